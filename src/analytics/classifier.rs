//! Visitor classification from raw request metadata
//!
//! Device detection is delegated to woothee. Woothee has no tablet category
//! (an iPad reports as a smartphone), so tablets are picked out by keyword
//! before the parser runs. Agents woothee cannot place fall back to a small
//! keyword table and finally to `desktop`.

use woothee::parser::Parser;

pub const DESKTOP: &str = "desktop";
pub const MOBILE: &str = "mobile";
pub const TABLET: &str = "tablet";
pub const CONSOLE: &str = "console";

/// Referrer label used when the request carries no referer header
pub const DIRECT: &str = "direct";

const TABLET_HINTS: &[&str] = &["iPad", "Tablet", "Kindle", "Silk/", "PlayBook"];
const MOBILE_HINTS: &[&str] = &[
    "iPhone",
    "iPod",
    "Mobile",
    "Windows Phone",
    "BlackBerry",
    "Opera Mini",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub device: String,
    pub referrer: String,
}

/// Derive the device category and referrer label for a visit.
pub fn classify(user_agent: Option<&str>, referer: Option<&str>) -> Classification {
    Classification {
        device: device_category(user_agent).to_string(),
        referrer: referrer_label(referer),
    }
}

/// Referer header verbatim, or `direct` when there is none. No URL
/// normalisation happens here: two pages on one host are two referrers.
pub fn referrer_label(referer: Option<&str>) -> String {
    match referer {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DIRECT.to_string(),
    }
}

pub fn device_category(user_agent: Option<&str>) -> &'static str {
    let agent = match user_agent.map(str::trim) {
        Some(agent) if !agent.is_empty() => agent,
        _ => return DESKTOP,
    };

    if is_tablet(agent) {
        return TABLET;
    }

    match Parser::new().parse(agent) {
        Some(result) => match result.category {
            "smartphone" | "mobilephone" => MOBILE,
            "appliance" => CONSOLE,
            "pc" | "crawler" => DESKTOP,
            _ => keyword_category(agent),
        },
        None => keyword_category(agent),
    }
}

fn is_tablet(agent: &str) -> bool {
    if TABLET_HINTS.iter().any(|hint| agent.contains(hint)) {
        return true;
    }

    // Android tablets omit the "Mobile" token that phones carry
    agent.contains("Android") && !agent.contains("Mobile")
}

fn keyword_category(agent: &str) -> &'static str {
    if MOBILE_HINTS.iter().any(|hint| agent.contains(hint)) {
        MOBILE
    } else {
        DESKTOP
    }
}
