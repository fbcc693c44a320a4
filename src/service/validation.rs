//! Input rules for link registration

use serde::{Deserialize, Serialize};
use url::Url;

pub const CUSTOM_CODE_MIN_LEN: usize = 3;
pub const CUSTOM_CODE_MAX_LEN: usize = 20;
pub const MAX_TAGS: usize = 5;
pub const TAG_MIN_LEN: usize = 2;
pub const TAG_MAX_LEN: usize = 20;
pub const MIN_EXPIRY_HOURS: f64 = 1.0;
/// One year
pub const MAX_EXPIRY_HOURS: f64 = 8760.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub custom_code: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub expiry_hours: Option<HoursInput>,
}

/// Form posts send numbers as strings, and an empty field as `""`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HoursInput {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A request that passed every rule
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLink {
    pub original_url: String,
    pub custom_code: Option<String>,
    pub tags: Vec<String>,
    pub expiry_hours: Option<f64>,
}

/// Check every field and report all violations at once.
pub fn validate(request: &CreateLinkRequest) -> Result<ValidatedLink, Vec<FieldError>> {
    let mut errors = Vec::new();

    let original_url = match request.original_url.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match parse_web_url(raw) {
            // Store the serialised form: the parser drops tabs and newlines
            // and percent-encodes the rest, so it is always a valid header
            Some(url) => url.as_str().to_string(),
            None => {
                errors.push(FieldError::new("originalUrl", "Please provide a valid URL"));
                String::new()
            }
        },
        _ => {
            errors.push(FieldError::new("originalUrl", "URL is required"));
            String::new()
        }
    };

    // Checked untrimmed: surrounding whitespace is an invalid character
    let custom_code = match request.custom_code.as_deref() {
        Some(code) if !code.is_empty() => {
            check_custom_code(code, &mut errors);
            Some(code.to_string())
        }
        _ => None,
    };

    let raw_tags: Vec<String> = request
        .tags
        .iter()
        .flatten()
        .map(|tag| tag.trim().to_string())
        .collect();
    check_tags(&raw_tags, &mut errors);

    // Tags form a set; the first spelling wins
    let mut tags: Vec<String> = Vec::with_capacity(raw_tags.len());
    for tag in raw_tags {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let expiry_hours = match parse_hours(request.expiry_hours.as_ref()) {
        Ok(hours) => hours,
        Err(error) => {
            errors.push(error);
            None
        }
    };

    if errors.is_empty() {
        Ok(ValidatedLink {
            original_url,
            custom_code,
            tags,
            expiry_hours,
        })
    } else {
        Err(errors)
    }
}

fn parse_web_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

fn check_custom_code(code: &str, errors: &mut Vec<FieldError>) {
    let len = code.chars().count();
    if len < CUSTOM_CODE_MIN_LEN {
        errors.push(FieldError::new(
            "customCode",
            "Custom code must be at least 3 characters long",
        ));
    } else if len > CUSTOM_CODE_MAX_LEN {
        errors.push(FieldError::new(
            "customCode",
            "Custom code cannot exceed 20 characters",
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(FieldError::new(
            "customCode",
            "Custom code can only contain letters, numbers, hyphens, and underscores",
        ));
    }
}

fn check_tags(tags: &[String], errors: &mut Vec<FieldError>) {
    if tags.len() > MAX_TAGS {
        errors.push(FieldError::new("tags", "Maximum 5 tags allowed"));
    }

    for tag in tags {
        let len = tag.chars().count();
        if len < TAG_MIN_LEN {
            errors.push(FieldError::new("tags", "Tag must be at least 2 characters long"));
        } else if len > TAG_MAX_LEN {
            errors.push(FieldError::new("tags", "Tag cannot exceed 20 characters"));
        }
    }
}

/// Absent, empty and zero all mean "never expires".
fn parse_hours(input: Option<&HoursInput>) -> Result<Option<f64>, FieldError> {
    let hours = match input {
        None => return Ok(None),
        Some(HoursInput::Number(n)) => *n,
        Some(HoursInput::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(HoursInput::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| FieldError::new("expiryHours", "Expiry time must be a number"))?,
    };

    if !hours.is_finite() {
        return Err(FieldError::new("expiryHours", "Expiry time must be a number"));
    }
    if hours == 0.0 {
        return Ok(None);
    }
    if hours < MIN_EXPIRY_HOURS {
        return Err(FieldError::new(
            "expiryHours",
            "Expiry time must be at least 1 hour",
        ));
    }
    if hours > MAX_EXPIRY_HOURS {
        return Err(FieldError::new(
            "expiryHours",
            "Expiry time cannot exceed 1 year",
        ));
    }

    Ok(Some(hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> CreateLinkRequest {
        CreateLinkRequest {
            original_url: Some(url.to_string()),
            ..CreateLinkRequest::default()
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn test_minimal_request_passes() {
        let valid = validate(&request("https://example.com/a?b=c")).unwrap();
        assert_eq!(valid.original_url, "https://example.com/a?b=c");
        assert_eq!(valid.custom_code, None);
        assert!(valid.tags.is_empty());
        assert_eq!(valid.expiry_hours, None);
    }

    #[test]
    fn test_url_rules() {
        let missing = validate(&CreateLinkRequest::default()).unwrap_err();
        assert_eq!(missing[0].message, "URL is required");

        for bad in ["not a url", "ftp://example.com", "javascript:alert(1)"] {
            let errors = validate(&request(bad)).unwrap_err();
            assert_eq!(fields(&errors), vec!["originalUrl"], "{bad}");
        }
    }

    #[test]
    fn test_url_stored_in_serialised_form() {
        let valid = validate(&request("https://example.com/a\nb\tc")).unwrap();
        assert_eq!(valid.original_url, "https://example.com/abc");

        let valid = validate(&request("https://example.com/café")).unwrap();
        assert_eq!(valid.original_url, "https://example.com/caf%C3%A9");

        let valid = validate(&request("  https://example.com  ")).unwrap();
        assert_eq!(valid.original_url, "https://example.com/");
    }

    #[test]
    fn test_custom_code_rules() {
        let mut req = request("https://example.com");

        req.custom_code = Some("".to_string());
        assert_eq!(validate(&req).unwrap().custom_code, None);

        req.custom_code = Some("my-code_1".to_string());
        assert_eq!(validate(&req).unwrap().custom_code.as_deref(), Some("my-code_1"));

        for bad in ["ab", "a".repeat(21).as_str(), "has space", " abc ", "emoji🙂"] {
            req.custom_code = Some(bad.to_string());
            assert!(validate(&req).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_tag_rules() {
        let mut req = request("https://example.com");

        req.tags = Some(vec![" news ".to_string(), "go".to_string()]);
        assert_eq!(validate(&req).unwrap().tags, vec!["news", "go"]);

        req.tags = Some(vec!["news".to_string(), " news".to_string(), "go".to_string()]);
        assert_eq!(validate(&req).unwrap().tags, vec!["news", "go"]);

        req.tags = Some((0..6).map(|i| format!("tag{i}")).collect());
        assert_eq!(validate(&req).unwrap_err()[0].message, "Maximum 5 tags allowed");

        req.tags = Some(vec!["x".to_string(), "y".repeat(21)]);
        assert_eq!(validate(&req).unwrap_err().len(), 2);
    }

    #[test]
    fn test_expiry_rules() {
        let mut req = request("https://example.com");

        req.expiry_hours = Some(HoursInput::Text("".to_string()));
        assert_eq!(validate(&req).unwrap().expiry_hours, None);

        req.expiry_hours = Some(HoursInput::Number(0.0));
        assert_eq!(validate(&req).unwrap().expiry_hours, None);

        req.expiry_hours = Some(HoursInput::Text("24".to_string()));
        assert_eq!(validate(&req).unwrap().expiry_hours, Some(24.0));

        req.expiry_hours = Some(HoursInput::Number(8760.0));
        assert_eq!(validate(&req).unwrap().expiry_hours, Some(8760.0));

        for bad in [
            HoursInput::Number(0.5),
            HoursInput::Number(8761.0),
            HoursInput::Text("soon".to_string()),
        ] {
            req.expiry_hours = Some(bad.clone());
            assert_eq!(fields(&validate(&req).unwrap_err()), vec!["expiryHours"], "{bad:?}");
        }
    }

    #[test]
    fn test_all_errors_reported_together() {
        let req = CreateLinkRequest {
            original_url: None,
            custom_code: Some("!!".to_string()),
            tags: Some(vec!["x".to_string()]),
            expiry_hours: Some(HoursInput::Number(-3.0)),
        };

        let errors = validate(&req).unwrap_err();
        let mut seen = fields(&errors);
        seen.dedup();
        assert_eq!(seen, vec!["originalUrl", "customCode", "tags", "expiryHours"]);
    }

    #[test]
    fn test_request_deserializes_from_form_json() {
        let req: CreateLinkRequest = serde_json::from_str(
            r#"{"originalUrl":"https://example.com","customCode":"","tags":["ab"],"expiryHours":"12"}"#,
        )
        .unwrap();
        assert_eq!(req.expiry_hours, Some(HoursInput::Text("12".to_string())));
        assert_eq!(validate(&req).unwrap().expiry_hours, Some(12.0));
    }
}
