//! Raw person records and their projection to the flat output shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel written wherever a source field is absent.
pub const NA: &str = "NA";

/// Placeholder the host API returns in place of a still-locked email.
pub const LOCKED_EMAIL_PLACEHOLDER: &str = "email_not_unlocked@domain.com";

/// One person entry from a search response.
///
/// Everything is optional. The upstream payload omits fields freely and
/// sends explicit nulls for others; both deserialize to `None` and the
/// projector supplies sentinels.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: Option<Organization>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhoneNumber {
    #[serde(default)]
    pub raw_number: Option<String>,
    #[serde(default)]
    pub sanitized_number: Option<String>,
}

/// Flat record as persisted. Twelve fields, all strings except `page`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: String,
    pub job_title: String,
    pub location: String,
    pub linkedin_url: String,
    pub twitter_url: String,
    pub github_url: String,
    pub phone_number: String,
    pub page: u32,
}

/// Project a raw person onto the flat shape. Total: any absent source
/// field becomes [`NA`], so every record carries the same twelve keys.
pub fn project(person: &PersonRecord, page: u32) -> FlatRecord {
    FlatRecord {
        name: or_na(&person.name),
        first_name: or_na(&person.first_name),
        last_name: or_na(&person.last_name),
        email: or_na(&person.email),
        company: person
            .organization
            .as_ref()
            .and_then(|org| org.name.clone())
            .unwrap_or_else(|| NA.to_string()),
        job_title: or_na(&person.title),
        location: render_location(person),
        linkedin_url: or_na(&person.linkedin_url),
        twitter_url: or_na(&person.twitter_url),
        github_url: or_na(&person.github_url),
        phone_number: person
            .phone_numbers
            .first()
            .and_then(|phone| phone.raw_number.clone())
            .unwrap_or_else(|| NA.to_string()),
        page,
    }
}

/// True when the record is missing contact details worth unlocking:
/// no email, a placeholder email, a first phone without a raw number, or
/// no phone entries at all. An empty phone list triggers unlocking even
/// when the email is already present.
pub fn needs_unlock(person: &PersonRecord) -> bool {
    let email_missing = person
        .email
        .as_deref()
        .map_or(true, |email| email.is_empty() || email == LOCKED_EMAIL_PLACEHOLDER);
    let phone_missing = person
        .phone_numbers
        .first()
        .and_then(|phone| phone.raw_number.as_deref())
        .map_or(true, str::is_empty);
    email_missing || phone_missing || person.phone_numbers.is_empty()
}

/// "City, State" when the city is known, with `NA` standing in for a
/// missing state. No city at all collapses the whole field to `NA`.
fn render_location(person: &PersonRecord) -> String {
    match person.city.as_deref() {
        Some(city) if !city.is_empty() => {
            let state = person
                .state
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NA.to_string());
            format!("{city}, {state}")
        }
        _ => NA.to_string(),
    }
}

fn or_na(field: &Option<String>) -> String {
    field.clone().unwrap_or_else(|| NA.to_string())
}

/// Parse one raw payload entry into a [`PersonRecord`].
pub fn parse_person(raw: &Value) -> Result<PersonRecord, serde_json::Error> {
    serde_json::from_value(raw.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_is_total_on_empty_record() {
        let record = project(&PersonRecord::default(), 3);
        assert_eq!(record.name, NA);
        assert_eq!(record.email, NA);
        assert_eq!(record.company, NA);
        assert_eq!(record.location, NA);
        assert_eq!(record.phone_number, NA);
        assert_eq!(record.page, 3);
    }

    #[test]
    fn test_projection_flattens_nested_fields() {
        let person = parse_person(&json!({
            "id": "66f1a",
            "name": "Ann Lee",
            "first_name": "Ann",
            "last_name": "Lee",
            "email": "ann@example.com",
            "organization": {"name": "Acme"},
            "title": "CTO",
            "city": "Austin",
            "state": "Texas",
            "linkedin_url": "https://linkedin.com/in/annlee",
            "phone_numbers": [{"raw_number": "+1-555-0100", "sanitized_number": "+15550100"}]
        }))
        .unwrap();
        let record = project(&person, 1);
        assert_eq!(record.name, "Ann Lee");
        assert_eq!(record.company, "Acme");
        assert_eq!(record.job_title, "CTO");
        assert_eq!(record.location, "Austin, Texas");
        assert_eq!(record.phone_number, "+1-555-0100");
        assert_eq!(record.twitter_url, NA);
        assert_eq!(record.github_url, NA);
    }

    #[test]
    fn test_explicit_nulls_become_na() {
        let person = parse_person(&json!({
            "name": "Bo",
            "email": null,
            "organization": null,
            "city": null
        }))
        .unwrap();
        let record = project(&person, 2);
        assert_eq!(record.email, NA);
        assert_eq!(record.company, NA);
        assert_eq!(record.location, NA);
    }

    #[test]
    fn test_location_without_state() {
        let person = parse_person(&json!({"city": "Austin"})).unwrap();
        assert_eq!(project(&person, 1).location, "Austin, NA");
    }

    #[test]
    fn test_flat_record_has_twelve_keys() {
        let value = serde_json::to_value(project(&PersonRecord::default(), 1)).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 12);
    }

    #[test]
    fn test_needs_unlock_on_placeholder_email() {
        let person = parse_person(&json!({
            "email": LOCKED_EMAIL_PLACEHOLDER,
            "phone_numbers": [{"raw_number": "+1-555-0100"}]
        }))
        .unwrap();
        assert!(needs_unlock(&person));
    }

    #[test]
    fn test_needs_unlock_on_missing_phone() {
        let person = parse_person(&json!({
            "email": "real@example.com",
            "phone_numbers": []
        }))
        .unwrap();
        assert!(needs_unlock(&person));
    }

    #[test]
    fn test_needs_unlock_on_phone_without_raw_number() {
        let person = parse_person(&json!({
            "email": "real@example.com",
            "phone_numbers": [{"sanitized_number": "+15550100"}]
        }))
        .unwrap();
        assert!(needs_unlock(&person));
    }

    #[test]
    fn test_complete_record_needs_no_unlock() {
        let person = parse_person(&json!({
            "email": "real@example.com",
            "phone_numbers": [{"raw_number": "+1-555-0100"}]
        }))
        .unwrap();
        assert!(!needs_unlock(&person));
    }

    #[test]
    fn test_unknown_payload_fields_are_ignored() {
        let person = parse_person(&json!({
            "name": "Cy",
            "intent_strength": null,
            "show_intent": false,
            "restricted": true
        }))
        .unwrap();
        assert_eq!(project(&person, 1).name, "Cy");
    }
}
