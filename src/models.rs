use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One person being pursued for outreach, as the backend returns it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub possible_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>, // drafted body from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email2: Option<String>, // operator-edited body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_message_sent: Option<bool>,
    /// Fields the backend attaches that this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ContactRecord {
    pub fn key(&self) -> RecordKey {
        let link = self
            .profile_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(|link| link.trim_end_matches('/').to_lowercase());
        RecordKey {
            link,
            name: self.name.trim().to_string(),
        }
    }

    pub fn same_person(&self, other: &ContactRecord) -> bool {
        self.key().same_person(&other.key())
    }

    /// The body that will be sent: the edited version wins over the draft.
    pub fn body(&self) -> Option<&str> {
        self.email2.as_deref().or(self.email.as_deref())
    }

    pub fn has_draft(&self) -> bool {
        self.email.is_some()
    }

    pub fn is_delivered(&self) -> bool {
        let emailed = self.email_sent.as_ref().is_some_and(|sent| !sent.is_empty());
        emailed && self.twitter_message_sent == Some(true)
    }

    pub fn effective_domain(&self) -> Option<String> {
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.trim().is_empty()) {
            return Some(domain.trim().to_string());
        }
        self.profile_link.as_deref().and_then(profile_slug)
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.profile_link.as_deref().unwrap_or("(unnamed)")
        } else {
            &self.name
        }
    }
}

/// Second path segment of a profile URL, e.g. `jesse` in `https://linkedin.com/in/jesse`.
pub fn profile_slug(link: &str) -> Option<String> {
    let parsed = url::Url::parse(link.trim()).ok()?;
    let slug = parsed.path_segments()?.filter(|s| !s.is_empty()).nth(1)?;
    Some(slug.to_string())
}

/// Identity of a record: its normalized profile link and trimmed name.
///
/// Equality is exact and names one record. `same_person` is the looser match
/// used across stages and against the backend, where either side may lack a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    link: Option<String>,
    name: String,
}

impl RecordKey {
    /// Links decide when both sides have one; otherwise the names must agree.
    pub fn same_person(&self, other: &RecordKey) -> bool {
        match (&self.link, &other.link) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            Some(link) => f.write_str(link),
            None => f.write_str(&self.name),
        }
    }
}

/// A not-yet-submitted block of pasted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyPerson {
    pub name: String,
    pub profile_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, link: Option<&str>) -> ContactRecord {
        ContactRecord {
            name: name.to_string(),
            profile_link: link.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_key_prefers_normalized_profile_link() {
        let a = record("Jesse Zhang", Some("https://LinkedIn.com/in/jesse/"));
        let b = record("J. Zhang", Some("  https://linkedin.com/in/jesse"));
        assert!(a.same_person(&b));
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "https://linkedin.com/in/jesse");

        let other = record("Jesse Zhang", Some("https://linkedin.com/in/jesse-z"));
        assert!(!a.same_person(&other));
    }

    #[test]
    fn test_same_person_when_one_side_has_no_link() {
        let linked = record("Jesse Zhang", Some("https://linkedin.com/in/jesse"));
        let bare = record(" Jesse Zhang", None);
        assert!(linked.same_person(&bare));
        assert!(bare.same_person(&linked));

        let stranger = record("Ada Lovelace", None);
        assert!(!linked.same_person(&stranger));
    }

    #[test]
    fn test_key_falls_back_to_name() {
        let a = record(" Jesse Zhang ", None);
        let b = record("Jesse Zhang", Some("   "));
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "Jesse Zhang");
    }

    #[test]
    fn test_body_prefers_edited_version() {
        let mut r = record("Jesse", None);
        assert_eq!(r.body(), None);
        r.email = Some("draft".to_string());
        assert_eq!(r.body(), Some("draft"));
        r.email2 = Some("final".to_string());
        assert_eq!(r.body(), Some("final"));
    }

    #[test]
    fn test_is_delivered_requires_both_channels() {
        let mut r = record("Jesse", None);
        assert!(!r.is_delivered());

        r.email_sent = Some(vec!["a@x.com".to_string()]);
        assert!(!r.is_delivered());

        r.twitter_message_sent = Some(true);
        assert!(r.is_delivered());

        r.email_sent = Some(Vec::new());
        assert!(!r.is_delivered());
    }

    #[test]
    fn test_effective_domain() {
        let mut r = record("Jesse", Some("https://linkedin.com/in/jesse"));
        assert_eq!(r.effective_domain(), Some("jesse".to_string()));

        r.domain = Some("decagon.ai".to_string());
        assert_eq!(r.effective_domain(), Some("decagon.ai".to_string()));

        let bare = record("Nobody", Some("not a url"));
        assert_eq!(bare.effective_domain(), None);
    }

    #[test]
    fn test_deserialize_tolerates_nulls_and_keeps_unknown_fields() {
        let json = r#"{
            "name": "Jesse Zhang",
            "profile_link": "https://linkedin.com/in/jesse",
            "possible_emails": null,
            "email": "Hi Jesse",
            "email_sent": null,
            "status": "pending"
        }"#;
        let r: ContactRecord = serde_json::from_str(json).unwrap();
        assert!(r.possible_emails.is_empty());
        assert_eq!(r.email.as_deref(), Some("Hi Jesse"));
        assert_eq!(r.email_sent, None);
        assert_eq!(r.extra.get("status"), Some(&Value::String("pending".to_string())));

        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["status"], "pending");
        assert!(back.get("email2").is_none());
    }
}
