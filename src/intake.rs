use regex::Regex;
use std::sync::LazyLock;

use crate::models::CompanyPerson;

static LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:[a-z]{2,3}\.)?linkedin\.com/in/[^\s/?#]+/?").unwrap()
});

static TWITTER_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?(?:twitter|x)\.com/([A-Za-z0-9_]{1,15})\b").unwrap()
});

static TWITTER_HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@([A-Za-z0-9_]{1,15})\b").unwrap());

/// What the board can tell about pasted text before the backend parses it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPreview {
    pub name: Option<String>,
    pub profile_link: Option<String>,
    pub twitter_handle: Option<String>,
}

pub fn preview(raw: &str) -> DraftPreview {
    let profile_link = LINKEDIN_RE.find(raw).map(|m| m.as_str().to_string());

    let twitter_handle = TWITTER_URL_RE
        .captures(raw)
        .or_else(|| TWITTER_HANDLE_RE.captures(raw))
        .map(|caps| caps[1].to_string());

    // First line that is plain text, not a link or a handle
    let name = raw
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('@')
                && !line.contains("://")
                && !line.starts_with("www.")
        })
        .map(|line| truncate_chars(line, 60));

    DraftPreview {
        name,
        profile_link,
        twitter_handle,
    }
}

/// Pre-filled draft text for one person from a company lookup.
pub fn company_entry_text(person: &CompanyPerson, domain: &str) -> String {
    let mut lines = Vec::with_capacity(3);
    for part in [person.name.trim(), person.profile_link.trim(), domain.trim()] {
        if !part.is_empty() {
            lines.push(part);
        }
    }
    lines.join("\n")
}

/// Splits operator input like `a@x.com, b@x.com` into addresses.
pub fn parse_email_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_extracts_fields() {
        let raw = "Jesse Zhang\nhttps://linkedin.com/in/jesse\n@jesseontwitter\nWorks at decagon.ai\nMet at hackathon, interested in LLMs";
        let p = preview(raw);
        assert_eq!(p.name, Some("Jesse Zhang".to_string()));
        assert_eq!(p.profile_link, Some("https://linkedin.com/in/jesse".to_string()));
        assert_eq!(p.twitter_handle, Some("jesseontwitter".to_string()));
    }

    #[test]
    fn test_preview_twitter_url_and_www_linkedin() {
        let raw = "https://www.linkedin.com/in/thejessezhang/\nhttps://x.com/thejessezhang\nJesse";
        let p = preview(raw);
        assert_eq!(
            p.profile_link,
            Some("https://www.linkedin.com/in/thejessezhang/".to_string())
        );
        assert_eq!(p.twitter_handle, Some("thejessezhang".to_string()));
        assert_eq!(p.name, Some("Jesse".to_string()));
    }

    #[test]
    fn test_preview_ignores_email_addresses_as_handles() {
        let p = preview("Reach me at jesse@decagon.ai");
        assert_eq!(p.twitter_handle, None);
        assert_eq!(p.name, Some("Reach me at jesse@decagon.ai".to_string()));
    }

    #[test]
    fn test_preview_empty_text() {
        assert_eq!(preview("  \n\n"), DraftPreview::default());
    }

    #[test]
    fn test_company_entry_text() {
        let person = CompanyPerson {
            name: "Ada Lovelace".to_string(),
            profile_link: "https://linkedin.com/in/ada".to_string(),
        };
        assert_eq!(
            company_entry_text(&person, "analytical.io"),
            "Ada Lovelace\nhttps://linkedin.com/in/ada\nanalytical.io"
        );
        assert_eq!(
            company_entry_text(&person, " "),
            "Ada Lovelace\nhttps://linkedin.com/in/ada"
        );
    }

    #[test]
    fn test_parse_email_list() {
        assert_eq!(
            parse_email_list("a@x.com, b@x.com;c@x.com\n d@x.com"),
            vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com"]
        );
        assert!(parse_email_list(" , ").is_empty());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("Zoë Ångström-Smith", 8), "Zoë Å...");
    }
}
