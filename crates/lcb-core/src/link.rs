//! Link parsing for Telegram invite/channel links.

use std::sync::OnceLock;

use regex::Regex;

use crate::lookup::LookupError;

/// What a link points at, as far as the lookup API is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    /// Private invite (`t.me/+HASH`, `t.me/joinchat/HASH`).
    Invite(String),
    /// Public username (`t.me/name`, `@name`).
    Username(String),
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:@|(?:https?://)?(?:www\.)?(?:telegram\.(?:me|dog)|t\.me)/(joinchat/|\+)?)",
        )
        .expect("valid regex")
    })
}

fn invite_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"))
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z]\w{1,30}[a-z0-9]$").expect("valid regex"))
}

/// Parse a user-supplied link into a lookup target.
pub fn parse_link(raw: &str) -> Result<LinkTarget, LookupError> {
    let trimmed = raw.trim();
    let malformed = || LookupError::Malformed(trimmed.to_string());

    let (is_invite, rest) = match prefix_re().captures(trimmed) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (caps.get(1).is_some(), &trimmed[whole..])
        }
        None => (false, trimmed),
    };

    // Drop query/fragment and a trailing slash.
    let rest = rest.split(|c: char| c == '?' || c == '#').next().unwrap_or("");
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    if rest.is_empty() {
        return Err(malformed());
    }

    if is_invite {
        if !invite_hash_re().is_match(rest) {
            return Err(malformed());
        }
        return Ok(LinkTarget::Invite(rest.to_string()));
    }

    if !username_re().is_match(rest) || rest.contains("__") {
        return Err(malformed());
    }
    Ok(LinkTarget::Username(rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invite_forms() {
        for raw in [
            "https://t.me/+AbCdEf123",
            "t.me/+AbCdEf123",
            "http://telegram.me/joinchat/AbCdEf123",
            "https://www.t.me/joinchat/AbCdEf123/",
        ] {
            assert_eq!(
                parse_link(raw).unwrap(),
                LinkTarget::Invite("AbCdEf123".to_string()),
                "{raw}"
            );
        }
    }

    #[test]
    fn parses_public_usernames() {
        assert_eq!(
            parse_link("https://t.me/rust_lang").unwrap(),
            LinkTarget::Username("rust_lang".to_string())
        );
        assert_eq!(
            parse_link("@durov").unwrap(),
            LinkTarget::Username("durov".to_string())
        );
        assert_eq!(
            parse_link("  t.me/SomeChannel?start=1  ").unwrap(),
            LinkTarget::Username("SomeChannel".to_string())
        );
        assert_eq!(
            parse_link("telegram.dog/channel_01").unwrap(),
            LinkTarget::Username("channel_01".to_string())
        );
    }

    #[test]
    fn rejects_malformed_links() {
        for raw in [
            "https://t.me/",
            "https://t.me/+",
            "t.me/joinchat/",
            "t.me/some/123",
            "t.me/1abc",
            "t.me/ab",
            "t.me/bad__name",
            "t.me/ends_",
            "hello world",
        ] {
            assert!(
                matches!(parse_link(raw), Err(LookupError::Malformed(_))),
                "{raw}"
            );
        }
    }
}
