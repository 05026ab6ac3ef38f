//! URL clean-up before a URL is fetched or shown to the model.

use regex::Regex;
use std::sync::OnceLock;

/// Replacement for URLs that must never be followed.
pub const BLANK_URL: &str = "about:blank";

const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// Neutralise script-bearing schemes and strip control characters.
///
/// The scheme check runs on a normalised copy (entities decoded, whitespace
/// and control characters removed, lowercased) so `java\tscript:` or
/// `&#106;avascript:` are caught too.
pub fn sanitize_url(url: &str) -> String {
    let cleaned: String = url.trim().chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        return BLANK_URL.to_string();
    }

    let probe: String = decode_numeric_entities(&cleaned)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase();

    if DANGEROUS_SCHEMES.iter().any(|s| probe.starts_with(s)) {
        return BLANK_URL.to_string();
    }
    cleaned
}

/// Prefix `https://` unless already present.
pub fn add_https_protocol(url: &str) -> String {
    if url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Like [`add_https_protocol`], then put `www.` in front of the host if it
/// is not already there.
pub fn add_https_protocol_and_www(url: &str) -> String {
    let secure = add_https_protocol(url);
    let rest = &secure["https://".len()..];
    if rest.starts_with("www.") {
        secure
    } else {
        format!("https://www.{}", rest)
    }
}

fn decode_numeric_entities(text: &str) -> String {
    static ENTITY: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = ENTITY.get_or_init(|| Regex::new(r"(?i)&#(x[0-9a-f]+|[0-9]+);?").ok()) else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    })
    .into_owned()
}
