//! Cleanup of free-text contact fields.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::ilcd::epd::model::openepd::ILCD_ATTACHMENT;

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[+\d\s\-()]+").expect("phone pattern is valid"))
}

/// Extracts the longest phone-like run, e.g. `Tel: +49 (0) 521 93` into
/// `+49 (0) 521 93`. Text without such a run is returned unchanged.
pub fn cleanup_phone(phone: &str) -> String {
    let mut runs: Vec<&str> = phone_pattern()
        .find_iter(phone)
        .map(|found| found.as_str())
        .collect();
    runs.sort_by_key(|run| std::cmp::Reverse(run.len()));
    runs.into_iter()
        .map(str::trim)
        .find(|run| !run.is_empty())
        .unwrap_or(phone)
        .to_string()
}

/// A bare domain becomes `https://<domain>/`; URLs are kept.
pub fn cleanup_website(website: &str) -> String {
    let website = website.trim();
    if website.starts_with("http") {
        website.to_string()
    } else {
        format!("https://{website}/")
    }
}

/// Host of a URL without a `www.` prefix. Bare domains are accepted too.
pub fn domain_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if !url.starts_with("http") {
        return Some(url.strip_prefix("www.").unwrap_or(url).to_string());
    }
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Key under which provider specific identifiers are stored in `alt_ids`.
pub fn provider_domain(base_url: Option<&str>) -> String {
    base_url
        .and_then(domain_from_url)
        .unwrap_or_else(|| ILCD_ATTACHMENT.to_string())
}
