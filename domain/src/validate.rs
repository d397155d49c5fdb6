//! URL normalization and host helpers used by the destination stage and the
//! domain checks.

use url::Url;

use crate::pipeline::Draft;
use crate::{ErrorCode, Rejection, ROOT_KEY};

/// Longest destination URL we accept.
pub const MAX_URL_LENGTH: usize = 32_000;

/// Second-level labels under which registrations happen one level deeper
/// (`example.co.uk`).
const SECOND_LEVEL_LABELS: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "org", "ne", "or"];

fn parse_with_host(s: &str) -> Option<Url> {
    Url::parse(s).ok().filter(|u| u.host_str().is_some())
}

/// True when `s` parses as an absolute URL with a host.
pub fn is_valid_url(s: &str) -> bool {
    parse_with_host(s).is_some()
}

/// Canonicalize a user-supplied destination. Valid URLs are kept as typed;
/// scheme-less input like `example.com/x` is promoted to `https://`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_URL_LENGTH {
        return None;
    }
    if is_valid_url(trimmed) {
        return Some(trimmed.to_string());
    }
    if trimmed.contains('.') && !trimmed.contains(char::is_whitespace) {
        return parse_with_host(&format!("https://{}", trimmed)).map(|u| u.to_string());
    }
    None
}

/// Set each query parameter on `url`, replacing the first occurrence of the
/// same name in place and dropping later duplicates.
pub fn merge_query_params(url: &str, params: &[(&str, &str)]) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

    for (name, value) in params {
        match pairs.iter().position(|(k, _)| k == name) {
            Some(first) => {
                pairs[first].1 = value.to_string();
                let mut idx = 0;
                pairs.retain(|(k, _)| {
                    let keep = k != name || idx == first;
                    idx += 1;
                    keep
                });
            }
            None => pairs.push((name.to_string(), value.to_string())),
        }
    }

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    Some(parsed.to_string())
}

fn host_of(url: &str) -> Option<String> {
    if let Some(u) = parse_with_host(url) {
        return u.host_str().map(str::to_lowercase);
    }
    if url.contains('.') && !url.contains(char::is_whitespace) {
        return parse_with_host(&format!("https://{}", url))
            .and_then(|u| u.host_str().map(str::to_lowercase));
    }
    None
}

/// Hostname with a leading `www.` removed.
pub fn hostname_without_www(url: &str) -> Option<String> {
    host_of(url).map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
}

/// Registrable ("apex") domain of a URL.
pub fn apex_domain(url: &str) -> Option<String> {
    let host = hostname_without_www(url)?;
    match host.as_str() {
        "youtu.be" => return Some("youtube.com".into()),
        "raw.githubusercontent.com" => return Some("github.com".into()),
        _ => {}
    }
    if host.ends_with(".vercel.app") {
        return Some(host);
    }
    let parts: Vec<&str> = host.split('.').collect();
    let n = parts.len();
    if n <= 2 {
        return Some(host);
    }
    let tld = parts[n - 1];
    if SECOND_LEVEL_LABELS.contains(&parts[n - 2]) && tld.len() == 2 {
        Some(parts[n - 3..].join("."))
    } else {
        Some(parts[n - 2..].join("."))
    }
}

/// Destination stage: canonicalize the URL and merge UTM tags into it.
pub(crate) fn normalize_destination(draft: &mut Draft) -> Result<(), Rejection> {
    let raw = draft.url.take().filter(|u| !u.trim().is_empty());
    let Some(raw) = raw else {
        if draft.key.as_deref() != Some(ROOT_KEY) {
            return Err(Rejection::new(
                ErrorCode::MissingUrl,
                "Missing destination URL",
            ));
        }
        return Ok(());
    };

    let mut url = normalize_url(&raw)
        .ok_or_else(|| Rejection::new(ErrorCode::InvalidUrl, "Invalid destination URL"))?;

    let utm = draft.request.utm.present();
    if !utm.is_empty() {
        url = merge_query_params(&url, &utm)
            .ok_or_else(|| Rejection::new(ErrorCode::InvalidUrl, "Invalid destination URL"))?;
    }

    draft.url = Some(url);
    Ok(())
}
