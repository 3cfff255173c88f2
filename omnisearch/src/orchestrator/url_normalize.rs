//! URL normalisation for cross-source deduplication.
//!
//! Two results are the same page when their URLs differ only in tracking
//! parameters, one trailing slash, or letter case.

use url::Url;

/// Tracking query parameters that are stripped during normalisation.
const TRACKING_PARAMS: &[&str] = &["utm_source", "utm_medium", "utm_campaign", "ref"];

/// Normalise a URL for deduplication comparison.
///
/// Applies the following transformations:
///
/// 1. Strip known tracking parameters (`utm_source`, `utm_medium`,
///    `utm_campaign`, `ref`); drop the `?` if nothing remains.
/// 2. Strip a single trailing slash from the serialised URL.
/// 3. Lowercase the whole string.
///
/// Remaining parameter order and fragments are preserved. Input that does
/// not parse as a URL only gets steps 2 and 3.
///
/// # Examples
///
/// ```
/// use omnisearch::orchestrator::url_normalize::normalize_url;
///
/// let a = normalize_url("https://a.com/x?utm_source=y");
/// let b = normalize_url("https://a.com/x/");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let serialised = match Url::parse(raw) {
        Ok(parsed) => strip_tracking_params(parsed).to_string(),
        Err(_) => raw.to_string(),
    };
    let trimmed = serialised.strip_suffix('/').unwrap_or(&serialised);
    trimmed.to_lowercase()
}

fn strip_tracking_params(mut parsed: Url) -> Url {
    if parsed.query().is_none() {
        return parsed;
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.iter().any(|p| *p == *key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed
}

/// Host of `raw` without a leading `www.`; empty if the URL has no host.
pub fn domain_of(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .map(|host| host.strip_prefix("www.").unwrap_or(&host).to_owned())
        .unwrap_or_default()
}
