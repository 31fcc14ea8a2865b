//! Challenge page heuristics.
//!
//! Two separate checks live here:
//! - [`is_unresolved_challenge`], the dispatcher's fallback trigger. It is a
//!   plain substring match and is known to be fragile: any 403 page that
//!   mentions the vendor name counts, and other vendors are not recognised.
//! - [`detect_interstitial`], used by the bypass client to decide whether a
//!   response is a challenge page worth waiting out.

use http::HeaderMap;
use http::header::SERVER;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Substring whose presence in a 403 body marks an unsolved challenge.
pub const CHALLENGE_VENDOR_MARKER: &str = "cloudflare";

/// Returns true when the bypass client handed back a challenge it could not
/// clear: status 403 and a body mentioning the vendor, case-insensitively.
pub fn is_unresolved_challenge(status: u16, body: &str) -> bool {
    status == 403 && body.to_lowercase().contains(CHALLENGE_VENDOR_MARKER)
}

/// Known challenge interstitials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterstitialKind {
    JavaScript,
    Managed,
    Turnstile,
    RateLimit,
}

#[derive(Debug)]
struct InterstitialPattern {
    kind: InterstitialKind,
    patterns: Vec<Regex>,
}

impl InterstitialPattern {
    fn new(kind: InterstitialKind, raw_patterns: &[&str]) -> Self {
        Self {
            kind,
            patterns: raw_patterns.iter().map(|pattern| build_regex(pattern)).collect(),
        }
    }

    fn matches(&self, body: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(body))
    }
}

static KNOWN_INTERSTITIALS: Lazy<Vec<InterstitialPattern>> = Lazy::new(|| {
    vec![
        InterstitialPattern::new(
            InterstitialKind::Turnstile,
            &[
                r#"class="cf-turnstile""#,
                r#"src="https://challenges\.cloudflare\.com/turnstile/v0/api\.js"#,
            ],
        ),
        InterstitialPattern::new(
            InterstitialKind::Managed,
            &[
                r#"cpo\.src\s*=\s*['"]/cdn-cgi/challenge-platform/.*?orchestrate/(?:captcha|managed)/v1"#,
                r"window\._cf_chl_ctx\s*=",
            ],
        ),
        InterstitialPattern::new(
            InterstitialKind::JavaScript,
            &[
                r#"<title>\s*Just a moment\.\.\.\s*</title>"#,
                r"window\._cf_chl_opt\s*=",
                r#"<form[^>]*id="challenge-form""#,
            ],
        ),
        InterstitialPattern::new(
            InterstitialKind::RateLimit,
            &[
                r#"<span[^>]*class="cf-error-code">1015<"#,
                r"You are being rate limited",
            ],
        ),
    ]
});

/// Detect whether the response is served by Cloudflare.
pub fn is_cloudflare_server(headers: &HeaderMap) -> bool {
    headers
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("cloudflare"))
        .unwrap_or(false)
}

/// Classify a challenge interstitial, if the response is one.
pub fn detect_interstitial(status: u16, headers: &HeaderMap, body: &str) -> Option<InterstitialKind> {
    if !matches!(status, 403 | 429 | 503) || !is_cloudflare_server(headers) {
        return None;
    }

    KNOWN_INTERSTITIALS
        .iter()
        .find(|pattern| pattern.matches(body))
        .map(|pattern| pattern.kind)
}

fn build_regex(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap_or_else(|err| panic!("invalid challenge pattern {pattern:?}: {err}"))
}
