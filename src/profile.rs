//! Browser profile selection.
//!
//! Responsibilities:
//! - Hold the embedded browser/platform/device user-agent table.
//! - Select a profile from filter options (platform, browser, desktop/mobile).
//! - Allow a custom user-agent while keeping matching browser headers.

use std::borrow::Cow;

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Deserialize;

use crate::headers::HeaderSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceKind {
    Desktop,
    Mobile,
}

struct AgentEntry {
    device: DeviceKind,
    platform: &'static str,
    browser: &'static str,
    agents: &'static [&'static str],
}

struct BrowserHeaders {
    browser: &'static str,
    accept: &'static str,
    accept_language: &'static str,
    accept_encoding: &'static str,
}

const PLATFORMS: &[&str] = &["linux", "windows", "darwin", "android", "ios"];

const BROWSER_HEADERS: &[BrowserHeaders] = &[
    BrowserHeaders {
        browser: "chrome",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        accept_encoding: "gzip, deflate, br",
    },
    BrowserHeaders {
        browser: "firefox",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        accept_encoding: "gzip, deflate, br",
    },
];

const AGENTS: &[AgentEntry] = &[
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "windows",
        browser: "chrome",
        agents: &[
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
        ],
    },
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "windows",
        browser: "firefox",
        agents: &[
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
        ],
    },
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "linux",
        browser: "chrome",
        agents: &[
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        ],
    },
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "linux",
        browser: "firefox",
        agents: &["Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0"],
    },
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "darwin",
        browser: "chrome",
        agents: &[
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        ],
    },
    AgentEntry {
        device: DeviceKind::Desktop,
        platform: "darwin",
        browser: "firefox",
        agents: &[
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
        ],
    },
    AgentEntry {
        device: DeviceKind::Mobile,
        platform: "android",
        browser: "chrome",
        agents: &[
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
        ],
    },
    AgentEntry {
        device: DeviceKind::Mobile,
        platform: "ios",
        browser: "chrome",
        agents: &[
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/131.0.6778.73 Mobile/15E148 Safari/604.1",
        ],
    },
];

/// Options to filter/select a profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub custom: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub desktop: bool,
    pub mobile: bool,
    pub allow_brotli: bool,
}

impl BrowserOptions {
    /// Desktop Chrome on Windows, the profile the bypass client presents.
    pub fn chrome_windows() -> Self {
        Self {
            platform: Some("windows".into()),
            browser: Some("chrome".into()),
            desktop: true,
            mobile: false,
            allow_brotli: true,
            custom: None,
        }
    }
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self::chrome_windows()
    }
}

/// Final selected profile.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub browser: String,
    pub platform: String,
    pub headers: HeaderSet,
}

impl BrowserProfile {
    pub fn user_agent(&self) -> &str {
        self.headers.get("User-Agent").unwrap_or_default()
    }
}

/// Select a browser profile matching `opts`.
pub fn select_profile(opts: &BrowserOptions) -> Result<BrowserProfile, ProfileError> {
    if !opts.desktop && !opts.mobile {
        return Err(ProfileError::InvalidOptions(
            "desktop and mobile cannot both be disabled".into(),
        ));
    }

    if let Some(ref custom) = opts.custom {
        return Ok(custom_profile(custom));
    }

    let platform = match opts.platform {
        Some(ref platform) => {
            if !PLATFORMS.contains(&platform.as_str()) {
                return Err(ProfileError::InvalidOptions(
                    format!("invalid platform '{platform}'; valid: {}", PLATFORMS.join(", "))
                        .into(),
                ));
            }
            platform.clone()
        }
        None => random_choice(PLATFORMS)
            .ok_or(ProfileError::ProfileNotFound)?
            .to_string(),
    };

    let candidates: Vec<&AgentEntry> = AGENTS
        .iter()
        .filter(|entry| entry.platform == platform)
        .filter(|entry| match entry.device {
            DeviceKind::Desktop => opts.desktop,
            DeviceKind::Mobile => opts.mobile,
        })
        .collect();

    if candidates.is_empty() {
        return Err(ProfileError::ProfileNotFound);
    }

    let entry = match opts.browser {
        Some(ref browser) => candidates
            .iter()
            .copied()
            .find(|entry| entry.browser == browser.as_str())
            .ok_or_else(|| {
                ProfileError::InvalidOptions(
                    format!("browser '{browser}' not available for platform '{platform}'").into(),
                )
            })?,
        None => random_choice(&candidates).ok_or(ProfileError::ProfileNotFound)?,
    };

    let user_agent = random_choice(entry.agents).ok_or(ProfileError::ProfileNotFound)?;
    let template = browser_headers(entry.browser).ok_or(ProfileError::ProfileNotFound)?;

    let mut headers = HeaderSet::new();
    headers.insert("User-Agent", user_agent);
    headers.insert("Accept", template.accept);
    headers.insert("Accept-Language", template.accept_language);
    headers.insert("Accept-Encoding", template.accept_encoding);
    if !opts.allow_brotli {
        strip_brotli(&mut headers);
    }

    Ok(BrowserProfile {
        browser: entry.browser.to_string(),
        platform,
        headers,
    })
}

fn custom_profile(custom: &str) -> BrowserProfile {
    let matched = AGENTS
        .iter()
        .find(|entry| entry.agents.iter().any(|agent| agent.contains(custom)));

    let mut headers = HeaderSet::new();
    headers.insert("User-Agent", custom);
    match matched.and_then(|entry| browser_headers(entry.browser)) {
        Some(template) => {
            headers.insert("Accept", template.accept);
            headers.insert("Accept-Language", template.accept_language);
            headers.insert("Accept-Encoding", template.accept_encoding);
        }
        None => {
            headers.insert(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
            );
            headers.insert("Accept-Language", "en-US,en;q=0.9");
            headers.insert("Accept-Encoding", "gzip, deflate");
        }
    }

    BrowserProfile {
        browser: matched.map(|entry| entry.browser).unwrap_or("custom").to_string(),
        platform: matched.map(|entry| entry.platform).unwrap_or("unknown").to_string(),
        headers,
    }
}

fn browser_headers(browser: &str) -> Option<&'static BrowserHeaders> {
    BROWSER_HEADERS.iter().find(|headers| headers.browser == browser)
}

fn strip_brotli(headers: &mut HeaderSet) {
    if let Some(encoding) = headers.get("Accept-Encoding") {
        let filtered = encoding
            .split(',')
            .map(str::trim)
            .filter(|enc| !enc.eq_ignore_ascii_case("br"))
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert("Accept-Encoding", filtered);
    }
}

fn random_choice<T: Copy>(items: &[T]) -> Option<T> {
    items.choose(&mut thread_rng()).copied()
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid browser options: {0}")]
    InvalidOptions(Cow<'static, str>),
    #[error("no matching browser profile found")]
    ProfileNotFound,
}
