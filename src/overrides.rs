//! Site-specific overrides applied to load requests

use std::collections::BTreeMap;
use url::Url;

const YOUTUBE_DOMAINS: [&str; 2] = ["youtube.com", "youtube-nocookie.com"];

/// Query parameter that selects the YouTube layout the headset can play
const YOUTUBE_LAYOUT_PARAM: &str = "disable_polymer";

/// Per-domain user agent overrides
///
/// A lookup matches the request host and every parent domain of it, the most
/// specific entry winning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentOverrides {
    by_domain: BTreeMap<String, String>,
}

impl UserAgentOverrides {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let by_domain = entries
            .into_iter()
            .map(|(domain, ua)| (normalize_domain(domain.as_ref()), ua.into()))
            .filter(|(domain, _)| !domain.is_empty())
            .collect();
        Self { by_domain }
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    /// User agent to present for `uri`, `None` when no entry matches
    pub fn lookup(&self, uri: &str) -> Option<&str> {
        if self.by_domain.is_empty() {
            return None;
        }
        let url = Url::parse(uri).ok()?;
        let host = url.host_str()?.to_lowercase();

        let mut domain = host.as_str();
        loop {
            if let Some(ua) = self.by_domain.get(domain) {
                return Some(ua.as_str());
            }
            match domain.split_once('.') {
                Some((_, parent)) if parent.contains('.') => domain = parent,
                _ => return None,
            }
        }
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches("*.").trim_matches('.').to_lowercase()
}

/// Rewritten YouTube uri, `None` when `uri` needs no rewrite
///
/// YouTube pages are moved to https on the `www.` host with the legacy layout
/// selected. An already rewritten uri yields `None`.
pub fn youtube_override(uri: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    let host = url.host_str()?.to_lowercase();

    let domain = YOUTUBE_DOMAINS
        .iter()
        .find(|d| host == **d || host.ends_with(&format!(".{}", d)))?;

    let mut changed = false;

    if url.scheme() != "https" {
        url.set_scheme("https").ok()?;
        changed = true;
    }

    let desktop_host = format!("www.{}", domain);
    if host != desktop_host && (host == *domain || host == format!("m.{}", domain)) {
        url.set_host(Some(&desktop_host)).ok()?;
        changed = true;
    }

    if !url.query_pairs().any(|(key, _)| key == YOUTUBE_LAYOUT_PARAM) {
        url.query_pairs_mut().append_pair(YOUTUBE_LAYOUT_PARAM, "1");
        changed = true;
    }

    changed.then(|| url.to_string())
}
