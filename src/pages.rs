//! Internal pages and URI helpers

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use url::Url;

use crate::engine::LoadError;

pub const ABOUT_BLANK: &str = "about:blank";

/// Sentinel uri the private placeholder page is known by. Content may never navigate to it.
pub const PRIVATE_BROWSING_URI: &str = "about:privatebrowsing";

/// Region used once region lookup finished without a country
pub const WORLDWIDE_REGION: &str = "worldwide";

const MOBILE_PREFIXES: [&str; 2] = ["m.", "mobile."];

const PRIVATE_PAGE_HTML: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Private Browsing</title>\
<style>body{background:#1c1b22;color:#fbfbfe;font-family:sans-serif;text-align:center;padding-top:20%}</style>\
</head><body><h1>Private Browsing</h1>\
<p>Pages you visit in this window are not saved to history.</p></body></html>";

/// Home uri for a configured homepage
///
/// Only the shipped homepage is decorated with the region.
pub fn home_uri(homepage: &str, is_default_homepage: bool, region: Option<&str>) -> String {
    match region {
        Some(region) if is_default_homepage => match Url::parse(homepage) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("region", region);
                url.to_string()
            }
            Err(_) => format!("{}?region={}", homepage, region),
        },
        _ => homepage.to_string(),
    }
}

/// Whether `uri` is (a decoration of) the homepage
pub fn is_home_uri(homepage: &str, uri: &str) -> bool {
    uri.to_lowercase().starts_with(&homepage.to_lowercase())
}

/// Normalized region
pub fn normalize_region(region: Option<&str>) -> String {
    region
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| WORLDWIDE_REGION.to_string())
}

/// Client-side redirect, replaces the current history entry in place
pub fn redirect_script(target: &str) -> String {
    format!(
        "javascript:window.location.replace('{}');",
        target.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

/// Desktop variant of a mobile site uri, `None` when the host has no mobile prefix
pub fn strip_mobile_subdomain(uri: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    let host = url.host_str()?.to_lowercase();

    let prefix = MOBILE_PREFIXES.iter().find(|p| host.starts_with(*p))?;
    let stripped = &host[prefix.len()..];
    if stripped.is_empty() {
        return None;
    }

    url.set_host(Some(stripped)).ok()?;
    Some(url.to_string())
}

/// Encode an HTML document as a data uri
pub fn data_uri(html: &str) -> String {
    format!("data:text/html;charset=utf-8;base64,{}", STANDARD.encode(html))
}

/// Placeholder page loaded by private sessions instead of the homepage
pub fn private_page_uri() -> String {
    data_uri(PRIVATE_PAGE_HTML)
}

/// Error page answered for a failed load
pub fn error_page_uri(uri: &str, error: &LoadError) -> String {
    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Problem loading page</title></head>\
<body><h1>Problem loading page</h1><p>{}</p><p>Error: {} ({})</p></body></html>",
        escape_html(uri),
        error.category.as_str(),
        error.code
    );
    data_uri(&html)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
