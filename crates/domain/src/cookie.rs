//! Cookie management types.
//!
//! A [`CookieJar`] stores cookies by domain; [`SharedCookieJar`] wraps one
//! behind a lock so concurrent request pipelines can share it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

/// A single HTTP cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie belongs to.
    pub domain: String,
    /// Only sent to exactly `domain` (no `Domain` attribute was given).
    #[serde(default)]
    pub host_only: bool,
    /// Path the cookie applies to.
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiration time (None for session cookies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// HttpOnly flag.
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag.
    #[serde(default)]
    pub secure: bool,
    /// SameSite attribute.
    #[serde(default)]
    pub same_site: SameSite,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Create a new cookie.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into().to_lowercase(),
            host_only: false,
            path: default_path(),
            expires: None,
            http_only: false,
            secure: false,
            same_site: SameSite::default(),
        }
    }

    /// Set the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the expiration.
    #[must_use]
    pub const fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set Secure flag.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Check if the cookie is expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|exp| exp <= Utc::now())
    }

    /// Check if the cookie applies to a given URL.
    #[must_use]
    pub fn applies_to(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&self.domain, &host)
        };
        domain_ok && path_matches(&self.path, url.path())
    }

    /// Format for Cookie header.
    #[must_use]
    pub fn to_cookie_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Parse from a `Set-Cookie` header received for `request_url`.
    ///
    /// Returns `None` when the header is malformed or names a domain the
    /// request host may not set cookies for.
    #[must_use]
    pub fn from_set_cookie(header: &str, request_url: &Url) -> Option<Self> {
        let host = request_url.host_str()?.to_lowercase();
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self::new(name, value.trim().trim_matches('"'), host.clone());
        cookie.host_only = true;
        cookie.path = default_cookie_path(request_url.path());
        let mut max_age: Option<i64> = None;

        for part in parts {
            let part = part.trim();
            let (attr, val) = part.split_once('=').unwrap_or((part, ""));
            let val = val.trim();
            match attr.trim().to_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_lowercase();
                    if !domain_matches(&domain, &host) {
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => cookie.expires = parse_cookie_date(val).or(cookie.expires),
                "max-age" => max_age = val.parse().ok(),
                "samesite" => {
                    cookie.same_site = match val.to_lowercase().as_str() {
                        "strict" => SameSite::Strict,
                        "lax" => SameSite::Lax,
                        _ => SameSite::None,
                    };
                }
                "httponly" => cookie.http_only = true,
                "secure" => cookie.secure = true,
                _ => {}
            }
        }

        // Max-Age takes precedence over Expires.
        if let Some(secs) = max_age {
            cookie.expires = Some(Utc::now() + chrono::Duration::seconds(secs));
        }

        Some(cookie)
    }
}

/// SameSite attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Cookies are sent with all requests.
    #[default]
    None,
    /// Cookies are sent with top-level navigations and GET from third-party sites.
    Lax,
    /// Cookies are only sent in first-party context.
    Strict,
}

/// Cookie jar for storing cookies.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CookieJar {
    /// Stored cookies by domain.
    #[serde(default)]
    cookies: HashMap<String, Vec<Cookie>>,
}

impl CookieJar {
    /// Create a new empty cookie jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie to the jar; an already-expired cookie deletes its namesake.
    pub fn add(&mut self, cookie: Cookie) {
        let cookies = self.cookies.entry(cookie.domain.clone()).or_default();
        cookies.retain(|c| c.name != cookie.name || c.path != cookie.path);
        if !cookie.is_expired() {
            cookies.push(cookie);
        }
    }

    /// Remove a cookie by name and domain.
    pub fn remove(&mut self, name: &str, domain: &str) {
        if let Some(cookies) = self.cookies.get_mut(domain) {
            cookies.retain(|c| c.name != name);
        }
    }

    /// Get all cookies for a URL, longest path first.
    #[must_use]
    pub fn get_for_url(&self, url: &Url) -> Vec<&Cookie> {
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .flatten()
            .filter(|c| !c.is_expired() && c.applies_to(url))
            .collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }

    /// Get all non-expired cookies.
    #[must_use]
    pub fn all_valid(&self) -> Vec<&Cookie> {
        self.cookies
            .values()
            .flatten()
            .filter(|c| !c.is_expired())
            .collect()
    }

    /// Clear all cookies.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Get the total number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.values().map(Vec::len).sum()
    }

    /// Check if the jar is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the Cookie header value for a URL.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.get_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        let header_value: Vec<String> = cookies.iter().map(|c| c.to_cookie_header()).collect();
        Some(header_value.join("; "))
    }

    /// Process `Set-Cookie` headers from a response; returns the cookies stored.
    pub fn process_set_cookies(&mut self, headers: &[(String, String)], url: &Url) -> Vec<Cookie> {
        let mut stored = Vec::new();
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                if let Some(cookie) = Cookie::from_set_cookie(value, url) {
                    stored.push(cookie.clone());
                    self.add(cookie);
                }
            }
        }
        stored
    }
}

/// A cookie jar shared between concurrent pipelines.
#[derive(Debug, Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<RwLock<CookieJar>>,
}

impl SharedCookieJar {
    /// Wraps a jar.
    #[must_use]
    pub fn new(jar: CookieJar) -> Self {
        Self {
            inner: Arc::new(RwLock::new(jar)),
        }
    }

    /// Cookie header for a URL.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.inner.read().cookie_header(url)
    }

    /// Stores `Set-Cookie` headers; returns the cookies stored.
    pub fn store(&self, headers: &[(String, String)], url: &Url) -> Vec<Cookie> {
        self.inner.write().process_set_cookies(headers, url)
    }

    /// Copy of the current jar.
    #[must_use]
    pub fn snapshot(&self) -> CookieJar {
        self.inner.read().clone()
    }
}

/// Default cookie path: the request path up to its last `/`.
fn default_cookie_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(exp) = DateTime::parse_from_rfc2822(value) {
        return Some(exp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Check if a cookie domain matches a request host.
fn domain_matches(cookie_domain: &str, request_host: &str) -> bool {
    let cookie_domain = cookie_domain.to_lowercase();
    let request_host = request_host.to_lowercase();
    request_host == cookie_domain || request_host.ends_with(&format!(".{cookie_domain}"))
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}
