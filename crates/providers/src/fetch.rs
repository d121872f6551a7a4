//! Shared HTTP fetch helper.
//!
//! Each adapter instance owns one [`Fetcher`] carrying its platform headers,
//! default query params and cookie store, so per-platform session state never
//! leaks across adapters.

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use rustc_hash::FxHashMap;
use tracing::debug;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Build the shared HTTP client used by every adapter.
pub fn default_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

/// Per-adapter request helper: platform headers + params + cookie store.
#[derive(Debug, Clone)]
pub struct Fetcher {
    pub client: Client,
    headers: HeaderMap,
    params: FxHashMap<String, String>,
    cookies: FxHashMap<String, String>,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(DEFAULT_UA));
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"),
        );

        Self {
            client,
            headers,
            params: FxHashMap::default(),
            cookies: FxHashMap::default(),
        }
    }

    pub fn set_origin_and_referer(&mut self, base_url: &'static str) {
        let value = HeaderValue::from_static(base_url);
        self.headers.insert(reqwest::header::ORIGIN, value.clone());
        self.headers.insert(reqwest::header::REFERER, value);
    }

    /// Insert an arbitrary header; invalid names/values are skipped.
    pub fn add_header(&mut self, key: &str, value: &str) {
        match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => debug!(key, "invalid header; skipping"),
        }
    }

    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get_cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Import cookies from a "name1=value1; name2=value2" string.
    pub fn set_cookies_from_string(&mut self, cookie_string: &str) {
        for part in cookie_string.split(&[';', '\n'][..]).map(str::trim) {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                self.cookies.insert(name.to_owned(), value.to_owned());
            }
        }
    }

    /// Capture cookies set by a response.
    pub fn store_response_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(reqwest::header::SET_COOKIE).iter() {
            if let Ok(cookie_str) = value.to_str()
                && let Some(cookie_part) = cookie_str.split(';').next()
                && let Some((name, value)) = cookie_part.split_once('=')
            {
                let name = name.trim();
                let value = value.trim();
                if !name.is_empty() && !value.is_empty() {
                    self.cookies.insert(name.to_owned(), value.to_owned());
                }
            }
        }
    }

    fn cookie_header(&self) -> Option<HeaderValue> {
        if self.cookies.is_empty() {
            return None;
        }
        let joined = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut headers = self.headers.clone();
        if let Some(cookie) = self.cookie_header() {
            headers.insert(reqwest::header::COOKIE, cookie);
        }

        self.client
            .request(method, url)
            .headers(headers)
            .query(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_string_parsing() {
        let mut fetcher = Fetcher::new(Client::new());
        fetcher.set_cookies_from_string("token=abc; uid=42; ; broken");
        assert_eq!(fetcher.get_cookie("token").unwrap(), "abc");
        assert_eq!(fetcher.get_cookie("uid").unwrap(), "42");
        assert!(fetcher.get_cookie("broken").is_none());
    }

    #[test]
    fn test_response_cookie_capture() {
        let mut fetcher = Fetcher::new(Client::new());
        let mut headers = HeaderMap::new();
        headers.append(
            reqwest::header::SET_COOKIE,
            HeaderValue::from_static("_m_h5_tk=token123_1699999999; Path=/"),
        );
        fetcher.store_response_cookies(&headers);
        assert_eq!(fetcher.get_cookie("_m_h5_tk").unwrap(), "token123_1699999999");
    }
}
