//! Aggregation parameters.
//!
//! One immutable [`ProviderParams`] snapshot travels with every aggregation
//! call: the registry swaps the current snapshot wholesale on configuration
//! updates, and adapters read the snapshot they were handed for the duration
//! of one call. There is no ambient mutable state.

use std::time::Duration;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::warn;

/// Immutable parameter snapshot for one aggregation call.
#[derive(Debug, Clone, Default)]
pub struct ProviderParams {
    /// When enabled, comments with identical (mode, color, content) collapse
    /// into one entry with a repeat counter.
    pub aggregation_enabled: bool,
    /// Compiled content blacklist; matching comments are dropped after the
    /// fold.
    blacklist: Option<Regex>,
    /// Provider-specific configuration blobs, keyed by provider name
    /// (cookies, per-provider junk keywords, ...).
    pub provider_extras: FxHashMap<String, serde_json::Value>,
    /// Overall bound for one aggregation call. All pipelines are abandoned
    /// together when it elapses.
    pub request_timeout: Option<Duration>,
}

impl ProviderParams {
    pub fn new() -> Self {
        Self {
            aggregation_enabled: true,
            ..Self::default()
        }
    }

    pub fn aggregation_enabled(mut self, enabled: bool) -> Self {
        self.aggregation_enabled = enabled;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn provider_extra(mut self, provider: impl Into<String>, extra: serde_json::Value) -> Self {
        self.provider_extras.insert(provider.into(), extra);
        self
    }

    /// Set (or clear) the content blacklist pattern.
    ///
    /// An invalid pattern keeps the previously compiled one: configuration
    /// failures must never become fatal.
    pub fn set_blacklist(&mut self, pattern: Option<&str>) {
        match pattern {
            None => self.blacklist = None,
            Some(p) => match Regex::new(p) {
                Ok(re) => self.blacklist = Some(re),
                Err(e) => {
                    warn!(pattern = p, error = %e, "invalid blacklist pattern; keeping previous");
                }
            },
        }
    }

    /// Builder-style variant of [`Self::set_blacklist`].
    pub fn blacklist(mut self, pattern: &str) -> Self {
        self.set_blacklist(Some(pattern));
        self
    }

    /// Whether a comment's content is blacklisted.
    pub fn is_blacklisted(&self, content: &str) -> bool {
        self.blacklist
            .as_ref()
            .is_some_and(|re| re.is_match(content))
    }

    /// The configuration blob for one provider, if any.
    pub fn extra(&self, provider: &str) -> Option<&serde_json::Value> {
        self.provider_extras.get(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_matching() {
        let params = ProviderParams::new().blacklist("广告|代练");
        assert!(params.is_blacklisted("低价代练私聊"));
        assert!(!params.is_blacklisted("前方高能"));
    }

    #[test]
    fn test_invalid_blacklist_keeps_previous() {
        let mut params = ProviderParams::new().blacklist("广告");
        params.set_blacklist(Some("(["));
        assert!(params.is_blacklisted("广告位招租"));
    }

    #[test]
    fn test_no_blacklist_matches_nothing() {
        let params = ProviderParams::new();
        assert!(!params.is_blacklisted("anything"));
    }
}
