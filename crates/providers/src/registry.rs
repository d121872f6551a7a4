//! Provider registry and compound operations.
//!
//! The registry owns the fixed set of adapter instances. It is built once
//! and read-mostly afterwards; the only mutable state is the parameter
//! snapshot, which is replaced wholesale on configuration updates.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use danmu_core::model::{Comment, CommentMode, DramaInfo, EpisodeInfo, format_p};
use danmu_core::{DanmuProvider, ProviderParams, aggregate};

use crate::fetch::default_client;
use crate::matcher::{KanMatcher, MediaMatcher};
use crate::platforms::{Bilibili, Iqiyi, MangoTv, Tencent, Youku};

/// Stable placeholder emitted when no provider yields any data, so
/// downstream UIs always have something to render.
fn no_match_placeholder() -> Vec<Comment> {
    vec![Comment {
        cid: None,
        p: format_p(0.0, CommentMode::Scroll, 0xFFFFFF, "none"),
        m: "未匹配到弹幕".to_string(),
    }]
}

pub struct ProviderRegistry {
    providers: FxHashMap<&'static str, Arc<dyn DanmuProvider>>,
    matcher: Option<Arc<dyn MediaMatcher>>,
    params: RwLock<Arc<ProviderParams>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: FxHashMap::default(),
            matcher: None,
            params: RwLock::new(Arc::new(ProviderParams::new())),
        }
    }

    /// Create a registry with all built-in providers and the default
    /// secondary matcher.
    pub fn with_defaults() -> Self {
        let client = default_client();
        let mut registry = Self::new();
        registry.register(Arc::new(Tencent::new(client.clone())));
        registry.register(Arc::new(Iqiyi::new(client.clone())));
        registry.register(Arc::new(Youku::new(client.clone())));
        registry.register(Arc::new(MangoTv::new(client.clone())));
        registry.register(Arc::new(Bilibili::new(client.clone())));
        registry.matcher = Some(Arc::new(KanMatcher::new(client)));
        registry
    }

    /// Register a provider. Later registrations win on name collisions.
    pub fn register(&mut self, provider: Arc<dyn DanmuProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Install (or remove) the secondary matcher.
    pub fn set_matcher(&mut self, matcher: Option<Arc<dyn MediaMatcher>>) {
        self.matcher = matcher;
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DanmuProvider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    /// Replace the parameter snapshot wholesale. Calls already in flight
    /// keep the snapshot they started with.
    pub fn update_params(&self, params: ProviderParams) {
        *self.params.write() = Arc::new(params);
    }

    /// The current parameter snapshot.
    pub fn params_snapshot(&self) -> Arc<ProviderParams> {
        self.params.read().clone()
    }

    /// Fan out `get_episodes` to the named providers.
    ///
    /// Identical (provider, id string) requests are deduplicated before
    /// dispatch. Individual provider failures degrade to empty results, and
    /// every returned episode id is re-namespaced as `provider:episodeId`.
    pub async fn get_episodes(
        &self,
        requests: &[(String, String)],
        episode_number: Option<u32>,
    ) -> Vec<EpisodeInfo> {
        let params = self.params_snapshot();

        let mut seen = FxHashSet::default();
        let unique: Vec<&(String, String)> = requests
            .iter()
            .filter(|(provider, id_string)| seen.insert((provider.clone(), id_string.clone())))
            .collect();

        let fetches = unique.into_iter().filter_map(|(name, id_string)| {
            let Some(provider) = self.get(name) else {
                debug!(provider = %name, "unknown provider in episode request; skipping");
                return None;
            };
            let params = params.clone();
            let id_string = id_string.clone();
            Some(async move {
                match provider
                    .get_episodes(&id_string, episode_number, &params)
                    .await
                {
                    Ok(episodes) => episodes,
                    Err(e) => {
                        warn!(provider = provider.name(), error = %e, "episode fetch failed");
                        Vec::new()
                    }
                }
            })
        });

        join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .map(|mut episode| {
                episode.episode_id = format!("{}:{}", episode.provider, episode.episode_id);
                episode
            })
            .collect()
    }

    /// Fan out search to every provider that supports it, then let the
    /// secondary matcher contribute extra candidates. Matcher failures are
    /// swallowed.
    pub async fn get_episode_params(&self, keyword: &str) -> Vec<DramaInfo> {
        let params = self.params_snapshot();

        let searches = self
            .providers
            .values()
            .filter(|provider| provider.supports_search())
            .map(|provider| {
                let provider = provider.clone();
                let params = params.clone();
                async move {
                    match provider.search(keyword, &params).await {
                        Ok(dramas) => dramas,
                        Err(e) => {
                            warn!(provider = provider.name(), error = %e, "search failed");
                            Vec::new()
                        }
                    }
                }
            });

        let mut dramas: Vec<DramaInfo> = join_all(searches).await.into_iter().flatten().collect();

        if let Some(matcher) = &self.matcher {
            match matcher.match_media(keyword).await {
                Ok(candidates) => {
                    for candidate in candidates {
                        // only keep candidates whose id the target adapter
                        // itself accepts
                        let valid = self
                            .get(&candidate.provider)
                            .is_some_and(|p| p.parse_id_string(&candidate.drama_id).is_some());
                        if valid {
                            dramas.push(candidate);
                        }
                    }
                }
                Err(e) => debug!(error = %e, "secondary matcher failed; ignoring"),
            }
        }

        dramas
    }

    /// Aggregate the comments active at `time` for a comma-separated
    /// `provider:idString` composite.
    ///
    /// Malformed pairs and unknown providers are skipped; when nothing
    /// matches at all, a stable placeholder is returned instead of an error.
    pub async fn get_danmu(&self, composite: &str, time: f64) -> Vec<Comment> {
        let params = self.params_snapshot();

        let pairs: Vec<(Arc<dyn DanmuProvider>, String)> = composite
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                let (name, id_string) = part.split_once(':')?;
                let provider = self.get(name).or_else(|| {
                    debug!(provider = %name, "unknown provider in composite id; skipping");
                    None
                })?;
                if provider.parse_id_string(id_string).is_none() {
                    debug!(provider = %name, "malformed id string; skipping");
                    return None;
                }
                Some((provider, id_string.to_string()))
            })
            .collect();

        if pairs.is_empty() {
            return no_match_placeholder();
        }

        let comments = aggregate(&pairs, time, &params).await;
        if comments.is_empty() {
            return no_match_placeholder();
        }
        comments
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use danmu_core::model::{ProviderComment, SegmentInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: &'static str,
        comments: Vec<ProviderComment>,
        episode_calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &'static str, comments: Vec<ProviderComment>) -> Self {
            Self {
                name,
                comments,
                episode_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DanmuProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_episodes(
            &self,
            _id_string: &str,
            _episode_number: Option<u32>,
            _params: &ProviderParams,
        ) -> danmu_core::Result<Vec<EpisodeInfo>> {
            self.episode_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![EpisodeInfo {
                provider: self.name.to_string(),
                episode_id: "ep1".to_string(),
                episode_title: "第1集".to_string(),
                episode_number: 1,
            }])
        }

        async fn get_segments(
            &self,
            _id_string: &str,
            _params: &ProviderParams,
        ) -> danmu_core::Result<Vec<SegmentInfo>> {
            Ok(vec![SegmentInfo {
                provider: self.name.to_string(),
                segment_id: "0".to_string(),
                start_time: 0.0,
            }])
        }

        async fn get_comments(
            &self,
            _id_string: &str,
            _segment_id: &str,
            _params: &ProviderParams,
        ) -> danmu_core::Result<Option<Vec<ProviderComment>>> {
            Ok(Some(self.comments.clone()))
        }

        fn generate_id_string(
            &self,
            _fields: &FxHashMap<String, String>,
        ) -> Option<String> {
            None
        }

        fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
            if raw.contains('=') {
                let mut fields = FxHashMap::default();
                fields.insert("id".to_string(), raw.to_string());
                Some(fields)
            } else {
                None
            }
        }
    }

    fn stub_comment(content: &str) -> ProviderComment {
        ProviderComment {
            id: None,
            timestamp: 1.0,
            mode: CommentMode::Scroll,
            color: 0xFFFFFF,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_with_defaults_registers_builtins() {
        let registry = ProviderRegistry::with_defaults();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["bilibili", "iqiyi", "mangotv", "tencent", "youku"]
        );
    }

    #[tokio::test]
    async fn test_get_danmu_skips_bad_pairs_and_namespaces_nothing() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider::new("stub", vec![stub_comment("hey")])));

        let comments = registry
            .get_danmu("stub:id=1,unknown:id=2,malformed,stub:noequals", 0.0)
            .await;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].m, "hey");
    }

    #[tokio::test]
    async fn test_get_danmu_placeholder_when_nothing_matches() {
        let registry = ProviderRegistry::new();
        let comments = registry.get_danmu("unknown:id=1", 0.0).await;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].m, "未匹配到弹幕");
        assert!(comments[0].p.starts_with("0.00,1,16777215,"));
    }

    #[tokio::test]
    async fn test_get_episodes_dedups_and_namespaces() {
        let stub = Arc::new(StubProvider::new("stub", Vec::new()));
        let mut registry = ProviderRegistry::new();
        registry.register(stub.clone());

        let requests = vec![
            ("stub".to_string(), "id=1".to_string()),
            ("stub".to_string(), "id=1".to_string()),
            ("unknown".to_string(), "id=2".to_string()),
        ];
        let episodes = registry.get_episodes(&requests, None).await;

        assert_eq!(stub.episode_calls.load(Ordering::SeqCst), 1);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].episode_id, "stub:ep1");
    }

    #[tokio::test]
    async fn test_params_snapshot_is_replaced_wholesale() {
        let registry = ProviderRegistry::new();
        assert!(registry.params_snapshot().aggregation_enabled);

        registry.update_params(ProviderParams::new().aggregation_enabled(false));
        assert!(!registry.params_snapshot().aggregation_enabled);
    }
}
