//! Fan-out/fan-in aggregation with deduplication.
//!
//! For a set of (provider, id string) pairs and a playback time, every
//! provider pipeline runs concurrently: fetch + sort segments, locate the
//! active segment, fetch its comments. Pipelines are fully isolated; a slow
//! or failing provider never delays or fails the others. Aggregation is a
//! complete barrier - the fold starts only after every pipeline finished.

use std::sync::Arc;

use futures::future::join_all;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProviderParams;
use crate::error::Result;
use crate::locator::find_active_segment;
use crate::model::{Comment, ProviderComment, format_p, sort_segments};
use crate::provider::DanmuProvider;

/// One (provider, opaque id string) aggregation input.
pub type ProviderPair = (Arc<dyn DanmuProvider>, String);

/// Aggregate the comments active at `time` across all `pairs` into one
/// canonical, deduplicated list.
///
/// Output order is unspecified (map iteration order); callers must not
/// depend on ordering beyond what is encoded in `p`. Given the same inputs
/// the result is deterministic regardless of fetch completion order: the
/// fold runs sequentially over the barrier results in input-pair order.
pub async fn aggregate(pairs: &[ProviderPair], time: f64, params: &ProviderParams) -> Vec<Comment> {
    let pipelines = pairs
        .iter()
        .map(|(provider, id_string)| collect_one(provider.clone(), id_string.clone(), time, params));

    let results = match params.request_timeout {
        Some(limit) => match tokio::time::timeout(limit, join_all(pipelines)).await {
            Ok(results) => results,
            Err(_) => {
                warn!(timeout = ?limit, "aggregation timed out; abandoning all pipelines");
                return Vec::new();
            }
        },
        None => join_all(pipelines).await,
    };

    fold(results, params)
}

/// Run one provider pipeline, absorbing every failure into an empty result.
async fn collect_one(
    provider: Arc<dyn DanmuProvider>,
    id_string: String,
    time: f64,
    params: &ProviderParams,
) -> (String, Vec<ProviderComment>) {
    let name = provider.name().to_string();
    match try_collect(provider.as_ref(), &id_string, time, params).await {
        Ok(Some(comments)) => {
            debug!(provider = %name, count = comments.len(), "provider pipeline done");
            (name, comments)
        }
        Ok(None) => {
            debug!(provider = %name, "no segment or no data at requested time");
            (name, Vec::new())
        }
        Err(e) => {
            warn!(provider = %name, error = %e, "provider pipeline failed");
            (name, Vec::new())
        }
    }
}

async fn try_collect(
    provider: &dyn DanmuProvider,
    id_string: &str,
    time: f64,
    params: &ProviderParams,
) -> Result<Option<Vec<ProviderComment>>> {
    let mut segments = provider.get_segments(id_string, params).await?;
    sort_segments(&mut segments);

    let Some(segment) = find_active_segment(&segments, time) else {
        return Ok(None);
    };

    provider
        .get_comments(id_string, &segment.segment_id, params)
        .await
}

struct FoldEntry {
    provider: String,
    comment: ProviderComment,
    count: u32,
}

/// Fold per-provider comment lists into the canonical output.
fn fold(results: Vec<(String, Vec<ProviderComment>)>, params: &ProviderParams) -> Vec<Comment> {
    let mut map: FxHashMap<String, FoldEntry> = FxHashMap::default();
    // Preserves first-seen order so output is stable across runs.
    let mut order: Vec<String> = Vec::new();

    for (provider, comments) in results {
        for comment in comments {
            let key = dedup_key(&comment, params.aggregation_enabled);
            match map.get_mut(&key) {
                Some(entry) => {
                    entry.count += 1;
                    // Earliest occurrence wins as the representative.
                    if comment.timestamp < entry.comment.timestamp {
                        entry.comment = comment;
                        entry.provider = provider.clone();
                    }
                }
                None => {
                    order.push(key.clone());
                    map.insert(
                        key,
                        FoldEntry {
                            provider: provider.clone(),
                            comment,
                            count: 1,
                        },
                    );
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| map.remove(&key))
        .filter(|entry| !params.is_blacklisted(&entry.comment.content))
        .map(|entry| {
            let m = if entry.count > 1 {
                format!("{} × {}", entry.comment.content, entry.count)
            } else {
                entry.comment.content.clone()
            };
            Comment {
                cid: entry.comment.id.clone(),
                p: format_p(
                    entry.comment.timestamp,
                    entry.comment.mode,
                    entry.comment.color,
                    &entry.provider,
                ),
                m,
            }
        })
        .collect()
}

/// The key under which a comment folds.
///
/// With content aggregation on, identical (mode, color, content) triples
/// merge. Otherwise the comment's own id is used, or a fresh random key so
/// unidentified comments never merge.
fn dedup_key(comment: &ProviderComment, aggregation_enabled: bool) -> String {
    if aggregation_enabled {
        format!(
            "{}\u{1}{}\u{1}{}",
            comment.mode.as_int(),
            comment.color,
            comment.content
        )
    } else {
        comment
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DanmuError;
    use crate::model::{CommentMode, EpisodeInfo, SegmentInfo};
    use async_trait::async_trait;
    use std::time::Duration;

    /// In-memory provider with canned segments and comments.
    struct FakeProvider {
        name: &'static str,
        segments: Vec<(f64, &'static str)>,
        comments: Vec<ProviderComment>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        fn new(name: &'static str, comments: Vec<ProviderComment>) -> Self {
            Self {
                name,
                segments: vec![(0.0, "0")],
                comments,
                fail: false,
                delay: None,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                segments: Vec::new(),
                comments: Vec::new(),
                fail: true,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl DanmuProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_episodes(
            &self,
            _id_string: &str,
            _episode_number: Option<u32>,
            _params: &ProviderParams,
        ) -> Result<Vec<EpisodeInfo>> {
            Ok(Vec::new())
        }

        async fn get_segments(
            &self,
            _id_string: &str,
            _params: &ProviderParams,
        ) -> Result<Vec<SegmentInfo>> {
            if self.fail {
                return Err(DanmuError::provider("segment fetch exploded"));
            }
            Ok(self
                .segments
                .iter()
                .map(|(start, id)| SegmentInfo {
                    provider: self.name.to_string(),
                    segment_id: id.to_string(),
                    start_time: *start,
                })
                .collect())
        }

        async fn get_comments(
            &self,
            _id_string: &str,
            _segment_id: &str,
            _params: &ProviderParams,
        ) -> Result<Option<Vec<ProviderComment>>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Some(self.comments.clone()))
        }

        fn generate_id_string(
            &self,
            _fields: &rustc_hash::FxHashMap<String, String>,
        ) -> Option<String> {
            None
        }

        fn parse_id_string(&self, _raw: &str) -> Option<rustc_hash::FxHashMap<String, String>> {
            Some(rustc_hash::FxHashMap::default())
        }
    }

    fn comment(id: Option<&str>, timestamp: f64, content: &str) -> ProviderComment {
        ProviderComment {
            id: id.map(str::to_string),
            timestamp,
            mode: CommentMode::Scroll,
            color: 0xFFFFFF,
            content: content.to_string(),
        }
    }

    fn pair(provider: FakeProvider) -> ProviderPair {
        (Arc::new(provider), "id=1".to_string())
    }

    #[tokio::test]
    async fn test_end_to_end_two_providers_merge() {
        let pairs = vec![
            pair(FakeProvider::new("a", vec![comment(None, 3.0, "hi")])),
            pair(FakeProvider::new("b", vec![comment(None, 3.0, "hi")])),
        ];
        let params = ProviderParams::new();

        let result = aggregate(&pairs, 1.0, &params).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].m, "hi × 2");
        assert!(result[0].p.starts_with("3.00,1,16777215,"));
    }

    #[tokio::test]
    async fn test_earliest_timestamp_wins() {
        let pairs = vec![
            pair(FakeProvider::new("a", vec![comment(None, 5.0, "gg")])),
            pair(FakeProvider::new("b", vec![comment(None, 2.0, "gg")])),
            pair(FakeProvider::new("c", vec![comment(None, 8.0, "gg")])),
        ];
        let params = ProviderParams::new();

        let result = aggregate(&pairs, 0.0, &params).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].m, "gg × 3");
        assert!(result[0].p.starts_with("2.00,"), "p = {}", result[0].p);
        assert!(result[0].p.ends_with(",[b]"));
    }

    #[tokio::test]
    async fn test_failing_provider_does_not_suppress_others() {
        let pairs = vec![
            pair(FakeProvider::failing("broken")),
            pair(FakeProvider::new("ok", vec![comment(None, 1.0, "still here")])),
        ];
        let params = ProviderParams::new();

        let result = aggregate(&pairs, 0.0, &params).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].m, "still here");
    }

    #[tokio::test]
    async fn test_aggregation_toggle() {
        let make_pairs = || {
            vec![
                pair(FakeProvider::new("a", vec![comment(None, 1.0, "wow")])),
                pair(FakeProvider::new("b", vec![comment(None, 2.0, "wow")])),
            ]
        };

        let merged = aggregate(&make_pairs(), 0.0, &ProviderParams::new()).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].m, "wow × 2");

        let separate = aggregate(
            &make_pairs(),
            0.0,
            &ProviderParams::new().aggregation_enabled(false),
        )
        .await;
        assert_eq!(separate.len(), 2);
        assert!(separate.iter().all(|c| c.m == "wow"));
    }

    #[tokio::test]
    async fn test_same_id_merges_when_aggregation_disabled() {
        let pairs = vec![
            pair(FakeProvider::new("a", vec![comment(Some("k1"), 4.0, "first")])),
            pair(FakeProvider::new("b", vec![comment(Some("k1"), 2.0, "second")])),
        ];
        let params = ProviderParams::new().aggregation_enabled(false);

        let result = aggregate(&pairs, 0.0, &params).await;
        assert_eq!(result.len(), 1);
        assert!(result[0].p.starts_with("2.00,"));
        assert_eq!(result[0].m, "second × 2");
    }

    #[tokio::test]
    async fn test_content_blacklist_drops_entries() {
        let pairs = vec![pair(FakeProvider::new(
            "a",
            vec![comment(None, 1.0, "关注主播领福利"), comment(None, 2.0, "666")],
        ))];
        let mut params = ProviderParams::new();
        params.set_blacklist(Some("关注|福利"));

        let result = aggregate(&pairs, 0.0, &params).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].m, "666");
    }

    #[tokio::test]
    async fn test_dedup_idempotence() {
        let make_pairs = || {
            vec![
                pair(FakeProvider::new(
                    "a",
                    vec![comment(None, 5.0, "x"), comment(None, 9.0, "y")],
                )),
                pair(FakeProvider::new("b", vec![comment(None, 3.0, "x")])),
            ]
        };
        let params = ProviderParams::new();

        let first = aggregate(&make_pairs(), 0.0, &params).await;
        let second = aggregate(&make_pairs(), 0.0, &params).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_no_segment_at_time_yields_empty() {
        let mut provider = FakeProvider::new("a", vec![comment(None, 1.0, "hi")]);
        provider.segments = vec![(120.0, "2")];

        let result = aggregate(&[pair(provider)], 10.0, &ProviderParams::new()).await;
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout_abandons_all_pipelines() {
        let mut slow = FakeProvider::new("slow", vec![comment(None, 1.0, "late")]);
        slow.delay = Some(Duration::from_secs(60));
        let pairs = vec![pair(slow)];
        let params = ProviderParams::new().request_timeout(Duration::from_secs(5));

        let result = aggregate(&pairs, 0.0, &params).await;
        assert!(result.is_empty());
    }
}
