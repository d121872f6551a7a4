//! Provider contract.
//!
//! One implementation per content provider presents a uniform capability
//! surface over that source. Every operation may fail independently; callers
//! catch failures per provider and degrade to empty results, never aborting
//! sibling pipelines.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::config::ProviderParams;
use crate::error::Result;
use crate::model::{DramaInfo, EpisodeInfo, ProviderComment, SegmentInfo};

/// Trait implemented once per content provider.
#[async_trait]
pub trait DanmuProvider: Send + Sync {
    /// Stable provider name ("tencent", "bilibili", ...). Used as the
    /// namespace prefix in composite identifiers.
    fn name(&self) -> &'static str;

    /// Whether this provider implements [`Self::search`]. Checked before
    /// dispatch; providers without search are skipped silently.
    fn supports_search(&self) -> bool {
        false
    }

    /// Search for dramas by keyword. `drama_id` in the returned records is
    /// the provider's opaque id string.
    async fn search(&self, keyword: &str, params: &ProviderParams) -> Result<Vec<DramaInfo>> {
        let _ = (keyword, params);
        Ok(Vec::new())
    }

    /// List episodes for a drama, or only the matching ones when
    /// `episode_number` is given. Implementations must apply the episode
    /// filter before returning, so junk content never reaches the caller.
    async fn get_episodes(
        &self,
        id_string: &str,
        episode_number: Option<u32>,
        params: &ProviderParams,
    ) -> Result<Vec<EpisodeInfo>>;

    /// List the comment segments of an episode. The caller sorts the result
    /// before running the locator.
    async fn get_segments(&self, id_string: &str, params: &ProviderParams)
    -> Result<Vec<SegmentInfo>>;

    /// Fetch the comments of one segment. `Ok(None)` signals "no data",
    /// distinct from `Ok(Some(vec![]))` which signals "fetched, but zero
    /// comments".
    async fn get_comments(
        &self,
        id_string: &str,
        segment_id: &str,
        params: &ProviderParams,
    ) -> Result<Option<Vec<ProviderComment>>>;

    /// Encode a provider record into an opaque id string. `None` when the
    /// record is missing required fields.
    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String>;

    /// Decode and validate an opaque id string. Must return `None` (never
    /// error) on malformed input; call sites treat `None` as "skip this
    /// provider".
    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>>;
}
