//! Concrete provider adapters.

pub mod bilibili;
pub mod iqiyi;
pub mod mangotv;
pub mod tencent;
pub mod youku;

pub use bilibili::Bilibili;
pub use iqiyi::Iqiyi;
pub use mangotv::MangoTv;
pub use tencent::Tencent;
pub use youku::Youku;

use danmu_core::episode::{EpisodeFilter, parse_episode_number};
use danmu_core::{EpisodeInfo, ProviderParams};

/// Build the episode filter for one provider: the global junk list plus any
/// `junk_keywords` configured in the provider's extras.
pub(crate) fn episode_filter_for(provider: &str, params: &ProviderParams) -> EpisodeFilter {
    let keywords: Vec<String> = params
        .extra(provider)
        .and_then(|extra| extra.get("junk_keywords"))
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|k| k.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if keywords.is_empty() {
        EpisodeFilter::default()
    } else {
        EpisodeFilter::with_provider_keywords(&keywords)
    }
}

/// Turn raw (episode_id, title) pairs into classified episodes.
///
/// Junk titles are dropped first; surviving episodes get their parsed number
/// or, failing that, their 1-based position. When `episode_number` is given
/// only matching episodes are returned.
pub(crate) fn classify_episodes(
    provider: &'static str,
    raw: Vec<(String, String)>,
    filter: &EpisodeFilter,
    episode_number: Option<u32>,
) -> Vec<EpisodeInfo> {
    raw.into_iter()
        .filter(|(_, title)| !filter.is_junk(title))
        .enumerate()
        .map(|(position, (episode_id, episode_title))| {
            let number =
                parse_episode_number(&episode_title).unwrap_or(position as u32 + 1);
            EpisodeInfo {
                provider: provider.to_string(),
                episode_id,
                episode_title,
                episode_number: number,
            }
        })
        .filter(|episode| episode_number.is_none_or(|n| episode.episode_number == n))
        .collect()
}
