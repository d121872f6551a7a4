//! Best-effort secondary media matcher.
//!
//! An external content-identification service can contribute extra drama
//! candidates beyond what the providers' own search returns. Everything here
//! is best-effort: failures are swallowed by the registry, never fatal.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use danmu_core::DramaInfo;
use danmu_core::codec::encode_fields;

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::util::json_str;

/// External service resolving a keyword to per-provider drama candidates.
#[async_trait]
pub trait MediaMatcher: Send + Sync {
    /// `drama_id` in the returned records must already be an encoded id
    /// string for the named provider; the registry validates each candidate
    /// against the provider's own codec before use.
    async fn match_media(&self, keyword: &str) -> Result<Vec<DramaInfo>>;
}

const KAN_SEARCH_URL: &str = "https://api.so.360kan.com/index";

static QQ_COVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v\.qq\.com/x/cover/([A-Za-z0-9]+)").unwrap());
static YOUKU_SHOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v\.youku\.com/v_show/id_([A-Za-z0-9=]+)").unwrap());
static MGTV_PLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mgtv\.com/b/(\d+)/(\d+)").unwrap());
static BILI_SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bilibili\.com/bangumi/play/ss(\d+)").unwrap());

/// Matcher backed by the 360kan cross-site index.
///
/// Its result rows carry one play link per hosting site; links we can turn
/// into a valid provider record become candidates, the rest are ignored.
pub struct KanMatcher {
    fetcher: Fetcher,
}

impl KanMatcher {
    pub fn new(client: Client) -> Self {
        Self {
            fetcher: Fetcher::new(client),
        }
    }

    fn candidate_from_link(site: &str, url: &str, title: &str) -> Option<DramaInfo> {
        let (provider, drama_id) = match site {
            "qq" => {
                let cid = QQ_COVER.captures(url)?.get(1)?.as_str().to_string();
                ("tencent", encode_fields(&[("cid", &cid), ("vid", "")]))
            }
            "youku" => {
                let vid = YOUKU_SHOW.captures(url)?.get(1)?.as_str().to_string();
                ("youku", encode_fields(&[("show_id", ""), ("vid", &vid)]))
            }
            "imgo" => {
                let caps = MGTV_PLAY.captures(url)?;
                let cid = caps.get(1)?.as_str();
                let vid = caps.get(2)?.as_str();
                ("mangotv", encode_fields(&[("cid", cid), ("vid", vid)]))
            }
            "bilibili1" => {
                let sid = BILI_SEASON.captures(url)?.get(1)?.as_str().to_string();
                ("bilibili", encode_fields(&[("sid", &sid), ("oid", "")]))
            }
            _ => return None,
        };
        Some(DramaInfo {
            provider: provider.to_string(),
            drama_id,
            drama_title: title.to_string(),
            season: 1,
        })
    }

    fn parse_rows(value: &Value) -> Vec<DramaInfo> {
        let Some(rows) = value.pointer("/data/longData/rows").and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for row in rows {
            let Some(title) = json_str(row, "titleTxt") else {
                continue;
            };
            let Some(playlinks) = row.get("playlinks").and_then(Value::as_object) else {
                continue;
            };
            for (site, link) in playlinks {
                if let Some(url) = link.as_str()
                    && let Some(candidate) = Self::candidate_from_link(site, url, title)
                {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }
}

#[async_trait]
impl MediaMatcher for KanMatcher {
    async fn match_media(&self, keyword: &str) -> Result<Vec<DramaInfo>> {
        let value: Value = self
            .fetcher
            .get(KAN_SEARCH_URL)
            .query(&[("force_v", "1"), ("kw", keyword), ("pageno", "1"), ("v_ap", "1")])
            .send()
            .await?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await?;

        Ok(Self::parse_rows(&value))
    }
}
