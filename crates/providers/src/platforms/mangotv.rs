//! MangoTV (mgtv.com) adapter.
//!
//! Ids are `{cid, vid}` pairs. The galaxy barrage endpoint serves one-minute
//! buckets addressed by millisecond offset; episode duration comes from the
//! video info API as a clock string.

use async_trait::async_trait;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::Value;

use danmu_core::codec::{decode_fields, encode_fields, field};
use danmu_core::model::{CommentMode, EpisodeInfo, ProviderComment, SegmentInfo};
use danmu_core::{DanmuProvider, ProviderParams};

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::platforms::{classify_episodes, episode_filter_for};
use crate::util::{json_f64, json_str, json_u64, parse_clock_duration};

const VIDEO_INFO_URL: &str = "https://pcweb.api.mgtv.com/video/info";
const EPISODE_LIST_URL: &str = "https://pcweb.api.mgtv.com/episode/list";
const BARRAGE_URL: &str = "https://galaxy.bz.mgtv.com/rdbarrage";

/// Bucket length of the barrage endpoint, in seconds.
const SEGMENT_SPAN: f64 = 60.0;

struct MangoId {
    cid: String,
    vid: String,
}

pub struct MangoTv {
    fetcher: Fetcher,
}

impl MangoTv {
    pub fn new(client: Client) -> Self {
        let mut fetcher = Fetcher::new(client);
        fetcher.set_origin_and_referer("https://www.mgtv.com");
        Self { fetcher }
    }

    fn id_record(&self, raw: &str) -> Result<MangoId> {
        let fields = self
            .parse_id_string(raw)
            .ok_or_else(|| ProviderError::InvalidId(raw.to_string()))?;
        Ok(MangoId {
            cid: fields["cid"].clone(),
            vid: fields["vid"].clone(),
        })
    }

    fn parse_duration(value: &Value) -> Option<f64> {
        let info = value.pointer("/data/info")?;
        json_f64(info, "duration")
            .filter(|d| *d > 0.0)
            .or_else(|| json_str(info, "time").and_then(parse_clock_duration))
    }

    fn parse_episode_list(cid: &str, value: &Value) -> Vec<(String, String)> {
        let Some(list) = value.pointer("/data/list").and_then(Value::as_array) else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|item| {
                let vid = json_u64(item, "video_id").map(|n| n.to_string())?;
                // t2 carries the episode label; t1 is the show name
                let title = json_str(item, "t2")
                    .or_else(|| json_str(item, "t1"))
                    .unwrap_or(&vid)
                    .to_string();
                Some((encode_fields(&[("cid", cid), ("vid", &vid)]), title))
            })
            .collect()
    }

    fn parse_barrage_items(value: &Value) -> Option<Vec<ProviderComment>> {
        let data = value.get("data")?;
        // "items": null means the bucket exists but holds nothing
        let Some(items) = data.get("items").and_then(Value::as_array) else {
            return Some(Vec::new());
        };

        let comments = items
            .iter()
            .filter_map(|item| {
                let content = json_str(item, "content")?;
                let timestamp = json_f64(item, "time")? / 1000.0;
                let mode = match json_u64(item, "type").unwrap_or(0) {
                    1 => CommentMode::Top,
                    2 => CommentMode::Bottom,
                    _ => CommentMode::Scroll,
                };
                // v2_color carries split left/right colors; plain comments are white
                let color = item
                    .pointer("/v2_color/color_left")
                    .map(|left| {
                        let r = json_u64(left, "r").unwrap_or(0xFF) as u32;
                        let g = json_u64(left, "g").unwrap_or(0xFF) as u32;
                        let b = json_u64(left, "b").unwrap_or(0xFF) as u32;
                        (r << 16) | (g << 8) | b
                    })
                    .unwrap_or(0xFFFFFF);

                Some(ProviderComment {
                    id: json_u64(item, "id").map(|n| n.to_string()),
                    timestamp,
                    mode,
                    color,
                    content: content.to_string(),
                })
            })
            .collect();
        Some(comments)
    }
}

#[async_trait]
impl DanmuProvider for MangoTv {
    fn name(&self) -> &'static str {
        "mangotv"
    }

    async fn get_episodes(
        &self,
        id_string: &str,
        episode_number: Option<u32>,
        params: &ProviderParams,
    ) -> danmu_core::Result<Vec<EpisodeInfo>> {
        let id = self.id_record(id_string)?;
        let value: Value = self
            .fetcher
            .get(EPISODE_LIST_URL)
            .query(&[
                ("video_id", id.vid.as_str()),
                ("cid", id.cid.as_str()),
                ("page", "0"),
                ("size", "100"),
            ])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let raw = Self::parse_episode_list(&id.cid, &value);
        let filter = episode_filter_for(self.name(), params);
        Ok(classify_episodes(self.name(), raw, &filter, episode_number))
    }

    async fn get_segments(
        &self,
        id_string: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<SegmentInfo>> {
        let id = self.id_record(id_string)?;
        let value: Value = self
            .fetcher
            .get(VIDEO_INFO_URL)
            .query(&[("cid", id.cid.as_str()), ("vid", id.vid.as_str())])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let Some(duration) = Self::parse_duration(&value) else {
            return Ok(Vec::new());
        };

        let count = (duration / SEGMENT_SPAN).ceil().max(1.0) as u32;
        Ok((0..count)
            .map(|n| {
                let start = f64::from(n) * SEGMENT_SPAN;
                SegmentInfo {
                    provider: self.name().to_string(),
                    // the barrage endpoint addresses buckets by ms offset
                    segment_id: ((start * 1000.0) as u64).to_string(),
                    start_time: start,
                }
            })
            .collect())
    }

    async fn get_comments(
        &self,
        id_string: &str,
        segment_id: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Option<Vec<ProviderComment>>> {
        let id = self.id_record(id_string)?;
        if segment_id.parse::<u64>().is_err() {
            return Ok(None);
        }

        let value: Value = self
            .fetcher
            .get(BARRAGE_URL)
            .query(&[
                ("vid", id.vid.as_str()),
                ("cid", id.cid.as_str()),
                ("time", segment_id),
            ])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        Ok(Self::parse_barrage_items(&value))
    }

    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String> {
        let cid = fields.get("cid")?;
        let vid = fields.get("vid")?;
        Some(encode_fields(&[("cid", cid), ("vid", vid)]))
    }

    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
        let fields = decode_fields(raw)?;
        field(&fields, "cid").filter(|c| !c.is_empty())?;
        field(&fields, "vid").filter(|v| !v.is_empty())?;
        Some(fields)
    }
}
