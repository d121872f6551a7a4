//! Youku (v.youku.com) adapter.
//!
//! Ids are `{show_id, vid}` pairs. The danmu list endpoint is an mtop-style
//! API: a `_m_h5_tk` token cookie must be bootstrapped first, and every
//! request carries an MD5 signature over `tokenHead&t&appKey&data`. Comments
//! come in one-minute buckets addressed by the `mat` field.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use danmu_core::codec::{decode_fields, encode_fields, field};
use danmu_core::model::{CommentMode, EpisodeInfo, ProviderComment, SegmentInfo};
use danmu_core::{DanmuProvider, ProviderParams};

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::platforms::{classify_episodes, episode_filter_for};
use crate::util::{json_f64, json_str};

const APP_KEY: &str = "24679788";
const TOKEN_URL: &str =
    "https://acs.youku.com/h5/mtop.com.youku.aplatform.weakget/1.0/?jsv=2.5.1&appKey=24679788";
const DANMU_LIST_URL: &str = "https://acs.youku.com/h5/mopen.youku.danmu.list/1.0/";
const PLAY_INFO_URL: &str = "https://play.youku.com/play/get.json";
const SHOW_VIDEOS_URL: &str = "https://openapi.youku.com/v2/shows/videos.json";
const DEFAULT_CLIENT_ID: &str = "53e6cc67237fc59a";

/// Bucket length of the danmu list endpoint, in seconds.
const SEGMENT_SPAN: f64 = 60.0;

struct YoukuId {
    show_id: String,
    vid: String,
}

pub struct Youku {
    fetcher: Fetcher,
    /// Cached `_m_h5_tk` token cookie, refreshed on demand.
    token: Mutex<Option<String>>,
}

impl Youku {
    pub fn new(client: Client) -> Self {
        let mut fetcher = Fetcher::new(client);
        fetcher.set_origin_and_referer("https://v.youku.com");
        Self {
            fetcher,
            token: Mutex::new(None),
        }
    }

    fn id_record(&self, raw: &str) -> Result<YoukuId> {
        let fields = self
            .parse_id_string(raw)
            .ok_or_else(|| ProviderError::InvalidId(raw.to_string()))?;
        Ok(YoukuId {
            show_id: fields.get("show_id").cloned().unwrap_or_default(),
            vid: fields["vid"].clone(),
        })
    }

    /// Fetch (or reuse) the `_m_h5_tk` token cookie required for signing.
    async fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.token.lock().clone() {
            return Ok(token);
        }

        let response = self.fetcher.get(TOKEN_URL).send().await?;
        let token = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|cookie| cookie.split(';').next())
            .find_map(|pair| pair.trim().strip_prefix("_m_h5_tk="))
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Other("token cookie missing".to_string()))?;

        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    fn sign(token: &str, t: u128, data: &str) -> String {
        // only the part before '_' enters the signature
        let token_head = token.split('_').next().unwrap_or(token);
        let mut hasher = Md5::new();
        hasher.update(format!("{token_head}&{t}&{APP_KEY}&{data}"));
        hex::encode(hasher.finalize())
    }

    fn parse_play_duration(value: &Value) -> Option<f64> {
        value
            .pointer("/data/video")
            .and_then(|video| json_f64(video, "seconds"))
    }

    fn parse_show_videos(show_id: &str, value: &Value) -> Vec<(String, String)> {
        let Some(videos) = value.get("videos").and_then(Value::as_array) else {
            return Vec::new();
        };
        videos
            .iter()
            .filter_map(|video| {
                let vid = json_str(video, "id")?;
                let title = json_str(video, "title").unwrap_or(vid);
                Some((
                    encode_fields(&[("show_id", show_id), ("vid", vid)]),
                    title.to_string(),
                ))
            })
            .collect()
    }

    /// The `result` payload is a JSON string nested inside the envelope.
    fn parse_danmu_result(value: &Value) -> Option<Vec<ProviderComment>> {
        let result_str = value.pointer("/data/result").and_then(Value::as_str)?;
        let result: Value = serde_json::from_str(result_str).ok()?;
        let items = result.pointer("/data/result")?.as_array()?;

        let comments = items
            .iter()
            .filter_map(|item| {
                let content = json_str(item, "content")?;
                let timestamp = json_f64(item, "playat")? / 1000.0;

                let properties: Option<Value> = json_str(item, "propertis")
                    .and_then(|s| serde_json::from_str(s).ok());
                let color = properties
                    .as_ref()
                    .and_then(|p| json_f64(p, "color"))
                    .map(|c| c as u32 & 0xFF_FFFF)
                    .unwrap_or(0xFFFFFF);
                let mode = properties
                    .as_ref()
                    .and_then(|p| json_f64(p, "pos"))
                    .map(|p| match p as i64 {
                        1 => CommentMode::Top,
                        2 => CommentMode::Bottom,
                        _ => CommentMode::Scroll,
                    })
                    .unwrap_or(CommentMode::Scroll);

                Some(ProviderComment {
                    id: item
                        .get("id")
                        .and_then(Value::as_u64)
                        .map(|n| n.to_string()),
                    timestamp,
                    mode,
                    color,
                    content: content.to_string(),
                })
            })
            .collect();
        Some(comments)
    }

    fn client_id(params: &ProviderParams) -> String {
        params
            .extra("youku")
            .and_then(|extra| extra.get("client_id"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CLIENT_ID)
            .to_string()
    }
}

#[async_trait]
impl DanmuProvider for Youku {
    fn name(&self) -> &'static str {
        "youku"
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
            .get(SHOW_VIDEOS_URL)
            .query(&[
                ("client_id", Self::client_id(params).as_str()),
                ("show_id", id.show_id.as_str()),
                ("page", "1"),
                ("count", "100"),
            ])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let raw = Self::parse_show_videos(&id.show_id, &value);
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
            .get(PLAY_INFO_URL)
            .query(&[("vid", id.vid.as_str()), ("ct", "12")])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let Some(duration) = Self::parse_play_duration(&value) else {
            return Ok(Vec::new());
        };

        let count = (duration / SEGMENT_SPAN).ceil().max(1.0) as u32;
        Ok((0..count)
            .map(|mat| SegmentInfo {
                provider: self.name().to_string(),
                segment_id: mat.to_string(),
                start_time: f64::from(mat) * SEGMENT_SPAN,
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
        let Ok(mat) = segment_id.parse::<u32>() else {
            return Ok(None);
        };

        let token = self.ensure_token().await?;
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let data = json!({
            "ctime": t,
            "ctype": 10004,
            "cver": "v1.0",
            "mat": mat,
            "mcount": 1,
            "pid": 0,
            "sver": "3.1.0",
            "type": 1,
            "vid": id.vid,
        })
        .to_string();
        let sign = Self::sign(&token, t, &data);
        let t_str = t.to_string();

        let response = self
            .fetcher
            .post(DANMU_LIST_URL)
            .query(&[
                ("jsv", "2.5.1"),
                ("appKey", APP_KEY),
                ("t", t_str.as_str()),
                ("sign", sign.as_str()),
                ("api", "mopen.youku.danmu.list"),
                ("v", "1.0"),
                ("type", "originaljson"),
            ])
            .header(reqwest::header::COOKIE, format!("_m_h5_tk={token}"))
            .form(&[("data", data.as_str())])
            .send()
            .await
            .map_err(ProviderError::from)?;

        let value: Value = response
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        Ok(Self::parse_danmu_result(&value))
    }

    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String> {
        let vid = fields.get("vid")?;
        let show_id = fields.get("show_id").map(String::as_str).unwrap_or("");
        Some(encode_fields(&[("show_id", show_id), ("vid", vid)]))
    }

    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
        let fields = decode_fields(raw)?;
        field(&fields, "vid").filter(|v| !v.is_empty())?;
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_uses_token_head_only() {
        let full = Youku::sign("abcdef_1699999999", 1700000000000, "{}");
        let head_only = Youku::sign("abcdef", 1700000000000, "{}");
        assert_eq!(full, head_only);
        assert_eq!(full.len(), 32);
    }

    #[test]
    fn test_parse_danmu_result_nested_json_string() {
        let inner = json!({
            "data": {
                "result": [
                    {
                        "id": 99001,
                        "content": "经典场面",
                        "playat": 63000,
                        "propertis": "{\"color\":16711680,\"pos\":1}"
                    },
                    {"content": "路过", "playat": 64250}
                ]
            }
        })
        .to_string();
        let envelope = json!({"data": {"result": inner}});

        let comments = Youku::parse_danmu_result(&envelope).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].timestamp, 63.0);
        assert_eq!(comments[0].color, 0xFF0000);
        assert_eq!(comments[0].mode, CommentMode::Top);
        assert_eq!(comments[0].id.as_deref(), Some("99001"));
        assert_eq!(comments[1].mode, CommentMode::Scroll);
    }

    #[test]
    fn test_parse_danmu_result_malformed_is_none() {
        assert!(Youku::parse_danmu_result(&json!({"data": {}})).is_none());
        assert!(Youku::parse_danmu_result(&json!({"data": {"result": "not json"}})).is_none());
    }

    #[test]
    fn test_parse_show_videos() {
        let value = json!({
            "videos": [
                {"id": "XNDM1", "title": "第1集"},
                {"id": "XNDM2", "title": "第2集"},
            ]
        });
        let raw = Youku::parse_show_videos("show9", &value);
        assert_eq!(raw.len(), 2);
        assert!(raw[0].0.contains("show_id=show9"));
        assert!(raw[1].0.contains("vid=XNDM2"));
    }

    #[test]
    fn test_id_string_requires_vid() {
        let adapter = Youku::new(Client::new());
        assert!(adapter.parse_id_string("show_id=s1&vid=XNDM1").is_some());
        assert!(adapter.parse_id_string("show_id=s1").is_none());
    }
}
