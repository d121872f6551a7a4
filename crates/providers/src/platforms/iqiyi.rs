//! iQiyi (iq.com / iqiyi.com) adapter.
//!
//! Ids are `{aid, tvid}` pairs. The bullet service serves fixed 300-second
//! buckets as zlib-compressed XML, addressed by two digit groups taken from
//! the tail of the tvid.

use std::io::Read;

use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::Value;

use danmu_core::codec::{decode_fields, encode_fields, field};
use danmu_core::model::{CommentMode, EpisodeInfo, ProviderComment, SegmentInfo};
use danmu_core::{DanmuProvider, ProviderParams};

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::platforms::{classify_episodes, episode_filter_for};
use crate::util::{json_f64, json_str, parse_clock_duration};

const BASEINFO_URL: &str = "https://pcw-api.iqiyi.com/video/video/baseinfo";
const ALBUM_LIST_URL: &str = "https://pcw-api.iqiyi.com/albums/album/avlistinfo";
const BULLET_URL: &str = "https://cmts.iqiyi.com/bullet";

/// Bucket length of the bullet service, in seconds.
const SEGMENT_SPAN: f64 = 300.0;

struct IqiyiId {
    aid: String,
    tvid: String,
}

pub struct Iqiyi {
    fetcher: Fetcher,
}

impl Iqiyi {
    pub fn new(client: Client) -> Self {
        let mut fetcher = Fetcher::new(client);
        fetcher.set_origin_and_referer("https://www.iqiyi.com");
        Self { fetcher }
    }

    fn id_record(&self, raw: &str) -> Result<IqiyiId> {
        let fields = self
            .parse_id_string(raw)
            .ok_or_else(|| ProviderError::InvalidId(raw.to_string()))?;
        Ok(IqiyiId {
            aid: fields.get("aid").cloned().unwrap_or_default(),
            tvid: fields["tvid"].clone(),
        })
    }

    /// Bullet files live under two digit groups cut from the tvid tail:
    /// `.../{tvid[-4..-2]}/{tvid[-2..]}/{tvid}_300_{n}.z`.
    fn bullet_url(tvid: &str, segment: u32) -> Option<String> {
        if tvid.len() < 4 {
            return None;
        }
        let head = &tvid[tvid.len() - 4..tvid.len() - 2];
        let tail = &tvid[tvid.len() - 2..];
        Some(format!("{BULLET_URL}/{head}/{tail}/{tvid}_300_{segment}.z"))
    }

    fn parse_duration(value: &Value) -> Option<f64> {
        let data = value.get("data")?;
        json_f64(data, "durationSec")
            .or_else(|| json_str(data, "duration").and_then(parse_clock_duration))
    }

    fn parse_episode_list(value: &Value) -> Vec<(String, String)> {
        let Some(list) = value
            .pointer("/data/epsodelist")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        list.iter()
            .filter_map(|item| {
                let tvid = item
                    .get("tvId")
                    .and_then(Value::as_u64)
                    .map(|n| n.to_string())?;
                let title = json_str(item, "name").unwrap_or(&tvid).to_string();
                let aid = item
                    .get("albumId")
                    .and_then(Value::as_u64)
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                Some((
                    encode_fields(&[("aid", &aid), ("tvid", &tvid)]),
                    title,
                ))
            })
            .collect()
    }

    /// Parse the decompressed bullet XML into comments.
    ///
    /// The payload is a flat list of `<bulletInfo>` elements with
    /// `<content>`, `<showTime>` (seconds), `<color>` and `<position>`
    /// children.
    fn parse_bullet_xml(xml: &str) -> Result<Vec<ProviderComment>> {
        let mut reader = Reader::from_str(xml);
        let mut comments = Vec::new();

        let mut in_bullet = false;
        let mut current_tag: Vec<u8> = Vec::new();
        let mut content_id = None;
        let mut content = None;
        let mut show_time = None;
        let mut color = 0xFFFFFFu32;
        let mut position = 0i64;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current_tag = e.name().as_ref().to_vec();
                    if current_tag == b"bulletInfo" {
                        in_bullet = true;
                        content_id = None;
                        content = None;
                        show_time = None;
                        color = 0xFFFFFF;
                        position = 0;
                    }
                }
                Ok(Event::Text(t)) if in_bullet => {
                    let Ok(text) = t.unescape() else { continue };
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match current_tag.as_slice() {
                        b"contentId" => content_id = Some(text.to_string()),
                        b"content" => content = Some(text.to_string()),
                        b"showTime" => show_time = text.parse::<f64>().ok(),
                        b"color" => color = crate::util::parse_rgb(text),
                        b"position" => position = text.parse().unwrap_or(0),
                        _ => {}
                    }
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"bulletInfo" => {
                    in_bullet = false;
                    if let (Some(content), Some(timestamp)) = (content.take(), show_time.take()) {
                        comments.push(ProviderComment {
                            id: content_id.take(),
                            timestamp,
                            mode: match position {
                                1 => CommentMode::Top,
                                2 => CommentMode::Bottom,
                                _ => CommentMode::Scroll,
                            },
                            color,
                            content,
                        });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ProviderError::XmlError(e.to_string())),
                _ => {}
            }
        }

        Ok(comments)
    }

    fn inflate(bytes: &[u8]) -> Result<String> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut xml = String::new();
        decoder.read_to_string(&mut xml)?;
        Ok(xml)
    }
}

#[async_trait]
impl DanmuProvider for Iqiyi {
    fn name(&self) -> &'static str {
        "iqiyi"
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
            .get(ALBUM_LIST_URL)
            .query(&[("aid", id.aid.as_str()), ("page", "1"), ("size", "200")])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let raw = Self::parse_episode_list(&value);
        let filter = episode_filter_for(self.name(), params);
        Ok(classify_episodes(self.name(), raw, &filter, episode_number))
    }

    async fn get_segments(
        &self,
        id_string: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<SegmentInfo>> {
        let id = self.id_record(id_string)?;
        let url = format!("{BASEINFO_URL}/{}", id.tvid);
        let value: Value = self
            .fetcher
            .get(&url)
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
        Ok((1..=count)
            .map(|n| SegmentInfo {
                provider: self.name().to_string(),
                segment_id: n.to_string(),
                start_time: f64::from(n - 1) * SEGMENT_SPAN,
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
        let Ok(segment) = segment_id.parse::<u32>() else {
            return Ok(None);
        };
        let Some(url) = Self::bullet_url(&id.tvid, segment) else {
            return Ok(None);
        };

        let response = self
            .fetcher
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::from)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response
            .error_for_status()
            .map_err(ProviderError::from)?
            .bytes()
            .await
            .map_err(ProviderError::from)?;

        let xml = Self::inflate(&bytes)?;
        let comments = Self::parse_bullet_xml(&xml)?;
        Ok(Some(comments))
    }

    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String> {
        let tvid = fields.get("tvid")?;
        let aid = fields.get("aid").map(String::as_str).unwrap_or("");
        Some(encode_fields(&[("aid", aid), ("tvid", tvid)]))
    }

    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
        let fields = decode_fields(raw)?;
        let tvid = field(&fields, "tvid").filter(|t| !t.is_empty())?;
        // the bullet path scheme needs at least four digits of tvid tail
        if !tvid.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_bullet_url_digit_groups() {
        let url = Iqiyi::bullet_url("4982817241938500", 3).unwrap();
        assert_eq!(url, "https://cmts.iqiyi.com/bullet/85/00/4982817241938500_300_3.z");
        assert!(Iqiyi::bullet_url("42", 1).is_none());
    }

    #[test]
    fn test_parse_bullet_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<danmu><data><entry><list>
<bulletInfo><contentId>900</contentId><content>太好看了</content><showTime>12</showTime><color>ff00ff</color><position>0</position></bulletInfo>
<bulletInfo><contentId>901</contentId><content>字幕组辛苦</content><showTime>17.5</showTime><color>ffffff</color><position>1</position></bulletInfo>
</list></entry></data></danmu>"#;

        let comments = Iqiyi::parse_bullet_xml(xml).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "太好看了");
        assert_eq!(comments[0].timestamp, 12.0);
        assert_eq!(comments[0].color, 0xFF00FF);
        assert_eq!(comments[0].mode, CommentMode::Scroll);
        assert_eq!(comments[1].mode, CommentMode::Top);
        assert_eq!(comments[1].id.as_deref(), Some("901"));
    }

    #[test]
    fn test_inflate_round_trip() {
        let xml = "<danmu><data/></danmu>";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(Iqiyi::inflate(&compressed).unwrap(), xml);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(
            Iqiyi::parse_duration(&json!({"data": {"durationSec": 2640}})),
            Some(2640.0)
        );
        assert_eq!(
            Iqiyi::parse_duration(&json!({"data": {"duration": "44:00"}})),
            Some(2640.0)
        );
        assert_eq!(Iqiyi::parse_duration(&json!({"code": "A00001"})), None);
    }

    #[test]
    fn test_parse_episode_list() {
        let value = json!({
            "data": {
                "epsodelist": [
                    {"tvId": 4982817241938500u64, "albumId": 5244810514669600u64, "name": "第1集"},
                    {"tvId": 4982817241938501u64, "albumId": 5244810514669600u64, "name": "独家花絮"},
                ]
            }
        });
        let raw = Iqiyi::parse_episode_list(&value);
        assert_eq!(raw.len(), 2);
        assert!(raw[0].0.contains("tvid=4982817241938500"));
    }

    #[test]
    fn test_parse_id_string_rejects_non_numeric_tvid() {
        let adapter = Iqiyi::new(Client::new());
        assert!(adapter.parse_id_string("aid=1&tvid=12345678").is_some());
        assert!(adapter.parse_id_string("aid=1&tvid=abc").is_none());
        assert!(adapter.parse_id_string("aid=1").is_none());
    }
}
