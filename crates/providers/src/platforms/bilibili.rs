//! Bilibili (bilibili.com) adapter.
//!
//! Ids are `{sid, oid}` pairs: `sid` is the bangumi season, `oid` the comment
//! stream id (cid) of one episode. The legacy `list.so` endpoint returns the
//! whole episode's comments as raw-deflate XML, so the segment list is a
//! single segment starting at zero.

use std::io::Read;

use async_trait::async_trait;
use flate2::read::DeflateDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::Value;

use danmu_core::codec::{decode_fields, encode_fields, field};
use danmu_core::model::{CommentMode, DramaInfo, EpisodeInfo, ProviderComment, SegmentInfo};
use danmu_core::{DanmuProvider, ProviderParams};

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::platforms::{classify_episodes, episode_filter_for};
use crate::util::{json_str, json_u64, strip_em_tags};

const SEASON_URL: &str = "https://api.bilibili.com/pgc/view/web/season";
const DANMU_LIST_URL: &str = "https://api.bilibili.com/x/v1/dm/list.so";
const SEARCH_URL: &str = "https://api.bilibili.com/x/web-interface/search/type";

struct BiliId {
    sid: String,
    oid: String,
}

pub struct Bilibili {
    fetcher: Fetcher,
}

impl Bilibili {
    pub fn new(client: Client) -> Self {
        let mut fetcher = Fetcher::new(client);
        fetcher.set_origin_and_referer("https://www.bilibili.com");
        Self { fetcher }
    }

    fn id_record(&self, raw: &str) -> Result<BiliId> {
        let fields = self
            .parse_id_string(raw)
            .ok_or_else(|| ProviderError::InvalidId(raw.to_string()))?;
        Ok(BiliId {
            sid: fields.get("sid").cloned().unwrap_or_default(),
            oid: fields.get("oid").cloned().unwrap_or_default(),
        })
    }

    fn parse_search_results(value: &Value) -> Vec<DramaInfo> {
        let Some(results) = value.pointer("/data/result").and_then(Value::as_array) else {
            return Vec::new();
        };
        results
            .iter()
            .filter_map(|item| {
                let sid = json_u64(item, "season_id")?.to_string();
                let title = json_str(item, "title")?;
                Some(DramaInfo {
                    provider: "bilibili".to_string(),
                    drama_id: encode_fields(&[("sid", &sid), ("oid", "")]),
                    drama_title: strip_em_tags(title),
                    season: 1,
                })
            })
            .collect()
    }

    fn parse_season_episodes(sid: &str, value: &Value) -> Vec<(String, String)> {
        let Some(episodes) = value.pointer("/result/episodes").and_then(Value::as_array) else {
            return Vec::new();
        };
        episodes
            .iter()
            .filter_map(|episode| {
                let oid = json_u64(episode, "cid")?.to_string();
                let short = json_str(episode, "title").unwrap_or("");
                let long = json_str(episode, "long_title").unwrap_or("");
                // the short title is usually just the index ("1"); normalize
                // it so the classifier sees a parseable form
                let title = if short.chars().all(|c| c.is_ascii_digit()) && !short.is_empty() {
                    if long.is_empty() {
                        format!("第{short}集")
                    } else {
                        format!("第{short}集 {long}")
                    }
                } else if long.is_empty() {
                    short.to_string()
                } else {
                    format!("{short} {long}")
                };
                Some((encode_fields(&[("sid", sid), ("oid", &oid)]), title))
            })
            .collect()
    }

    /// Parse `<d p="time,mode,size,color,ts,pool,uidhash,rowid">text</d>`
    /// entries out of the list.so XML.
    fn parse_danmu_xml(xml: &str) -> Result<Vec<ProviderComment>> {
        let mut reader = Reader::from_str(xml);
        let mut comments = Vec::new();
        let mut pending: Option<(f64, CommentMode, u32, Option<String>)> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"d" => {
                    pending = e
                        .try_get_attribute("p")
                        .ok()
                        .flatten()
                        .and_then(|attr| attr.unescape_value().ok())
                        .and_then(|p| Self::parse_p_attribute(&p));
                }
                Ok(Event::Text(t)) => {
                    if let Some((timestamp, mode, color, id)) = pending.take()
                        && let Ok(text) = t.unescape()
                    {
                        let content = text.trim();
                        if !content.is_empty() {
                            comments.push(ProviderComment {
                                id,
                                timestamp,
                                mode,
                                color,
                                content: content.to_string(),
                            });
                        }
                    }
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"d" => {
                    pending = None;
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ProviderError::XmlError(e.to_string())),
                _ => {}
            }
        }

        Ok(comments)
    }

    fn parse_p_attribute(p: &str) -> Option<(f64, CommentMode, u32, Option<String>)> {
        let parts: Vec<&str> = p.split(',').collect();
        if parts.len() < 4 {
            return None;
        }
        let timestamp: f64 = parts[0].parse().ok()?;
        let mode = CommentMode::from_i64(parts[1].parse().unwrap_or(1));
        let color: u32 = parts[3].parse::<u32>().unwrap_or(0xFFFFFF) & 0xFF_FFFF;
        let id = parts.get(7).map(|s| s.to_string()).filter(|s| !s.is_empty());
        Some((timestamp, mode, color, id))
    }

    /// list.so ships raw-deflate bytes; uncompressed XML comes back as-is
    /// when a proxy already inflated it.
    fn inflate(bytes: &[u8]) -> Result<String> {
        let mut decoder = DeflateDecoder::new(bytes);
        let mut xml = String::new();
        match decoder.read_to_string(&mut xml) {
            Ok(_) => Ok(xml),
            Err(_) => String::from_utf8(bytes.to_vec())
                .map_err(|_| ProviderError::UnexpectedPayload("not deflate, not utf-8".to_string())),
        }
    }
}

#[async_trait]
impl DanmuProvider for Bilibili {
    fn name(&self) -> &'static str {
        "bilibili"
    }

    fn supports_search(&self) -> bool {
        true
    }

    async fn search(
        &self,
        keyword: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<DramaInfo>> {
        let value: Value = self
            .fetcher
            .get(SEARCH_URL)
            .query(&[("search_type", "media_bangumi"), ("keyword", keyword)])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        Ok(Self::parse_search_results(&value))
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
            .get(SEASON_URL)
            .query(&[("season_id", id.sid.as_str())])
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let raw = Self::parse_season_episodes(&id.sid, &value);
        let filter = episode_filter_for(self.name(), params);
        Ok(classify_episodes(self.name(), raw, &filter, episode_number))
    }

    async fn get_segments(
        &self,
        id_string: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<SegmentInfo>> {
        let id = self.id_record(id_string)?;
        if id.oid.is_empty() {
            return Ok(Vec::new());
        }
        // the whole episode comes back in one list.so response
        Ok(vec![SegmentInfo {
            provider: self.name().to_string(),
            segment_id: "0".to_string(),
            start_time: 0.0,
        }])
    }

    async fn get_comments(
        &self,
        id_string: &str,
        _segment_id: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Option<Vec<ProviderComment>>> {
        let id = self.id_record(id_string)?;
        if id.oid.is_empty() {
            return Ok(None);
        }

        let response = self
            .fetcher
            .get(DANMU_LIST_URL)
            .query(&[("oid", id.oid.as_str())])
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
        Ok(Some(Self::parse_danmu_xml(&xml)?))
    }

    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String> {
        let sid = fields.get("sid").map(String::as_str).unwrap_or("");
        let oid = fields.get("oid").map(String::as_str).unwrap_or("");
        if sid.is_empty() && oid.is_empty() {
            return None;
        }
        Some(encode_fields(&[("sid", sid), ("oid", oid)]))
    }

    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
        let fields = decode_fields(raw)?;
        let sid = field(&fields, "sid").unwrap_or("");
        let oid = field(&fields, "oid").unwrap_or("");
        if sid.is_empty() && oid.is_empty() {
            return None;
        }
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><i>
<chatserver>chat.bilibili.com</chatserver><chatid>1234</chatid>
<d p="12.5,1,25,16777215,1700000000,0,abc123,90001">名场面来了</d>
<d p="13.0,5,25,255,1700000001,0,def456,90002">前排</d>
<d p="bad,attribute">ignored</d>
</i>"#;

    #[test]
    fn test_parse_danmu_xml() {
        let comments = Bilibili::parse_danmu_xml(SAMPLE_XML).unwrap();
        assert_eq!(comments.len(), 2);

        assert_eq!(comments[0].content, "名场面来了");
        assert_eq!(comments[0].timestamp, 12.5);
        assert_eq!(comments[0].mode, CommentMode::Scroll);
        assert_eq!(comments[0].color, 0xFFFFFF);
        assert_eq!(comments[0].id.as_deref(), Some("90001"));

        assert_eq!(comments[1].mode, CommentMode::Top);
        assert_eq!(comments[1].color, 0x0000FF);
    }

    #[test]
    fn test_inflate_accepts_raw_deflate_and_plain() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE_XML.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(Bilibili::inflate(&compressed).unwrap(), SAMPLE_XML);
        assert_eq!(Bilibili::inflate(SAMPLE_XML.as_bytes()).unwrap(), SAMPLE_XML);
    }

    #[test]
    fn test_parse_season_episodes_normalizes_titles() {
        let value = json!({
            "result": {
                "episodes": [
                    {"cid": 111, "title": "1", "long_title": "初遇"},
                    {"cid": 112, "title": "2", "long_title": ""},
                    {"cid": 113, "title": "PV1", "long_title": "先导预告"},
                ]
            }
        });
        let raw = Bilibili::parse_season_episodes("4316", &value);
        assert_eq!(raw[0].1, "第1集 初遇");
        assert_eq!(raw[1].1, "第2集");
        assert_eq!(raw[2].1, "PV1 先导预告");

        // classification drops the trailer and keeps numbering intact
        let episodes = classify_episodes(
            "bilibili",
            raw,
            &danmu_core::episode::EpisodeFilter::default(),
            None,
        );
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].episode_number, 1);
        assert_eq!(episodes[1].episode_number, 2);
    }

    #[test]
    fn test_parse_search_results() {
        let value = json!({
            "data": {
                "result": [
                    {"season_id": 4316, "title": "<em class=\"keyword\">灵笼</em>"},
                ]
            }
        });
        let dramas = Bilibili::parse_search_results(&value);
        assert_eq!(dramas.len(), 1);
        assert_eq!(dramas[0].drama_title, "灵笼");
        assert!(dramas[0].drama_id.contains("sid=4316"));
    }

    #[test]
    fn test_id_string_needs_sid_or_oid() {
        let adapter = Bilibili::new(Client::new());
        assert!(adapter.parse_id_string("sid=4316&oid=").is_some());
        assert!(adapter.parse_id_string("sid=&oid=111").is_some());
        assert!(adapter.parse_id_string("sid=&oid=").is_none());
        assert!(adapter.parse_id_string("nonsense").is_none());
    }
}
