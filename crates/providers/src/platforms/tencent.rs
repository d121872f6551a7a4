//! Tencent Video (v.qq.com) adapter.
//!
//! Ids are `{cid, vid}` pairs: `cid` addresses the drama, `vid` one episode.
//! The barrage service exposes a per-episode segment index keyed by start
//! offset; comments are fetched per segment name.

use async_trait::async_trait;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use danmu_core::codec::{decode_fields, encode_fields, field};
use danmu_core::model::{CommentMode, DramaInfo, EpisodeInfo, ProviderComment, SegmentInfo};
use danmu_core::{DanmuProvider, ProviderParams};

use crate::error::{ProviderError, Result};
use crate::fetch::Fetcher;
use crate::platforms::{classify_episodes, episode_filter_for};
use crate::util::{json_f64, json_str, strip_em_tags};

const BARRAGE_BASE_URL: &str = "https://dm.video.qq.com/barrage/base";
const BARRAGE_SEGMENT_URL: &str = "https://dm.video.qq.com/barrage/segment";
const EPISODE_LIST_URL: &str = "https://pbaccess.video.qq.com/trpc.universal_backend_service.page_server_rpc.PageServer/GetPageData?video_appid=3000010&vplatform=2";
const SEARCH_URL: &str = "https://pbaccess.video.qq.com/trpc.videosearch.mobile_search.MultiTerminalSearch/MbSearch?vplatform=2";

struct TencentId {
    cid: String,
    vid: String,
}

pub struct Tencent {
    fetcher: Fetcher,
}

impl Tencent {
    pub fn new(client: Client) -> Self {
        let mut fetcher = Fetcher::new(client);
        fetcher.set_origin_and_referer("https://v.qq.com");
        Self { fetcher }
    }

    fn id_record(&self, raw: &str) -> Result<TencentId> {
        let fields = self
            .parse_id_string(raw)
            .ok_or_else(|| ProviderError::InvalidId(raw.to_string()))?;
        Ok(TencentId {
            cid: fields["cid"].clone(),
            vid: fields.get("vid").cloned().unwrap_or_default(),
        })
    }

    fn parse_search_results(value: &Value) -> Vec<DramaInfo> {
        let Some(items) = value
            .pointer("/data/normalList/itemList")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let cid = item.pointer("/doc/id").and_then(Value::as_str)?;
                let video_info = item.get("videoInfo")?;
                let title = json_str(video_info, "title")?;
                Some(DramaInfo {
                    provider: "tencent".to_string(),
                    drama_id: encode_fields(&[("cid", cid), ("vid", "")]),
                    drama_title: strip_em_tags(title),
                    season: 1,
                })
            })
            .collect()
    }

    fn parse_episode_items(cid: &str, value: &Value) -> Vec<(String, String)> {
        let Some(modules) = value
            .pointer("/data/module_list_datas")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        let mut items = Vec::new();
        for module in modules {
            let Some(datas) = module
                .pointer("/module_datas/0/item_data_lists/item_datas")
                .and_then(Value::as_array)
            else {
                continue;
            };
            for item in datas {
                let Some(item_params) = item.get("item_params") else {
                    continue;
                };
                let Some(vid) = json_str(item_params, "vid") else {
                    continue;
                };
                // the service flags trailers itself; drop them before the
                // title filter even sees them
                if json_str(item_params, "is_trailer") == Some("1") {
                    continue;
                }
                let title = json_str(item_params, "union_title")
                    .or_else(|| json_str(item_params, "title"))
                    .unwrap_or(vid);
                items.push((encode_fields(&[("cid", cid), ("vid", vid)]), title.to_string()));
            }
        }
        items
    }

    fn parse_segment_index(value: &Value) -> Vec<SegmentInfo> {
        let Some(index) = value.get("segment_index").and_then(Value::as_object) else {
            return Vec::new();
        };

        index
            .values()
            .filter_map(|entry| {
                let name = json_str(entry, "segment_name")?;
                let start_ms = json_f64(entry, "segment_start")?;
                Some(SegmentInfo {
                    provider: "tencent".to_string(),
                    segment_id: name.to_string(),
                    start_time: start_ms / 1000.0,
                })
            })
            .collect()
    }

    fn parse_barrage_list(value: &Value) -> Option<Vec<ProviderComment>> {
        let list = value.get("barrage_list")?.as_array()?;

        let comments = list
            .iter()
            .filter_map(|item| {
                let content = json_str(item, "content")?;
                let timestamp = json_f64(item, "time_offset")? / 1000.0;

                // content_style is itself a JSON string; absent for plain
                // white scrolling comments
                let style: Option<Value> = json_str(item, "content_style")
                    .and_then(|s| serde_json::from_str(s).ok());
                let color = style
                    .as_ref()
                    .and_then(|s| json_str(s, "color"))
                    .map(crate::util::parse_rgb)
                    .unwrap_or(0xFFFFFF);
                let mode = match style.as_ref().and_then(|s| json_f64(s, "position")) {
                    Some(p) if p == 2.0 => CommentMode::Top,
                    Some(p) if p == 3.0 => CommentMode::Bottom,
                    _ => CommentMode::Scroll,
                };

                Some(ProviderComment {
                    id: json_str(item, "id").map(str::to_string),
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
impl DanmuProvider for Tencent {
    fn name(&self) -> &'static str {
        "tencent"
    }

    fn supports_search(&self) -> bool {
        true
    }

    async fn search(
        &self,
        keyword: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<DramaInfo>> {
        let body = json!({
            "version": "",
            "clientType": 1,
            "filterValue": "",
            "query": keyword,
            "retry": 0,
            "pagenum": 0,
            "pagesize": 20,
            "queryFrom": 4,
            "isneedQc": true,
        });
        let value: Value = self
            .fetcher
            .post(SEARCH_URL)
            .json(&body)
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
        let body = json!({
            "page_params": {
                "req_from": "web_vsite",
                "page_id": "vsite_episode_list",
                "page_type": "detail_operation",
                "id_type": "1",
                "cid": id.cid,
                "page_size": "100",
                "page_context": "",
            },
            "has_cache": 1,
        });
        let value: Value = self
            .fetcher
            .post(EPISODE_LIST_URL)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from)?
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let raw = Self::parse_episode_items(&id.cid, &value);
        let filter = episode_filter_for(self.name(), params);
        Ok(classify_episodes(self.name(), raw, &filter, episode_number))
    }

    async fn get_segments(
        &self,
        id_string: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Vec<SegmentInfo>> {
        let id = self.id_record(id_string)?;
        let url = format!("{BARRAGE_BASE_URL}/{}", id.vid);
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

        Ok(Self::parse_segment_index(&value))
    }

    async fn get_comments(
        &self,
        id_string: &str,
        segment_id: &str,
        _params: &ProviderParams,
    ) -> danmu_core::Result<Option<Vec<ProviderComment>>> {
        let id = self.id_record(id_string)?;
        let url = format!("{BARRAGE_SEGMENT_URL}/{}/{segment_id}", id.vid);
        let response = self
            .fetcher
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::from)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = response
            .error_for_status()
            .map_err(ProviderError::from)?
            .json()
            .await
            .map_err(ProviderError::from)?;

        Ok(Self::parse_barrage_list(&value))
    }

    fn generate_id_string(&self, fields: &FxHashMap<String, String>) -> Option<String> {
        let cid = fields.get("cid")?;
        let vid = fields.get("vid").map(String::as_str).unwrap_or("");
        Some(encode_fields(&[("cid", cid), ("vid", vid)]))
    }

    fn parse_id_string(&self, raw: &str) -> Option<FxHashMap<String, String>> {
        let fields = decode_fields(raw)?;
        // cid is mandatory; vid may be empty until an episode is chosen
        field(&fields, "cid").filter(|cid| !cid.is_empty())?;
        Some(fields)
    }
}
