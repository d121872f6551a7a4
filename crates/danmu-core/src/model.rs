//! Data model shared across providers and the aggregation engine.
//!
//! Every entity carries a `provider` tag. Cross-provider identity is
//! established only by content equivalence (see [`crate::engine`]), never by
//! comparing opaque provider ids.

use serde::{Deserialize, Serialize};

/// A drama/show as reported by one provider's search operation.
///
/// Ephemeral: produced per request, never persisted. `drama_id` is the
/// provider's opaque id string (see [`crate::codec`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DramaInfo {
    pub provider: String,
    pub drama_id: String,
    pub drama_title: String,
    pub season: u32,
}

/// A single episode of a drama.
///
/// `episode_id` is opaque and provider-namespaced; it is globally unique only
/// once prefixed with the provider name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub provider: String,
    pub episode_id: String,
    pub episode_title: String,
    pub episode_number: u32,
}

/// A fixed slice of an episode's comment stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub provider: String,
    pub segment_id: String,
    /// Start offset of the segment, in seconds from the episode start.
    pub start_time: f64,
}

/// Sort a provider's segment list ascending by start time.
///
/// Segment lists must always be sorted before they reach the locator. Start
/// times within one provider's list are distinct; duplicates are collapsed
/// defensively so the floor search stays well-defined.
pub fn sort_segments(segments: &mut Vec<SegmentInfo>) {
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    segments.dedup_by(|a, b| a.start_time == b.start_time);
}

/// Display mode of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentMode {
    /// Right-to-left scrolling comment.
    Scroll,
    /// Pinned to the bottom of the frame.
    Bottom,
    /// Pinned to the top of the frame.
    Top,
}

impl CommentMode {
    /// The conventional numeric encoding used in the canonical `p` string.
    pub fn as_int(self) -> u8 {
        match self {
            CommentMode::Scroll => 1,
            CommentMode::Bottom => 4,
            CommentMode::Top => 5,
        }
    }

    /// Lossy decode from a provider payload; unknown values fall back to
    /// scrolling.
    pub fn from_i64(value: i64) -> Self {
        match value {
            4 => CommentMode::Bottom,
            5 => CommentMode::Top,
            _ => CommentMode::Scroll,
        }
    }
}

/// A single comment as reported by one provider.
///
/// `timestamp` is relative to the start of the episode, not the segment.
/// Produced per request, folded into the aggregation map, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderComment {
    pub id: Option<String>,
    pub timestamp: f64,
    pub mode: CommentMode,
    /// 24-bit RGB color.
    pub color: u32,
    pub content: String,
}

/// Canonical output entity returned to the caller.
///
/// `p` is the composite `"timestamp,mode,color,[provider]"` string; `m` is the
/// content, possibly suffixed with a repeat counter. This is a projection of
/// the fold result, not independently persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub cid: Option<String>,
    pub p: String,
    pub m: String,
}

/// Format the canonical `p` string for a comment.
pub fn format_p(timestamp: f64, mode: CommentMode, color: u32, provider: &str) -> String {
    format!("{timestamp:.2},{},{color},[{provider}]", mode.as_int())
}
