//! Episode title classification.
//!
//! Maps raw episode titles to canonical episode numbers and filters out
//! non-episode content (trailers, bonus clips, behind-the-scenes, ...).

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

// Trailing "第12集" / "第3话" / "第5回" / "第7期", arabic digits.
static EP_CN_ARABIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第(\d{1,4})[集话話回期]\s*$").unwrap());

// Trailing "第十二话" with Chinese numerals.
static EP_CN_NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第([零一二三四五六七八九十百千万萬]{1,10})[集话話回期]\s*$").unwrap());

// Trailing "S01E02"; the season component is parsed but discarded.
static EP_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S\d{1,3}\s*E(\d{1,4})\s*$").unwrap());

// Trailing "EP12" / "E12".
static EP_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)EP?(\d{1,4})\s*$").unwrap());

// Generic trailing number behind a bracket/dash/underscore/space, optionally
// followed by an end marker ("某番_98", "标题 - 07", "某剧[12]END").
static EP_TRAILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\[【（(_\-\s](\d{1,4})[\]】）)]?\s*(?:END|FIN|完结|完)?\s*$").unwrap()
});

/// Parse the canonical episode number out of a raw title.
///
/// Patterns are tried in order and the first match wins; returns `None` when
/// nothing matches. Callers fall back to the 1-based positional index.
pub fn parse_episode_number(title: &str) -> Option<u32> {
    let title = normalize_digits(title.trim());

    if let Some(caps) = EP_CN_ARABIC.captures(&title) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = EP_CN_NUMERAL.captures(&title) {
        return parse_chinese_numeral(&caps[1]).and_then(|n| u32::try_from(n).ok());
    }
    if let Some(caps) = EP_SEASON_EPISODE.captures(&title) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = EP_PREFIXED.captures(&title) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = EP_TRAILING.captures(&title) {
        return caps[1].parse().ok();
    }
    None
}

/// Replace full-width digits（０-９）with their ASCII counterparts.
fn normalize_digits(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Parse a Chinese numeral (0-9 digits, 十/百/千/万 units) into a number.
///
/// Standard positional composition: unit characters multiply the pending
/// digit into the current section, 万 closes a section. A bare leading unit
/// counts as one of it ("十二" is 12).
pub fn parse_chinese_numeral(text: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut section = 0u64;
    let mut digit: Option<u64> = None;

    for c in text.chars() {
        match c {
            '零' => digit = Some(0),
            '一' => digit = Some(1),
            '二' => digit = Some(2),
            '三' => digit = Some(3),
            '四' => digit = Some(4),
            '五' => digit = Some(5),
            '六' => digit = Some(6),
            '七' => digit = Some(7),
            '八' => digit = Some(8),
            '九' => digit = Some(9),
            '十' => {
                section += digit.unwrap_or(1).max(1) * 10;
                digit = None;
            }
            '百' => {
                section += digit.unwrap_or(1).max(1) * 100;
                digit = None;
            }
            '千' => {
                section += digit.unwrap_or(1).max(1) * 1000;
                digit = None;
            }
            '万' | '萬' => {
                section += digit.unwrap_or(0);
                total = (total + section).max(1) * 10_000;
                section = 0;
                digit = None;
            }
            _ => return None,
        }
    }

    Some(total + section + digit.unwrap_or(0))
}

/// Global junk-content keywords shared by every provider.
///
/// Titles matching any of these are not real episodes: promotional material,
/// bonus footage, music releases, release-format tags and the like.
const GLOBAL_JUNK_KEYWORDS: &[&str] = &[
    "预告",
    "花絮",
    "彩蛋",
    "特辑",
    "专访",
    "访谈",
    "幕后",
    "片花",
    "看点",
    "速看",
    "解读",
    "盘点",
    "回顾",
    "合集",
    "混剪",
    "抢先",
    "纯享",
    "加更",
    "直拍",
    "发布会",
    "番外",
    "周边",
    "OST",
    "MV",
    "PV",
    "CM",
    "NG",
    "BD",
    "x264",
    "x265",
    "AAC",
    "FLAC",
    "720P",
    "1080P",
    "4K",
];

static GLOBAL_FILTER: LazyLock<Regex> = LazyLock::new(|| compile_keywords(GLOBAL_JUNK_KEYWORDS, &[]).unwrap());

fn compile_keywords(global: &[&str], extra: &[String]) -> Result<Regex, regex::Error> {
    let pattern = global
        .iter()
        .map(|k| regex::escape(k))
        .chain(extra.iter().map(|k| k.clone()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){pattern}"))
}

/// Compiled junk-title filter: the global keyword list, optionally extended
/// with provider-specific keywords.
#[derive(Debug, Clone)]
pub struct EpisodeFilter {
    pattern: Regex,
}

impl Default for EpisodeFilter {
    fn default() -> Self {
        Self {
            pattern: GLOBAL_FILTER.clone(),
        }
    }
}

impl EpisodeFilter {
    /// Build a filter from the global list plus provider-specific keyword
    /// fragments. If the combined pattern fails to compile (a provider
    /// supplied an invalid fragment), fall back to the global-only pattern.
    pub fn with_provider_keywords(keywords: &[String]) -> Self {
        match compile_keywords(GLOBAL_JUNK_KEYWORDS, keywords) {
            Ok(pattern) => Self { pattern },
            Err(e) => {
                warn!(error = %e, "invalid provider keyword fragment; using global filter");
                Self::default()
            }
        }
    }

    /// Whether a title represents junk (non-episode) content.
    pub fn is_junk(&self, title: &str) -> bool {
        self.pattern.is_match(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("第12集", Some(12))]
    #[case("第1话", Some(1))]
    #[case("第08回", Some(8))]
    #[case("第３期", Some(3))]
    #[case("第十二话", Some(12))]
    #[case("第二十集", Some(20))]
    #[case("第一百零五集", Some(105))]
    #[case("S01E02", Some(2))]
    #[case("我的剧 s2e13", Some(13))]
    #[case("EP07", Some(7))]
    #[case("某剧 E3", Some(3))]
    #[case("某番_98", Some(98))]
    #[case("某剧 - 07", Some(7))]
    #[case("某剧[12]END", Some(12))]
    #[case("某剧（24）完结", Some(24))]
    #[case("随便的标题", None)]
    #[case("", None)]
    fn test_parse_episode_number(#[case] title: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_episode_number(title), expected);
    }

    #[rstest]
    #[case("十", Some(10))]
    #[case("十二", Some(12))]
    #[case("二十", Some(20))]
    #[case("九十九", Some(99))]
    #[case("一百", Some(100))]
    #[case("一百零五", Some(105))]
    #[case("三百二十一", Some(321))]
    #[case("一千零一", Some(1001))]
    #[case("一万", Some(10_000))]
    #[case("两千零二", None)] // 两 is not in the numeral table
    fn test_parse_chinese_numeral(#[case] text: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_chinese_numeral(text), expected);
    }

    #[test]
    fn test_filter_excludes_junk() {
        let filter = EpisodeFilter::default();
        assert!(filter.is_junk("幕后花絮"));
        assert!(filter.is_junk("第12集预告"));
        assert!(filter.is_junk("某剧 OST 合集"));
        assert!(!filter.is_junk("第12集"));
        assert!(!filter.is_junk("决战"));
    }

    #[test]
    fn test_filter_provider_keywords() {
        let filter = EpisodeFilter::with_provider_keywords(&["独家策划".to_string()]);
        assert!(filter.is_junk("独家策划：主演谈角色"));
        assert!(filter.is_junk("幕后花絮"));
        assert!(!filter.is_junk("第12集"));
    }

    #[test]
    fn test_filter_invalid_fragment_falls_back() {
        let filter = EpisodeFilter::with_provider_keywords(&["([".to_string()]);
        // still filters the global list
        assert!(filter.is_junk("预告"));
        assert!(!filter.is_junk("第12集"));
    }
}
