//! Opaque identifier codec.
//!
//! Providers reference dramas/episodes through opaque id strings that cross
//! the aggregation boundary. The encoding is a shared key-value protocol:
//! `key=value` pairs joined by `&`, with keys and values percent-escaped so
//! provider-chosen field names survive a round trip. Each adapter wraps the
//! decoded map into its own typed record; the engine itself never inspects
//! the fields.

use rustc_hash::FxHashMap;

/// Encode a set of fields into an opaque id string.
///
/// Field order is preserved, so the same record always encodes to the same
/// string.
pub fn encode_fields(fields: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&urlencoding::encode(key));
        out.push('=');
        out.push_str(&urlencoding::encode(value));
    }
    out
}

/// Decode an opaque id string back into its fields.
///
/// Returns `None` on malformed input (empty string, pair without `=`, empty
/// key, invalid escape) - never an error. Call sites treat `None` as "skip
/// this provider".
pub fn decode_fields(raw: &str) -> Option<FxHashMap<String, String>> {
    if raw.is_empty() {
        return None;
    }

    let mut fields = FxHashMap::default();
    for pair in raw.split('&') {
        let (key, value) = pair.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        let key = urlencoding::decode(key).ok()?;
        let value = urlencoding::decode(value).ok()?;
        fields.insert(key.into_owned(), value.into_owned());
    }
    Some(fields)
}

/// Fetch a required field out of a decoded map.
pub fn field<'a>(fields: &'a FxHashMap<String, String>, key: &str) -> Option<&'a str> {
    fields.get(key).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let encoded = encode_fields(&[("cid", "mzc00200xyz"), ("vid", "i41001234")]);
        assert_eq!(encoded, "cid=mzc00200xyz&vid=i41001234");

        let decoded = decode_fields(&encoded).unwrap();
        assert_eq!(decoded["cid"], "mzc00200xyz");
        assert_eq!(decoded["vid"], "i41001234");
    }

    #[test]
    fn test_round_trip_with_reserved_characters() {
        let encoded = encode_fields(&[("id", "a=b&c"), ("标题", "第1集")]);
        let decoded = decode_fields(&encoded).unwrap();
        assert_eq!(decoded["id"], "a=b&c");
        assert_eq!(decoded["标题"], "第1集");
    }

    #[test]
    fn test_malformed_input_is_none() {
        assert!(decode_fields("").is_none());
        assert!(decode_fields("novalue").is_none());
        assert!(decode_fields("=orphan").is_none());
        assert!(decode_fields("ok=1&broken").is_none());
    }

    #[test]
    fn test_invalid_utf8_escape_is_none() {
        // 0xFF is not valid UTF-8 on its own
        assert!(decode_fields("key=%FF").is_none());
    }
}
