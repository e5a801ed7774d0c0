//! Stream-tag codec
//!
//! Dimensional metadata travels embedded in the metric name itself, as a
//! reserved suffix of the form:
//!
//! ```text
//! name|ST[b"<base64(category)>":b"<base64(value)>",...]
//! ```
//!
//! The machine-encoded form ([`encode_stream_tags`]) base64-wraps both halves
//! of every pair so arbitrary bytes survive the flat-name transport. The
//! human-authored form ([`prep_stream_tags`]) keeps pairs readable and is
//! validated instead of escaped. Both forms are deterministic: pairs are
//! deduplicated and sorted before joining, so equal tag sets always yield
//! byte-identical suffixes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// Marker that opens an embedded tag block inside a metric name.
pub const TAG_BLOCK_OPEN: &str = "|ST[";

/// Marker that closes an embedded tag block.
pub const TAG_BLOCK_CLOSE: char = ']';

/// Prefix of a pre-escaped category or value; such fields pass through the
/// encoder unchanged.
const PRE_ENCODED: &str = "b\"";

/// Upper bound on pairs in one encoded tag set. Excess pairs are dropped and
/// logged, never an error.
pub const MAX_STREAM_TAGS: usize = 256;

/// One (category, value) pair of dimensional metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub category: String,
    pub value: String,
}

impl Tag {
    pub fn new(category: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            value: value.into(),
        }
    }
}

/// Errors from the human-authored tag-list parser.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("invalid tag specification {0:?}: expected category:value[,category:value,...]")]
    InvalidSpec(String),
}

fn tag_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^:,]+:[^:,]+(,[^:,]+:[^:,]+)*$").expect("tag list pattern is valid")
    })
}

/// Normalizes a raw category: lower-cased with embedded whitespace stripped.
/// Pre-escaped categories are passed through untouched.
fn clean_category(raw: &str) -> String {
    if raw.starts_with(PRE_ENCODED) {
        return raw.to_string();
    }
    raw.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}

/// Base64-wraps one half of a pair, unless the caller pre-escaped it.
fn encode_part(part: &str) -> String {
    if part.starts_with(PRE_ENCODED) {
        part.to_string()
    } else {
        format!("{}{}\"", PRE_ENCODED, BASE64.encode(part))
    }
}

/// Encodes a tag set into the canonical escaped suffix payload (the text
/// between `|ST[` and `]`).
///
/// Cleaning drops tags whose category or value ends up empty. Fully-formed
/// `category:value` pairs are deduplicated by exact string match and sorted
/// lexicographically before escaping, so the output is order-independent.
pub fn encode_stream_tags(tags: &[Tag]) -> String {
    // (formed pair, category, value): the formed pair drives dedup and sort,
    // the halves are escaped independently afterwards.
    let mut pairs: Vec<(String, String, String)> = Vec::with_capacity(tags.len());
    for tag in tags {
        let category = clean_category(&tag.category);
        if category.is_empty() || tag.value.is_empty() {
            continue;
        }
        let formed = format!("{}:{}", category, tag.value);
        pairs.push((formed, category, tag.value.clone()));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs.dedup_by(|a, b| a.0 == b.0);

    if pairs.len() > MAX_STREAM_TAGS {
        warn!(
            dropped = pairs.len() - MAX_STREAM_TAGS,
            limit = MAX_STREAM_TAGS,
            "stream tag set over limit, truncating"
        );
        pairs.truncate(MAX_STREAM_TAGS);
    }

    pairs
        .iter()
        .map(|(_, category, value)| format!("{}:{}", encode_part(category), encode_part(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Appends an encoded tag block to a metric name.
///
/// Idempotent: a name that already carries an embedded block is returned
/// unchanged, as is a name whose tag set encodes to nothing.
pub fn metric_name_with_stream_tags(name: &str, tags: &[Tag]) -> String {
    if tags.is_empty() || name.contains(TAG_BLOCK_OPEN) {
        return name.to_string();
    }
    let encoded = encode_stream_tags(tags);
    if encoded.is_empty() {
        return name.to_string();
    }
    format!("{}{}{}{}", name, TAG_BLOCK_OPEN, encoded, TAG_BLOCK_CLOSE)
}

/// Merges additional tags into a metric name.
///
/// A name without an embedded block gets the new tags encoded alone; a name
/// with one has its existing pairs unioned with the new ones (exact-string
/// union on the escaped pairs), re-sorted, and the block rebuilt.
pub fn merge_tags(metric_name: &str, tags: &[Tag]) -> String {
    let Some((base, rest)) = metric_name.split_once(TAG_BLOCK_OPEN) else {
        return metric_name_with_stream_tags(metric_name, tags);
    };

    let block = rest.strip_suffix(TAG_BLOCK_CLOSE).unwrap_or(rest);
    let mut pairs: Vec<String> = block
        .split(',')
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect();

    let encoded = encode_stream_tags(tags);
    pairs.extend(encoded.split(',').filter(|p| !p.is_empty()).map(str::to_string));

    pairs.sort();
    pairs.dedup();
    if pairs.len() > MAX_STREAM_TAGS {
        warn!(
            dropped = pairs.len() - MAX_STREAM_TAGS,
            limit = MAX_STREAM_TAGS,
            "merged stream tag set over limit, truncating"
        );
        pairs.truncate(MAX_STREAM_TAGS);
    }

    format!(
        "{}{}{}{}",
        base,
        TAG_BLOCK_OPEN,
        pairs.join(","),
        TAG_BLOCK_CLOSE
    )
}

/// Parses an operator-supplied, comma-separated `category:value` list into a
/// ready-to-append `|ST[...]` suffix.
///
/// This is the human-authored form: pairs are validated and sorted but not
/// base64-escaped. The characters `[`, `]`, `'`, `"`, and backtick are
/// replaced with `_` so the result cannot break the block syntax or metric
/// name quoting downstream. An empty input yields an empty suffix.
pub fn prep_stream_tags(tag_list: &str) -> Result<String, TagError> {
    if tag_list.is_empty() {
        return Ok(String::new());
    }
    if !tag_list_pattern().is_match(tag_list) {
        return Err(TagError::InvalidSpec(tag_list.to_string()));
    }

    let cleaned: String = tag_list
        .chars()
        .map(|c| match c {
            '[' | ']' | '\'' | '"' | '`' => '_',
            other => other,
        })
        .collect();

    let mut pairs: Vec<&str> = cleaned.split(',').collect();
    pairs.sort_unstable();

    Ok(format!(
        "{}{}{}",
        TAG_BLOCK_OPEN,
        pairs.join(","),
        TAG_BLOCK_CLOSE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_part(part: &str) -> String {
        let inner = part
            .strip_prefix(PRE_ENCODED)
            .and_then(|p| p.strip_suffix('"'))
            .expect("encoded part wrapped as b\"...\"");
        String::from_utf8(BASE64.decode(inner).expect("valid base64")).expect("utf8")
    }

    #[test]
    fn test_encode_round_trip() {
        let tags = vec![Tag::new("zone", "us1"), Tag::new("arch", "x86")];
        let encoded = encode_stream_tags(&tags);

        let decoded: Vec<(String, String)> = encoded
            .split(',')
            .map(|pair| {
                let (c, v) = pair.split_once(':').unwrap();
                (decode_part(c), decode_part(v))
            })
            .collect();

        // Encoding sorts, so compare order-independently.
        assert!(decoded.contains(&("zone".to_string(), "us1".to_string())));
        assert!(decoded.contains(&("arch".to_string(), "x86".to_string())));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_encode_is_sorted_and_deduplicated() {
        let tags = vec![
            Tag::new("b", "2"),
            Tag::new("a", "1"),
            Tag::new("b", "2"),
        ];
        let encoded = encode_stream_tags(&tags);
        let pairs: Vec<&str> = encoded.split(',').collect();

        assert_eq!(pairs.len(), 2);
        assert_eq!(decode_part(pairs[0].split_once(':').unwrap().0), "a");
        assert_eq!(decode_part(pairs[1].split_once(':').unwrap().0), "b");
    }

    #[test]
    fn test_encode_cleans_category() {
        let tags = vec![Tag::new("Data Center", "east")];
        let encoded = encode_stream_tags(&tags);
        let (c, _) = encoded.split_once(':').unwrap();
        assert_eq!(decode_part(c), "datacenter");
    }

    #[test]
    fn test_encode_drops_empty_halves() {
        let tags = vec![
            Tag::new("", "value"),
            Tag::new("   ", "value"),
            Tag::new("cat", ""),
        ];
        assert_eq!(encode_stream_tags(&tags), "");
    }

    #[test]
    fn test_encode_passes_through_pre_encoded() {
        let tags = vec![Tag::new("b\"Y2F0\"", "b\"dmFs\"")];
        assert_eq!(encode_stream_tags(&tags), "b\"Y2F0\":b\"dmFs\"");
    }

    #[test]
    fn test_encode_truncates_over_limit() {
        let tags: Vec<Tag> = (0..MAX_STREAM_TAGS + 10)
            .map(|i| Tag::new(format!("c{:04}", i), "v"))
            .collect();
        let encoded = encode_stream_tags(&tags);
        assert_eq!(encoded.split(',').count(), MAX_STREAM_TAGS);
    }

    #[test]
    fn test_decoration_appends_block() {
        let tags = vec![Tag::new("zone", "us1")];
        let name = metric_name_with_stream_tags("cpu`idle", &tags);
        assert!(name.starts_with("cpu`idle|ST["));
        assert!(name.ends_with(']'));
    }

    #[test]
    fn test_decoration_is_idempotent() {
        let first = metric_name_with_stream_tags("cpu`idle", &[Tag::new("zone", "us1")]);
        let second = metric_name_with_stream_tags(&first, &[Tag::new("other", "x")]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_decoration_with_empty_tags_returns_name() {
        assert_eq!(metric_name_with_stream_tags("cpu`idle", &[]), "cpu`idle");
    }

    #[test]
    fn test_decoration_with_invalid_tags_returns_name() {
        let tags = vec![Tag::new("", "")];
        assert_eq!(metric_name_with_stream_tags("cpu`idle", &tags), "cpu`idle");
    }

    #[test]
    fn test_merge_without_block_encodes_new_tags() {
        let merged = merge_tags("disk`reads", &[Tag::new("device", "sda")]);
        assert!(merged.starts_with("disk`reads|ST["));
    }

    #[test]
    fn test_merge_unions_existing_block() {
        let name = metric_name_with_stream_tags("disk`reads", &[Tag::new("device", "sda")]);
        let merged = merge_tags(&name, &[Tag::new("units", "sectors")]);

        let (base, rest) = merged.split_once(TAG_BLOCK_OPEN).unwrap();
        assert_eq!(base, "disk`reads");

        let block = rest.strip_suffix(TAG_BLOCK_CLOSE).unwrap();
        let decoded: Vec<String> = block
            .split(',')
            .map(|pair| decode_part(pair.split_once(':').unwrap().0))
            .collect();
        assert!(decoded.contains(&"device".to_string()));
        assert!(decoded.contains(&"units".to_string()));
    }

    #[test]
    fn test_merge_deduplicates_union() {
        let name = metric_name_with_stream_tags("disk`reads", &[Tag::new("device", "sda")]);
        let merged = merge_tags(&name, &[Tag::new("device", "sda")]);
        assert_eq!(name, merged);
    }

    #[test]
    fn test_prep_valid_list() {
        let suffix = prep_stream_tags("c1:v1,c2:v2").unwrap();
        assert_eq!(suffix, "|ST[c1:v1,c2:v2]");
    }

    #[test]
    fn test_prep_sorts_pairs() {
        let suffix = prep_stream_tags("c2:v2,c1:v1").unwrap();
        assert_eq!(suffix, "|ST[c1:v1,c2:v2]");
    }

    #[test]
    fn test_prep_empty_input() {
        assert_eq!(prep_stream_tags("").unwrap(), "");
    }

    #[test]
    fn test_prep_rejects_glued_pairs() {
        // Two pairs glued without a separator leave two delimiters in what
        // must parse as a single pair.
        assert!(prep_stream_tags("c1:v1c2:v2").is_err());
        assert!(prep_stream_tags("c1:v1:v2").is_err());
    }

    #[test]
    fn test_prep_rejects_missing_delimiter() {
        assert!(prep_stream_tags("c1v1").is_err());
    }

    #[test]
    fn test_prep_rejects_empty_pair() {
        assert!(prep_stream_tags("c1:v1,").is_err());
        assert!(prep_stream_tags(",c1:v1").is_err());
        assert!(prep_stream_tags("c1:v1,,c2:v2").is_err());
    }

    #[test]
    fn test_prep_strips_reserved_characters() {
        let suffix = prep_stream_tags("c[1]:v'1").unwrap();
        assert_eq!(suffix, "|ST[c_1_:v_1]");
    }
}
