//! YAML front matter splitting and parsing.
//!
//! A markdown file may open with a YAML block fenced by `---` lines:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [rust, web]
//! ---
//! # Body starts here
//! ```
//!
//! The closing fence may also be `...`. A file whose first line is not `---`
//! (or whose block is never closed) has no front matter.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front matter must be a mapping of keys to values")]
    NotAMapping,
}

/// Split a document into its raw YAML block and the remaining body.
pub fn split(raw: &str) -> (Option<&str>, &str) {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (None, text);
    };
    if first.trim_end() != "---" {
        return (None, text);
    }

    let mut offset = first.len();
    for line in lines {
        let fence = line.trim_end();
        if fence == "---" || fence == "..." {
            let yaml = &text[first.len()..offset];
            let body = &text[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse a YAML document into a JSON-style object. Empty input is an empty map.
pub fn parse(yaml: &str) -> Result<Map<String, Value>, FrontMatterError> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(FrontMatterError::NotAMapping),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_front_matter_and_body() {
        let (yaml, body) = split("---\ntitle: Hi\n---\n# Body\n");
        assert_eq!(yaml, Some("title: Hi\n"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn split_accepts_crlf_and_dots_fence() {
        let (yaml, body) = split("---\r\na: 1\r\n...\r\ntext");
        assert_eq!(yaml, Some("a: 1\r\n"));
        assert_eq!(body, "text");
    }

    #[test]
    fn split_without_front_matter() {
        let (yaml, body) = split("# Just markdown\n---\n");
        assert_eq!(yaml, None);
        assert_eq!(body, "# Just markdown\n---\n");
    }

    #[test]
    fn split_unterminated_block_is_body() {
        let (yaml, body) = split("---\ntitle: x\n");
        assert_eq!(yaml, None);
        assert_eq!(body, "---\ntitle: x\n");
    }

    #[test]
    fn split_strips_byte_order_mark() {
        let (yaml, _) = split("\u{feff}---\na: b\n---\n");
        assert_eq!(yaml, Some("a: b\n"));
    }

    #[test]
    fn parse_mapping() {
        let map = parse("title: Hello\ntags: [a, b]\ndate: 2021-03-04\n").unwrap();
        assert_eq!(map["title"], json!("Hello"));
        assert_eq!(map["tags"], json!(["a", "b"]));
        assert_eq!(map["date"], json!("2021-03-04"));
    }

    #[test]
    fn parse_empty_is_empty_map() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \n").unwrap().is_empty());
    }

    #[test]
    fn parse_scalar_is_rejected() {
        assert!(matches!(parse("just text"), Err(FrontMatterError::NotAMapping)));
    }

    #[test]
    fn parse_invalid_yaml_is_error() {
        assert!(matches!(parse("a: [1, 2"), Err(FrontMatterError::Yaml(_))));
    }
}
