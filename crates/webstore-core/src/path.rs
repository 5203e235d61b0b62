//! Restricted path expressions addressing a node inside a JSON document.
//!
//! Grammar: `$` followed by any number of `.name`, `['name']`, `["name"]`
//! or `[index]` segments. Every expression selects at most one node, so
//! wildcards, recursive descent, filters, slices, unions and negative
//! indices are rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Largest array index a path may address. Assigning past the end of an
/// array pads it with nulls, so the bound also caps that growth.
pub const MAX_INDEX: usize = 1 << 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("expected root identifier '$' at start")]
    ExpectedRoot,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of path")]
    UnexpectedEnd,
    #[error("recursive descent is not supported")]
    RecursiveDescent,
    #[error("wildcards are not supported")]
    Wildcard,
    #[error("filter expressions are not supported")]
    Filter,
    #[error("slices are not supported")]
    Slice,
    #[error("unions are not supported")]
    Union,
    #[error("negative index is not supported")]
    NegativeIndex,
    #[error("invalid index")]
    InvalidIndex,
    #[error("unclosed string")]
    UnclosedString,
    #[error("invalid escape sequence")]
    InvalidEscape,
}

/// One step from a node to its child.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed, definite path. Equality and hashing are on the segments, so
/// `$.a` and `$['a']` are the same path.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        Parser { input, pos: 0 }.parse_path()
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path of the containing node, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, parents) = self.segments.split_last()?;
        Some(Self::from_segments(parents.to_vec()))
    }

    /// Segment-wise prefix test: `$.a` is a prefix of `$.a.b` but not of `$.ab`.
    pub fn starts_with(&self, prefix: &JsonPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True when either path is a prefix of the other.
    pub fn overlaps(&self, other: &JsonPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    pub fn common_prefix(&self, other: &JsonPath) -> JsonPath {
        let segments = self
            .segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.clone())
            .collect();
        Self::from_segments(segments)
    }

    /// Node selected by this path, if present.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(doc, |node, segment| match (segment, node) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                _ => None,
            })
    }

    /// Store `value` at this path, creating missing intermediate containers.
    /// Intermediate nodes of the wrong shape are replaced. Returns `false`,
    /// leaving `doc` untouched, when an index exceeds [`MAX_INDEX`].
    pub fn assign(&self, doc: &mut Value, value: Value) -> bool {
        let out_of_range = self
            .segments
            .iter()
            .any(|segment| matches!(segment, Segment::Index(index) if *index > MAX_INDEX));
        if out_of_range {
            return false;
        }
        let mut node = doc;
        for segment in &self.segments {
            node = slot_mut(node, segment);
        }
        *node = value;
        true
    }

    /// Detach and return the node at this path. Removing the root leaves an
    /// empty object behind.
    pub fn remove(&self, doc: &mut Value) -> Option<Value> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Some(std::mem::replace(doc, Value::Object(Map::new())));
        };
        let parent = parents
            .iter()
            .try_fold(doc, |node, segment| match (segment, node) {
                (Segment::Key(key), Value::Object(map)) => map.get_mut(key),
                (Segment::Index(index), Value::Array(items)) => items.get_mut(*index),
                _ => None,
            })?;
        match (last, parent) {
            (Segment::Key(key), Value::Object(map)) => map.remove(key),
            (Segment::Index(index), Value::Array(items)) if *index < items.len() => {
                Some(items.remove(*index))
            }
            _ => None,
        }
    }
}

fn slot_mut<'a>(node: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                other => other,
            }
        }
        Segment::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            match node {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                other => other,
            }
        }
    }
}

fn is_identifier(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_identifier_char)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) if is_identifier(key) => write!(f, ".{key}")?,
                Segment::Key(key) => {
                    let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
                    write!(f, "['{escaped}']")?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for JsonPath {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn parse_path(&mut self) -> Result<JsonPath, PathError> {
        if self.input.trim().is_empty() {
            return Err(PathError::Empty);
        }
        if self.peek() != Some('$') {
            return Err(PathError::ExpectedRoot);
        }
        self.advance();

        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.advance();
                    match self.peek() {
                        Some('.') => return Err(PathError::RecursiveDescent),
                        Some('*') => return Err(PathError::Wildcard),
                        _ => segments.push(Segment::Key(self.parse_identifier()?)),
                    }
                }
                '[' => {
                    self.advance();
                    segments.push(self.parse_bracket()?);
                }
                other => return Err(PathError::UnexpectedChar(other, self.pos)),
            }
        }

        Ok(JsonPath::from_segments(segments))
    }

    fn parse_bracket(&mut self) -> Result<Segment, PathError> {
        self.skip_whitespace();
        let segment = match self.peek() {
            Some('\'') | Some('"') => Segment::Key(self.parse_string()?),
            Some('0'..='9') => Segment::Index(self.parse_index()?),
            Some('-') => return Err(PathError::NegativeIndex),
            Some('*') => return Err(PathError::Wildcard),
            Some('?') => return Err(PathError::Filter),
            Some(':') => return Err(PathError::Slice),
            Some(c) => return Err(PathError::UnexpectedChar(c, self.pos)),
            None => return Err(PathError::UnexpectedEnd),
        };
        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.advance();
                Ok(segment)
            }
            Some(':') => Err(PathError::Slice),
            Some(',') => Err(PathError::Union),
            Some(c) => Err(PathError::UnexpectedChar(c, self.pos)),
            None => Err(PathError::UnexpectedEnd),
        }
    }

    fn parse_identifier(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_identifier_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return match self.peek() {
                Some(c) => Err(PathError::UnexpectedChar(c, self.pos)),
                None => Err(PathError::UnexpectedEnd),
            };
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_index(&mut self) -> Result<usize, PathError> {
        let start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        match self.input[start..self.pos].parse() {
            Ok(index) if index <= MAX_INDEX => Ok(index),
            _ => Err(PathError::InvalidIndex),
        }
    }

    fn parse_string(&mut self) -> Result<String, PathError> {
        let quote = self.peek().ok_or(PathError::UnexpectedEnd)?;
        self.advance();

        let mut result = String::new();
        loop {
            match self.peek() {
                None => return Err(PathError::UnclosedString),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some(c @ ('\\' | '\'' | '"')) => result.push(c),
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        _ => return Err(PathError::InvalidEscape),
                    }
                    self.advance();
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> JsonPath {
        JsonPath::parse(s).unwrap()
    }

    #[test]
    fn parse_root() {
        let path = p("$");
        assert!(path.is_root());
        assert_eq!(path.to_string(), "$");
    }

    #[test]
    fn parse_dotted_and_bracketed() {
        let path = p("$.user['first name'][2].city");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("user".into()),
                Segment::Key("first name".into()),
                Segment::Index(2),
                Segment::Key("city".into()),
            ]
        );
        assert_eq!(path.to_string(), "$.user['first name'][2].city");
    }

    #[test]
    fn bracket_and_dot_forms_are_equal() {
        assert_eq!(p("$.a.b"), p("$['a'][\"b\"]"));
        assert_eq!(p("$[ 'a' ]").to_string(), "$.a");
    }

    #[test]
    fn quoted_key_escapes_round_trip() {
        let path = p(r"$['it\'s']");
        assert_eq!(path.segments(), &[Segment::Key("it's".into())]);
        assert_eq!(p(&path.to_string()), path);
    }

    #[test]
    fn rejects_non_definite_paths() {
        assert_eq!(JsonPath::parse(""), Err(PathError::Empty));
        assert_eq!(JsonPath::parse("name"), Err(PathError::ExpectedRoot));
        assert_eq!(JsonPath::parse("$..name"), Err(PathError::RecursiveDescent));
        assert_eq!(JsonPath::parse("$.*"), Err(PathError::Wildcard));
        assert_eq!(JsonPath::parse("$[*]"), Err(PathError::Wildcard));
        assert_eq!(JsonPath::parse("$[?(@.a)]"), Err(PathError::Filter));
        assert_eq!(JsonPath::parse("$[-1]"), Err(PathError::NegativeIndex));
        assert_eq!(JsonPath::parse("$[0:2]"), Err(PathError::Slice));
        assert_eq!(JsonPath::parse("$[0,1]"), Err(PathError::Union));
        assert_eq!(JsonPath::parse("$['a"), Err(PathError::UnclosedString));
        assert_eq!(JsonPath::parse("$[0"), Err(PathError::UnexpectedEnd));
        assert_eq!(JsonPath::parse("$."), Err(PathError::UnexpectedEnd));
        assert!(matches!(
            JsonPath::parse("$.a b"),
            Err(PathError::UnexpectedChar(' ', 3))
        ));
    }

    #[test]
    fn prefix_relations_are_segment_wise() {
        let name = p("$.name");
        assert!(p("$.name.first").starts_with(&name));
        assert!(!p("$.names").starts_with(&name));
        assert!(name.overlaps(&p("$.name.first")));
        assert!(p("$.name.first").overlaps(&name));
        assert!(p("$").overlaps(&name));
        assert!(!name.overlaps(&p("$.newName")));
    }

    #[test]
    fn common_prefix_of_siblings_is_parent() {
        assert_eq!(p("$.a.b").common_prefix(&p("$.a.c")), p("$.a"));
        assert_eq!(p("$.name").common_prefix(&p("$.newName")), p("$"));
        assert_eq!(p("$.a").common_prefix(&p("$.a.b")), p("$.a"));
    }

    #[test]
    fn parent_walks_up() {
        assert_eq!(p("$.a.b").parent(), Some(p("$.a")));
        assert_eq!(p("$").parent(), None);
    }

    #[test]
    fn lookup_follows_objects_and_arrays() {
        let doc = json!({"a": {"list": [10, {"b": true}]}});
        assert_eq!(p("$.a.list[0]").lookup(&doc), Some(&json!(10)));
        assert_eq!(p("$.a.list[1].b").lookup(&doc), Some(&json!(true)));
        assert_eq!(p("$.a.list[5]").lookup(&doc), None);
        assert_eq!(p("$.a.list.b").lookup(&doc), None);
        assert_eq!(p("$").lookup(&doc), Some(&doc));
    }

    #[test]
    fn assign_creates_intermediates() {
        let mut doc = json!({});
        assert!(p("$.a.b.c").assign(&mut doc, json!(1)));
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));

        assert!(p("$.list[2]").assign(&mut doc, json!("x")));
        assert_eq!(doc["list"], json!([null, null, "x"]));
    }

    #[test]
    fn oversized_index_is_rejected() {
        assert_eq!(
            JsonPath::parse("$.a[18446744073709551615]"),
            Err(PathError::InvalidIndex)
        );
        assert_eq!(JsonPath::parse("$.a[4000000000]"), Err(PathError::InvalidIndex));
        assert_eq!(
            JsonPath::parse(&format!("$[{MAX_INDEX}]")).map(|path| path.to_string()),
            Ok(format!("$[{MAX_INDEX}]"))
        );
    }

    #[test]
    fn assign_refuses_index_past_bound() {
        let mut doc = json!({"a": 1});
        let path = JsonPath::from_segments(vec![
            Segment::Key("list".into()),
            Segment::Index(usize::MAX),
        ]);
        assert!(!path.assign(&mut doc, json!(1)));
        assert_eq!(doc, json!({"a": 1}));
        assert!(p("$.list[1]").assign(&mut doc, json!(2)));
        assert_eq!(doc["list"], json!([null, 2]));
    }

    #[test]
    fn assign_replaces_scalar_intermediate() {
        let mut doc = json!({"a": "scalar"});
        assert!(p("$.a.b").assign(&mut doc, json!(2)));
        assert_eq!(doc, json!({"a": {"b": 2}}));
    }

    #[test]
    fn assign_root_replaces_document() {
        let mut doc = json!({"old": 1});
        assert!(p("$").assign(&mut doc, json!({"new": 2})));
        assert_eq!(doc, json!({"new": 2}));
    }

    #[test]
    fn remove_detaches_node() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]});
        assert_eq!(p("$.a.b").remove(&mut doc), Some(json!(1)));
        assert_eq!(doc["a"], json!({"c": 2}));
        assert_eq!(p("$.list[0]").remove(&mut doc), Some(json!(1)));
        assert_eq!(doc["list"], json!([2, 3]));
        assert_eq!(p("$.missing.deep").remove(&mut doc), None);
    }

    #[test]
    fn remove_root_leaves_empty_object() {
        let mut doc = json!({"a": 1});
        assert_eq!(p("$").remove(&mut doc), Some(json!({"a": 1})));
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn serde_uses_canonical_string() {
        let path = p("$['a'].b[0]");
        assert_eq!(serde_json::to_value(&path).unwrap(), json!("$.a.b[0]"));
        let parsed: JsonPath = serde_json::from_value(json!("$.x")).unwrap();
        assert_eq!(parsed, p("$.x"));
        assert!(serde_json::from_value::<JsonPath>(json!("$..x")).is_err());
    }
}
