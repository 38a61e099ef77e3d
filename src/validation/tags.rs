//! Annotation tags, telemetry types and telemetry classes.
//!
//! Annotations are persisted as a comma-joined string, so tag values may
//! not contain commas and may not be empty.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

lazy_static! {
    /// `name` or `name=value`; name is at least 3 chars and starts with a letter.
    static ref TAG_PATTERN: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]{2,}(=[^,=]+)?$").unwrap();

    static ref TELEMETRY_TYPE_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{2,127}$").unwrap();
}

/// A validated annotation tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    pub fn parse(raw: &str) -> Result<Self> {
        if TAG_PATTERN.is_match(raw) {
            return Ok(Tag(raw.to_string()));
        }

        let reason = match raw.split_once('=') {
            _ if raw.contains(',') => "commas are not allowed",
            Some((_, "")) => "empty values are not allowed",
            Some((_, value)) if value.contains('=') => "only a single '=value' is allowed",
            Some((name, _)) if name.len() < 3 => "name must be at least 3 characters",
            None if raw.len() < 3 => "name must be at least 3 characters",
            _ => "name must start with a letter and use [A-Za-z0-9_.-]",
        };

        Err(Error::InvalidTag {
            tag: raw.to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        self.0.split_once('=').map(|(n, _)| n).unwrap_or(&self.0)
    }

    pub fn value(&self) -> Option<&str> {
        self.0.split_once('=').map(|(_, v)| v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Tag::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Tag::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

/// Parse a list of raw tag strings, failing on the first invalid one.
pub fn parse_tags<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Tag>> {
    raw.iter().map(|t| Tag::parse(t.as_ref())).collect()
}

/// Join tags for storage in a single column.
pub fn join_annotations(tags: &[String]) -> String {
    tags.join(",")
}

/// Split a stored annotation column back into tags. Empty means no tags.
pub fn split_annotations(stored: &str) -> Vec<String> {
    if stored.is_empty() {
        return Vec::new();
    }
    stored.split(',').map(|s| s.to_string()).collect()
}

/// Telemetry type identifier, e.g. `SLE-SERVER-Pkgs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TelemetryType(String);

impl TelemetryType {
    pub fn parse(raw: &str) -> Result<Self> {
        if TELEMETRY_TYPE_PATTERN.is_match(raw) {
            Ok(TelemetryType(raw.to_string()))
        } else {
            Err(Error::InvalidTelemetryType {
                telemetry_type: raw.to_string(),
                reason: "expected 3-128 chars of [A-Za-z0-9_.-] starting alphanumeric"
                    .to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TelemetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TelemetryType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TelemetryType::parse(&value)
    }
}

impl From<TelemetryType> for String {
    fn from(t: TelemetryType) -> Self {
        t.0
    }
}

/// Consent class a telemetry type is collected under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryClass {
    #[serde(rename = "MANDATORY")]
    Mandatory,
    #[serde(rename = "OPT-OUT")]
    OptOut,
    #[serde(rename = "OPT-IN")]
    OptIn,
}

impl TelemetryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryClass::Mandatory => "MANDATORY",
            TelemetryClass::OptOut => "OPT-OUT",
            TelemetryClass::OptIn => "OPT-IN",
        }
    }
}

impl fmt::Display for TelemetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_tags() {
        for raw in ["abc", "env=prod", "region=eu-west-1", "host.name=web01"] {
            assert!(Tag::parse(raw).is_ok(), "{} should be valid", raw);
        }

        let tag = Tag::parse("env=prod").unwrap();
        assert_eq!(tag.name(), "env");
        assert_eq!(tag.value(), Some("prod"));
        assert_eq!(Tag::parse("solo").unwrap().value(), None);
    }

    #[test]
    fn test_invalid_tags() {
        let cases = [
            ("ab", "at least 3"),
            ("ab=c", "at least 3"),
            ("env=", "empty values"),
            ("env=a=b", "single"),
            ("env=a,b", "commas"),
            ("1abc", "start with a letter"),
            ("", "at least 3"),
        ];
        for (raw, expected) in cases {
            match Tag::parse(raw) {
                Err(Error::InvalidTag { reason, .. }) => {
                    assert!(reason.contains(expected), "{}: {}", raw, reason)
                }
                other => panic!("{} should be rejected, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_annotation_split_of_empty_column() {
        assert!(split_annotations("").is_empty());
        assert_eq!(split_annotations("abc,env=prod"), vec!["abc", "env=prod"]);
    }

    #[test]
    fn test_telemetry_type() {
        assert!(TelemetryType::parse("SLE-SERVER-Test").is_ok());
        assert!(TelemetryType::parse("pkg.list_v2").is_ok());
        assert!(TelemetryType::parse("ab").is_err());
        assert!(TelemetryType::parse("-leading").is_err());
        assert!(TelemetryType::parse("has space").is_err());
    }

    #[test]
    fn test_class_wire_names() {
        assert_eq!(
            serde_json::to_string(&TelemetryClass::OptOut).unwrap(),
            r#""OPT-OUT""#
        );
        let class: TelemetryClass = serde_json::from_str(r#""MANDATORY""#).unwrap();
        assert_eq!(class, TelemetryClass::Mandatory);
    }

    proptest! {
        #[test]
        fn prop_valid_tags_survive_annotation_storage(
            tags in proptest::collection::vec("[a-z][a-z0-9]{2,8}(=[a-z0-9]{1,8})?", 0..6)
        ) {
            let parsed = parse_tags(&tags).unwrap();
            let raw: Vec<String> = parsed.into_iter().map(String::from).collect();
            prop_assert_eq!(split_annotations(&join_annotations(&raw)), raw);
        }

        #[test]
        fn prop_tags_with_commas_rejected(
            name in "[a-z]{3,6}", left in "[a-z]{1,4}", right in "[a-z]{1,4}"
        ) {
            let raw = format!("{}={},{}", name, left, right);
            prop_assert!(Tag::parse(&raw).is_err());
        }
    }
}
