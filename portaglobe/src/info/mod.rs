//! Globe metadata records.
//!
//! User-facing globe metadata (name, description, creation time) is a
//! structured record, kept apart from the operational log stream.

use chrono::{DateTime, Utc};
use std::fmt;

/// Path of the metadata file inside a globe package.
pub const INFO_FILE_PATH: &str = "earth/info.txt";

/// Structured metadata describing a globe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobeInfo {
    /// Globe file name, e.g. `sf.glb`
    pub name: String,
    /// Free-text description shown to users
    pub description: String,
    /// Creation timestamp, when recorded
    pub created: Option<DateTime<Utc>>,
}

impl GlobeInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            created: None,
        }
    }

    /// Parses a metadata record.
    ///
    /// Format: name line, optional RFC 3339 timestamp line, then the
    /// description until end of input. Legacy packages wrote free text
    /// here; anything that does not parse as a timestamp is folded into
    /// the description so old globes still present sensibly.
    pub fn parse(name: &str, content: &str) -> Self {
        let mut lines = content.lines();
        let first = lines.next().unwrap_or_default().trim();

        let mut created = None;
        let mut description_lines: Vec<&str> = Vec::new();

        match DateTime::parse_from_rfc3339(first) {
            Ok(ts) => created = Some(ts.with_timezone(&Utc)),
            Err(_) if !first.is_empty() => description_lines.push(first),
            Err(_) => {}
        }

        for line in lines {
            if created.is_none() {
                if let Ok(ts) = DateTime::parse_from_rfc3339(line.trim()) {
                    created = Some(ts.with_timezone(&Utc));
                    continue;
                }
            }
            description_lines.push(line);
        }

        GlobeInfo {
            name: name.to_string(),
            description: description_lines.join("\n").trim().to_string(),
            created,
        }
    }

    /// Serializes the record in the same line-oriented form `parse` reads.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(created) = self.created {
            out.push_str(&created.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            out.push('\n');
        }
        out.push_str(&self.description);
        if !self.description.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for GlobeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.name, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_timestamp() {
        let content = "2016-04-08T10:30:00Z\nSan Francisco bay area\nImagery to level 18\n";
        let info = GlobeInfo::parse("sf.glb", content);
        assert_eq!(info.name, "sf.glb");
        assert!(info.created.is_some());
        assert_eq!(info.description, "San Francisco bay area\nImagery to level 18");
    }

    #[test]
    fn test_parse_legacy_free_text() {
        let content = "A globe cut before timestamps existed.\nStill has a description.\n";
        let info = GlobeInfo::parse("old.glb", content);
        assert!(info.created.is_none());
        assert!(info.description.starts_with("A globe cut before"));
    }

    #[test]
    fn test_parse_empty() {
        let info = GlobeInfo::parse("empty.glm", "");
        assert!(info.created.is_none());
        assert!(info.description.is_empty());
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let content = "2016-04-08T10:30:00Z\nBay area\n";
        let info = GlobeInfo::parse("sf.glb", content);
        let reparsed = GlobeInfo::parse("sf.glb", &info.serialize());
        assert_eq!(info, reparsed);
    }
}
