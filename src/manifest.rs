//! Caption manifest serialization.
//!
//! Each split gets one `{root}/{split}.json` file holding a JSON array of
//! caption records in materialization order. Downstream fine-tuning tooling
//! expects 4-space indentation, so the default serde_json pretty formatter
//! (2 spaces) is not used.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One (image, caption) pair in a split manifest.
///
/// `caption_id` and `image_id` are always equal; both come from the same
/// record id allocated by [`crate::materialize::IdCounter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub caption_id: u64,
    pub image_id: u64,
    pub caption: String,
    pub image_path: String,
}

/// Path of the manifest file for a split.
pub fn manifest_path(root: &Path, split: &str) -> PathBuf {
    root.join(format!("{}.json", split))
}

/// Serialize the records for a split to `{root}/{split}.json`, overwriting
/// any existing file.
pub fn write_manifest(root: &Path, split: &str, records: &[CaptionRecord]) -> Result<PathBuf> {
    let path = manifest_path(root, split);

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut ser)
        .context("Failed to serialize manifest")?;

    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create manifest {:?}", path))?;
    file.write_all(&buf)?;

    tracing::info!(split = %split, records = records.len(), path = ?path, "Wrote manifest");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: u64, caption: &str) -> CaptionRecord {
        CaptionRecord {
            caption_id: id,
            image_id: id,
            caption: caption.to_string(),
            image_path: format!("/tmp/train/IMG{:06}.png", id - 1),
        }
    }

    #[test]
    fn test_manifest_roundtrip_preserves_order() {
        let dir = tempdir().unwrap();
        let records = vec![
            record(1, "this is a picture of airplane."),
            record(2, "this is a picture of cat."),
            record(3, "this is a picture of truck."),
        ];

        let path = write_manifest(dir.path(), "train", &records).unwrap();
        assert_eq!(path, dir.path().join("train.json"));

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<CaptionRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_manifest_uses_four_space_indent() {
        let dir = tempdir().unwrap();
        let records = vec![record(1, "this is a picture of dog.")];

        let path = write_manifest(dir.path(), "eval", &records).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.contains("\n    {"));
        assert!(content.contains("\n        \"caption_id\": 1"));
    }

    #[test]
    fn test_manifest_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "train", &[record(1, "a"), record(2, "b")]).unwrap();
        write_manifest(dir.path(), "train", &[record(3, "c")]).unwrap();

        let content = std::fs::read_to_string(dir.path().join("train.json")).unwrap();
        let parsed: Vec<CaptionRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].caption_id, 3);
    }

    #[test]
    fn test_empty_manifest_is_valid_json() {
        let dir = tempdir().unwrap();
        let path = write_manifest(dir.path(), "eval", &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<CaptionRecord> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }
}
