//! Dataset materialization - turn labeled images into (image file, caption)
//! pairs on disk.
//!
//! Splits are processed in caller order with one shared [`IdCounter`], so
//! record ids keep increasing across splits instead of restarting at 1 for
//! each one. File writes are not transactional; a failure partway through
//! leaves whatever was already written.

use anyhow::{anyhow, Context, Result};

use crate::config::DatasetConfig;
use crate::dataset::LabeledImage;
use crate::manifest::CaptionRecord;

/// Monotonic id source shared across splits within one run.
///
/// Each allocation yields both the index used in the image filename and the
/// record id stored in the manifest. The two differ by one: the filename
/// carries the pre-increment value, the record id the post-increment value.
/// That skew matches the layout consumed by existing fine-tuning tooling
/// (first file is `IMG000000.png`, its `caption_id`/`image_id` are 1), so it
/// is kept rather than fixed.
#[derive(Debug, Default)]
pub struct IdCounter {
    next: u64,
}

/// Id pair for one materialized item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedId {
    /// Numeric part of the image filename.
    pub file_index: u64,
    /// `caption_id` and `image_id` of the manifest record.
    pub record_id: u64,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> AssignedId {
        let file_index = self.next;
        self.next += 1;
        AssignedId {
            file_index,
            record_id: self.next,
        }
    }

    /// Discard progress and start over from zero. Callers that want
    /// per-split numbering invoke this between splits; the default flow
    /// never does.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Materialize one split: write every image under `{root}/{split}/` and
/// return its caption records in input order.
pub fn materialize_split(
    config: &DatasetConfig,
    split: &str,
    items: &[LabeledImage],
    counter: &mut IdCounter,
) -> Result<Vec<CaptionRecord>> {
    let split_dir = config.root.join(split);
    std::fs::create_dir_all(&split_dir)
        .with_context(|| format!("Failed to create split directory {:?}", split_dir))?;

    let mut records = Vec::with_capacity(items.len());

    for item in items {
        let id = counter.alloc();
        let filename = config.filename.format(id.file_index);
        let image_path = split_dir.join(&filename);

        let caption = caption_for(config, item.label)?;

        item.image
            .save(&image_path)
            .with_context(|| format!("Failed to save image {:?}", image_path))?;

        records.push(CaptionRecord {
            caption_id: id.record_id,
            image_id: id.record_id,
            caption,
            image_path: image_path.to_string_lossy().to_string(),
        });
    }

    tracing::info!(split = %split, items = records.len(), dir = ?split_dir, "Materialized split");
    Ok(records)
}

/// Render the caption for a label index, or fail if the index falls outside
/// the configured label table.
pub fn caption_for(config: &DatasetConfig, label: usize) -> Result<String> {
    let label_text = config.labels.get(label).ok_or_else(|| {
        anyhow!(
            "Label index {} out of range for table of {} entries",
            label,
            config.labels.len()
        )
    })?;
    Ok(config.caption_template.replace("{label}", label_text))
}
