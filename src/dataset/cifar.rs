//! CIFAR-10 binary-format loader with download-and-cache semantics.
//!
//! The upstream archive (`cifar-10-binary.tar.gz`) contains six batch files
//! of 10000 records each. A record is 3073 bytes: one label byte followed by
//! the 32x32 image as three channel planes (1024 red, 1024 green, 1024 blue
//! bytes, row-major).

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{DatasetError, LabeledImage};

const ARCHIVE_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const BATCH_DIR: &str = "cifar-10-batches-bin";

const IMAGE_DIM: u32 = 32;
const PLANE_LEN: usize = (IMAGE_DIM * IMAGE_DIM) as usize;
const RECORD_LEN: usize = 1 + 3 * PLANE_LEN;
const MAX_LABEL: u8 = 9;

const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const EVAL_BATCH: &str = "test_batch.bin";

/// Load one split of CIFAR-10, downloading and extracting the archive into
/// `cache_dir` on first use. `expected_sha256`, when set, is checked against
/// the downloaded archive before extraction.
pub fn load_split(
    cache_dir: &Path,
    split: &str,
    expected_sha256: Option<&str>,
) -> Result<Vec<LabeledImage>> {
    let batch_dir = ensure_extracted(cache_dir, expected_sha256)?;

    let batches: Vec<PathBuf> = match split {
        "train" => TRAIN_BATCHES.iter().map(|b| batch_dir.join(b)).collect(),
        "eval" => vec![batch_dir.join(EVAL_BATCH)],
        other => return Err(DatasetError::UnknownSplit(other.to_string()).into()),
    };

    let mut items = Vec::new();
    for batch in &batches {
        if !batch.exists() {
            return Err(DatasetError::MissingBatch(batch.clone()).into());
        }
        let bytes = std::fs::read(batch)
            .with_context(|| format!("Failed to read batch {:?}", batch))?;
        decode_batch(&bytes, batch, &mut items)?;
    }

    tracing::info!(split = %split, items = items.len(), "Loaded source split");
    Ok(items)
}

/// Decode every record in a batch file, appending to `out`.
pub fn decode_batch(bytes: &[u8], path: &Path, out: &mut Vec<LabeledImage>) -> Result<()> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(DatasetError::TruncatedBatch {
            path: path.to_path_buf(),
            got: bytes.len() as u64,
        }
        .into());
    }

    for (index, record) in bytes.chunks_exact(RECORD_LEN).enumerate() {
        let label = record[0];
        if label > MAX_LABEL {
            return Err(DatasetError::LabelOutOfRange {
                index,
                label,
                max: MAX_LABEL,
            }
            .into());
        }

        let planes = &record[1..];
        let mut image = RgbImage::new(IMAGE_DIM, IMAGE_DIM);
        for y in 0..IMAGE_DIM as usize {
            for x in 0..IMAGE_DIM as usize {
                let idx = y * IMAGE_DIM as usize + x;
                image.put_pixel(
                    x as u32,
                    y as u32,
                    image::Rgb([
                        planes[idx],
                        planes[PLANE_LEN + idx],
                        planes[2 * PLANE_LEN + idx],
                    ]),
                );
            }
        }

        out.push(LabeledImage {
            image,
            label: label as usize,
        });
    }

    Ok(())
}

/// Download the archive if absent and extract the batch directory,
/// returning its path. Both steps are skipped when their output already
/// exists.
fn ensure_extracted(cache_dir: &Path, expected_sha256: Option<&str>) -> Result<PathBuf> {
    let batch_dir = cache_dir.join(BATCH_DIR);
    if batch_dir.exists() {
        return Ok(batch_dir);
    }

    let archive_path = ensure_archive(cache_dir, expected_sha256)?;

    tracing::info!(archive = ?archive_path, "Extracting source dataset archive");
    let file = std::fs::File::open(&archive_path)?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);
    archive
        .unpack(cache_dir)
        .context("Failed to extract dataset archive")?;

    if !batch_dir.exists() {
        return Err(anyhow!(
            "Archive did not contain expected directory {:?}",
            BATCH_DIR
        ));
    }

    Ok(batch_dir)
}

/// Download the archive into the cache if it is not already there.
fn ensure_archive(cache_dir: &Path, expected_sha256: Option<&str>) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;
    let archive_path = cache_dir.join(ARCHIVE_NAME);

    if !archive_path.exists() {
        tracing::info!(url = ARCHIVE_URL, "Downloading source dataset...");
        let response = ureq::get(ARCHIVE_URL)
            .call()
            .map_err(|e| anyhow!("Failed to download dataset: {}", e))?;

        let mut file = std::fs::File::create(&archive_path)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        tracing::info!(path = ?archive_path, "Dataset archive downloaded");
    }

    let digest = sha256_file(&archive_path)?;
    match expected_sha256 {
        Some(expected) if !expected.eq_ignore_ascii_case(&digest) => {
            Err(DatasetError::ChecksumMismatch {
                path: archive_path,
                expected: expected.to_string(),
                got: digest,
            }
            .into())
        }
        Some(_) => Ok(archive_path),
        None => {
            tracing::debug!(sha256 = %digest, "No expected checksum configured");
            Ok(archive_path)
        }
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one raw record with a solid color.
    fn make_record(label: u8, rgb: [u8; 3]) -> Vec<u8> {
        let mut record = vec![label];
        for channel in rgb {
            record.extend(std::iter::repeat(channel).take(PLANE_LEN));
        }
        record
    }

    #[test]
    fn test_decode_batch_reads_labels_and_pixels() {
        let mut bytes = make_record(3, [255, 0, 0]);
        bytes.extend(make_record(7, [0, 0, 255]));

        let mut items = Vec::new();
        decode_batch(&bytes, Path::new("test.bin"), &mut items).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, 3);
        assert_eq!(items[1].label, 7);
        assert_eq!(items[0].image.get_pixel(0, 0), &image::Rgb([255, 0, 0]));
        assert_eq!(items[1].image.get_pixel(31, 31), &image::Rgb([0, 0, 255]));
        assert_eq!(items[0].image.dimensions(), (IMAGE_DIM, IMAGE_DIM));
    }

    #[test]
    fn test_decode_batch_rejects_truncated_input() {
        let bytes = vec![0u8; RECORD_LEN - 1];
        let mut items = Vec::new();
        let err = decode_batch(&bytes, Path::new("test.bin"), &mut items).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_decode_batch_rejects_bad_label() {
        let bytes = make_record(10, [0, 0, 0]);
        let mut items = Vec::new();
        let err = decode_batch(&bytes, Path::new("test.bin"), &mut items).unwrap_err();
        assert!(err.to_string().contains("label byte 10"));
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ARCHIVE_NAME), b"not a real archive").unwrap();

        let err = ensure_archive(dir.path(), Some("00".repeat(32).as_str())).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_unknown_split_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Fake an already extracted archive so no download is attempted.
        std::fs::create_dir_all(dir.path().join(BATCH_DIR)).unwrap();

        let err = load_split(dir.path(), "validation", None).unwrap_err();
        assert!(err.to_string().contains("unknown split"));
    }
}
