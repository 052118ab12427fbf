use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::train::{DataArgs, ModelArgs, TrainingArgs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub embed: EmbedConfig,

    #[serde(default)]
    pub trainer: TrainerConfig,

    #[serde(default)]
    pub training: TrainingArgs,

    #[serde(default)]
    pub model: ModelArgs,

    /// Manifest locations for fine-tuning. Absent by default; the trainer
    /// refuses to run without it rather than guessing paths.
    #[serde(default)]
    pub data: Option<DataArgs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory the materialized splits and manifests are written under.
    #[serde(default = "default_dataset_root")]
    pub root: PathBuf,

    /// Where downloaded source archives are cached.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Expected SHA-256 of the source archive. Verified when set; the
    /// computed digest is logged either way.
    #[serde(default)]
    pub archive_sha256: Option<String>,

    /// Splits in processing order. Record IDs continue across splits.
    #[serde(default = "default_splits")]
    pub splits: Vec<String>,

    /// Ordered label table; a source label index is an index into this list.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// Caption template; `{label}` is replaced with the label text.
    #[serde(default = "default_caption_template")]
    pub caption_template: String,

    #[serde(default)]
    pub filename: FilenamePattern,
}

fn default_dataset_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capset")
        .join("dataset")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("capset")
        .join("downloads")
}

fn default_splits() -> Vec<String> {
    vec!["train".to_string(), "eval".to_string()]
}

fn default_labels() -> Vec<String> {
    // CIFAR-10 category names, in label-index order.
    [
        "airplane",
        "automobile",
        "bird",
        "cat",
        "deer",
        "dog",
        "frog",
        "horse",
        "ship",
        "truck",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_caption_template() -> String {
    "this is a picture of {label}.".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_dataset_root(),
            cache_dir: default_cache_dir(),
            archive_sha256: None,
            splits: default_splits(),
            labels: default_labels(),
            caption_template: default_caption_template(),
            filename: FilenamePattern::default(),
        }
    }
}

/// Pattern for materialized image filenames, e.g. `IMG000042.png`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenamePattern {
    #[serde(default = "default_filename_prefix")]
    pub prefix: String,

    /// Zero-pad width of the numeric part.
    #[serde(default = "default_filename_width")]
    pub width: usize,

    #[serde(default = "default_filename_extension")]
    pub extension: String,
}

fn default_filename_prefix() -> String {
    "IMG".to_string()
}

fn default_filename_width() -> usize {
    6
}

fn default_filename_extension() -> String {
    "png".to_string()
}

impl Default for FilenamePattern {
    fn default() -> Self {
        Self {
            prefix: default_filename_prefix(),
            width: default_filename_width(),
            extension: default_filename_extension(),
        }
    }
}

impl FilenamePattern {
    pub fn format(&self, index: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            self.extension,
            width = self.width
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Named pre-trained multimodal model the pipelines are built on.
    #[serde(default = "default_embed_model")]
    pub model_name: String,

    /// Where encoder model files are cached.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
}

fn default_embed_model() -> String {
    "clip-vit-b32".to_string()
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("capset")
        .join("models")
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: default_embed_model(),
            models_dir: default_models_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// External fine-tuning entry point. Receives the path of the serialized
    /// argument-group file as its only positional argument.
    #[serde(default = "default_trainer_entrypoint")]
    pub entrypoint: String,
}

fn default_trainer_entrypoint() -> String {
    "capset-finetune".to_string()
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            entrypoint: default_trainer_entrypoint(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            embed: EmbedConfig::default(),
            trainer: TrainerConfig::default(),
            training: TrainingArgs::default(),
            model: ModelArgs::default(),
            data: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capset")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_label_table_is_cifar10() {
        let config = DatasetConfig::default();
        assert_eq!(config.labels.len(), 10);
        assert_eq!(config.labels[0], "airplane");
        assert_eq!(config.labels[9], "truck");
    }

    #[test]
    fn test_filename_pattern_format() {
        let pattern = FilenamePattern::default();
        assert_eq!(pattern.format(0), "IMG000000.png");
        assert_eq!(pattern.format(42), "IMG000042.png");
        assert_eq!(pattern.format(1_000_000), "IMG1000000.png");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.dataset.splits, config.dataset.splits);
        assert_eq!(parsed.dataset.caption_template, config.dataset.caption_template);
        assert!(parsed.data.is_none());
    }
}
