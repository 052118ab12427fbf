//! Fine-tuning invocation.
//!
//! Training itself happens in an external pipeline; this module only
//! assembles its three argument groups, validates them, and invokes the
//! configured entry point. The entry point receives one positional
//! argument, the path of a JSON file holding `{training, model, data}`.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

use crate::embed::Modality;

/// Hyperparameters passed through to the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArgs {
    #[serde(default = "default_epochs")]
    pub num_train_epochs: u32,

    #[serde(default = "default_batch_size")]
    pub per_device_train_batch_size: u32,

    #[serde(default = "default_batch_size")]
    pub per_device_eval_batch_size: u32,

    #[serde(default = "default_true")]
    pub do_train: bool,

    #[serde(default = "default_true")]
    pub do_eval: bool,

    #[serde(default)]
    pub remove_unused_columns: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_true")]
    pub overwrite_output_dir: bool,
}

fn default_epochs() -> u32 {
    3
}

fn default_batch_size() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("capset")
        .join("finetune")
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            num_train_epochs: default_epochs(),
            per_device_train_batch_size: default_batch_size(),
            per_device_eval_batch_size: default_batch_size(),
            do_train: true,
            do_eval: true,
            remove_unused_columns: false,
            output_dir: default_output_dir(),
            overwrite_output_dir: true,
        }
    }
}

/// Model-setup flags for the external trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArgs {
    #[serde(default)]
    pub freeze_vision_model: bool,

    #[serde(default)]
    pub freeze_text_model: bool,

    #[serde(default = "default_model_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("capset")
        .join("finetune")
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            freeze_vision_model: false,
            freeze_text_model: false,
            cache_dir: default_model_cache_dir(),
        }
    }
}

/// Where the materialized dataset lives. There is no sensible default for
/// these paths, so they must be supplied explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataArgs {
    /// Root the splits were materialized under.
    pub dataset_root: PathBuf,

    pub train_manifest: PathBuf,

    pub eval_manifest: PathBuf,
}

impl DataArgs {
    /// Derive manifest locations from a materialization root.
    pub fn for_root(root: &std::path::Path) -> Self {
        Self {
            dataset_root: root.to_path_buf(),
            train_manifest: crate::manifest::manifest_path(root, "train"),
            eval_manifest: crate::manifest::manifest_path(root, "eval"),
        }
    }
}

/// Trained model artifact produced by the external entry point.
#[derive(Debug, Clone)]
pub struct TrainedArtifact {
    pub output_dir: PathBuf,
}

/// Argument-group file handed to the entry point.
#[derive(Debug, Serialize)]
struct TrainerInvocation<'a> {
    model_name: &'a str,
    modality: Modality,
    training: &'a TrainingArgs,
    model: &'a ModelArgs,
    data: &'a DataArgs,
}

/// Trainable handle for a named model in a fixed modality.
pub struct Trainer {
    model_name: String,
    modality: Modality,
    entrypoint: String,
}

impl Trainer {
    pub fn new(model_name: impl Into<String>, modality: Modality, entrypoint: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            modality,
            entrypoint: entrypoint.into(),
        }
    }

    /// Validate the argument groups and invoke the external entry point.
    ///
    /// `data` is required: the trainer cannot find the manifests on its own
    /// and will not guess paths.
    pub fn train(
        &self,
        training: &TrainingArgs,
        model: &ModelArgs,
        data: Option<&DataArgs>,
    ) -> Result<TrainedArtifact> {
        let data = data.ok_or_else(|| {
            anyhow!("Missing data configuration: set [data] with the manifest paths before training")
        })?;
        self.validate(training, data)?;

        std::fs::create_dir_all(&training.output_dir)
            .with_context(|| format!("Failed to create output dir {:?}", training.output_dir))?;

        let invocation = TrainerInvocation {
            model_name: &self.model_name,
            modality: self.modality,
            training,
            model,
            data,
        };
        let args_path = training.output_dir.join("trainer_args.json");
        let json = serde_json::to_string_pretty(&invocation)?;
        std::fs::write(&args_path, json)
            .with_context(|| format!("Failed to write {:?}", args_path))?;

        tracing::info!(
            entrypoint = %self.entrypoint,
            model = %self.model_name,
            modality = %self.modality,
            args = ?args_path,
            "Invoking external trainer"
        );

        let status = Command::new(&self.entrypoint)
            .arg(&args_path)
            .status()
            .with_context(|| format!("Failed to launch trainer {:?}", self.entrypoint))?;

        if !status.success() {
            bail!("Trainer {:?} exited with {}", self.entrypoint, status);
        }

        Ok(TrainedArtifact {
            output_dir: training.output_dir.clone(),
        })
    }

    fn validate(&self, training: &TrainingArgs, data: &DataArgs) -> Result<()> {
        if !training.do_train && !training.do_eval {
            bail!("Nothing to do: both do_train and do_eval are disabled");
        }
        if training.do_train && !data.train_manifest.exists() {
            bail!(
                "Train manifest {:?} not found; run `capset materialize` first",
                data.train_manifest
            );
        }
        if training.do_eval && !data.eval_manifest.exists() {
            bail!(
                "Eval manifest {:?} not found; run `capset materialize` first",
                data.eval_manifest
            );
        }
        if training.output_dir.exists() && !training.overwrite_output_dir {
            bail!(
                "Output dir {:?} exists and overwrite_output_dir is false",
                training.output_dir
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trainer() -> Trainer {
        Trainer::new("clip-vit-b32", Modality::Image, "capset-finetune")
    }

    #[test]
    fn test_training_args_defaults_match_invoker_surface() {
        let args = TrainingArgs::default();
        assert_eq!(args.num_train_epochs, 3);
        assert_eq!(args.per_device_train_batch_size, 8);
        assert_eq!(args.per_device_eval_batch_size, 8);
        assert!(args.do_train);
        assert!(args.do_eval);
        assert!(!args.remove_unused_columns);
        assert!(args.overwrite_output_dir);
    }

    #[test]
    fn test_train_without_data_args_fails_fast() {
        let err = trainer()
            .train(&TrainingArgs::default(), &ModelArgs::default(), None)
            .unwrap_err();
        assert!(err.to_string().contains("Missing data configuration"));
    }

    #[test]
    fn test_train_with_missing_manifest_fails() {
        let dir = tempdir().unwrap();
        let data = DataArgs::for_root(dir.path());

        let err = trainer()
            .train(&TrainingArgs::default(), &ModelArgs::default(), Some(&data))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_train_refuses_existing_output_dir_without_overwrite() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("train.json"), "[]").unwrap();
        std::fs::write(dir.path().join("eval.json"), "[]").unwrap();
        let data = DataArgs::for_root(dir.path());

        let output_dir = dir.path().join("out");
        std::fs::create_dir_all(&output_dir).unwrap();
        let training = TrainingArgs {
            output_dir,
            overwrite_output_dir: false,
            ..TrainingArgs::default()
        };

        let err = trainer()
            .train(&training, &ModelArgs::default(), Some(&data))
            .unwrap_err();
        assert!(err.to_string().contains("overwrite_output_dir"));
    }

    #[test]
    fn test_data_args_for_root() {
        let data = DataArgs::for_root(std::path::Path::new("/data/set"));
        assert_eq!(data.train_manifest, PathBuf::from("/data/set/train.json"));
        assert_eq!(data.eval_manifest, PathBuf::from("/data/set/eval.json"));
    }
}
