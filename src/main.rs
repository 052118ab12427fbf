use anyhow::{bail, Result};
use std::path::PathBuf;

use capset::config::Config;
use capset::dataset;
use capset::embed::EmbeddingPipeline;
use capset::manifest;
use capset::materialize::{materialize_split, IdCounter};
use capset::logging;
use capset::train::{DataArgs, Trainer};

enum Command {
    Materialize,
    Train { from_root: bool },
    EmbedImage(PathBuf),
    EmbedText(String),
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("capset {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "materialize" => {
                command = Some(Command::Materialize);
            }
            "train" => {
                let mut from_root = false;
                if i + 1 < args.len() && args[i + 1] == "--from-root" {
                    from_root = true;
                    i += 1;
                }
                command = Some(Command::Train { from_root });
            }
            "embed" => {
                if i + 2 < args.len() {
                    command = match args[i + 1].as_str() {
                        "image" => Some(Command::EmbedImage(PathBuf::from(&args[i + 2]))),
                        "text" => Some(Command::EmbedText(args[i + 2].clone())),
                        other => {
                            eprintln!("Error: embed expects 'image' or 'text', got '{}'", other);
                            std::process::exit(1);
                        }
                    };
                    i += 2;
                } else {
                    eprintln!("Error: embed requires a modality and an argument");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = command.unwrap_or_else(|| {
        print_help();
        std::process::exit(1);
    });

    CliArgs {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"capset - prepare image-caption datasets for embedding-model fine-tuning

USAGE:
    capset [OPTIONS] COMMAND

COMMANDS:
    materialize         Fetch the source dataset, write images and manifests
    train [--from-root] Invoke the external fine-tuning entry point
                        (--from-root derives data args from the dataset root)
    embed image PATH    Embed an image file and print the vector size
    embed text TEXT     Embed a text string and print the vector size

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    CAPSET_LOG          Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/capset/config.toml"#
    );
}

fn cmd_materialize(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.dataset.root)?;

    // One counter for the whole run: record ids continue from one split to
    // the next in configured order.
    let mut counter = IdCounter::new();

    for split in &config.dataset.splits {
        let items = dataset::load_split(
            &config.dataset.cache_dir,
            split,
            config.dataset.archive_sha256.as_deref(),
        )?;
        let records = materialize_split(&config.dataset, split, &items, &mut counter)?;
        manifest::write_manifest(&config.dataset.root, split, &records)?;
    }

    Ok(())
}

fn cmd_train(config: &Config, from_root: bool) -> Result<()> {
    // Build both inference pipelines up front, mirroring how the trained
    // model will be served; this also pre-fetches the encoder files.
    let _image_pipe = EmbeddingPipeline::image(&config.embed.model_name, &config.embed.models_dir)?;
    let _text_pipe = EmbeddingPipeline::text(&config.embed.model_name, &config.embed.models_dir)?;
    tracing::info!(model = %config.embed.model_name, "Embedding pipelines ready");

    let derived;
    let data = if from_root {
        derived = DataArgs::for_root(&config.dataset.root);
        Some(&derived)
    } else {
        config.data.as_ref()
    };

    let trainer = Trainer::new(
        &config.embed.model_name,
        capset::embed::Modality::Image,
        &config.trainer.entrypoint,
    );
    let artifact = trainer.train(&config.training, &config.model, data)?;
    println!("Trained model written to {:?}", artifact.output_dir);

    Ok(())
}

fn cmd_embed_image(config: &Config, path: &PathBuf) -> Result<()> {
    if !path.exists() {
        bail!("Image {:?} not found", path);
    }
    let mut pipe = EmbeddingPipeline::image(&config.embed.model_name, &config.embed.models_dir)?;
    let vec = pipe.embed_image_file(path)?;
    println!("{} dimensions, first = {:.6}", vec.len(), vec.first().unwrap_or(&0.0));
    Ok(())
}

fn cmd_embed_text(config: &Config, text: &str) -> Result<()> {
    let mut pipe = EmbeddingPipeline::text(&config.embed.model_name, &config.embed.models_dir)?;
    let vec = pipe.embed_text(text)?;
    println!("{} dimensions, first = {:.6}", vec.len(), vec.first().unwrap_or(&0.0));
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    match args.command {
        Command::Materialize => cmd_materialize(&config),
        Command::Train { from_root } => cmd_train(&config, from_root),
        Command::EmbedImage(path) => cmd_embed_image(&config, &path),
        Command::EmbedText(text) => cmd_embed_text(&config, &text),
    }
}
