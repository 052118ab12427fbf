//! Pipeline implementation using ONNX Runtime.

use anyhow::{anyhow, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};

use super::Modality;

/// L2-normalized embedding vector (512-dimensional for ViT-B/32).
pub type Embedding = Vec<f32>;

/// Known model names and their encoder file sources.
fn encoder_source(model_name: &str, modality: Modality) -> Result<(&'static str, &'static str)> {
    match (model_name, modality) {
        // Qdrant's CLIP ViT-B/32 encoders (ONNX)
        ("clip-vit-b32", Modality::Image) => Ok((
            "clip-vit-b32-vision.onnx",
            "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx",
        )),
        ("clip-vit-b32", Modality::Text) => Ok((
            "clip-vit-b32-text.onnx",
            "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/model.onnx",
        )),
        _ => Err(anyhow!("Unknown embedding model {:?}", model_name)),
    }
}

/// A single-modality embedding pipeline: input → decode/tokenize → encoder
/// → L2-normalized vector.
pub struct EmbeddingPipeline {
    session: Session,
    modality: Modality,
}

impl EmbeddingPipeline {
    /// Build the image → vector pipeline for a named model.
    pub fn image(model_name: &str, models_dir: &Path) -> Result<Self> {
        Self::build(model_name, Modality::Image, models_dir)
    }

    /// Build the text → vector pipeline for a named model.
    pub fn text(model_name: &str, models_dir: &Path) -> Result<Self> {
        Self::build(model_name, Modality::Text, models_dir)
    }

    fn build(model_name: &str, modality: Modality, models_dir: &Path) -> Result<Self> {
        let (filename, url) = encoder_source(model_name, modality)?;
        let model_path = ensure_encoder(models_dir, filename, url)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)?;

        Ok(Self { session, modality })
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Decode an image file and embed it. Only valid on the image pipeline.
    pub fn embed_image_file(&mut self, path: &Path) -> Result<Embedding> {
        let img = image::open(path).map_err(|e| anyhow!("Failed to load image: {}", e))?;
        self.embed_image(&img)
    }

    pub fn embed_image(&mut self, img: &DynamicImage) -> Result<Embedding> {
        if self.modality != Modality::Image {
            return Err(anyhow!("Pipeline is bound to the {} encoder", self.modality));
        }
        run_visual_encoder(&mut self.session, img)
    }

    pub fn embed_text(&mut self, text: &str) -> Result<Embedding> {
        if self.modality != Modality::Text {
            return Err(anyhow!("Pipeline is bound to the {} encoder", self.modality));
        }
        run_text_encoder(&mut self.session, text)
    }
}

/// Download an encoder file if it doesn't exist.
fn ensure_encoder(models_dir: &Path, filename: &str, url: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(models_dir)?;
    let model_path = models_dir.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "Downloading encoder model...");
        let response = ureq::get(url)
            .call()
            .map_err(|e| anyhow!("Failed to download model: {}", e))?;

        let mut file = std::fs::File::create(&model_path)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        tracing::info!(model = %filename, path = ?model_path, "Encoder model downloaded");
    }

    Ok(model_path)
}

/// Run the visual encoder on an image.
fn run_visual_encoder(session: &mut Session, img: &DynamicImage) -> Result<Embedding> {
    const INPUT_SIZE: u32 = 224;

    // Resize to the encoder input size
    let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // CLIP normalization constants (ImageNet stats)
    let mean = [0.48145466, 0.4578275, 0.40821073];
    let std = [0.26862954, 0.26130258, 0.27577711];

    // Convert to tensor (NCHW format, normalized)
    let mut input_data = vec![0.0f32; (3 * INPUT_SIZE * INPUT_SIZE) as usize];

    for y in 0..INPUT_SIZE as usize {
        for x in 0..INPUT_SIZE as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            let idx = y * INPUT_SIZE as usize + x;

            // Normalize: (pixel/255 - mean) / std
            input_data[idx] = ((pixel[0] as f32 / 255.0) - mean[0]) / std[0]; // R
            input_data[INPUT_SIZE as usize * INPUT_SIZE as usize + idx] =
                ((pixel[1] as f32 / 255.0) - mean[1]) / std[1]; // G
            input_data[2 * INPUT_SIZE as usize * INPUT_SIZE as usize + idx] =
                ((pixel[2] as f32 / 255.0) - mean[2]) / std[2]; // B
        }
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
        input_data.into_boxed_slice(),
    ))?;

    let outputs = session.run(ort::inputs!["pixel_values" => input_tensor])?;

    let embedding_output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("No embedding output"))?;

    let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

    Ok(l2_normalize(embedding_data.to_vec()))
}

/// Run the text encoder on a string.
fn run_text_encoder(session: &mut Session, text: &str) -> Result<Embedding> {
    // Simple tokenization (CLIP uses BPE, this is a simplified version)
    let tokens = simple_tokenize(text);

    // Pad/truncate to 77 tokens (CLIP's context length)
    let mut input_ids = vec![49406i64]; // Start token
    input_ids.extend(tokens.iter().take(75).cloned());
    input_ids.push(49407); // End token

    while input_ids.len() < 77 {
        input_ids.push(0);
    }

    let input_tensor = Tensor::from_array(([1usize, 77], input_ids.into_boxed_slice()))?;

    let outputs = session.run(ort::inputs!["input_ids" => input_tensor])?;

    let embedding_output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("No embedding output"))?;

    let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

    Ok(l2_normalize(embedding_data.to_vec()))
}

/// Simple tokenization for common words (placeholder - real CLIP uses BPE)
fn simple_tokenize(text: &str) -> Vec<i64> {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .take(75)
        .map(|c| c as i64)
        .collect()
}

fn l2_normalize(embedding: Vec<f32>) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 0.001);
        assert!((normalized[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_unknown_model_name_fails() {
        let err = encoder_source("blip-base", Modality::Image).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding model"));
    }

    #[test]
    fn test_simple_tokenize_strips_punctuation() {
        let tokens = simple_tokenize("Hi!");
        assert_eq!(tokens.len(), 2);
    }
}
