//! capset - prepare image-caption datasets and drive embedding-model
//! fine-tuning.
//!
//! The flow is sequential: load a labeled source dataset, materialize each
//! split as (image file, caption) pairs with a JSON manifest, then hand the
//! manifests to an external fine-tuning entry point.

pub mod config;
pub mod dataset;
pub mod embed;
pub mod logging;
pub mod manifest;
pub mod materialize;
pub mod train;
