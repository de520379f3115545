//! Model persistence
//!
//! Trained models are stored in a checksummed binary envelope together
//! with their metadata (feature names, hyperparameters, validation
//! metrics).

mod serializer;

pub use serializer::{load_model, read_envelope, save_model, ModelMetadata, SerializedModel};
