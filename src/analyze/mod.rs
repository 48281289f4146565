// src/analyze/mod.rs
//! Page analysis: relevance classification and listing extraction, both
//! backed by a [`LanguageModel`](ai_adapter::LanguageModel).

pub mod ai_adapter;
pub mod classifier;
pub mod extractor;
pub mod text;

pub use ai_adapter::{build_model_from_config, DisabledModel, DynModel, LanguageModel, OpenAiProvider};
pub use classifier::{Category, Classification, ClassificationError, Classifier, ModelFailurePolicy};
pub use extractor::{ExtractedListing, ExtractionError, Extractor};
