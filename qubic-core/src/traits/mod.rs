//! Interfaces the core consumes but does not implement: embedding and
//! sentiment providers are wired in from outside.

mod embedding;
mod sentiment;

pub use embedding::IEmbeddingProvider;
pub use sentiment::{ISentimentAnalyzer, Sentiment};
