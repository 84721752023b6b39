use serde::{Deserialize, Serialize};

use crate::errors::QubicResult;

/// Sentiment verdict for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sentiment {
    pub label: String,
    /// Signed intensity in [-1,1].
    pub score: f64,
}

/// Sentiment analysis provider.
pub trait ISentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> QubicResult<Sentiment>;

    /// Human-readable provider name.
    fn name(&self) -> &str;
}
