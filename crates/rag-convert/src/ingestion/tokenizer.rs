//! Token counting for chunk bounds

use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

/// Counts tokens the way the downstream embedding model would
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`
    fn count_tokens(&self, text: &str) -> usize;

    /// Identifier reported to clients
    fn name(&self) -> &str;
}

/// Hugging Face tokenizer loaded from a `tokenizer.json`
pub struct HuggingFaceTokenCounter {
    tokenizer: tokenizers::Tokenizer,
    model_id: String,
}

impl HuggingFaceTokenCounter {
    pub fn from_file(path: impl AsRef<Path>, model_id: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            Error::Config(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;

        Ok(Self {
            tokenizer,
            model_id: model_id.into(),
        })
    }
}

impl TokenCounter for HuggingFaceTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(e) => {
                // Never undercount: fall back to word bounds
                tracing::warn!("Tokenizer failed, counting words instead: {}", e);
                WordTokenCounter::count(text)
            }
        }
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}

/// Counts Unicode words and punctuation marks as tokens
pub struct WordTokenCounter {
    model_id: String,
}

impl WordTokenCounter {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    fn count(text: &str) -> usize {
        text.split_word_bounds()
            .filter(|w| !w.trim().is_empty())
            .count()
    }
}

impl TokenCounter for WordTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        Self::count(text)
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}
