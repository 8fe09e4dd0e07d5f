//! Named-entity evidence.
//!
//! A recognizer turns text into labelled spans; this module maps those spans
//! onto identifier and legal-name fields. Recognizer failures are logged and
//! treated as "no entities".

use std::path::Path;

use thiserror::Error;
use tracing::warn;

use super::identifiers::{is_inn, is_ogrn, starts_with_legal_form};
use super::EvidenceProvider;
use crate::record::{DocKind, Evidence};

#[derive(Debug, Error)]
#[cfg_attr(not(feature = "ner"), allow(dead_code))]
pub enum NerError {
    #[error("NER support not compiled in (enable the `ner` feature)")]
    Unavailable,
    #[error("failed to load NER model from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// One grouped entity span.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "ner"), allow(dead_code))]
pub struct Entity {
    pub label: String,
    pub word: String,
    pub score: f32,
}

pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<Entity>, NerError>;
}

/// Load the token-classification model in `dir`.
#[cfg(feature = "ner")]
pub fn load_recognizer(dir: &Path) -> Result<Box<dyn EntityRecognizer>, NerError> {
    let recognizer = super::onnx::OnnxRecognizer::load(dir)?;
    Ok(Box::new(recognizer))
}

#[cfg(not(feature = "ner"))]
pub fn load_recognizer(dir: &Path) -> Result<Box<dyn EntityRecognizer>, NerError> {
    let _ = dir;
    Err(NerError::Unavailable)
}

/// Identifier and legal-name evidence from recognizer spans; first fit wins per field.
pub fn evidence_from_entities(entities: &[Entity]) -> Evidence {
    let mut ev = Evidence::default();
    for entity in entities {
        let word = entity.word.replace("##", "");
        let word = word.trim();
        if ev.inn.is_empty() && is_inn(word) {
            ev.inn = word.to_string();
        } else if ev.ogrn.is_empty() && is_ogrn(word) {
            ev.ogrn = word.to_string();
        } else if ev.full_name.is_empty() && starts_with_legal_form(word) {
            ev.full_name = word.to_string();
        }
    }
    ev
}

pub struct NerProvider {
    recognizer: Box<dyn EntityRecognizer>,
    on_homepage: bool,
    max_chars: usize,
}

impl NerProvider {
    pub fn new(recognizer: Box<dyn EntityRecognizer>, on_homepage: bool, max_chars: usize) -> Self {
        NerProvider {
            recognizer,
            on_homepage,
            max_chars,
        }
    }
}

impl EvidenceProvider for NerProvider {
    fn name(&self) -> &'static str {
        "ner"
    }

    fn applies_to(&self, kind: DocKind) -> bool {
        kind == DocKind::Pdf || self.on_homepage
    }

    fn extract(&self, text: &str) -> Evidence {
        let text = match text.char_indices().nth(self.max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        };
        match self.recognizer.recognize(text) {
            Ok(entities) => evidence_from_entities(&entities),
            Err(e) => {
                warn!("NER failed: {}", e);
                Evidence::default()
            }
        }
    }
}

// ── Tests ──
