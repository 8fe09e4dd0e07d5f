//! ONNX Runtime token-classification backend for [`EntityRecognizer`].
//!
//! The model directory must contain `model.onnx`, `tokenizer.json` and a
//! `config.json` with an `id2label` map (BIO tags such as `B-ORG`, `I-ORG`).

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use super::ner::{Entity, EntityRecognizer, NerError};

const MAX_TOKENS: usize = 512;
/// Text is fed to the model in windows of this many characters.
const WINDOW_CHARS: usize = 1200;

pub struct OnnxRecognizer {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
}

impl OnnxRecognizer {
    pub fn load(model_dir: &Path) -> Result<Self, NerError> {
        let load_err = |reason: String| NerError::Load {
            path: model_dir.display().to_string(),
            reason,
        };

        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let config_path = model_dir.join("config.json");

        let session = open_session(&model_path).map_err(|e| load_err(format!("model: {e}")))?;

        let mut tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| load_err(format!("tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| load_err(format!("truncation: {e}")))?;

        let config = std::fs::read_to_string(&config_path)
            .map_err(|e| load_err(format!("config.json: {e}")))?;
        let labels = parse_id2label(&config).map_err(load_err)?;

        info!(labels = labels.len(), model = %model_path.display(), "loaded NER model");
        Ok(OnnxRecognizer {
            session: Mutex::new(session),
            tokenizer,
            labels,
        })
    }

    fn recognize_window(&self, text: &str) -> Result<Vec<Entity>, NerError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| NerError::Tokenize(e.to_string()))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&v| v as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&v| v as i64).collect();
        let types: Vec<i64> = encoding.get_type_ids().iter().map(|&v| v as i64).collect();
        let seq_len = ids.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }
        let shape = [1i64, seq_len as i64];

        let ids_tensor = Tensor::from_array((shape, ids.into_boxed_slice())).map_err(infer)?;
        let mask_tensor = Tensor::from_array((shape, mask.into_boxed_slice())).map_err(infer)?;
        let type_tensor = Tensor::from_array((shape, types.into_boxed_slice())).map_err(infer)?;

        let tags: Vec<(usize, f32)> = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| NerError::Inference("session lock poisoned".into()))?;
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => ids_tensor,
                    "attention_mask" => mask_tensor,
                    "token_type_ids" => type_tensor,
                ])
                .map_err(infer)?;

            let (output_shape, logits) = outputs[0].try_extract_tensor::<f32>().map_err(infer)?;
            let dims: &[i64] = output_shape;
            if dims.len() != 3 || dims[1] as usize != seq_len {
                return Err(NerError::Inference(format!("unexpected output shape {dims:?}")));
            }
            let num_labels = dims[2] as usize;
            (0..seq_len)
                .map(|t| argmax_softmax(&logits[t * num_labels..(t + 1) * num_labels]))
                .collect()
        };

        let tokens: Vec<TaggedToken<'_>> = tags
            .into_iter()
            .zip(encoding.get_offsets())
            .zip(encoding.get_special_tokens_mask())
            .filter(|(_, special)| **special == 0)
            .map(|(((label, score), &(start, end)), _)| TaggedToken {
                tag: self.labels.get(label).map(String::as_str).unwrap_or("O"),
                start,
                end,
                score,
            })
            .collect();

        Ok(group_entities(text, &tokens))
    }
}

impl EntityRecognizer for OnnxRecognizer {
    fn recognize(&self, text: &str) -> Result<Vec<Entity>, NerError> {
        let mut entities = Vec::new();
        for window in char_windows(text, WINDOW_CHARS) {
            entities.extend(self.recognize_window(window)?);
        }
        Ok(entities)
    }
}

fn open_session(path: &Path) -> anyhow::Result<Session> {
    Ok(Session::builder()?.commit_from_file(path)?)
}

fn infer<E: std::fmt::Display>(e: E) -> NerError {
    NerError::Inference(e.to_string())
}

struct TaggedToken<'a> {
    tag: &'a str,
    start: usize,
    end: usize,
    score: f32,
}

/// Merge consecutive `B-X`/`I-X` tokens into spans of `text`.
fn group_entities(text: &str, tokens: &[TaggedToken<'_>]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<(String, usize, usize, Vec<f32>)> = None;

    let mut flush = |current: &mut Option<(String, usize, usize, Vec<f32>)>| {
        if let Some((label, start, end, scores)) = current.take() {
            if let Some(word) = text.get(start..end) {
                entities.push(Entity {
                    label,
                    word: word.to_string(),
                    score: scores.iter().sum::<f32>() / scores.len() as f32,
                });
            }
        }
    };

    for token in tokens {
        let (prefix, kind) = match token.tag.split_once('-') {
            Some((p, k)) => (p, k),
            None => {
                flush(&mut current);
                continue;
            }
        };
        let continues = prefix == "I"
            && current.as_ref().is_some_and(|(label, ..)| label == kind);
        if continues {
            if let Some((_, _, end, scores)) = current.as_mut() {
                *end = token.end;
                scores.push(token.score);
            }
        } else {
            flush(&mut current);
            current = Some((kind.to_string(), token.start, token.end, vec![token.score]));
        }
    }
    flush(&mut current);
    entities
}

fn argmax_softmax(logits: &[f32]) -> (usize, f32) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|l| (l - max).exp()).sum();
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, l)| (idx, (l - max).exp() / sum))
        .unwrap_or((0, 0.0))
}

fn parse_id2label(config: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value =
        serde_json::from_str(config).map_err(|e| format!("config.json: {e}"))?;
    let map = value
        .get("id2label")
        .and_then(|m| m.as_object())
        .ok_or_else(|| "config.json has no id2label".to_string())?;

    let mut labels = vec![String::from("O"); map.len()];
    for (id, label) in map {
        let idx: usize = id.parse().map_err(|_| format!("bad label id {id:?}"))?;
        let label = label.as_str().ok_or_else(|| format!("label {id} is not a string"))?;
        if idx >= labels.len() {
            labels.resize(idx + 1, String::from("O"));
        }
        labels[idx] = label.to_string();
    }
    Ok(labels)
}

fn char_windows(text: &str, size: usize) -> Vec<&str> {
    let mut windows = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let end = text[start..]
            .char_indices()
            .nth(size)
            .map(|(i, _)| start + i)
            .unwrap_or(text.len());
        windows.push(&text[start..end]);
        start = end;
    }
    windows
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn tok<'a>(tag: &'a str, start: usize, end: usize) -> TaggedToken<'a> {
        TaggedToken {
            tag,
            start,
            end,
            score: 1.0,
        }
    }

    #[test]
    fn groups_bio_spans() {
        let text = "Acme Corp pays 1234567890";
        let tokens = [
            tok("B-ORG", 0, 4),
            tok("I-ORG", 5, 9),
            tok("O", 10, 14),
            tok("B-MISC", 15, 20),
            tok("I-MISC", 20, 25),
        ];
        let entities = group_entities(text, &tokens);
        let words: Vec<&str> = entities.iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["Acme Corp", "1234567890"]);
        assert_eq!(entities[0].label, "ORG");
    }

    #[test]
    fn label_map_from_config() {
        let labels = parse_id2label(r#"{"id2label": {"0": "O", "2": "I-ORG", "1": "B-ORG"}}"#).unwrap();
        assert_eq!(labels, vec!["O", "B-ORG", "I-ORG"]);
        assert!(parse_id2label("{}").is_err());
    }

    #[test]
    fn windows_respect_char_boundaries() {
        let windows = char_windows("абвгд", 2);
        assert_eq!(windows, vec!["аб", "вг", "д"]);
        assert!(char_windows("", 3).is_empty());
    }

    #[test]
    #[ignore] // needs a model under models/ner
    fn recognizes_with_local_model() {
        let dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/ner");
        let recognizer = OnnxRecognizer::load(&dir).unwrap();
        let entities = recognizer.recognize("Acme Corporation is based in London.").unwrap();
        assert!(!entities.is_empty());
    }
}
