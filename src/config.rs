use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::record::CompletenessRule;

pub const DEFAULT_CONFIG_FILE: &str = "agency_scraper.toml";
const ENV_PREFIX: &str = "AGENCY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub fetch: FetchSettings,
    pub extract: ExtractSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory the per-source listing CSVs are written to.
    pub listings_dir: PathBuf,
    /// Union of all listings; input of the enrichment batch.
    pub merged: PathBuf,
    /// Enriched table, rewritten after every processed row.
    pub enriched: PathBuf,
    pub sqlite: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            listings_dir: PathBuf::from("data/raw"),
            merged: PathBuf::from("data/interim/agencies_merged.csv"),
            enriched: PathBuf::from("data/interim/agencies_merged_with_inn_ogrn.csv"),
            sqlite: PathBuf::from("data/agencies.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Client identities tried in order until one gets a response.
    pub user_agents: Vec<String>,
    /// Automatic retries per identity on transport errors and `retry_statuses`.
    pub max_retries: u32,
    pub retry_statuses: Vec<u16>,
    pub retry_backoff_ms: u64,
    /// Pause before moving on to the next identity.
    pub identity_backoff_ms: u64,
    pub page_timeout_secs: u64,
    pub document_timeout_secs: u64,
    pub max_document_bytes: usize,
    /// Extra PEM root certificates trusted on top of the built-in roots.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/124.0 Safari/537.36".into(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5_1) Safari/605.1.15".into(),
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Firefox/121.0".into(),
            ],
            max_retries: 2,
            retry_statuses: vec![429, 500, 502, 503, 504],
            retry_backoff_ms: 1000,
            identity_backoff_ms: 1000,
            page_timeout_secs: 20,
            document_timeout_secs: 45,
            max_document_bytes: 2_000_000,
            ca_bundle: None,
        }
    }
}

impl FetchSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Token-classification model directory (`model.onnx`, `tokenizer.json`, `config.json`).
    pub ner_model_dir: Option<PathBuf>,
    /// Run the recognizer on homepage text too, not only on documents.
    pub ner_on_homepage: bool,
    pub document_suffix: String,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        ExtractSettings {
            ner_model_dir: None,
            ner_on_homepage: false,
            document_suffix: ".pdf".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub complete_when: CompletenessRule,
    /// Stop after this many processed (not skipped) rows.
    pub limit: Option<usize>,
}

/// Defaults, then the TOML file (if present), then `AGENCY__*` env vars.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let settings = config::Config::builder()
        .add_source(config::File::from(file).required(path.is_some()))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fetch.user_agents")
                .with_list_parse_key("fetch.retry_statuses")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read config {:?}", file))?;
    settings
        .try_deserialize()
        .context("Invalid configuration")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("nope.toml");
        assert!(load(Some(&absent)).is_err());
    }

    #[test]
    fn defaults_without_file() {
        let s = load(None).unwrap();
        assert_eq!(s.fetch.user_agents.len(), 3);
        assert_eq!(s.fetch.retry_statuses, vec![429, 500, 502, 503, 504]);
        assert_eq!(s.batch.complete_when, CompletenessRule::default());
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("agency.toml");
        std::fs::write(
            &file,
            r#"
[fetch]
max_retries = 0
identity_backoff_ms = 5
user_agents = ["ua-one"]

[batch.complete_when]
identity = ["inn"]
contact = ["email"]

[paths]
enriched = "out.csv"
"#,
        )
        .unwrap();

        let s = load(Some(&file)).unwrap();
        assert_eq!(s.fetch.max_retries, 0);
        assert_eq!(s.fetch.identity_backoff_ms, 5);
        assert_eq!(s.fetch.user_agents, vec!["ua-one".to_string()]);
        assert_eq!(s.fetch.page_timeout_secs, 20);
        assert_eq!(s.fetch.max_document_bytes, 2_000_000);
        assert_eq!(s.batch.complete_when.identity, vec![Field::Inn]);
        assert_eq!(s.batch.complete_when.contact, vec![Field::Email]);
        assert_eq!(s.paths.enriched, PathBuf::from("out.csv"));
        assert_eq!(s.paths.merged, PathBuf::from("data/interim/agencies_merged.csv"));
        assert_eq!(s.extract.document_suffix, ".pdf");
    }
}
