//! Named prompt templates loaded from a YAML document.
//!
//! ```yaml
//! prompts:
//!   - id: default
//!     raw: "Is {{url}} on task for {{intention}}?"
//! ```
//!
//! The document is read at construction and again only on [`PromptStore::reload`].

pub mod template;

pub use template::fill_template;

use crate::telemetry::{kinds, Telemetry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub id: String,
    pub raw: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: Vec<PromptEntry>,
}

pub struct PromptStore {
    path: Option<PathBuf>,
    prompts: RwLock<Vec<PromptEntry>>,
    telemetry: Arc<dyn Telemetry>,
}

impl PromptStore {
    /// Load from `path`. A missing or malformed file leaves the store empty.
    pub fn load(path: impl Into<PathBuf>, telemetry: Arc<dyn Telemetry>) -> Self {
        let store = Self {
            path: Some(path.into()),
            prompts: RwLock::new(Vec::new()),
            telemetry,
        };
        store.reload();
        store
    }

    /// A store with fixed contents and no backing file.
    pub fn with_prompts(prompts: Vec<PromptEntry>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            path: None,
            prompts: RwLock::new(prompts),
            telemetry,
        }
    }

    /// Parse a YAML prompt document.
    pub fn from_yaml_str(yaml: &str, telemetry: Arc<dyn Telemetry>) -> Result<Self> {
        let doc: PromptDocument = serde_yaml::from_str(yaml).context("Failed to parse prompt document")?;
        Ok(Self::with_prompts(doc.prompts, telemetry))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The raw template for `id`.
    pub fn get_prompt(&self, id: &str) -> Option<String> {
        let prompts = self.prompts.read().ok()?;
        prompts.iter().find(|p| p.id == id).map(|p| p.raw.clone())
    }

    pub fn all_prompts(&self) -> Vec<PromptEntry> {
        self.prompts.read().map(|p| p.clone()).unwrap_or_default()
    }

    /// Re-read the backing file. Returns the number of prompts now loaded.
    pub fn reload(&self) -> usize {
        let Some(path) = &self.path else {
            return self.all_prompts().len();
        };

        info!("Loading prompts from {}", path.display());
        let loaded = match read_document(path) {
            Ok(doc) => {
                info!("Loaded {} prompts", doc.prompts.len());
                doc.prompts
            }
            Err(e) => {
                error!("Failed to load prompts: {:#}", e);
                self.telemetry.record_event(
                    kinds::PROMPT_LOAD_FAILED,
                    json!({
                        "path": path.display().to_string(),
                        "error": format!("{:#}", e),
                    }),
                );
                Vec::new()
            }
        };

        let count = loaded.len();
        if let Ok(mut prompts) = self.prompts.write() {
            *prompts = loaded;
        }
        count
    }
}

fn read_document(path: &Path) -> Result<PromptDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompts from {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse prompts in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::RecordingTelemetry;
    use tempfile::TempDir;

    const DOC: &str = r#"
prompts:
  - id: default
    raw: "Check {{url}}"
  - id: strict
    raw: |
      Only allow {{focus_mode}} sites.
"#;

    #[test]
    fn loads_and_looks_up_by_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prompts.yml");
        std::fs::write(&path, DOC).unwrap();

        let store = PromptStore::load(&path, Arc::new(RecordingTelemetry::new()));
        assert_eq!(store.get_prompt("default").as_deref(), Some("Check {{url}}"));
        assert_eq!(
            store.get_prompt("strict").as_deref(),
            Some("Only allow {{focus_mode}} sites.\n")
        );
        assert!(store.get_prompt("missing").is_none());
        assert_eq!(store.all_prompts().len(), 2);
    }

    #[test]
    fn missing_file_leaves_store_empty_and_reports() {
        let tmp = TempDir::new().unwrap();
        let telemetry = Arc::new(RecordingTelemetry::new());
        let store = PromptStore::load(tmp.path().join("absent.yml"), telemetry.clone());

        assert!(store.all_prompts().is_empty());
        assert_eq!(telemetry.events_of(kinds::PROMPT_LOAD_FAILED).len(), 1);
    }

    #[test]
    fn reload_picks_up_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prompts.yml");
        std::fs::write(&path, DOC).unwrap();
        let store = PromptStore::load(&path, Arc::new(RecordingTelemetry::new()));

        std::fs::write(&path, "prompts:\n  - id: default\n    raw: updated\n").unwrap();
        assert_eq!(store.get_prompt("default").as_deref(), Some("Check {{url}}"));

        assert_eq!(store.reload(), 1);
        assert_eq!(store.get_prompt("default").as_deref(), Some("updated"));
        assert!(store.get_prompt("strict").is_none());
    }

    #[test]
    fn malformed_reload_empties_the_store() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prompts.yml");
        std::fs::write(&path, DOC).unwrap();
        let telemetry = Arc::new(RecordingTelemetry::new());
        let store = PromptStore::load(&path, telemetry.clone());

        std::fs::write(&path, "prompts: [ {id: ").unwrap();
        assert_eq!(store.reload(), 0);
        assert!(store.get_prompt("default").is_none());
        assert_eq!(telemetry.events_of(kinds::PROMPT_LOAD_FAILED).len(), 1);
    }

    #[test]
    fn from_yaml_str() {
        let store = PromptStore::from_yaml_str(DOC, Arc::new(RecordingTelemetry::new())).unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.reload(), 2);
    }
}
