//! User-facing message lookup.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_LANGUAGE: &str = "en";

pub mod keys {
    pub const AI_DECISION_FAIL: &str = "common.ai_decision_fail";
    pub const SERVICE_BUSY: &str = "common.service_busy";
    pub const INVALID_INPUT: &str = "common.invalid_input";
}

/// Resolves a message key for a language. Never fails; unknown keys come back
/// as the key itself.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, lang: &str) -> String;
}

/// Built-in English messages, optionally overlaid with a YAML catalog of the
/// form `{ <lang>: { <key>: <text> } }`.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let english: HashMap<String, String> = [
            (
                keys::AI_DECISION_FAIL,
                "We couldn't check this site right now, so it has been blocked to keep you focused.",
            ),
            (
                keys::SERVICE_BUSY,
                "AI service is currently taking too long to respond. Please try again later.",
            ),
            (keys::INVALID_INPUT, "Invalid input"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            messages: HashMap::from([(DEFAULT_LANGUAGE.to_string(), english)]),
        }
    }
}

impl MessageCatalog {
    /// Built-in messages overlaid with the catalog at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read translations from {}", path.display()))?;
        let mut catalog = Self::default();
        catalog.merge_yaml(&content)?;
        debug!("Loaded translations for {} languages", catalog.messages.len());
        Ok(catalog)
    }

    pub fn merge_yaml(&mut self, yaml: &str) -> Result<()> {
        let overlay: HashMap<String, HashMap<String, String>> =
            serde_yaml::from_str(yaml).context("Failed to parse translations")?;
        for (lang, entries) in overlay {
            self.messages
                .entry(normalize_language(&lang))
                .or_default()
                .extend(entries);
        }
        Ok(())
    }

    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.messages.keys().cloned().collect();
        langs.sort();
        langs
    }
}

impl Translator for MessageCatalog {
    fn translate(&self, key: &str, lang: &str) -> String {
        let lang = normalize_language(lang);
        self.messages
            .get(&lang)
            .and_then(|m| m.get(key))
            .or_else(|| {
                self.messages
                    .get(DEFAULT_LANGUAGE)
                    .and_then(|m| m.get(key))
            })
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// `pt-BR` and `pt_br` both become `pt`.
fn normalize_language(lang: &str) -> String {
    let primary = lang.split(['-', '_']).next().unwrap_or("").trim();
    if primary.is_empty() {
        DEFAULT_LANGUAGE.to_string()
    } else {
        primary.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_fallback_and_unknown_keys() {
        let catalog = MessageCatalog::default();
        let en = catalog.translate(keys::AI_DECISION_FAIL, "en");
        assert!(!en.is_empty());
        assert_eq!(catalog.translate(keys::AI_DECISION_FAIL, "fr-CA"), en);
        assert_eq!(catalog.translate("no.such.key", "en"), "no.such.key");
    }

    #[test]
    fn overlay_adds_languages() {
        let mut catalog = MessageCatalog::default();
        catalog
            .merge_yaml("de:\n  common.ai_decision_fail: \"Nicht geprüft\"\n")
            .unwrap();
        assert_eq!(catalog.translate(keys::AI_DECISION_FAIL, "de_DE"), "Nicht geprüft");
        assert_eq!(catalog.languages(), vec!["de".to_string(), "en".to_string()]);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("messages.yml");
        std::fs::write(&path, "es:\n  common.invalid_input: Entrada no válida\n").unwrap();
        let catalog = MessageCatalog::load(&path).unwrap();
        assert_eq!(catalog.translate(keys::INVALID_INPUT, "es"), "Entrada no válida");
    }
}
