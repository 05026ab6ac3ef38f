//! Versioned catalog of prompt-injection patterns.
//!
//! Compiled once on first use. Rules are grouped by severity and keep their
//! declaration order inside each group.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Bumped whenever a rule is added, removed or changed.
pub const CATALOG_VERSION: u32 = 3;

/// Rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Direct attempts to override instructions.
    Critical,
    /// Keywords and role prefixes that are rarely legitimate in short inputs.
    Suspicious,
    /// Encoded or invisible payloads used to slip past the other rules.
    Encoding,
}

impl Severity {
    /// Order used when rejecting input.
    pub const VALIDATION_ORDER: [Severity; 3] =
        [Severity::Critical, Severity::Encoding, Severity::Suspicious];

    /// Order used when redacting input.
    pub const SANITIZE_ORDER: [Severity; 3] =
        [Severity::Critical, Severity::Suspicious, Severity::Encoding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Suspicious => "suspicious",
            Self::Encoding => "encoding",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compiled rule.
#[derive(Debug)]
pub struct PatternRule {
    pub id: &'static str,
    pub severity: Severity,
    pub regex: Regex,
}

impl PatternRule {
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// The full rule table.
#[derive(Debug)]
pub struct PatternCatalog {
    pub version: u32,
    rules: Vec<PatternRule>,
}

const CRITICAL: &[(&str, &str)] = &[
    (
        "ignore_previous_instructions",
        r"(?i)\b(?:ignore|disregard|forget|override)\s+(?:all\s+|any\s+|the\s+|your\s+)*(?:previous|prior|above|earlier|preceding|system)\s+(?:instructions?|prompts?|rules|directions|context)",
    ),
    (
        "new_instructions",
        r"(?i)\bnew\s+(?:system\s+)?instructions?\s*:",
    ),
    (
        "prompt_exfiltration",
        r"(?i)\b(?:reveal|print|show|output|repeat|leak)\s+(?:me\s+)?(?:your\s+|the\s+)?(?:system\s+|hidden\s+|initial\s+)?(?:prompt|instructions)\b",
    ),
    (
        "chat_control_tokens",
        r"(?i)<\|(?:im_start|im_end|system|assistant|user|endoftext)\|>",
    ),
    (
        "bracketed_roles",
        r"(?i)\[/?(?:system|assistant|inst)\]|<<\s*/?sys\s*>>",
    ),
    (
        "jailbreak",
        r"(?i)\b(?:jailbreak|dan\s+mode|developer\s+mode|do\s+anything\s+now)\b",
    ),
    ("role_reassignment", r"(?i)\byou\s+are\s+now\b"),
];

const SUSPICIOUS: &[(&str, &str)] = &[
    ("ignore_keyword", r"(?i)\bignore\b"),
    ("disregard_keyword", r"(?i)\bdisregard\b"),
    ("role_prefix", r"(?i)\b(?:system|assistant)\s*:"),
    (
        "persona_switch",
        r"(?i)\b(?:pretend\s+(?:to\s+be|you\s+are)|act\s+as|role\s*play\s+as)\b",
    ),
    (
        "filter_bypass",
        r"(?i)\b(?:bypass|circumvent)\s+(?:the\s+|your\s+|all\s+)?(?:rules|filters?|restrictions|safety|guidelines)\b",
    ),
];

const ENCODING: &[(&str, &str)] = &[
    ("base64_blob", r"[A-Za-z0-9+/]{40,}={0,2}"),
    ("hex_escapes", r"(?i)(?:\\x[0-9a-f]{2}){3,}"),
    ("unicode_escapes", r"(?i)(?:\\u[0-9a-f]{4}){2,}"),
    ("html_entities", r"(?i)(?:&#x?[0-9a-f]+;){3,}"),
    ("percent_encoding", r"(?i)(?:%[0-9a-f]{2}){4,}"),
    (
        "invisible_characters",
        r"[\u{200B}-\u{200F}\u{202A}-\u{202E}\u{2060}-\u{2064}\u{2066}-\u{2069}\u{FEFF}]",
    ),
];

impl PatternCatalog {
    /// The process-wide catalog.
    pub fn global() -> &'static PatternCatalog {
        static CATALOG: OnceLock<PatternCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            let mut rules = Vec::new();
            rules.extend(compile_all(Severity::Critical, CRITICAL));
            rules.extend(compile_all(Severity::Suspicious, SUSPICIOUS));
            rules.extend(compile_all(Severity::Encoding, ENCODING));
            PatternCatalog {
                version: CATALOG_VERSION,
                rules,
            }
        })
    }

    /// Rules of one severity, in declaration order.
    pub fn rules(&self, severity: Severity) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |r| r.severity == severity)
    }

    /// First rule of `severity` matching `text`.
    pub fn first_match(&self, severity: Severity, text: &str) -> Option<&PatternRule> {
        self.rules(severity).find(|r| r.matches(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_all(severity: Severity, patterns: &[(&'static str, &str)]) -> Vec<PatternRule> {
    patterns
        .iter()
        .filter_map(|&(id, p)| match Regex::new(p) {
            Ok(regex) => Some(PatternRule {
                id,
                severity,
                regex,
            }),
            Err(e) => {
                tracing::warn!("Failed to compile guard pattern '{}': {}", id, e);
                None
            }
        })
        .collect()
}
