//! `{{name}}` placeholder substitution.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").ok())
        .as_ref()
}

/// Replace every `{{name}}` with its value.
///
/// Single pass: braces inside substituted values are left alone. Placeholders
/// with no value become the empty string.
pub fn fill_template(template: &str, values: &HashMap<&str, String>) -> String {
    let Some(re) = placeholder() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    })
    .into_owned()
}

/// Names of all placeholders in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let Some(re) = placeholder() else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for caps in re.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
