//! `{variable}` placeholder handling for prompt templates.
//!
//! A placeholder is `{` followed by one or more word characters
//! (alphanumeric or `_`) and `}`. Any other brace is literal text.

use crate::error::PlanningError;
use indexmap::IndexMap;

/// Placeholder names in order of first appearance, without duplicates.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, name) in scan(template) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Check that placeholders and variable domains match exactly.
///
/// All unknown placeholders and unused variables are reported together.
pub fn validate(template: &str, domains: &IndexMap<String, Vec<String>>) -> Result<(), PlanningError> {
    if template.trim().is_empty() {
        return Err(PlanningError::EmptyTemplate);
    }
    let used = placeholders(template);
    let unknown: Vec<String> = used
        .iter()
        .filter(|name| !domains.contains_key(name.as_str()))
        .cloned()
        .collect();
    let unused: Vec<String> = domains
        .keys()
        .filter(|name| !used.contains(name))
        .cloned()
        .collect();
    if !unknown.is_empty() || !unused.is_empty() {
        return Err(PlanningError::Validation { unknown, unused });
    }
    if let Some((name, _)) = domains.iter().find(|(_, values)| values.is_empty()) {
        return Err(PlanningError::EmptyDomain(name.clone()));
    }
    Ok(())
}

/// Substitute bindings into the template in a single pass.
///
/// Values are inserted verbatim; braces inside a value are never expanded.
/// Placeholders without a binding are left untouched.
pub fn render(template: &str, bindings: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for (start, name) in scan(template) {
        let end = start + name.len() + 2;
        if let Some(value) = bindings.get(name) {
            out.push_str(&template[cursor..start]);
            out.push_str(value);
            cursor = end;
        }
    }
    out.push_str(&template[cursor..]);
    out
}

/// Byte offset of each placeholder's opening brace and its name.
fn scan(template: &str) -> Vec<(usize, &str)> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let mut j = name_start;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
            j += 1;
        }
        if j > name_start && j < bytes.len() && bytes[j] == b'}' {
            found.push((i, &template[name_start..j]));
            i = j + 1;
        } else {
            i += 1;
        }
    }
    found
}
