//! Placeholder substitution for prompt templates.
//!
//! Placeholders are `{name}` or `{name|default}`. Names start with a
//! letter, so JSON braces in template bodies are left alone.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

use crate::config::TemplatePolicy;
use crate::error::{TemplateError, TemplateResult};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z][A-Za-z0-9_]*)(?:\|([^{}|]*))?\}").expect("placeholder regex")
});

/// A placeholder found in a template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVariable {
    pub name: String,
    pub default: Option<String>,
}

/// Extract placeholders from a template body, first occurrence wins.
pub fn extract_variables(body: &str) -> Vec<TemplateVariable> {
    let mut seen = Vec::new();
    let mut variables = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(body) {
        let name = caps[1].to_string();
        if seen.contains(&name) {
            continue;
        }
        seen.push(name.clone());
        variables.push(TemplateVariable {
            name,
            default: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }
    variables
}

/// Substitute placeholders in `body` from `vars`, falling back to
/// inline defaults.
///
/// Unresolved placeholders are left in place with a warning under
/// `Warn`, and fail the render under `Strict`. Once nothing is left
/// unresolved the operation is idempotent.
pub fn substitute(
    template_id: &str,
    body: &str,
    vars: &HashMap<String, String>,
    policy: TemplatePolicy,
) -> TemplateResult<String> {
    let mut unresolved: Vec<String> = Vec::new();

    let rendered = PLACEHOLDER_RE.replace_all(body, |caps: &Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = vars.get(name) {
            return value.clone();
        }
        if let Some(default) = caps.get(2) {
            return default.as_str().to_string();
        }
        if !unresolved.iter().any(|n| n == name) {
            unresolved.push(name.to_string());
        }
        caps[0].to_string()
    });

    if unresolved.is_empty() {
        return Ok(rendered.into_owned());
    }

    match policy {
        TemplatePolicy::Warn => {
            for name in &unresolved {
                warn!(template_id, variable = %name, "Unresolved template variable");
            }
            Ok(rendered.into_owned())
        }
        TemplatePolicy::Strict => Err(TemplateError::UnresolvedVariable {
            name: unresolved.remove(0),
            template_id: template_id.to_string(),
        }),
    }
}
