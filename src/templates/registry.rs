//! Static per-mode variable schemas.
//!
//! Each mode declares which variables its templates accept, which are
//! required, and how values are checked before a render is attempted.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};

/// How a variable's value is validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableKind {
    Text,
    /// Numeric, accepting JSON numbers or numeric strings, with an
    /// inclusive range.
    Number { min: f64, max: f64 },
    Enumeration(&'static [&'static str]),
}

/// One variable a mode's templates may reference.
#[derive(Debug, Clone, Copy)]
pub struct VariableSpec {
    pub name: &'static str,
    pub kind: VariableKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: VariableKind) -> VariableSpec {
    VariableSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: VariableKind) -> VariableSpec {
    VariableSpec {
        name,
        kind,
        required: false,
    }
}

const COMPARE_VARIABLES: &[VariableSpec] = &[
    required("prompt", VariableKind::Text),
    optional("context", VariableKind::Text),
];

const BATTLE_VARIABLES: &[VariableSpec] = &[
    required("prompt", VariableKind::Text),
    optional("response", VariableKind::Text),
    optional(
        "battleType",
        VariableKind::Enumeration(&["critique", "improve", "defend"]),
    ),
];

const DEBATE_VARIABLES: &[VariableSpec] = &[
    required("topic", VariableKind::Text),
    required("intensity", VariableKind::Number { min: 1.0, max: 10.0 }),
    required("role", VariableKind::Enumeration(&["pro", "con"])),
    required("position", VariableKind::Text),
    required("originalPrompt", VariableKind::Text),
    optional("response", VariableKind::Text),
    optional("turnNumber", VariableKind::Number { min: 1.0, max: 1000.0 }),
];

const VIXRA_VARIABLES: &[VariableSpec] = &[
    required("Title", VariableKind::Text),
    required("Authors", VariableKind::Text),
    optional("Institution", VariableKind::Text),
    optional("ScienceField", VariableKind::Text),
    optional("Abstract", VariableKind::Text),
];

/// Variable schema for a mode, if the mode is known.
pub fn mode_schema(mode: &str) -> Option<&'static [VariableSpec]> {
    match mode {
        "compare" => Some(COMPARE_VARIABLES),
        "battle" => Some(BATTLE_VARIABLES),
        "debate" => Some(DEBATE_VARIABLES),
        "vixra" => Some(VIXRA_VARIABLES),
        _ => None,
    }
}

/// Whether a mode's schema declares a variable name.
pub fn known_variable(mode: &str, name: &str) -> bool {
    mode_schema(mode)
        .map(|schema| schema.iter().any(|spec| spec.name == name))
        .unwrap_or(false)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Validate a variable map against a mode's schema.
///
/// Unknown extra keys are ignored; templates simply never reference
/// them. Errors carry a message suitable for a 400 response.
pub fn validate_variables(mode: &str, vars: &HashMap<String, Value>) -> TemplateResult<()> {
    let schema = mode_schema(mode).ok_or_else(|| TemplateError::Validation {
        mode: mode.to_string(),
        message: format!("Unknown template mode: {mode}"),
    })?;

    for spec in schema {
        let value = match vars.get(spec.name) {
            Some(v) if !v.is_null() => v,
            _ => {
                if spec.required {
                    return Err(TemplateError::Validation {
                        mode: mode.to_string(),
                        message: format!("Required variable missing: {}", spec.name),
                    });
                }
                continue;
            }
        };

        match spec.kind {
            VariableKind::Text => {
                if as_text(value).is_none() {
                    return Err(TemplateError::Validation {
                        mode: mode.to_string(),
                        message: format!("Variable {} must be a string", spec.name),
                    });
                }
            }
            VariableKind::Number { min, max } => {
                let n = as_number(value).ok_or_else(|| TemplateError::Validation {
                    mode: mode.to_string(),
                    message: format!("Variable {} must be numeric", spec.name),
                })?;
                if n < min || n > max {
                    return Err(TemplateError::Validation {
                        mode: mode.to_string(),
                        message: format!(
                            "Variable {} must be between {} and {}",
                            spec.name, min, max
                        ),
                    });
                }
            }
            VariableKind::Enumeration(allowed) => {
                let text = as_text(value).unwrap_or_default();
                if !allowed.contains(&text.as_str()) {
                    return Err(TemplateError::Validation {
                        mode: mode.to_string(),
                        message: format!(
                            "Invalid value for {}: expected one of {}",
                            spec.name,
                            allowed.join(", ")
                        ),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Coerce validated variables into the string map the engine consumes.
pub fn stringify_variables(vars: &HashMap<String, Value>) -> HashMap<String, String> {
    vars.iter()
        .filter_map(|(k, v)| as_text(v).map(|text| (k.clone(), text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn debate_vars() -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert("topic".to_string(), json!("tabs vs spaces"));
        vars.insert("intensity".to_string(), json!(7));
        vars.insert("role".to_string(), json!("pro"));
        vars.insert("position".to_string(), json!("tabs are better"));
        vars.insert("originalPrompt".to_string(), json!("Which is better?"));
        vars
    }

    #[test]
    fn test_valid_debate_variables() {
        assert!(validate_variables("debate", &debate_vars()).is_ok());
    }

    #[test]
    fn test_missing_role_is_named_in_error() {
        let mut vars = debate_vars();
        vars.remove("role");
        let err = validate_variables("debate", &vars).unwrap_err();
        assert!(err.to_string().contains("Required variable missing: role"));
    }

    #[test]
    fn test_role_enum_membership() {
        let mut vars = debate_vars();
        vars.insert("role".to_string(), json!("moderator"));
        let err = validate_variables("debate", &vars).unwrap_err();
        assert!(err.to_string().contains("pro, con"));
    }

    #[test]
    fn test_intensity_coerces_numeric_strings() {
        let mut vars = debate_vars();
        vars.insert("intensity".to_string(), json!("8"));
        assert!(validate_variables("debate", &vars).is_ok());
    }

    #[test]
    fn test_intensity_range() {
        let mut vars = debate_vars();
        vars.insert("intensity".to_string(), json!(11));
        let err = validate_variables("debate", &vars).unwrap_err();
        assert!(err.to_string().contains("between 1 and 10"));

        vars.insert("intensity".to_string(), json!("not a number"));
        let err = validate_variables("debate", &vars).unwrap_err();
        assert!(err.to_string().contains("must be numeric"));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = validate_variables("karaoke", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("Unknown template mode"));
    }

    #[test]
    fn test_extra_keys_ignored() {
        let mut vars = debate_vars();
        vars.insert("sessionId".to_string(), json!("abc"));
        assert!(validate_variables("debate", &vars).is_ok());
    }

    #[test]
    fn test_known_variable_lookup() {
        assert!(known_variable("debate", "intensity"));
        assert!(!known_variable("debate", "sessionId"));
        assert!(!known_variable("karaoke", "topic"));
    }

    #[test]
    fn test_stringify_keeps_numbers() {
        let vars = debate_vars();
        let strings = stringify_variables(&vars);
        assert_eq!(strings.get("intensity").map(String::as_str), Some("7"));
        assert_eq!(strings.get("role").map(String::as_str), Some("pro"));
    }
}
