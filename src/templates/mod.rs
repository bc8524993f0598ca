//! Prompt template catalog.
//!
//! Templates are markdown files in the prompts directory, one file per
//! mode. Each file opens with front matter (`version`, `mode`) between
//! `---` fences, followed by `## Category` / `### Template Name`
//! sections whose bodies carry `{name}` / `{name|default}` placeholders.
//! The whole directory is parsed into a typed catalog once at startup
//! and every template is checked against its mode's variable schema.

pub mod engine;
pub mod registry;

pub use engine::{extract_variables, substitute, TemplateVariable};
pub use registry::{mode_schema, validate_variables, VariableKind, VariableSpec};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{TemplateConfig, TemplatePolicy};
use crate::error::{TemplateError, TemplateResult};

/// A parsed prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Slug derived from the section header, unique within a mode.
    pub id: String,
    pub name: String,
    pub category: String,
    pub mode: String,
    pub version: u32,
    pub body: String,
    pub variables: Vec<TemplateVariable>,
}

/// All templates known to the server, loaded once at startup.
#[derive(Debug)]
pub struct TemplateCatalog {
    templates: Vec<PromptTemplate>,
    policy: TemplatePolicy,
}

impl TemplateCatalog {
    /// Load and validate every `.md` template file in the prompts
    /// directory.
    ///
    /// Under the `warn` policy schema mismatches are logged and startup
    /// proceeds; under `strict` they fail the load.
    pub fn load(config: &TemplateConfig) -> TemplateResult<Self> {
        let mut entries: Vec<_> =
            fs::read_dir(&config.prompts_dir)?.collect::<Result<_, std::io::Error>>()?;
        entries.sort_by_key(|e| e.file_name());

        let mut templates = Vec::new();
        for entry in entries {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let parsed = parse_template_file(&path, &content)?;
            debug!(file = %path.display(), count = parsed.len(), "Parsed template file");
            templates.extend(parsed);
        }

        if templates.is_empty() {
            warn!(dir = %config.prompts_dir.display(), "No prompt templates found");
        }

        let catalog = Self {
            templates,
            policy: config.policy,
        };
        catalog.validate()?;
        info!(
            templates = catalog.templates.len(),
            policy = %catalog.policy,
            "Template catalog loaded"
        );
        Ok(catalog)
    }

    /// Look up a template by mode and id.
    pub fn get(&self, mode: &str, template_id: &str) -> TemplateResult<&PromptTemplate> {
        self.templates
            .iter()
            .find(|t| t.mode == mode && t.id == template_id)
            .ok_or_else(|| TemplateError::NotFound {
                mode: mode.to_string(),
                template_id: template_id.to_string(),
            })
    }

    /// Templates belonging to one mode, in file order.
    pub fn templates_for_mode(&self, mode: &str) -> Vec<&PromptTemplate> {
        self.templates.iter().filter(|t| t.mode == mode).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Validate variables for the mode, then render the template.
    pub fn render(
        &self,
        mode: &str,
        template_id: &str,
        vars: &HashMap<String, Value>,
    ) -> TemplateResult<String> {
        registry::validate_variables(mode, vars)?;
        let template = self.get(mode, template_id)?;
        let strings = registry::stringify_variables(vars);
        engine::substitute(&template.id, &template.body, &strings, self.policy)
    }

    fn validate(&self) -> TemplateResult<()> {
        for template in &self.templates {
            // Prove the body renders with a value for every placeholder
            let synthetic: HashMap<String, String> = template
                .variables
                .iter()
                .map(|v| (v.name.clone(), format!("test-{}", v.name)))
                .collect();
            if let Err(e) = engine::substitute(
                &template.id,
                &template.body,
                &synthetic,
                TemplatePolicy::Strict,
            ) {
                match self.policy {
                    TemplatePolicy::Warn => {
                        warn!(template = %template.id, error = %e, "Template failed synthetic render");
                    }
                    TemplatePolicy::Strict => return Err(e),
                }
            }

            for variable in &template.variables {
                if !registry::known_variable(&template.mode, &variable.name) {
                    match self.policy {
                        TemplatePolicy::Warn => {
                            warn!(
                                template = %template.id,
                                mode = %template.mode,
                                variable = %variable.name,
                                "Template variable missing from mode schema"
                            );
                        }
                        TemplatePolicy::Strict => {
                            return Err(TemplateError::Validation {
                                mode: template.mode.clone(),
                                message: format!(
                                    "Template {} references unknown variable {}",
                                    template.id, variable.name
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_template_file(path: &Path, content: &str) -> TemplateResult<Vec<PromptTemplate>> {
    let parse_err = |message: &str| TemplateError::Parse {
        path: path.display().to_string(),
        message: message.to_string(),
    };

    let mut lines = content.lines();
    match lines.next() {
        Some(line) if line.trim() == "---" => {}
        _ => return Err(parse_err("missing front matter fence")),
    }

    let mut mode: Option<String> = None;
    let mut version: u32 = 1;
    loop {
        let Some(line) = lines.next() else {
            return Err(parse_err("unterminated front matter"));
        };
        let line = line.trim();
        if line == "---" {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "mode" => mode = Some(value.trim().to_string()),
                "version" => {
                    version = value
                        .trim()
                        .parse()
                        .map_err(|_| parse_err("version must be an integer"))?;
                }
                _ => {}
            }
        }
    }
    let mode = mode.ok_or_else(|| parse_err("front matter missing mode"))?;

    let mut templates: Vec<PromptTemplate> = Vec::new();
    let mut category = String::from("General");
    let mut current: Option<(String, String)> = None;

    let finish = |templates: &mut Vec<PromptTemplate>,
                  category: &str,
                  current: &mut Option<(String, String)>| {
        if let Some((name, body)) = current.take() {
            let body = body.trim().to_string();
            let variables = engine::extract_variables(&body);
            let id = slug(&name);
            if templates.iter().any(|t: &PromptTemplate| t.id == id) {
                warn!(file = %path.display(), template = %id, "Duplicate template id, keeping first");
                return;
            }
            templates.push(PromptTemplate {
                id,
                name,
                category: category.to_string(),
                mode: mode.clone(),
                version,
                body,
                variables,
            });
        }
    };

    for line in lines {
        if let Some(heading) = line.strip_prefix("### ") {
            finish(&mut templates, &category, &mut current);
            current = Some((heading.trim().to_string(), String::new()));
        } else if let Some(heading) = line.strip_prefix("## ") {
            finish(&mut templates, &category, &mut current);
            category = heading.trim().to_string();
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    finish(&mut templates, &category, &mut current);

    Ok(templates)
}

/// Lowercase, hyphen-separated id from a section header.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    const DEBATE_FILE: &str = "---\n\
version: 2\n\
mode: debate\n\
---\n\
\n\
## Opening Statements\n\
\n\
### Pro Opening\n\
\n\
You argue {role} on \"{topic}\" at intensity {intensity|5}.\n\
Your position: {position}\n\
Original question: {originalPrompt}\n\
\n\
### Con Opening\n\
\n\
You argue {role} against \"{topic}\".\n\
Your position: {position}\n\
Original question: {originalPrompt}\n\
\n\
## Rebuttals\n\
\n\
### Standard Rebuttal\n\
\n\
Respond to your opponent on {topic}: {response|}\n";

    fn write_fixture(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn load_dir(dir: &TempDir, policy: TemplatePolicy) -> TemplateResult<TemplateCatalog> {
        TemplateCatalog::load(&TemplateConfig {
            prompts_dir: PathBuf::from(dir.path()),
            policy,
        })
    }

    #[test]
    fn test_parses_categories_and_templates() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "debate.md", DEBATE_FILE);
        let catalog = load_dir(&dir, TemplatePolicy::Warn).unwrap();

        assert_eq!(catalog.len(), 3);
        let opening = catalog.get("debate", "pro-opening").unwrap();
        assert_eq!(opening.category, "Opening Statements");
        assert_eq!(opening.version, 2);
        let names: Vec<&str> = opening.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["role", "topic", "intensity", "position", "originalPrompt"]);

        let rebuttal = catalog.get("debate", "standard-rebuttal").unwrap();
        assert_eq!(rebuttal.category, "Rebuttals");
        assert_eq!(rebuttal.variables[1].default.as_deref(), Some(""));
    }

    #[test]
    fn test_missing_front_matter_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "bad.md", "## Category\n### T\nbody\n");
        let err = load_dir(&dir, TemplatePolicy::Warn).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_front_matter_requires_mode() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "bad.md", "---\nversion: 1\n---\n### T\nbody\n");
        let err = load_dir(&dir, TemplatePolicy::Warn).unwrap_err();
        assert!(err.to_string().contains("missing mode"));
    }

    #[test]
    fn test_unknown_variable_warn_vs_strict() {
        let fixture = "---\nmode: debate\n---\n### Odd One\nUses {mysteryVariable}.\n";
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "debate.md", fixture);

        assert!(load_dir(&dir, TemplatePolicy::Warn).is_ok());

        let err = load_dir(&dir, TemplatePolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("mysteryVariable"));
    }

    #[test]
    fn test_get_unknown_template() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "debate.md", DEBATE_FILE);
        let catalog = load_dir(&dir, TemplatePolicy::Warn).unwrap();

        let err = catalog.get("debate", "surprise").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
        assert!(catalog.get("compare", "pro-opening").is_err());
    }

    #[test]
    fn test_render_validates_then_substitutes() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "debate.md", DEBATE_FILE);
        let catalog = load_dir(&dir, TemplatePolicy::Warn).unwrap();

        let mut vars = HashMap::new();
        vars.insert("topic".to_string(), json!("tabs vs spaces"));
        vars.insert("intensity".to_string(), json!(7));
        vars.insert("role".to_string(), json!("pro"));
        vars.insert("position".to_string(), json!("tabs win"));
        vars.insert("originalPrompt".to_string(), json!("Which indentation?"));

        let rendered = catalog.render("debate", "pro-opening", &vars).unwrap();
        assert!(rendered.contains("argue pro on \"tabs vs spaces\" at intensity 7"));
        assert!(rendered.contains("Your position: tabs win"));

        vars.remove("role");
        let err = catalog.render("debate", "pro-opening", &vars).unwrap_err();
        assert!(err.to_string().contains("Required variable missing: role"));
    }

    #[test]
    fn test_templates_for_mode() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir, "debate.md", DEBATE_FILE);
        write_fixture(
            &dir,
            "compare.md",
            "---\nmode: compare\n---\n### Plain\n{prompt}\n",
        );
        let catalog = load_dir(&dir, TemplatePolicy::Warn).unwrap();

        assert_eq!(catalog.templates_for_mode("debate").len(), 3);
        assert_eq!(catalog.templates_for_mode("compare").len(), 1);
        assert!(catalog.templates_for_mode("vixra").is_empty());
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Pro Opening"), "pro-opening");
        assert_eq!(slug("  Fiery  Rebuttal! "), "fiery-rebuttal");
        assert_eq!(slug("GPT-4o vs Claude"), "gpt-4o-vs-claude");
    }
}
