//! Markdown and plain-text exporters for persisted records.

use std::collections::HashMap;

use serde_json::Value;

use crate::storage::{Comparison, DebateSession, VixraSection};

/// Render a comparison as a markdown document.
pub fn comparison_markdown(comparison: &Comparison) -> String {
    let mut out = String::new();
    out.push_str("# Model Comparison\n\n");
    out.push_str(&format!("**Prompt:** {}\n\n", comparison.prompt));
    out.push_str(&format!(
        "**Date:** {}\n\n",
        comparison.created_at.format("%Y-%m-%d %H:%M UTC")
    ));

    for model_id in &comparison.model_ids {
        match comparison.responses.get(model_id) {
            Some(response) => {
                out.push_str(&format!("## {}\n\n", model_id));
                if let Some(reasoning) = &response.reasoning {
                    out.push_str("### Reasoning\n\n");
                    out.push_str(reasoning);
                    out.push_str("\n\n");
                }
                out.push_str(&response.content);
                out.push_str(&format!(
                    "\n\n_{} ms · {} in / {} out tokens · ${:.6}_\n\n",
                    response.response_time_ms,
                    response.token_usage.input,
                    response.token_usage.output,
                    response.cost.total
                ));
            }
            None => {
                out.push_str(&format!("## {} (no response)\n\n", model_id));
                out.push_str("No response was recorded for this model.\n\n");
            }
        }
    }

    out.push_str("---\n\n");
    out.push_str(&format!("**Total cost:** ${:.6}\n", comparison.total_cost));
    out
}

/// Render a comparison as plain text.
pub fn comparison_text(comparison: &Comparison) -> String {
    let mut out = String::new();
    out.push_str(&format!("MODEL COMPARISON\nPrompt: {}\n", comparison.prompt));

    for model_id in &comparison.model_ids {
        out.push_str(&format!("\n{}\n{}\n", model_id, "=".repeat(model_id.len())));
        match comparison.responses.get(model_id) {
            Some(response) => {
                out.push_str(&response.content);
                out.push('\n');
            }
            None => out.push_str("(no response recorded)\n"),
        }
    }

    out.push_str(&format!("\nTotal cost: ${:.6}\n", comparison.total_cost));
    out
}

/// Render a debate transcript as markdown, one section per turn.
pub fn debate_markdown(session: &DebateSession) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Debate: {}\n\n", session.topic));
    out.push_str(&format!("**Pro:** {}\n\n", session.model_a));
    out.push_str(&format!("**Con:** {}\n\n", session.model_b));
    out.push_str(&format!("**Intensity:** {}/10\n\n", session.intensity));
    out.push_str(&format!("**Status:** {}\n\n", session.status));

    for turn in &session.turns {
        let side = if turn.model_id == session.model_a {
            "pro"
        } else {
            "con"
        };
        out.push_str(&format!(
            "## Turn {} — {} ({})\n\n",
            turn.turn_number, turn.model_id, side
        ));
        if let Some(reasoning) = &turn.reasoning {
            out.push_str("### Reasoning\n\n");
            out.push_str(reasoning);
            out.push_str("\n\n");
        }
        out.push_str(&turn.content);
        out.push_str("\n\n");
    }

    out.push_str("---\n\n");
    out.push_str(&format!("**Total cost:** ${:.6}\n", session.total_cost));
    out
}

/// Render a debate transcript as plain text.
pub fn debate_text(session: &DebateSession) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "DEBATE: {}\nPro: {}\nCon: {}\nIntensity: {}/10\n",
        session.topic, session.model_a, session.model_b, session.intensity
    ));

    for turn in &session.turns {
        let side = if turn.model_id == session.model_a {
            "pro"
        } else {
            "con"
        };
        out.push_str(&format!(
            "\n[Turn {}] {} ({})\n{}\n",
            turn.turn_number, turn.model_id, side, turn.content
        ));
    }

    out.push_str(&format!("\nTotal cost: ${:.6}\n", session.total_cost));
    out
}

fn var_text(variables: &HashMap<String, Value>, key: &str) -> Option<String> {
    variables.get(key).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Assemble a vixra paper from its variables and generated sections.
///
/// Only supplied front-matter lines appear; nothing is invented for
/// missing variables. A missing abstract renders as "(pending)".
pub fn vixra_paper(variables: &HashMap<String, Value>, sections: &[VixraSection]) -> String {
    let title = var_text(variables, "Title").unwrap_or_else(|| "Untitled".to_string());
    let authors = var_text(variables, "Authors").unwrap_or_else(|| "Anonymous".to_string());

    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title));
    out.push_str(&format!("**Authors:** {}\n\n", authors));
    if let Some(institution) = var_text(variables, "Institution") {
        out.push_str(&format!("**Institution:** {}\n\n", institution));
    }
    if let Some(field) = var_text(variables, "ScienceField") {
        out.push_str(&format!("**Field:** {}\n\n", field));
    }

    let is_abstract =
        |s: &VixraSection| s.title.eq_ignore_ascii_case("abstract") || s.section_id.contains("abstract");

    out.push_str("## Abstract\n\n");
    let abstract_body = sections
        .iter()
        .find(|s| is_abstract(s))
        .map(|s| s.content.clone())
        .or_else(|| var_text(variables, "Abstract"))
        .unwrap_or_else(|| "(pending)".to_string());
    out.push_str(&abstract_body);
    out.push_str("\n\n");

    for section in sections.iter().filter(|s| !is_abstract(s)) {
        out.push_str(&format!("## {}\n\n", section.title));
        out.push_str(&section.content);
        out.push_str("\n\n");
    }

    out
}
