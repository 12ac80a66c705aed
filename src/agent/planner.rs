use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::tools::{ExecutedCall, ToolSpec};
use crate::error::PlanError;
use crate::models::{LanguageModel, ModelRequest};
use crate::session::Message;

const PLANNER_SYSTEM: &str =
    "You plan database operations for a library bookstore assistant. Answer with JSON only.";
const NARRATOR_SYSTEM: &str = "You are the friendly front desk assistant of a library bookstore.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        utterance: &str,
        history: &[Message],
        catalog: &[ToolSpec],
    ) -> Result<Vec<PlannedCall>, PlanError>;

    async fn narrate(
        &self,
        utterance: &str,
        trace: &[ExecutedCall],
    ) -> Result<String, PlanError>;
}

pub struct LlmPlanner {
    model: Arc<dyn LanguageModel>,
    model_name: String,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, model_name: String) -> Self {
        Self { model, model_name }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        utterance: &str,
        history: &[Message],
        catalog: &[ToolSpec],
    ) -> Result<Vec<PlannedCall>, PlanError> {
        let prompt = plan_prompt(utterance, history, catalog);
        let resp = self
            .model
            .generate(ModelRequest {
                model: self.model_name.clone(),
                prompt,
                system: Some(PLANNER_SYSTEM.into()),
                temperature: Some(0.0),
                max_tokens: Some(800),
            })
            .await
            .map_err(PlanError::Model)?;
        let plan = parse_plan(&resp.content)?;
        tracing::debug!(steps = plan.len(), "plan parsed");
        Ok(plan)
    }

    async fn narrate(
        &self,
        utterance: &str,
        trace: &[ExecutedCall],
    ) -> Result<String, PlanError> {
        let prompt = narrate_prompt(utterance, trace);
        let resp = self
            .model
            .generate(ModelRequest {
                model: self.model_name.clone(),
                prompt,
                system: Some(NARRATOR_SYSTEM.into()),
                temperature: None,
                max_tokens: Some(500),
            })
            .await
            .map_err(PlanError::Model)?;
        let reply = resp.content.trim().to_string();
        if reply.is_empty() {
            return Err(PlanError::Unparseable { raw: resp.content });
        }
        Ok(reply)
    }
}

fn plan_prompt(utterance: &str, history: &[Message], catalog: &[ToolSpec]) -> String {
    let mut tools = String::new();
    for spec in catalog {
        tools.push_str(&format!(
            "- {}: {}\n  args schema: {}\n",
            spec.name, spec.description, spec.args
        ));
    }
    let mut convo = String::new();
    for msg in history {
        convo.push_str(&format!("{}: {}\n", msg.role.as_str(), msg.content));
    }
    if convo.is_empty() {
        convo.push_str("(none)\n");
    }
    format!(
        "You route customer requests for a library bookstore to database tools.\n\n\
         Available tools:\n{tools}\n\
         Recent conversation:\n{convo}\n\
         Customer request: {utterance}\n\n\
         Reply with ONLY a JSON array of the tool calls to run, in order. Each entry \
         is {{\"tool\": \"<name>\", \"args\": {{...}}}}. Argument values must be \
         concrete, prices in dollars. Use [] when no tool fits the request."
    )
}

fn narrate_prompt(utterance: &str, trace: &[ExecutedCall]) -> String {
    let mut lines = String::new();
    if trace.is_empty() {
        lines.push_str("(no operations were needed)\n");
    }
    for (i, call) in trace.iter().enumerate() {
        let status = if call.success { "ok" } else { "FAILED" };
        lines.push_str(&format!(
            "{}. {} args {} -> {}: {}\n",
            i + 1,
            call.tool_name,
            call.input_args,
            status,
            call.output
        ));
    }
    format!(
        "A customer of the library bookstore asked:\n{utterance}\n\n\
         These operations ran in order:\n{lines}\n\
         Write a short, friendly reply to the customer. Use only the numbers and \
         facts in the results above; never invent data. If an operation failed, \
         say what went wrong and what the customer can do instead. Do not mention \
         tool names or internal details."
    )
}

// Tolerates markdown fences, prose around the JSON, and a single object
// instead of an array.
pub(crate) fn parse_plan(raw: &str) -> Result<Vec<PlannedCall>, PlanError> {
    let cleaned = strip_fences(raw);
    let Some(candidate) = extract_json(cleaned) else {
        tracing::warn!(raw, "model plan did not contain JSON");
        return Err(PlanError::Unparseable { raw: raw.to_string() });
    };
    let parsed: Result<Vec<PlannedCall>, _> = if candidate.starts_with('[') {
        serde_json::from_str(candidate)
    } else {
        serde_json::from_str::<PlannedCall>(candidate).map(|c| vec![c])
    };
    let mut calls = parsed.map_err(|e| {
        tracing::warn!(raw, error = %e, "model plan did not parse");
        PlanError::Unparseable { raw: raw.to_string() }
    })?;
    for call in &mut calls {
        if call.args.is_null() {
            call.args = Value::Object(Default::default());
        }
    }
    Ok(calls)
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest.trim())
}

// First balanced JSON array or object; brackets inside string literals
// do not count.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let open = text[start..].chars().next()?;
    let close = if open == '[' { ']' } else { '}' };
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + i + ch.len_utf8()]);
            }
        }
    }
    None
}
