//! LLM-backed planner.
//!
//! Turns an utterance plus recent history into at most `max_steps`
//! [`Step`]s. Planning never fails: unparseable output degrades to
//! capability names found in the text, and a failed model call degrades
//! to an empty plan, which the pipeline treats as chit-chat.

use concierge_config::OrchestratorConfig;
use concierge_core::capability::{CapabilityHandle, CapabilityRegistry};
use concierge_core::message::Message;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::json;
use crate::llm::ModelClient;
use crate::prompts;

/// One unit of a plan: capabilities to run together toward a goal.
///
/// Holds resolved handles, so every capability in a step is known to the
/// registry. Immutable; replanning swaps in a new `Step`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    capabilities: Vec<CapabilityHandle>,
    goal: String,
}

impl Step {
    /// Resolve `names` against the registry. Unknown and repeated names are
    /// dropped; `None` if nothing remains.
    pub fn new<S: AsRef<str>>(
        names: &[S],
        goal: impl Into<String>,
        registry: &CapabilityRegistry,
    ) -> Option<Self> {
        let mut capabilities: Vec<CapabilityHandle> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if capabilities.iter().any(|c| c.name() == name) {
                continue;
            }
            match registry.resolve(name) {
                Some(handle) => capabilities.push(handle),
                None => debug!(capability = name, "Dropping unknown capability"),
            }
        }

        if capabilities.is_empty() {
            return None;
        }
        Some(Self {
            capabilities,
            goal: goal.into(),
        })
    }

    pub fn capabilities(&self) -> &[CapabilityHandle] {
        &self.capabilities
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }
}

/// An ordered list of steps. Empty means chit-chat.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub reasoning: Option<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every capability across the plan, first occurrence order.
    pub fn capability_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.steps.iter().flat_map(|s| s.names()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Plans and replans steps with one model call each.
pub struct Planner {
    llm: ModelClient,
    registry: Arc<CapabilityRegistry>,
    max_steps: usize,
    history_turns: usize,
    history_chars: usize,
    temperature: f32,
}

impl Planner {
    pub fn new(
        llm: ModelClient,
        registry: Arc<CapabilityRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            max_steps: config.max_steps,
            history_turns: config.history_window,
            history_chars: config.history_turn_chars,
            temperature: config.planner_temperature,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    fn capability_list(&self) -> String {
        self.registry
            .descriptors()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn planning_prompt(&self, utterance: &str, history: &[Message], hint: Option<&str>) -> String {
        let skip = history.len().saturating_sub(self.history_turns);
        let recent: Vec<String> = history[skip..]
            .iter()
            .map(|m| m.render_line(self.history_chars))
            .collect();

        let mut prompt = format!("Available capabilities:\n{}\n", self.capability_list());
        if !recent.is_empty() {
            prompt.push_str(&format!("\nRecent conversation:\n{}\n", recent.join("\n")));
        }
        if let Some(name) = hint.filter(|name| self.registry.contains(name)) {
            prompt.push_str(&format!("\nLikely capability: {name}\n"));
        }
        prompt.push_str(&format!("\nUser request: {utterance}"));
        prompt
    }

    /// Plan the steps for an utterance. Never fails.
    ///
    /// `hint` names the capability the router's intent points at; it is
    /// shown to the model as a suggestion and ignored if not registered.
    pub async fn plan(
        &self,
        utterance: &str,
        user_id: &str,
        history: &[Message],
        hint: Option<&str>,
    ) -> Plan {
        let prompt = self.planning_prompt(utterance, history, hint);

        let text = match self
            .llm
            .generate(prompts::PLANNER, &prompt, self.temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, error = %e, "Planning call failed, treating as chit-chat");
                return Plan::default();
            }
        };

        let plan = self.parse_plan(&text, utterance);
        info!(
            user_id,
            steps = plan.steps.len(),
            capabilities = ?plan.capability_names(),
            "Plan created"
        );
        plan
    }

    /// Validate model output into a plan.
    ///
    /// Accepts `{"steps": [...]}` and the single-step `{"agents": [...]}`
    /// shape. Output with no JSON object falls back to capability names
    /// mentioned in the text.
    pub fn parse_plan(&self, text: &str, utterance: &str) -> Plan {
        let Some(obj) = json::parse_object(text) else {
            debug!("Planner output is not JSON, extracting capability names");
            return self.fallback_plan(text, utterance);
        };

        let reasoning = obj
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string);

        let steps: Vec<Step> = if let Some(raw_steps) = obj.get("steps").and_then(Value::as_array) {
            raw_steps
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|s| self.step_from_json(s, utterance))
                .take(self.max_steps)
                .collect()
        } else {
            self.step_from_json(&obj, utterance).into_iter().collect()
        };

        Plan { steps, reasoning }
    }

    /// `{"agents": [...], "goal": "..."}` into a step; blank goals become `default_goal`.
    fn step_from_json(&self, obj: &Map<String, Value>, default_goal: &str) -> Option<Step> {
        let names: Vec<&str> = obj
            .get("agents")
            .or_else(|| obj.get("capabilities"))
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_str)
            .collect();

        let goal = obj
            .get("goal")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(default_goal);

        Step::new(&names, goal, &self.registry)
    }

    /// Capability names mentioned anywhere in `text`, as one step.
    fn fallback_plan(&self, text: &str, utterance: &str) -> Plan {
        let words: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .map(str::to_lowercase)
            .collect();

        let mentioned: Vec<&str> = self
            .registry
            .names()
            .into_iter()
            .filter(|name| words.iter().any(|w| w == &name.to_lowercase()))
            .collect();

        Plan {
            steps: Step::new(&mentioned, utterance, &self.registry)
                .into_iter()
                .collect(),
            reasoning: Some("recovered from unstructured planner output".into()),
        }
    }

    /// Ask for an alternative to a failed step. `None` on any failure.
    pub async fn replan(&self, utterance: &str, failed: &Step, reason: &str) -> Option<Step> {
        let prompt = format!(
            "Available capabilities:\n{}\n\nUser request: {utterance}\n\n\
             Failed step: capabilities {:?}, goal \"{}\"\nFailure: {reason}",
            self.capability_list(),
            failed.names(),
            failed.goal(),
        );

        let text = match self
            .llm
            .generate(prompts::REPLANNER, &prompt, self.temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Replanning call failed");
                return None;
            }
        };

        let obj = json::parse_object(&text)?;
        let step = match obj.get("steps").and_then(Value::as_array) {
            Some(steps) => steps
                .iter()
                .filter_map(Value::as_object)
                .find_map(|s| self.step_from_json(s, failed.goal())),
            None => self.step_from_json(&obj, failed.goal()),
        };

        if let Some(step) = &step {
            debug!(capabilities = ?step.names(), goal = step.goal(), "Replanned step");
        }
        step
    }
}
