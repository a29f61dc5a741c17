//! Per-request conversation state.
//!
//! Owned by exactly one pipeline run and discarded when it finishes. The
//! step executor's stage functions take it by `&mut`.

use concierge_config::OrchestratorConfig;
use concierge_core::capability::CapabilityResult;
use concierge_core::entities::EntityContext;
use concierge_core::facts::Fact;
use concierge_core::message::{Message, truncate_chars};
use serde::Serialize;

use crate::planner::{Plan, Step};
use crate::router::{Classification, Intent};

/// Aggregate outcome of one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// First successful capability on success, the failed ones on failure
    pub capability: String,
    pub goal: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Compact rendering of `data` or `error`, bounded in length
    pub summary: String,
}

impl StepResult {
    /// Fold the capability results of one step. The step succeeds only if
    /// every capability succeeded.
    pub fn from_capability_results(
        goal: &str,
        results: &[CapabilityResult],
        summary_chars: usize,
    ) -> Self {
        let failed: Vec<&CapabilityResult> = results.iter().filter(|r| !r.success).collect();

        if failed.is_empty() {
            if let Some(first) = results.iter().find(|r| r.success) {
                let data = first.data.clone().unwrap_or(serde_json::Value::Null);
                let rendered = match &data {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Self {
                    capability: first.capability.clone(),
                    goal: goal.to_string(),
                    success: true,
                    summary: truncate_chars(&rendered, summary_chars).to_string(),
                    data: Some(data),
                    error: None,
                };
            }
        }

        let (capability, error) = if failed.is_empty() {
            (String::new(), "no capability was executed".to_string())
        } else {
            let names: Vec<&str> = failed.iter().map(|r| r.capability.as_str()).collect();
            let errors: Vec<String> = failed
                .iter()
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.capability,
                        r.error.as_deref().unwrap_or("unknown error")
                    )
                })
                .collect();
            (names.join(", "), errors.join("; "))
        };

        Self {
            capability,
            goal: goal.to_string(),
            success: false,
            data: None,
            summary: truncate_chars(&error, summary_chars).to_string(),
            error: Some(error),
        }
    }
}

/// Everything one pipeline run knows about the request.
#[derive(Debug)]
pub struct ConversationState {
    pub user_id: String,
    pub utterance: String,
    /// Recent messages, oldest first, bounded by `history_window`
    pub history: Vec<Message>,
    pub intent: Intent,
    pub confidence: f32,
    pub plan: Vec<Step>,
    pub current_step: usize,
    pub step_results: Vec<StepResult>,
    /// Retries spent on the active step; reset when the index advances
    pub retry_count: u32,
    pub max_steps: usize,
    pub max_retries: u32,
    /// Input of the active step: utterance plus prior summaries, maybe rewritten
    pub working_context: String,
    /// Raw results of the active step, in capability order
    pub capability_results: Vec<CapabilityResult>,
    /// Facts recalled for the response
    pub facts: Vec<Fact>,
    /// Known entities recalled for the response
    pub entities: Vec<EntityContext>,
    pub response: Option<String>,
}

impl ConversationState {
    pub fn new(
        user_id: impl Into<String>,
        utterance: impl Into<String>,
        history: Vec<Message>,
        config: &OrchestratorConfig,
    ) -> Self {
        let utterance = utterance.into();
        Self {
            user_id: user_id.into(),
            working_context: utterance.clone(),
            utterance,
            history,
            intent: Intent::Complex,
            confidence: 0.0,
            plan: Vec::new(),
            current_step: 0,
            step_results: Vec::new(),
            retry_count: 0,
            max_steps: config.max_steps,
            max_retries: config.max_retries_per_step,
            capability_results: Vec::new(),
            facts: Vec::new(),
            entities: Vec::new(),
            response: None,
        }
    }

    pub fn set_classification(&mut self, classification: Classification) {
        self.intent = classification.intent;
        self.confidence = classification.confidence;
    }

    /// Install a plan, keeping at most `max_steps` steps.
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = plan.steps;
        self.plan.truncate(self.max_steps);
        self.current_step = 0;
        self.retry_count = 0;
        self.step_results.clear();
    }

    pub fn active_step(&self) -> Option<&Step> {
        self.plan.get(self.current_step)
    }

    pub fn has_more_steps(&self) -> bool {
        self.current_step + 1 < self.plan.len()
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &StepResult> {
        self.step_results.iter().filter(|r| !r.success)
    }

    /// Utterance followed by a bulleted summary of every completed step.
    pub fn build_working_context(&self) -> String {
        if self.step_results.is_empty() {
            return self.utterance.clone();
        }

        let mut context = format!("{}\n\nResults of previous steps:", self.utterance);
        for result in &self.step_results {
            let status = if result.success { "ok" } else { "failed" };
            context.push_str(&format!(
                "\n- [{}] {} ({status}): {}",
                result.capability, result.goal, result.summary
            ));
        }
        context
    }
}
