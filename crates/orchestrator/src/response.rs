//! Final reply generation.
//!
//! Two paths: chit-chat answers from history alone; the action path
//! grounds the reply in the step results. Failed steps are always stated
//! in a deterministic footer, and a failed model call falls back to a
//! reply assembled from the step summaries.

use concierge_core::entities::EntityContext;
use concierge_core::facts::Fact;
use concierge_core::message::Message;
use tracing::warn;

use crate::llm::ModelClient;
use crate::prompts;
use crate::state::{ConversationState, StepResult};

const CHITCHAT_FALLBACK: &str = "Sorry, I can't answer right now. Please try again in a moment.";

pub struct ResponseGenerator {
    llm: ModelClient,
    temperature: f32,
    history_turns: usize,
    history_chars: usize,
}

impl ResponseGenerator {
    pub fn new(llm: ModelClient, temperature: f32, history_turns: usize, history_chars: usize) -> Self {
        Self {
            llm,
            temperature,
            history_turns,
            history_chars,
        }
    }

    fn history_messages(&self, history: &[Message]) -> Vec<Message> {
        let skip = history.len().saturating_sub(self.history_turns);
        history[skip..].to_vec()
    }

    fn facts_block(facts: &[Fact]) -> Option<String> {
        if facts.is_empty() {
            return None;
        }
        let lines: Vec<String> = facts
            .iter()
            .map(|f| format!("- ({}) {}", f.category, f.content))
            .collect();
        Some(format!("What you remember about the user:\n{}", lines.join("\n")))
    }

    fn entities_block(entities: &[EntityContext]) -> Option<String> {
        if entities.is_empty() {
            return None;
        }
        let lines: Vec<String> = entities.iter().map(EntityContext::render).collect();
        Some(format!("Known people and organizations:\n{}", lines.join("\n")))
    }

    /// Reply to small talk.
    pub async fn chitchat(
        &self,
        utterance: &str,
        history: &[Message],
        facts: &[Fact],
        entities: &[EntityContext],
    ) -> String {
        let mut system = prompts::CHITCHAT.to_string();
        for block in [Self::facts_block(facts), Self::entities_block(entities)]
            .into_iter()
            .flatten()
        {
            system.push_str("\n\n");
            system.push_str(&block);
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(self.history_messages(history));
        messages.push(Message::user(utterance));

        match self.llm.chat(messages, self.temperature).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => CHITCHAT_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = %e, "Chit-chat generation failed");
                CHITCHAT_FALLBACK.to_string()
            }
        }
    }

    fn action_prompt(&self, state: &ConversationState) -> String {
        let mut prompt = String::new();

        let recent: Vec<String> = self
            .history_messages(&state.history)
            .iter()
            .map(|m| m.render_line(self.history_chars))
            .collect();
        if !recent.is_empty() {
            prompt.push_str(&format!("Recent conversation:\n{}\n\n", recent.join("\n")));
        }

        for block in [Self::facts_block(&state.facts), Self::entities_block(&state.entities)]
            .into_iter()
            .flatten()
        {
            prompt.push_str(&block);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Results:\n");
        for result in &state.step_results {
            prompt.push_str(&render_result(result));
            prompt.push('\n');
        }

        prompt.push_str(&format!("\nUser request: {}", state.utterance));
        prompt
    }

    /// Reply grounded in the executed steps.
    pub async fn respond(&self, state: &ConversationState) -> String {
        let prompt = self.action_prompt(state);
        let body = match self
            .llm
            .generate(prompts::RESPONDER, &prompt, self.temperature)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_reply(&state.step_results),
            Err(e) => {
                warn!(user_id = %state.user_id, error = %e, "Response generation failed, using step summaries");
                fallback_reply(&state.step_results)
            }
        };

        match failure_footer(&state.step_results) {
            Some(footer) => format!("{body}\n\n{footer}"),
            None => body,
        }
    }
}

/// `[NAME]` header followed by the summary or the error.
fn render_result(result: &StepResult) -> String {
    let name = if result.capability.is_empty() {
        "STEP".to_string()
    } else {
        result.capability.to_uppercase()
    };
    if result.success {
        format!("[{name}] {}\n{}", result.goal, result.summary)
    } else {
        format!("[{name}] {}\nError: {}", result.goal, result.summary)
    }
}

/// One sentence per failed step, or `None` when every step succeeded.
pub fn failure_footer(results: &[StepResult]) -> Option<String> {
    let lines: Vec<String> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            format!(
                "I could not complete \"{}\" ({}) because {}.",
                r.goal,
                r.capability,
                r.error.as_deref().unwrap_or("of an unknown error").trim_end_matches('.')
            )
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// A reply built without the model: one line per successful step.
fn fallback_reply(results: &[StepResult]) -> String {
    let done: Vec<String> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| format!("- {}: {}", r.goal, r.summary))
        .collect();

    if done.is_empty() {
        "I wasn't able to get that done.".to_string()
    } else {
        format!("Here is what I found:\n{}", done.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, test_config};
    use concierge_core::capability::CapabilityResult;
    use concierge_core::entities::{Entity, EntityKind, RelatedEntity, RelationKind};
    use concierge_core::facts::FactCategory;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn generator(provider: Arc<ScriptedProvider>) -> ResponseGenerator {
        ResponseGenerator::new(ModelClient::new(provider, "mock-model"), 0.7, 4, 200)
    }

    fn state_with(results: Vec<StepResult>) -> ConversationState {
        let mut state = ConversationState::new("u1", "find Marco's email and book a call", vec![], &test_config());
        state.step_results = results;
        state
    }

    fn ok(cap: &str, goal: &str, data: &str) -> StepResult {
        StepResult::from_capability_results(goal, &[CapabilityResult::ok(cap, json!(data))], 500)
    }

    fn failed(cap: &str, goal: &str, error: &str) -> StepResult {
        StepResult::from_capability_results(goal, &[CapabilityResult::failed(cap, error)], 500)
    }

    #[tokio::test]
    async fn action_prompt_renders_results() {
        let provider = Arc::new(ScriptedProvider::new().on(prompts::RESPONDER, "Marco wrote on Thursday."));
        let state = state_with(vec![ok("mail", "find email", "Meet Thursday at 10")]);

        let reply = generator(provider.clone()).respond(&state).await;
        assert_eq!(reply, "Marco wrote on Thursday.");

        let prompt = provider.last_prompt_for(prompts::RESPONDER).unwrap();
        assert!(prompt.contains("[MAIL] find email\nMeet Thursday at 10"));
        assert!(prompt.ends_with("User request: find Marco's email and book a call"));
    }

    #[tokio::test]
    async fn action_prompt_lists_known_entities() {
        let provider = Arc::new(ScriptedProvider::new().on(prompts::RESPONDER, "Booked."));
        let mut state = state_with(vec![ok("calendar", "book a call", "created")]);
        state.entities = vec![EntityContext {
            entity: Entity {
                user_id: "u1".into(),
                name: "Marco Rossi".into(),
                kind: EntityKind::Person,
                properties: BTreeMap::from([("role".to_string(), "manager".to_string())]),
                updated_at: chrono::Utc::now(),
            },
            relationships: vec![RelatedEntity {
                kind: RelationKind::WorksFor,
                name: "Acme".into(),
                outgoing: true,
            }],
        }];

        generator(provider.clone()).respond(&state).await;

        let prompt = provider.last_prompt_for(prompts::RESPONDER).unwrap();
        assert!(prompt.contains(
            "Known people and organizations:\n* Marco Rossi (person)\n  Info: role: manager\n  Relations: works_for -> Acme\n\nResults:"
        ));
    }

    #[tokio::test]
    async fn failed_steps_always_get_a_footer() {
        let provider = Arc::new(ScriptedProvider::new().on(prompts::RESPONDER, "Found the email."));
        let state = state_with(vec![
            ok("mail", "find email", "Meet Thursday"),
            failed("calendar", "create event", "token expired"),
        ]);

        let reply = generator(provider).respond(&state).await;
        assert!(reply.starts_with("Found the email."));
        assert!(reply.contains("I could not complete \"create event\" (calendar) because calendar: token expired."));
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_summaries() {
        let provider = Arc::new(ScriptedProvider::new().fail_on(prompts::RESPONDER));
        let state = state_with(vec![
            ok("mail", "find email", "Meet Thursday"),
            failed("calendar", "create event", "down"),
        ]);

        let reply = generator(provider).respond(&state).await;
        assert!(reply.contains("- find email: Meet Thursday"));
        assert!(reply.contains("could not complete \"create event\""));
    }

    #[tokio::test]
    async fn chitchat_uses_history_and_facts() {
        let provider = Arc::new(ScriptedProvider::new().on(prompts::CHITCHAT, "Ciao Marco!"));
        let history = vec![Message::user("mi chiamo Marco"), Message::assistant("Piacere!")];
        let facts = vec![Fact {
            user_id: "u1".into(),
            category: FactCategory::Fact,
            content: "Is called Marco".into(),
            created_at: chrono::Utc::now(),
        }];

        let reply = generator(provider.clone()).chitchat("ciao", &history, &facts, &[]).await;
        assert_eq!(reply, "Ciao Marco!");

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.len(), 4);
        assert!(request.messages[0].content.contains("(fact) Is called Marco"));
        assert_eq!(request.messages[3].content, "ciao");
    }

    #[tokio::test]
    async fn chitchat_failure_is_polite() {
        let provider = Arc::new(ScriptedProvider::new().fail_on(prompts::CHITCHAT));
        let reply = generator(provider).chitchat("hi", &[], &[], &[]).await;
        assert_eq!(reply, CHITCHAT_FALLBACK);
    }

    #[test]
    fn no_footer_when_all_succeed() {
        assert!(failure_footer(&[ok("web", "search", "x")]).is_none());
    }
}
