//! The step executor: a state machine over the plan.
//!
//! ```text
//! PrepareStep ─▶ Enrich ─▶ CheckFreshness ─▶ Execute ─▶ Verify
//!      ▲                                                  │
//!      ├──────────── advance (success, more steps) ◀──────┤
//!      └──────────── retry (failure, retries left) ◀──────┤
//!                                                         ▼
//!                                                     Finalize
//! ```
//!
//! Every phase takes the [`ConversationState`] by `&mut`. A retry pops
//! the failed step result, asks the planner for an alternative step and
//! runs the same index again with the freshness cache bypassed. The
//! number of rounds is capped at `max_steps * (max_retries + 1)`.

use chrono::Utc;
use concierge_core::event::{EventBus, PipelineEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::enrich::QueryEnricher;
use crate::execution::{AgentExecutor, CacheMode};
use crate::planner::Planner;
use crate::state::{ConversationState, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PrepareStep,
    Enrich,
    CheckFreshness,
    Execute(CacheMode),
    Verify,
    Finalize,
}

/// What follows a verified step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance,
    Retry,
    Finalize,
}

/// The transition rule after a step settles.
pub fn next_transition(
    succeeded: bool,
    retry_count: u32,
    max_retries: u32,
    has_more_steps: bool,
) -> Transition {
    match (succeeded, has_more_steps) {
        (false, _) if retry_count < max_retries => Transition::Retry,
        (false, _) => Transition::Finalize,
        (true, true) => Transition::Advance,
        (true, false) => Transition::Finalize,
    }
}

pub struct StepExecutor {
    planner: Arc<Planner>,
    executor: AgentExecutor,
    enricher: Arc<dyn QueryEnricher>,
    events: Arc<EventBus>,
    summary_chars: usize,
    max_rounds: usize,
}

impl StepExecutor {
    pub fn new(
        planner: Arc<Planner>,
        executor: AgentExecutor,
        enricher: Arc<dyn QueryEnricher>,
        events: Arc<EventBus>,
        summary_chars: usize,
        max_rounds: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            enricher,
            events,
            summary_chars,
            max_rounds,
        }
    }

    /// Run the plan in `state` to completion.
    pub async fn run(&self, state: &mut ConversationState) {
        let mut phase = Phase::PrepareStep;
        let mut rounds = 0usize;

        loop {
            debug!(?phase, step = state.current_step, retry = state.retry_count, "Step executor phase");
            phase = match phase {
                Phase::PrepareStep => {
                    if state.active_step().is_none() {
                        Phase::Finalize
                    } else {
                        rounds += 1;
                        self.prepare_step(state);
                        Phase::Enrich
                    }
                }
                Phase::Enrich => {
                    self.enrich(state).await;
                    Phase::CheckFreshness
                }
                Phase::CheckFreshness => Phase::Execute(Self::cache_mode(state)),
                Phase::Execute(mode) => {
                    self.execute(state, mode).await;
                    Phase::Verify
                }
                Phase::Verify => {
                    let succeeded = self.verify(state);
                    let mut transition = next_transition(
                        succeeded,
                        state.retry_count,
                        state.max_retries,
                        state.has_more_steps(),
                    );
                    if transition != Transition::Finalize && rounds >= self.max_rounds {
                        warn!(rounds, "Execution round limit reached");
                        transition = Transition::Finalize;
                    }
                    match transition {
                        Transition::Advance => {
                            state.current_step += 1;
                            state.retry_count = 0;
                            Phase::PrepareStep
                        }
                        Transition::Retry => {
                            self.retry(state).await;
                            Phase::PrepareStep
                        }
                        Transition::Finalize => {
                            if succeeded {
                                state.current_step += 1;
                                state.retry_count = 0;
                            }
                            Phase::Finalize
                        }
                    }
                }
                Phase::Finalize => break,
            };
        }

        info!(
            user_id = %state.user_id,
            steps = state.step_results.len(),
            failed = state.failed_results().count(),
            rounds,
            "Plan execution finished"
        );
    }

    fn prepare_step(&self, state: &mut ConversationState) {
        state.working_context = state.build_working_context();
        state.capability_results.clear();
    }

    async fn enrich(&self, state: &mut ConversationState) {
        state.working_context = self
            .enricher
            .enrich(&state.working_context, &state.history)
            .await;
    }

    /// Retries must not be answered from the cache.
    fn cache_mode(state: &ConversationState) -> CacheMode {
        if state.retry_count > 0 {
            CacheMode::Bypass
        } else {
            CacheMode::ReadWrite
        }
    }

    async fn execute(&self, state: &mut ConversationState, mode: CacheMode) {
        let Some(step) = state.active_step() else {
            return;
        };
        let results = self
            .executor
            .execute_step(&state.user_id, step, &state.working_context, mode)
            .await;
        state.capability_results = results;
    }

    /// Record the step result. Returns whether the step succeeded.
    fn verify(&self, state: &mut ConversationState) -> bool {
        let goal = state.active_step().map(|s| s.goal().to_string()).unwrap_or_default();
        let result = StepResult::from_capability_results(&goal, &state.capability_results, self.summary_chars);
        let succeeded = result.success;

        info!(
            user_id = %state.user_id,
            step = state.current_step,
            capability = %result.capability,
            success = succeeded,
            "Step verified"
        );
        self.events.publish(PipelineEvent::StepCompleted {
            user_id: state.user_id.clone(),
            step_index: state.current_step,
            success: succeeded,
            attempt: state.retry_count + 1,
            timestamp: Utc::now(),
        });

        state.step_results.push(result);
        succeeded
    }

    /// Replace the failed step if the planner offers an alternative, then
    /// count the retry. The stale failed result is removed either way.
    async fn retry(&self, state: &mut ConversationState) {
        let reason = state
            .step_results
            .pop()
            .and_then(|r| r.error)
            .unwrap_or_else(|| "unknown error".to_string());

        let index = state.current_step;
        let replacement = match state.plan.get(index) {
            Some(failed) => self.planner.replan(&state.utterance, failed, &reason).await,
            None => None,
        };

        let replaced = replacement.is_some();
        if let Some(step) = replacement {
            info!(step = index, capabilities = ?step.names(), "Replacing failed step");
            state.plan[index] = step;
        } else {
            info!(step = index, "No alternative step, retrying the original");
        }
        state.retry_count += 1;

        self.events.publish(PipelineEvent::StepReplanned {
            user_id: state.user_id.clone(),
            step_index: index,
            replaced,
            retry_count: state.retry_count,
            timestamp: Utc::now(),
        });
    }
}
