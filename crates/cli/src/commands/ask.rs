//! `concierge ask`: answer one message and exit.

use concierge_orchestrator::Outcome;

use super::build_assistant;

pub async fn run(message: &str, user: &str, explain: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, assistant) = build_assistant()?;

    eprint!("  Thinking...");
    let outcome = assistant.run(user, message).await;
    eprint!("\r              \r");

    let outcome = outcome?;
    println!("{}", outcome.reply);

    if explain {
        println!();
        println!("{}", serde_json::to_string_pretty(&explanation(&outcome))?);
    }

    Ok(())
}

fn explanation(outcome: &Outcome) -> serde_json::Value {
    serde_json::json!({
        "intent": outcome.classification.intent.as_str(),
        "confidence": outcome.classification.confidence,
        "steps_planned": outcome.steps_planned,
        "step_results": outcome.step_results,
    })
}
