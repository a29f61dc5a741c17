//! `concierge chat`: interactive conversation.

use std::io::Write;

use concierge_core::event::PipelineEvent;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use super::build_assistant;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub async fn run(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (config, assistant) = build_assistant()?;

    println!();
    println!("  Concierge: Interactive Mode");
    println!();
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", config.default_model);
    println!("  Capabilities:  calendar, mail, web, notes");
    println!("  User:          {user}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    // Step progress goes to stderr as it happens
    let mut events = assistant.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Some(line) = progress_line(&event) {
                eprintln!("  {line}");
            }
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }
        if EXIT_COMMANDS.contains(&line) {
            break;
        }

        match assistant.process(user, line).await {
            Ok(reply) => {
                println!();
                for text in reply.lines() {
                    println!("  Concierge > {text}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn progress_line(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::PlanCreated {
            steps,
            capabilities,
            ..
        } if *steps > 0 => Some(format!(
            "· planned {steps} step(s): {}",
            capabilities.join(", ")
        )),
        PipelineEvent::StepCompleted {
            step_index,
            success,
            attempt,
            ..
        } => Some(format!(
            "· step {} {} (attempt {attempt})",
            step_index + 1,
            if *success { "done" } else { "failed" }
        )),
        PipelineEvent::StepReplanned { replaced: true, .. } => {
            Some("· trying an alternative".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn progress_lines_for_steps() {
        let done = PipelineEvent::StepCompleted {
            user_id: "u1".into(),
            step_index: 0,
            success: true,
            attempt: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(progress_line(&done).unwrap(), "· step 1 done (attempt 1)");

        let plan = PipelineEvent::PlanCreated {
            user_id: "u1".into(),
            steps: 2,
            capabilities: vec!["mail".into(), "calendar".into()],
            timestamp: Utc::now(),
        };
        assert_eq!(progress_line(&plan).unwrap(), "· planned 2 step(s): mail, calendar");
    }

    #[test]
    fn quiet_events_print_nothing() {
        let empty_plan = PipelineEvent::PlanCreated {
            user_id: "u1".into(),
            steps: 0,
            capabilities: vec![],
            timestamp: Utc::now(),
        };
        assert!(progress_line(&empty_plan).is_none());

        let generated = PipelineEvent::ResponseGenerated {
            user_id: "u1".into(),
            chars: 12,
            timestamp: Utc::now(),
        };
        assert!(progress_line(&generated).is_none());
    }
}
