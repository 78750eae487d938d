//! `waypoint chat`: Interactive or single-message chat.
//!
//! In interactive mode interrupts are answered inline: the run suspends, the
//! prompt is printed, and the next line typed is sent back as the resume
//! value.

use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use waypoint_agent::{RunError, Runtime, TurnOutcome};
use waypoint_core::ConversationId;

use super::answer::parse_answer;
use super::render::{print_interrupt, print_outcome, print_reply};

pub async fn run(
    config_path: Option<&Path>,
    conversation: Option<String>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set WAYPOINT_API_KEY, DEEPSEEK_API_KEY or OPENAI_API_KEY, or add");
        eprintln!("  `api_key` to {}", waypoint_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = waypoint_agent::build_from_config(&config).await?;
    let id = conversation.map(ConversationId).unwrap_or_default();
    tracing::debug!(conversation_id = %id, tools = runtime.tools.len(), "Chat runtime ready");

    if let Some(msg) = message {
        let outcome = runtime.controller.run_turn(&id, &msg).await?;
        print_outcome(id.as_str(), &outcome);
        return Ok(());
    }

    println!();
    println!("  Waypoint — interactive mode");
    println!();
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", config.default_model);
    println!("  Tools:         {}", runtime.tools.names().join(", "));
    println!("  Conversation:  {id}");
    println!();
    println!("  Type your message and press Enter. Type 'exit' to quit.");
    println!();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = ask(&mut input, "You > ").await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match runtime.controller.run_turn(&id, line).await {
            Ok(outcome) => settle(&runtime, &id, outcome, &mut input).await?,
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Keep answering interrupts until the turn completes.
async fn settle(
    runtime: &Runtime,
    id: &ConversationId,
    mut outcome: TurnOutcome,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let request = match outcome {
            TurnOutcome::Completed(reply) => {
                print_reply(&reply);
                return Ok(());
            }
            TurnOutcome::Interrupted(request) => request,
        };
        print_interrupt(&request);

        let value = loop {
            let Some(answer) = ask(input, "Answer > ").await? else {
                // Input closed; the run stays suspended in the checkpoint.
                return Ok(());
            };
            match parse_answer(&request, &answer) {
                Some(value) => break value,
                None => eprintln!("  Sorry, I couldn't read that answer. Try again or type 'cancel'."),
            }
        };

        outcome = match runtime.controller.resume_turn(id, value).await {
            Ok(next) => next,
            Err(RunError::ResumeMismatch(e)) => {
                tracing::debug!(conversation_id = %id, error = %e, "Resume value rejected");
                eprintln!("  [Error] {e}");
                TurnOutcome::Interrupted(request)
            }
            Err(e) => return Err(e.into()),
        };
    }
}

async fn ask(
    input: &mut Lines<BufReader<Stdin>>,
    label: &str,
) -> Result<Option<String>, std::io::Error> {
    print!("  {label}");
    std::io::stdout().flush()?;
    input.next_line().await
}
