//! Terminal rendering of run outcomes.

use waypoint_agent::{TurnOutcome, TurnReply};
use waypoint_core::{InterruptPayload, InterruptRequest};

pub fn print_reply(reply: &TurnReply) {
    println!();
    for line in reply.message.lines() {
        println!("  Assistant > {line}");
    }
    println!();
}

pub fn print_interrupt(request: &InterruptRequest) {
    println!();
    println!("  [{}] {}", request.kind, request.message);
    match &request.payload {
        InterruptPayload::AskParams { prompts, .. } => {
            for prompt in prompts {
                println!("    - {}: {}", prompt.field, prompt.prompt);
            }
        }
        InterruptPayload::Confirmation { args } => {
            let args = serde_json::to_string(args).unwrap_or_default();
            println!("    {}({args})", request.tool_name);
        }
        InterruptPayload::Selection { candidates } => {
            for c in candidates {
                if c.description.is_empty() {
                    println!("    {}. {}", c.id, c.name);
                } else {
                    println!("    {}. {} ({})", c.id, c.name, c.description);
                }
            }
        }
    }
}

/// One-shot rendering: a suspended run tells the user how to resume it.
pub fn print_outcome(conversation_id: &str, outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Completed(reply) => print_reply(reply),
        TurnOutcome::Interrupted(request) => {
            print_interrupt(request);
            println!();
            println!("  Resume with: waypoint resume -c {conversation_id} <answer>");
            println!();
        }
    }
}
