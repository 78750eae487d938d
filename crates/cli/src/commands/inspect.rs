//! `waypoint conversations` / `waypoint show`: Read checkpoints directly.

use std::path::Path;
use waypoint_core::{CheckpointStore, ConversationId, Role};

pub async fn list(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let store = waypoint_agent::open_checkpoint_store(&config).await?;
    let conversations = store.list().await?;

    if conversations.is_empty() {
        println!("No conversations stored.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:>5}  {:>5}  {:<13}  UPDATED", "ID", "NODE", "MSGS", "TOOLS", "PENDING");
    for c in conversations {
        println!(
            "{:<36}  {:<10}  {:>5}  {:>5}  {:<13}  {}",
            c.conversation_id,
            c.node.as_str(),
            c.message_count,
            c.total_tool_calls,
            c.pending_interrupt.map(|k| k.as_str()).unwrap_or("-"),
            c.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

pub async fn show(config_path: Option<&Path>, id: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let store = waypoint_agent::open_checkpoint_store(&config).await?;
    let state = store
        .load(&ConversationId(id.clone()))
        .await?
        .ok_or_else(|| format!("Conversation {id} not found"))?;

    println!("Conversation {}", state.conversation_id);
    println!("  Node:        {}", state.node.as_str());
    println!("  Turns:       {}", state.turns);
    println!("  Iterations:  {}", state.iteration_count);
    println!("  Tool calls:  {}", state.total_tool_calls);
    if let Some(reason) = &state.stop_reason {
        println!("  Stopped:     {reason}");
    }
    if let Some(pending) = &state.pending_interrupt {
        println!("  Pending:     {} for {} ({})", pending.request.kind, pending.request.tool_name, pending.request.message);
    }
    println!();

    for message in &state.messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        let mut content = message.content.clone();
        for call in &message.tool_calls {
            if !content.is_empty() {
                content.push(' ');
            }
            content.push_str(&format!("→ {}({})", call.name, call.arguments));
        }
        println!("  {role:>9} | {content}");
    }
    Ok(())
}
