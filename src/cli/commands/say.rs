//! Say Command
//!
//! One turn against the user's active conversation, for scripting.

use serde_json::json;

use super::chat::finalize_completed;
use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::types::Result;

pub async fn run(message: &str, user: Option<String>, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let user_id = ctx.user(user);
    let orchestrator = ctx.orchestrator(ctx.provider()?);

    let conversation = orchestrator.lifecycle().start_conversation(&user_id).await?;
    let response = orchestrator
        .handle_message(&user_id, &conversation.id, message)
        .await?;
    let finalized = finalize_completed(&ctx.finalizer(), &user_id, &response).await?;

    if format == "json" {
        let out = json!({
            "conversationId": conversation.id,
            "response": response,
            "finalize": finalized,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let output = Output::new();
        output.agent_reply(&response);
        if let Some(result) = &finalized {
            output.finalize_result(result);
        }
    }
    Ok(())
}
