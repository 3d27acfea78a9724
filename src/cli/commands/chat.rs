//! Chat Command
//!
//! Interactive conversation with the agent. A confirmed draft is finalized
//! right away and a fresh conversation starts for the next transaction.

use console::style;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::agent::{AgentOrchestrator, AgentResponse, FinalizeResult, FinalizeService};
use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::types::{AgentConversation, AgentState, Result, UserId};

pub async fn run(user: Option<String>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let user_id = ctx.user(user);
    let output = Output::new();

    let provider = ctx.provider()?;
    if !provider.health_check().await.unwrap_or(false) {
        output.warning(&format!(
            "{} ({}) is not reachable; messages will be answered with a rephrase request",
            provider.name(),
            provider.model()
        ));
    }
    let orchestrator = ctx.orchestrator(provider);
    let finalizer = ctx.finalizer();

    let mut conversation = orchestrator.lifecycle().start_conversation(&user_id).await?;

    output.header("Tally");
    println!("Describe a transaction, e.g. \"spent 20 on lunch from my wallet\".");
    println!(
        "{}",
        style("/cancel drops the current draft, /quit exits.").dim()
    );
    if conversation.agent_state != AgentState::Idle {
        output.info(&format!(
            "Resuming conversation {} ({})",
            conversation.id, conversation.agent_state
        ));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style("you›").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/cancel" => {
                conversation = cancel_current(&orchestrator, &user_id, &conversation, &output).await?;
                continue;
            }
            _ => {}
        }

        let response = match orchestrator
            .handle_message(&user_id, &conversation.id, line)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                output.error(&e.to_string());
                continue;
            }
        };
        output.agent_reply(&response);

        if let Some(result) = finalize_completed(&finalizer, &user_id, &response).await? {
            output.finalize_result(&result);
        }
        if response.agent_state.is_terminal() {
            conversation = orchestrator.lifecycle().start_conversation(&user_id).await?;
        }
    }

    Ok(())
}

/// Finalize the draft of a COMPLETED turn
pub(crate) async fn finalize_completed(
    finalizer: &FinalizeService,
    user_id: &UserId,
    response: &AgentResponse,
) -> Result<Option<FinalizeResult>> {
    if response.agent_state != AgentState::Completed {
        return Ok(None);
    }
    let Some(draft) = &response.updated_draft else {
        warn!("completed turn carried no draft");
        return Ok(None);
    };
    finalizer.finalize(&draft.id, user_id).await.map(Some)
}

/// Cancel the conversation's draft, if any, and start over
async fn cancel_current(
    orchestrator: &AgentOrchestrator,
    user_id: &UserId,
    conversation: &AgentConversation,
    output: &Output,
) -> Result<AgentConversation> {
    let lifecycle = orchestrator.lifecycle();
    let current = lifecycle.load_conversation(user_id, &conversation.id).await?;

    match &current.active_draft_id {
        Some(draft_id) => match lifecycle.cancel_draft(user_id, draft_id).await {
            Ok(_) => output.warning("Draft cancelled"),
            Err(e) => output.error(&e.to_string()),
        },
        None => {
            output.info("Nothing to cancel yet");
            return Ok(current);
        }
    }

    lifecycle.start_conversation(user_id).await
}
