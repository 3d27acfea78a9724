//! Status Command
//!
//! Active conversation, its draft, and recent ledger activity.

use serde_json::json;

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::{Result, TransactionDraft, format_amount};

const RECENT_LIMIT: usize = 5;

pub async fn run(user: Option<String>, format: &str) -> Result<()> {
    let json_output = format == "json";
    let root = std::env::current_dir()?;

    if !ConfigLoader::is_project_initialized(&root) {
        if json_output {
            println!("{}", json!({ "status": "not_initialized" }));
        } else {
            println!("Tally Status");
            println!("══════════════════════════════════════");
            println!("Not initialized. Run 'tally init' first.");
        }
        // informational only
        return Ok(());
    }

    let ctx = CommandContext::load()?;
    let user_id = ctx.user(user);

    let conversation = ctx.stores.conversations.get_active_by_user(&user_id).await?;
    let draft = match &conversation {
        Some(conversation) => ctx.stores.drafts.get_by_conversation(&conversation.id).await?,
        None => None,
    };
    let pools = ctx.stores.pools.get_pools(&user_id).await?;
    let recent = ctx.db.recent_transactions(&user_id, RECENT_LIMIT)?;

    if json_output {
        let status = json!({
            "status": "initialized",
            "userId": user_id,
            "conversation": conversation,
            "draft": draft,
            "pools": pools,
            "recentTransactions": recent,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let output = Output::new();
    println!("Tally Status");
    println!("══════════════════════════════════════");
    println!("User:     {}", user_id);
    println!("Database: {}", ctx.db_path().display());

    output.section("Conversation");
    match &conversation {
        Some(conversation) => {
            println!("  Id:       {}", conversation.id);
            println!("  State:    {}", conversation.agent_state);
            println!("  Activity: {}", conversation.last_activity_at.to_rfc3339());
        }
        None => println!("  No active conversation"),
    }
    if let Some(draft) = &draft {
        print_draft(draft);
    }

    output.section("Pools");
    output.pools(&pools);

    if !recent.is_empty() {
        output.section("Recent transactions");
        output.transactions(&recent);
    }
    Ok(())
}

fn print_draft(draft: &TransactionDraft) {
    let fields = &draft.extracted_fields;
    println!("  Draft:    {} ({})", draft.id, draft.status);
    if let Some(amount) = fields.amount {
        println!("  Amount:   {}", format_amount(amount));
    }
    if let Some(purpose) = &fields.purpose {
        println!("  Purpose:  {}", purpose);
    }
    if !draft.missing_fields.is_empty() {
        let missing: Vec<&str> = draft.missing_fields.iter().map(|f| f.as_str()).collect();
        println!("  Missing:  {}", missing.join(", "));
    }
}
