//! Finalize Command
//!
//! Record a confirmed draft in the ledger. Safe to repeat.

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::types::{DraftId, Result};

pub async fn run(draft_id: &str, user: Option<String>, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let result = ctx
        .finalizer()
        .finalize(&DraftId::new(draft_id), &ctx.user(user))
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        Output::new().finalize_result(&result);
    }
    Ok(())
}
