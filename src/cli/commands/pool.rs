//! Pool Command
//!
//! Manage the cash pools transactions are drawn from.

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::storage::NewCashPool;
use crate::types::{PoolId, Result};

pub fn add(name: &str, currency: &str, balance: f64, user: Option<String>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let pool = ctx.db.add_pool(NewCashPool {
        user_id: ctx.user(user),
        name: name.to_string(),
        currency: currency.to_string(),
        balance,
    })?;

    Output::new().success(&format!(
        "Added pool '{}' ({} {:.2})  {}",
        pool.name,
        pool.currency,
        pool.balance,
        pool.id
    ));
    Ok(())
}

pub async fn list(user: Option<String>, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let pools = ctx.stores.pools.get_pools(&ctx.user(user)).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&pools)?);
    } else {
        Output::new().pools(&pools);
    }
    Ok(())
}

/// Activate or deactivate a pool. Inactive pools are never offered or matched.
pub fn set_active(id: &str, active: bool, user: Option<String>) -> Result<()> {
    let ctx = CommandContext::load()?;
    ctx.db
        .set_pool_active(&ctx.user(user), &PoolId::new(id), active)?;

    let state = if active { "activated" } else { "deactivated" };
    Output::new().success(&format!("Pool {} {}", id, state));
    Ok(())
}
