//! Category Command

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::storage::NewCategory;
use crate::types::{Result, TallyError, TransactionType};

pub fn add(
    key: &str,
    category_type: &str,
    icon: Option<String>,
    color: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let category_type = category_type
        .parse::<TransactionType>()
        .map_err(TallyError::Config)?;

    let ctx = CommandContext::load()?;
    let category = ctx.db.add_category(NewCategory {
        user_id: ctx.user(user),
        key: key.to_string(),
        category_type,
        icon: icon.unwrap_or_default(),
        color: color.unwrap_or_default(),
    })?;

    Output::new().success(&format!(
        "Added {} category '{}'  {}",
        category.category_type, category.key, category.id
    ));
    Ok(())
}

pub async fn list(user: Option<String>, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let categories = ctx.stores.categories.get_categories(&ctx.user(user)).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        Output::new().categories(&categories);
    }
    Ok(())
}
