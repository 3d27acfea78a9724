use console::style;

use crate::agent::{AgentResponse, ConfirmationPayload, FinalizeResult, FinalizeStatus};
use crate::types::{AgentState, CashPool, Category, Transaction, format_amount};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Agent reply with its options or confirmation card
    pub fn agent_reply(&self, response: &AgentResponse) {
        println!("{} {}", style("tally›").cyan().bold(), response.message);

        if let Some(options) = &response.selectable_options {
            for (index, option) in options.iter().enumerate() {
                println!("  {} {}", style(format!("{}.", index + 1)).dim(), option.label);
            }
        }

        if let Some(payload) = &response.confirmation_payload {
            self.confirmation(payload);
        }

        match response.agent_state {
            AgentState::Completed => self.success("Conversation completed"),
            AgentState::Cancelled => self.warning("Conversation cancelled"),
            _ => {}
        }
    }

    fn confirmation(&self, payload: &ConfirmationPayload) {
        let amount = payload
            .amount
            .map(format_amount)
            .unwrap_or_else(|| "?".into());
        let kind = payload
            .transaction_type
            .map(|kind| kind.as_str())
            .unwrap_or("?");

        println!("  {:<10} {}", style("Type").dim(), kind);
        match &payload.currency {
            Some(currency) => println!("  {:<10} {} {}", style("Amount").dim(), currency, amount),
            None => println!("  {:<10} {}", style("Amount").dim(), amount),
        }
        println!("  {:<10} {}", style("Pool").dim(), payload.pool_name);
        println!("  {:<10} {}", style("Category").dim(), payload.category_name);
        if let Some(purpose) = &payload.purpose {
            println!("  {:<10} {}", style("Purpose").dim(), purpose);
        }
        if let Some(date) = payload.date {
            println!("  {:<10} {}", style("Date").dim(), date);
        }
        if let Some(notes) = &payload.notes {
            println!("  {:<10} {}", style("Notes").dim(), notes);
        }
        if !payload.tags.is_empty() {
            println!("  {:<10} {}", style("Tags").dim(), payload.tags.join(", "));
        }
    }

    pub fn finalize_result(&self, result: &FinalizeResult) {
        let transaction_id = result
            .transaction_id
            .as_ref()
            .map(|id| id.as_str())
            .unwrap_or_default();
        match result.status {
            FinalizeStatus::Success => {
                self.success(&format!("Recorded transaction {}", transaction_id))
            }
            FinalizeStatus::AlreadyFinalized => {
                self.info(&format!("Already recorded as transaction {}", transaction_id))
            }
            FinalizeStatus::Error => self.error(&format!(
                "{}: {}",
                result
                    .error_code
                    .map(|code| code.as_str())
                    .unwrap_or("ERROR"),
                result.error_message.as_deref().unwrap_or_default()
            )),
        }
    }

    pub fn pools(&self, pools: &[CashPool]) {
        if pools.is_empty() {
            println!("No cash pools yet. Add one with 'tally pool add'.");
            return;
        }
        for pool in pools {
            let marker = if pool.is_active {
                style("●").green()
            } else {
                style("○").dim()
            };
            println!(
                "{} {:<20} {:>12} {}  {}",
                marker,
                pool.name,
                format!("{:.2}", pool.balance),
                pool.currency,
                style(pool.id.as_str()).dim()
            );
        }
    }

    pub fn categories(&self, categories: &[Category]) {
        if categories.is_empty() {
            println!("No categories yet. Add one with 'tally category add'.");
            return;
        }
        for category in categories {
            println!(
                "{} {:<20} {:<8} {}",
                category.icon,
                category.key,
                category.category_type.as_str(),
                style(category.id.as_str()).dim()
            );
        }
    }

    pub fn transactions(&self, transactions: &[Transaction]) {
        for transaction in transactions {
            println!(
                "  {}  {:<8} {:>10}  {}",
                transaction.date,
                transaction.transaction_type.as_str(),
                format_amount(transaction.amount),
                transaction.purpose
            );
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
