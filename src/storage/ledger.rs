//! SQLite ledger: transaction rows plus pool balance movement

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Ledger;
use super::database::{Database, now_rfc3339, parse_date, parse_json, parse_timestamp};
use super::drafts::FINALIZE_SQL;
use crate::types::{
    CategoryId, DraftId, NewTransaction, PoolId, Result, TallyError, Transaction, TransactionId,
    TransactionType, UserId,
};

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let transaction_type: String = row.get(4)?;
    let transaction_type = transaction_type.parse::<TransactionType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            Box::new(TallyError::Storage(e)),
        )
    })?;
    let tags: String = row.get(8)?;
    let date: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Transaction {
        id: TransactionId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        pool_id: PoolId::new(row.get::<_, String>(2)?),
        amount: row.get(3)?,
        transaction_type,
        category_id: CategoryId::new(row.get::<_, String>(5)?),
        purpose: row.get(6)?,
        notes: row.get(7)?,
        tags: parse_json(8, &tags)?,
        date: parse_date(9, &date)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

/// Checks and writes for one ledger entry. Runs inside a transaction.
fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<Transaction> {
    if !tx.amount.is_finite() || tx.amount <= 0.0 {
        return Err(TallyError::invariant(format!(
            "ledger amount must be positive, got {}",
            tx.amount
        )));
    }

    let balance: Option<f64> = conn
        .query_row(
            "SELECT balance FROM cash_pools WHERE id = ?1 AND user_id = ?2 AND is_active = 1",
            params![tx.pool_id.as_str(), tx.user_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let balance = balance.ok_or_else(|| TallyError::not_found("cash pool", tx.pool_id.as_str()))?;

    let category_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1 AND user_id = ?2)",
        params![tx.category_id.as_str(), tx.user_id.as_str()],
        |row| row.get(0),
    )?;
    if !category_exists {
        return Err(TallyError::not_found("category", tx.category_id.as_str()));
    }

    let delta = match tx.transaction_type {
        TransactionType::Income => tx.amount,
        TransactionType::Expense => {
            if tx.amount > balance {
                return Err(TallyError::InsufficientBalance {
                    pool_id: tx.pool_id.to_string(),
                    balance,
                    required: tx.amount,
                });
            }
            -tx.amount
        }
    };

    let id = TransactionId::generate();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO transactions (id, user_id, pool_id, amount, type, category_id,
                                   purpose, notes, tags, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id.as_str(),
            tx.user_id.as_str(),
            tx.pool_id.as_str(),
            tx.amount,
            tx.transaction_type.as_str(),
            tx.category_id.as_str(),
            tx.purpose,
            tx.notes,
            serde_json::to_string(&tx.tags)?,
            tx.date.format("%Y-%m-%d").to_string(),
            now,
        ],
    )?;
    conn.execute(
        "UPDATE cash_pools SET balance = balance + ?2, updated_at = ?3 WHERE id = ?1",
        params![tx.pool_id.as_str(), delta, now],
    )?;

    conn.query_row(
        &format!("{SELECT_TRANSACTION} WHERE id = ?1"),
        params![id.as_str()],
        map_transaction,
    )
    .map_err(Into::into)
}

const SELECT_TRANSACTION: &str = "SELECT id, user_id, pool_id, amount, type, category_id, \
                                  purpose, notes, tags, date, created_at FROM transactions";

impl Database {
    pub fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let transaction = self
            .conn()?
            .query_row(
                &format!("{SELECT_TRANSACTION} WHERE id = ?1"),
                params![id.as_str()],
                map_transaction,
            )
            .optional()?;
        Ok(transaction)
    }

    /// Latest transactions of a user, newest date first
    pub fn recent_transactions(&self, user_id: &UserId, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_TRANSACTION} WHERE user_id = ?1 ORDER BY date DESC, created_at DESC LIMIT ?2"
        ))?;
        let transactions = stmt
            .query_map(params![user_id.as_str(), limit as i64], map_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }
}

#[async_trait]
impl Ledger for Database {
    async fn create_transaction(&self, transaction: NewTransaction) -> Result<Transaction> {
        let created = self.transaction(|conn| insert_transaction(conn, &transaction))?;
        tracing::info!(
            transaction_id = %created.id,
            pool_id = %created.pool_id,
            "{} transaction recorded",
            created.transaction_type
        );
        Ok(created)
    }

    async fn create_for_draft(
        &self,
        draft_id: &DraftId,
        transaction: NewTransaction,
    ) -> Result<Transaction> {
        let created = self.transaction(|conn| {
            let created = insert_transaction(conn, &transaction)?;
            let finalized = conn.execute(
                FINALIZE_SQL,
                params![draft_id.as_str(), created.id.as_str(), now_rfc3339()],
            )?;
            if finalized == 0 {
                return Err(TallyError::invariant(format!(
                    "draft {} is no longer CONFIRMED",
                    draft_id
                )));
            }
            Ok(created)
        })?;
        tracing::info!(
            transaction_id = %created.id,
            draft_id = %draft_id,
            pool_id = %created.pool_id,
            "{} transaction recorded",
            created.transaction_type
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConversationStore, DraftStore, NewCashPool, NewCategory, PoolProvider};
    use crate::types::{CashPool, DraftStatus};
    use chrono::NaiveDate;

    struct Fixture {
        db: Database,
        user: UserId,
        pool: CashPool,
        category: CategoryId,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let user = UserId::new("u1");
        let pool = db
            .add_pool(NewCashPool {
                user_id: user.clone(),
                name: "Main Wallet".into(),
                currency: "USD".into(),
                balance: 1000.0,
            })
            .unwrap();
        let category = db
            .add_category(NewCategory {
                user_id: user.clone(),
                key: "groceries".into(),
                category_type: TransactionType::Expense,
                icon: "🛒".into(),
                color: String::new(),
            })
            .unwrap()
            .id;
        Fixture {
            db,
            user,
            pool,
            category,
        }
    }

    fn expense(f: &Fixture, amount: f64) -> NewTransaction {
        NewTransaction {
            user_id: f.user.clone(),
            pool_id: f.pool.id.clone(),
            amount,
            transaction_type: TransactionType::Expense,
            category_id: f.category.clone(),
            purpose: "groceries".into(),
            notes: None,
            tags: vec!["food".into()],
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    async fn balance(f: &Fixture) -> f64 {
        f.db.get_pools(&f.user).await.unwrap()[0].balance
    }

    #[tokio::test]
    async fn test_expense_debits_pool() {
        let f = fixture();
        let created = f.db.create_transaction(expense(&f, 250.0)).await.unwrap();

        assert_eq!(created.amount, 250.0);
        assert_eq!(created.tags, vec!["food".to_string()]);
        assert_eq!(balance(&f).await, 750.0);
        assert_eq!(f.db.get_transaction(&created.id).unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_income_credits_pool() {
        let f = fixture();
        let mut income = expense(&f, 500.0);
        income.transaction_type = TransactionType::Income;
        f.db.create_transaction(income).await.unwrap();
        assert_eq!(balance(&f).await, 1500.0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_trace() {
        let f = fixture();
        let err = f
            .db
            .create_transaction(expense(&f, 5000.0))
            .await
            .unwrap_err();

        assert!(matches!(err, TallyError::InsufficientBalance { .. }));
        assert_eq!(balance(&f).await, 1000.0);
        assert!(f.db.recent_transactions(&f.user, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_for_draft_finalizes_in_one_step() {
        let f = fixture();
        let conversation = f.db.create_conversation(&f.user).await.unwrap();
        let draft = f
            .db
            .create_draft(&f.user, &conversation.id, Vec::new())
            .await
            .unwrap();

        // ACTIVE draft: the guard fails and the ledger write is rolled back
        let err = f
            .db
            .create_for_draft(&draft.id, expense(&f, 100.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));
        assert_eq!(balance(&f).await, 1000.0);
        assert!(f.db.recent_transactions(&f.user, 10).unwrap().is_empty());

        f.db.mark_draft_confirmed(&draft.id).await.unwrap();
        let created = f
            .db
            .create_for_draft(&draft.id, expense(&f, 100.0))
            .await
            .unwrap();
        let stored = f.db.get_draft(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DraftStatus::Finalized);
        assert_eq!(stored.transaction_id, Some(created.id));
        assert!(stored.finalized_at.is_some());

        // a second attempt on the finalized draft writes nothing
        assert!(
            f.db.create_for_draft(&draft.id, expense(&f, 100.0))
                .await
                .is_err()
        );
        assert_eq!(balance(&f).await, 900.0);
        assert_eq!(f.db.recent_transactions(&f.user, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_pool_is_not_found() {
        let f = fixture();
        f.db.set_pool_active(&f.user, &f.pool.id, false).unwrap();
        let err = f.db.create_transaction(expense(&f, 10.0)).await.unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_foreign_category_is_not_found() {
        let f = fixture();
        let mut tx = expense(&f, 10.0);
        tx.category_id = CategoryId::new("someone-elses");
        let err = f.db.create_transaction(tx).await.unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }
}
