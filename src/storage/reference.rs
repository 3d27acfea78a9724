//! Cash pools and categories

use async_trait::async_trait;
use rusqlite::{Row, params};

use super::database::{Database, now_rfc3339};
use super::{CategoryProvider, PoolProvider};
use crate::types::{
    CashPool, Category, CategoryId, PoolId, Result, ResultExt, TallyError, TransactionType, UserId,
};

/// Input for a new cash pool
#[derive(Debug, Clone)]
pub struct NewCashPool {
    pub user_id: UserId,
    pub name: String,
    pub currency: String,
    pub balance: f64,
}

/// Input for a new category
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub user_id: UserId,
    pub key: String,
    pub category_type: TransactionType,
    pub icon: String,
    pub color: String,
}

fn map_pool(row: &Row<'_>) -> rusqlite::Result<CashPool> {
    Ok(CashPool {
        id: PoolId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        currency: row.get(3)?,
        balance: row.get(4)?,
        is_active: row.get(5)?,
    })
}

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    let category_type: String = row.get(3)?;
    let category_type = category_type.parse::<TransactionType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::new(TallyError::Storage(e)),
        )
    })?;
    Ok(Category {
        id: CategoryId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        key: row.get(2)?,
        category_type,
        icon: row.get(4)?,
        color: row.get(5)?,
    })
}

impl Database {
    pub fn add_pool(&self, pool: NewCashPool) -> Result<CashPool> {
        let name = pool.name.trim();
        if name.is_empty() {
            return Err(TallyError::invariant("pool name must not be empty"));
        }
        if !pool.balance.is_finite() || pool.balance < 0.0 {
            return Err(TallyError::invariant(format!(
                "opening balance must be a non-negative number, got {}",
                pool.balance
            )));
        }

        let id = PoolId::generate();
        let now = now_rfc3339();
        let currency = pool.currency.trim().to_uppercase();
        self.conn()?
            .execute(
                "INSERT INTO cash_pools (id, user_id, name, currency, balance, is_active,
                                         created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                params![id.as_str(), pool.user_id.as_str(), name, currency, pool.balance, now],
            )
            .with_context("Failed to create cash pool")?;

        tracing::info!(pool_id = %id, "cash pool '{}' created", name);

        Ok(CashPool {
            id,
            user_id: pool.user_id,
            name: name.to_string(),
            currency,
            balance: pool.balance,
            is_active: true,
        })
    }

    pub fn set_pool_active(&self, user_id: &UserId, pool_id: &PoolId, active: bool) -> Result<()> {
        let affected = self
            .conn()?
            .execute(
                "UPDATE cash_pools SET is_active = ?3, updated_at = ?4
                 WHERE id = ?1 AND user_id = ?2",
                params![pool_id.as_str(), user_id.as_str(), active, now_rfc3339()],
            )
            .with_context("Failed to update cash pool")?;
        if affected == 0 {
            return Err(TallyError::not_found("cash pool", pool_id.as_str()));
        }
        Ok(())
    }

    pub fn add_category(&self, category: NewCategory) -> Result<Category> {
        let key = category.key.trim().to_lowercase();
        if key.is_empty() {
            return Err(TallyError::invariant("category key must not be empty"));
        }

        let id = CategoryId::generate();
        self.conn()?
            .execute(
                "INSERT INTO categories (id, user_id, key, type, icon, color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    category.user_id.as_str(),
                    key,
                    category.category_type.as_str(),
                    category.icon,
                    category.color,
                    now_rfc3339()
                ],
            )
            .with_context_fn(|| format!("Failed to create category '{}'", key))?;

        tracing::info!(category_id = %id, "category '{}' created", key);

        Ok(Category {
            id,
            user_id: category.user_id,
            key,
            category_type: category.category_type,
            icon: category.icon,
            color: category.color,
        })
    }
}

#[async_trait]
impl PoolProvider for Database {
    async fn get_pools(&self, user_id: &UserId) -> Result<Vec<CashPool>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, currency, balance, is_active
             FROM cash_pools WHERE user_id = ?1 ORDER BY name",
        )?;
        let pools = stmt
            .query_map(params![user_id.as_str()], map_pool)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pools)
    }
}

#[async_trait]
impl CategoryProvider for Database {
    async fn get_categories(&self, user_id: &UserId) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key, type, icon, color
             FROM categories WHERE user_id = ?1 ORDER BY type, key",
        )?;
        let categories = stmt
            .query_map(params![user_id.as_str()], map_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn wallet(user: &str) -> NewCashPool {
        NewCashPool {
            user_id: UserId::new(user),
            name: " Main Wallet ".into(),
            currency: "usd".into(),
            balance: 100.0,
        }
    }

    #[tokio::test]
    async fn test_pools_are_scoped_to_user() {
        let db = db();
        let pool = db.add_pool(wallet("u1")).unwrap();
        db.add_pool(wallet("u2")).unwrap();

        assert_eq!(pool.name, "Main Wallet");
        assert_eq!(pool.currency, "USD");

        let pools = db.get_pools(&UserId::new("u1")).await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0], pool);
    }

    #[tokio::test]
    async fn test_deactivated_pool_is_still_listed() {
        let db = db();
        let user = UserId::new("u1");
        let pool = db.add_pool(wallet("u1")).unwrap();
        db.set_pool_active(&user, &pool.id, false).unwrap();

        let pools = db.get_pools(&user).await.unwrap();
        assert!(!pools[0].is_active);

        let err = db
            .set_pool_active(&UserId::new("u2"), &pool.id, true)
            .unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }

    #[test]
    fn test_rejects_bad_pool_input() {
        let db = db();
        let mut pool = wallet("u1");
        pool.balance = -1.0;
        assert!(db.add_pool(pool).is_err());

        let mut pool = wallet("u1");
        pool.name = "  ".into();
        assert!(db.add_pool(pool).is_err());
    }

    #[tokio::test]
    async fn test_categories_roundtrip() {
        let db = db();
        let user = UserId::new("u1");
        let groceries = db
            .add_category(NewCategory {
                user_id: user.clone(),
                key: "Groceries".into(),
                category_type: TransactionType::Expense,
                icon: "🛒".into(),
                color: "#22aa22".into(),
            })
            .unwrap();
        assert_eq!(groceries.key, "groceries");

        let categories = db.get_categories(&user).await.unwrap();
        assert_eq!(categories, vec![groceries]);
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let db = db();
        let category = NewCategory {
            user_id: UserId::new("u1"),
            key: "salary".into(),
            category_type: TransactionType::Income,
            icon: "💼".into(),
            color: String::new(),
        };
        db.add_category(category.clone()).unwrap();
        assert!(db.add_category(category).is_err());
    }
}
