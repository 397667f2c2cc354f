//! PostgreSQL-backed entity store using the safe SQL builder.

use crate::config::ResolvedEntity;
use crate::sql::{self, row_to_record, PgBindValue, QueryBuf};
use crate::store::{DeleteMode, EntityStore, Record, Selected, Selection, StoreError, Trashed};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        tracing::info!("connected to PostgreSQL");
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn query(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Record>, StoreError> {
        let row: Option<PgRow> = Self::query(q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_record(&r)))
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find(&self, entity: &ResolvedEntity, id: &Value, trashed: Trashed) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::select_by_id(entity, id, trashed)).await
    }

    async fn select(&self, entity: &ResolvedEntity, selection: &Selection) -> Result<Selected, StoreError> {
        let rows = Self::query(&sql::select_page(entity, selection))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_record)
            .collect::<Vec<_>>();
        let total = match selection.window {
            None => rows.len() as u64,
            Some(_) => {
                let row = Self::query(&sql::count(entity, selection)).fetch_one(&self.pool).await?;
                row.try_get::<i64, _>("total")? as u64
            }
        };
        Ok(Selected { rows, total })
    }

    async fn insert(&self, entity: &ResolvedEntity, attributes: &Record) -> Result<Record, StoreError> {
        self.fetch_optional(&sql::insert(entity, attributes))
            .await?
            .ok_or_else(|| StoreError::other("insert returned no row"))
    }

    async fn update(&self, entity: &ResolvedEntity, id: &Value, attributes: &Record) -> Result<Option<Record>, StoreError> {
        self.fetch_optional(&sql::update(entity, id, attributes)).await
    }

    async fn delete(&self, entity: &ResolvedEntity, id: &Value, mode: DeleteMode) -> Result<bool, StoreError> {
        let q = match mode {
            DeleteMode::Soft if entity.soft_deletes => sql::soft_delete(entity, id),
            _ => sql::delete(entity, id),
        };
        let result = Self::query(&q).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
