use crate::store::{InsertOutcome, Store, StoreError};
use chrono::{DateTime, Utc};
use models::{Alert, CompetitorSnapshot, Id, SaleRow, Sku, Tenant};
use sqlx::types::Json;
use std::collections::HashMap;

/// SQL schema of tenants, pricing data, and alerts.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// Name of the unique constraint over `alerts (tenant_id, dedupe_key)`.
const DEDUPE_CONSTRAINT: &str = "alerts_tenant_dedupe_key";
/// SQLSTATE of a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Apply `SCHEMA`, which is idempotent.
pub async fn apply_schema(pool: &sqlx::PgPool) -> sqlx::Result<()> {
    use sqlx::Executor;

    pool.execute(SCHEMA).await?;
    Ok(())
}

/// PgStore is a `Store` backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    async fn tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let rows = sqlx::query_as::<_, Tenant>(
            r#"
            select id, slug, name
            from tenants
            order by id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn skus(&self, tenant_id: Id) -> Result<Vec<Sku>, StoreError> {
        let rows = sqlx::query_as::<_, Sku>(
            r#"
            select
                id,
                tenant_id,
                sku_code,
                name,
                mrp::float8 as mrp,
                map::float8 as map,
                cost::float8 as cost,
                on_hand_qty
            from skus
            where tenant_id = $1
            order by id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn sales_since(
        &self,
        tenant_id: Id,
        since: DateTime<Utc>,
    ) -> Result<Vec<SaleRow>, StoreError> {
        let rows = sqlx::query_as::<_, SaleRow>(
            r#"
            select
                id,
                tenant_id,
                sku_id,
                dealer_id,
                sold_price::float8 as sold_price,
                qty,
                sold_at,
                order_ref
            from sale_rows
            where tenant_id = $1 and sold_at >= $2
            order by sold_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn snapshots(&self, tenant_id: Id) -> Result<Vec<CompetitorSnapshot>, StoreError> {
        // Ids increase with insertion, and break ties of equal capture times.
        let rows = sqlx::query_as::<_, CompetitorSnapshot>(
            r#"
            select
                id,
                tenant_id,
                sku_id,
                competitor_id,
                price::float8 as price,
                captured_at,
                url
            from competitor_snapshots
            where tenant_id = $1
            order by captured_at, id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn last_sale_times(
        &self,
        tenant_id: Id,
    ) -> Result<HashMap<Id, DateTime<Utc>>, StoreError> {
        let rows = sqlx::query_as::<_, (Id, DateTime<Utc>)>(
            r#"
            select sku_id, max(sold_at)
            from sale_rows
            where tenant_id = $1
            group by sku_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_alert<'s>(&'s self, alert: &'s Alert) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            insert into alerts (
                id,
                tenant_id,
                type,
                sku_id,
                dealer_id,
                competitor_id,
                impact_amount,
                severity,
                status,
                evidence,
                dedupe_key,
                created_at
            ) values ($1, $2, $3, $4, $5, $6, $7::float8::numeric(12, 2), $8, $9, $10, $11, $12)
            "#,
        )
        .bind(alert.id)
        .bind(alert.tenant_id)
        .bind(alert.alert_type)
        .bind(alert.sku_id)
        .bind(alert.dealer_id)
        .bind(alert.competitor_id)
        .bind(alert.impact_amount)
        .bind(alert.severity)
        .bind(alert.status)
        .bind(Json(&alert.evidence))
        .bind(&alert.dedupe_key)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(err)) if is_dedupe_violation(err.as_ref()) => {
                Ok(InsertOutcome::DuplicateKey)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn is_dedupe_violation(err: &dyn sqlx::error::DatabaseError) -> bool {
    if err.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return false;
    }
    // Other unique constraints (such as a colliding primary key) are real errors.
    match err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        Some(pg_err) => pg_err.constraint() == Some(DEDUPE_CONSTRAINT),
        None => false,
    }
}
