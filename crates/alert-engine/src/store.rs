use chrono::{DateTime, Utc};
use models::{Alert, CompetitorSnapshot, Id, SaleRow, Sku, Tenant};
use std::collections::HashMap;
use std::future::Future;

/// Outcome of attempting to insert an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The alert was created.
    Inserted,
    /// An alert with the same dedupe key already exists for the tenant.
    /// This is the expected result of re-scanning the same data.
    DuplicateKey,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Store is the read and write interface of the scan over pricing data and alerts.
///
/// Implementations must reject an `insert_alert` whose `(tenant_id, dedupe_key)`
/// already exists, atomically, returning `InsertOutcome::DuplicateKey`.
pub trait Store: Send + Sync + 'static {
    /// All tenants.
    fn tenants(&self) -> impl Future<Output = Result<Vec<Tenant>, StoreError>> + Send + '_;

    /// All SKUs of the tenant.
    fn skus(&self, tenant_id: Id)
        -> impl Future<Output = Result<Vec<Sku>, StoreError>> + Send + '_;

    /// Sales of the tenant having `sold_at >= since`.
    fn sales_since(
        &self,
        tenant_id: Id,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SaleRow>, StoreError>> + Send + '_;

    /// All competitor snapshots of the tenant, ordered by ascending capture time
    /// and then by order of insertion.
    fn snapshots(
        &self,
        tenant_id: Id,
    ) -> impl Future<Output = Result<Vec<CompetitorSnapshot>, StoreError>> + Send + '_;

    /// Most recent `sold_at` of each SKU of the tenant which has ever sold.
    fn last_sale_times(
        &self,
        tenant_id: Id,
    ) -> impl Future<Output = Result<HashMap<Id, DateTime<Utc>>, StoreError>> + Send + '_;

    /// Insert an alert, unless its dedupe key is already taken.
    fn insert_alert<'s>(
        &'s self,
        alert: &'s Alert,
    ) -> impl Future<Output = Result<InsertOutcome, StoreError>> + Send + 's;
}
