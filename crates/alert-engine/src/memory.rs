use crate::store::{InsertOutcome, Store, StoreError};
use chrono::{DateTime, Utc};
use models::{Alert, CompetitorSnapshot, Id, SaleRow, Sku, Tenant};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// MemoryStore is an in-process `Store`, used for tests and local tooling.
///
/// It enforces the same per-tenant uniqueness of alert dedupe keys as the
/// database does, and allows faults to be injected into reads and writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tenants: Vec<Tenant>,
    skus: Vec<Sku>,
    sales: Vec<SaleRow>,
    snapshots: Vec<CompetitorSnapshot>,
    alerts: Vec<Alert>,
    faults: Faults,
    tenant_listings: usize,
}

/// Faults to inject into a `MemoryStore`.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Fail listing of tenants.
    pub tenant_listing: bool,
    /// Fail all reads of these tenants.
    pub reads: BTreeSet<Id>,
    /// Fail all alert inserts of these tenants.
    pub inserts: BTreeSet<Id>,
    /// Delay each alert insert, as a slow database would.
    pub insert_delay: Option<std::time::Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.lock().tenants.push(tenant);
    }
    pub fn add_sku(&self, sku: Sku) {
        self.lock().skus.push(sku);
    }
    pub fn add_sale(&self, sale: SaleRow) {
        self.lock().sales.push(sale);
    }
    pub fn add_snapshot(&self, snapshot: CompetitorSnapshot) {
        self.lock().snapshots.push(snapshot);
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// All alerts, in order of insertion.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    /// Number of times tenants have been listed, which is once per scan.
    pub fn tenant_listings(&self) -> usize {
        self.lock().tenant_listings
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reads(inner: &Inner, tenant_id: Id) -> Result<(), StoreError> {
        if inner.faults.reads.contains(&tenant_id) {
            return Err(StoreError::Unavailable(format!(
                "injected read fault for tenant {tenant_id}"
            )));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let mut inner = self.lock();
        inner.tenant_listings += 1;

        if inner.faults.tenant_listing {
            return Err(StoreError::Unavailable(
                "injected tenant listing fault".to_string(),
            ));
        }
        Ok(inner.tenants.clone())
    }

    async fn skus(&self, tenant_id: Id) -> Result<Vec<Sku>, StoreError> {
        let inner = self.lock();
        Self::check_reads(&inner, tenant_id)?;

        Ok(inner
            .skus
            .iter()
            .filter(|sku| sku.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn sales_since(
        &self,
        tenant_id: Id,
        since: DateTime<Utc>,
    ) -> Result<Vec<SaleRow>, StoreError> {
        let inner = self.lock();
        Self::check_reads(&inner, tenant_id)?;

        Ok(inner
            .sales
            .iter()
            .filter(|sale| sale.tenant_id == tenant_id && sale.sold_at >= since)
            .cloned()
            .collect())
    }

    async fn snapshots(&self, tenant_id: Id) -> Result<Vec<CompetitorSnapshot>, StoreError> {
        let inner = self.lock();
        Self::check_reads(&inner, tenant_id)?;

        let mut snapshots: Vec<_> = inner
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.tenant_id == tenant_id)
            .cloned()
            .collect();
        // Stable, so snapshots of equal capture time retain insertion order.
        snapshots.sort_by_key(|snapshot| snapshot.captured_at);

        Ok(snapshots)
    }

    async fn last_sale_times(
        &self,
        tenant_id: Id,
    ) -> Result<HashMap<Id, DateTime<Utc>>, StoreError> {
        let inner = self.lock();
        Self::check_reads(&inner, tenant_id)?;

        let mut last_sales: HashMap<Id, DateTime<Utc>> = HashMap::new();
        for sale in inner.sales.iter().filter(|sale| sale.tenant_id == tenant_id) {
            let last = last_sales.entry(sale.sku_id).or_insert(sale.sold_at);
            *last = (*last).max(sale.sold_at);
        }
        Ok(last_sales)
    }

    async fn insert_alert<'s>(&'s self, alert: &'s Alert) -> Result<InsertOutcome, StoreError> {
        let insert_delay = self.lock().faults.insert_delay;
        if let Some(delay) = insert_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.lock();

        if inner.faults.inserts.contains(&alert.tenant_id) {
            return Err(StoreError::Unavailable(format!(
                "injected insert fault for tenant {}",
                alert.tenant_id
            )));
        }

        // The check and the insert happen under one lock,
        // so this behaves like a unique constraint.
        if inner
            .alerts
            .iter()
            .any(|a| a.tenant_id == alert.tenant_id && a.dedupe_key == alert.dedupe_key)
        {
            return Ok(InsertOutcome::DuplicateKey);
        }

        inner.alerts.push(alert.clone());
        Ok(InsertOutcome::Inserted)
    }
}
