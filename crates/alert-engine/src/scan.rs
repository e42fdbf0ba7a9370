use crate::rules::{Rule, TenantWindow};
use crate::store::{InsertOutcome, Store};
use anyhow::Context;
use chrono::{DateTime, Utc};
use models::{AlertType, Id, IdGenerator};
use std::collections::BTreeMap;

/// Scanner evaluates all rules for all tenants, and inserts the alerts they raise.
///
/// It holds no state across scans beyond id generation: whether an alert was
/// already raised is decided by the `Store` at insertion time.
pub struct Scanner<S> {
    store: S,
    id_gen: std::sync::Mutex<IdGenerator>,
}

/// Counts of a complete scan.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Tenants which were scanned, including those which failed.
    pub tenants_processed: usize,
    /// Tenants whose scan failed part-way.
    pub tenants_failed: usize,
    pub alerts_created: usize,
    /// Candidates which were already alerted.
    pub duplicates_skipped: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub created_by_type: BTreeMap<AlertType, usize>,
}

/// Counts of a single tenant's scan.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub alerts_created: usize,
    pub duplicates_skipped: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub created_by_type: BTreeMap<AlertType, usize>,
}

impl ScanSummary {
    fn add(&mut self, tenant: TenantSummary) {
        self.alerts_created += tenant.alerts_created;
        self.duplicates_skipped += tenant.duplicates_skipped;

        for (alert_type, count) in tenant.created_by_type {
            *self.created_by_type.entry(alert_type).or_default() += count;
        }
    }
}

impl<S: Store> Scanner<S> {
    pub fn new(store: S, id_gen: IdGenerator) -> Self {
        Self {
            store,
            id_gen: std::sync::Mutex::new(id_gen),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Scan every tenant as of `now`.
    ///
    /// Tenants are scanned one at a time. A failure of one tenant is logged and
    /// counted, and doesn't prevent the scan of other tenants. Only a failure to
    /// list tenants fails the scan as a whole.
    #[tracing::instrument(skip_all, fields(%now))]
    pub async fn run_scan(&self, now: DateTime<Utc>) -> anyhow::Result<ScanSummary> {
        let start_time = std::time::Instant::now();

        let tenants = self.store.tenants().await.context("listing tenants")?;
        let mut summary = ScanSummary::default();

        for tenant in &tenants {
            summary.tenants_processed += 1;

            match self.scan_tenant(tenant.id, now).await {
                Ok(tenant_summary) => summary.add(tenant_summary),
                Err(err) => {
                    summary.tenants_failed += 1;
                    tracing::error!(tenant_id = %tenant.id, ?err, "tenant scan failed");
                }
            }
        }

        tracing::info!(
            tenants = summary.tenants_processed,
            failed = summary.tenants_failed,
            alerts_created = summary.alerts_created,
            duplicates = summary.duplicates_skipped,
            duration_ms = %start_time.elapsed().as_millis(),
            "scan complete"
        );
        Ok(summary)
    }

    /// Scan a single tenant as of `now`, returning at the first storage error.
    /// Alerts inserted prior to the error remain.
    #[tracing::instrument(skip_all, fields(%tenant_id))]
    pub async fn scan_tenant(
        &self,
        tenant_id: Id,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TenantSummary> {
        let window = self.load_window(tenant_id, now).await?;
        let mut summary = TenantSummary::default();

        for rule in Rule::ALL {
            for candidate in rule.evaluate(&window) {
                let alert = candidate.into_alert(self.next_id(), tenant_id, now);

                let outcome = self
                    .store
                    .insert_alert(&alert)
                    .await
                    .with_context(|| format!("inserting alert {}", alert.dedupe_key))?;

                match outcome {
                    InsertOutcome::Inserted => {
                        summary.alerts_created += 1;
                        *summary.created_by_type.entry(alert.alert_type).or_default() += 1;

                        tracing::debug!(
                            dedupe_key = %alert.dedupe_key,
                            impact = alert.impact_amount,
                            severity = %alert.severity,
                            "created alert"
                        );
                    }
                    InsertOutcome::DuplicateKey => {
                        summary.duplicates_skipped += 1;
                        tracing::debug!(dedupe_key = %alert.dedupe_key, "alert already exists");
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn load_window(&self, tenant_id: Id, now: DateTime<Utc>) -> anyhow::Result<TenantWindow> {
        let skus = self
            .store
            .skus(tenant_id)
            .await
            .context("fetching SKUs")?;
        let sales = self
            .store
            .sales_since(tenant_id, TenantWindow::sales_since(now))
            .await
            .context("fetching recent sales")?;
        let snapshots = self
            .store
            .snapshots(tenant_id)
            .await
            .context("fetching competitor snapshots")?;
        let last_sales = self
            .store
            .last_sale_times(tenant_id)
            .await
            .context("fetching last sale times")?;

        Ok(TenantWindow::new(
            tenant_id, now, skus, sales, snapshots, last_sales,
        ))
    }

    fn next_id(&self) -> Id {
        self.id_gen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .next()
    }
}
