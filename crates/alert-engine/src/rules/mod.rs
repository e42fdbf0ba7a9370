//! Breach rules evaluated over a tenant's window of pricing data.
//!
//! Rules are pure: they read a `TenantWindow` and return the `Candidate`
//! alerts it implies, in a stable order. They never fail. Rows which reference a
//! SKU that's not part of the window are stale or orphaned, and are skipped.
use chrono::{DateTime, Duration, Utc};
use models::{Alert, AlertStatus, AlertType, CompetitorSnapshot, Id, SaleRow, Severity, Sku};
use std::collections::{BTreeMap, HashMap};

mod dead_stock;
mod sales;
mod undercut;

pub use undercut::latest_snapshots;

/// Sales older than this many days aren't evaluated for price breaches.
pub const SALES_WINDOW_DAYS: i64 = 30;
/// SKUs which haven't sold within this many days are dead stock.
pub const DEAD_STOCK_DAYS: i64 = 90;

/// The inputs of one tenant's evaluation.
#[derive(Debug, Clone)]
pub struct TenantWindow {
    pub tenant_id: Id,
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// SKUs of the tenant, indexed on their id.
    pub skus: BTreeMap<Id, Sku>,
    /// Sales within `SALES_WINDOW_DAYS` of `now`.
    pub sales: Vec<SaleRow>,
    /// Competitor snapshots in capture (and then insertion) order.
    pub snapshots: Vec<CompetitorSnapshot>,
    /// Last sale time of each SKU, over all history.
    pub last_sales: HashMap<Id, DateTime<Utc>>,
}

impl TenantWindow {
    pub fn new(
        tenant_id: Id,
        now: DateTime<Utc>,
        skus: Vec<Sku>,
        sales: Vec<SaleRow>,
        snapshots: Vec<CompetitorSnapshot>,
        last_sales: HashMap<Id, DateTime<Utc>>,
    ) -> Self {
        Self {
            tenant_id,
            now,
            skus: skus.into_iter().map(|sku| (sku.id, sku)).collect(),
            sales,
            snapshots,
            last_sales,
        }
    }

    /// Earliest `sold_at` of a sale evaluated at `now`.
    pub fn sales_since(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(SALES_WINDOW_DAYS)
    }

    /// A SKU is dead if its last sale is strictly before this instant.
    pub fn dead_stock_cutoff(&self) -> DateTime<Utc> {
        self.now - Duration::days(DEAD_STOCK_DAYS)
    }
}

/// An alert which a rule would raise, prior to its insertion.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub alert_type: AlertType,
    pub sku_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competitor_id: Option<Id>,
    pub impact: f64,
    pub severity: Severity,
    pub dedupe_key: String,
    pub evidence: serde_json::Value,
}

impl Candidate {
    /// Build the `Open` alert of this candidate.
    pub fn into_alert(self, id: Id, tenant_id: Id, created_at: DateTime<Utc>) -> Alert {
        let Candidate {
            alert_type,
            sku_id,
            dealer_id,
            competitor_id,
            impact,
            severity,
            dedupe_key,
            evidence,
        } = self;

        Alert {
            id,
            tenant_id,
            alert_type,
            sku_id,
            dealer_id,
            competitor_id,
            impact_amount: impact,
            severity,
            status: AlertStatus::Open,
            evidence,
            dedupe_key,
            created_at,
        }
    }
}

/// The rules evaluated by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// A sale below the SKU's floor price (MAP).
    FloorPrice,
    /// A sale below the SKU's list price (MRP).
    ListPrice,
    /// A competitor's latest price below the SKU's floor price.
    Undercut,
    /// A SKU without a recent sale.
    DeadStock,
}

impl Rule {
    pub const ALL: [Rule; 4] = [
        Rule::FloorPrice,
        Rule::ListPrice,
        Rule::Undercut,
        Rule::DeadStock,
    ];

    pub fn evaluate(&self, window: &TenantWindow) -> Vec<Candidate> {
        match self {
            Rule::FloorPrice => sales::floor_breaches(window),
            Rule::ListPrice => sales::list_breaches(window),
            Rule::Undercut => undercut::undercuts(window),
            Rule::DeadStock => dead_stock::dead_stock(window),
        }
    }
}
