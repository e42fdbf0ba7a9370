use super::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant is an isolated unit of pricing and inventory data.
/// No scan ever aggregates across tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
pub struct Tenant {
    pub id: Id,
    pub slug: String,
    pub name: String,
}

/// A stock-keeping unit along with its reference prices and inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub id: Id,
    pub tenant_id: Id,
    pub sku_code: String,
    pub name: String,
    /// Maximum retail ("list") price.
    pub mrp: f64,
    /// Minimum advertised ("floor") price. Expected to be at most `mrp`,
    /// but that's not enforced here.
    pub map: f64,
    /// Unit cost of the inventory.
    pub cost: f64,
    pub on_hand_qty: i32,
}

/// A dealer's sale of a SKU. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SaleRow {
    pub id: Id,
    pub tenant_id: Id,
    pub sku_id: Id,
    pub dealer_id: Id,
    pub sold_price: f64,
    pub qty: i32,
    pub sold_at: DateTime<Utc>,
    pub order_ref: String,
}

/// An observation of a competitor's price for a SKU. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct CompetitorSnapshot {
    pub id: Id,
    pub tenant_id: Id,
    pub sku_id: Id,
    pub competitor_id: Id,
    pub price: f64,
    pub captured_at: DateTime<Utc>,
    pub url: String,
}
