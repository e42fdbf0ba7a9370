use super::{Candidate, TenantWindow};
use models::{AlertType, CompetitorSnapshot, Id};
use serde_json::json;
use std::collections::btree_map::{BTreeMap, Entry};

pub(super) fn undercuts(window: &TenantWindow) -> Vec<Candidate> {
    latest_snapshots(&window.snapshots)
        .into_values()
        .filter_map(|snapshot| {
            let sku = window.skus.get(&snapshot.sku_id)?;

            let impact =
                pricing::undercut_impact(sku.map, snapshot.price, pricing::UNDERCUT_FORECAST_QTY);
            if impact <= 0.0 {
                return None;
            }

            Some(Candidate {
                alert_type: AlertType::Undercut,
                sku_id: snapshot.sku_id,
                dealer_id: None,
                competitor_id: Some(snapshot.competitor_id),
                impact,
                severity: pricing::severity_from_impact(impact),
                dedupe_key: pricing::dedupe_key(
                    AlertType::Undercut,
                    snapshot.sku_id,
                    Some(snapshot.competitor_id),
                    snapshot.captured_at,
                ),
                evidence: json!({
                    "targetPrice": sku.map,
                    "competitorPrice": snapshot.price,
                    "forecastQty": pricing::UNDERCUT_FORECAST_QTY,
                    "capturedAt": snapshot.captured_at,
                    "competitorId": snapshot.competitor_id,
                    "skuId": snapshot.sku_id,
                    "url": snapshot.url,
                }),
            })
        })
        .collect()
}

/// Reduce `snapshots` to the most recently captured snapshot of each
/// (SKU, competitor) pair. Of snapshots captured at the same instant,
/// the first one seen is kept.
pub fn latest_snapshots(
    snapshots: &[CompetitorSnapshot],
) -> BTreeMap<(Id, Id), &CompetitorSnapshot> {
    let mut latest = BTreeMap::new();

    for snapshot in snapshots {
        match latest.entry((snapshot.sku_id, snapshot.competitor_id)) {
            Entry::Vacant(entry) => {
                entry.insert(snapshot);
            }
            Entry::Occupied(mut entry) => {
                if snapshot.captured_at > entry.get().captured_at {
                    entry.insert(snapshot);
                }
            }
        }
    }
    latest
}
