use super::{Candidate, TenantWindow, DEAD_STOCK_DAYS};
use models::AlertType;
use serde_json::json;

pub(super) fn dead_stock(window: &TenantWindow) -> Vec<Candidate> {
    let cutoff = window.dead_stock_cutoff();

    window
        .skus
        .values()
        .filter_map(|sku| {
            let last_sale_at = window.last_sales.get(&sku.id).copied();

            if matches!(last_sale_at, Some(at) if at >= cutoff) {
                return None; // Sold recently enough.
            }
            // Note that SKUs with nothing on hand are still raised, at zero value.
            let impact = pricing::dead_stock_value(sku.cost, sku.on_hand_qty as f64);

            Some(Candidate {
                alert_type: AlertType::DeadStock,
                sku_id: sku.id,
                dealer_id: None,
                competitor_id: None,
                impact,
                severity: pricing::severity_from_impact(impact),
                dedupe_key: pricing::dedupe_key(AlertType::DeadStock, sku.id, None, window.now),
                evidence: json!({
                    "skuId": sku.id,
                    "cost": sku.cost,
                    "onHandQty": sku.on_hand_qty,
                    "lastSaleAt": last_sale_at,
                    "cutoff": cutoff,
                    "thresholdDays": DEAD_STOCK_DAYS,
                    "checkedAt": window.now,
                }),
            })
        })
        .collect()
}
