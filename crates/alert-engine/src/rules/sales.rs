use super::{Candidate, TenantWindow};
use models::{AlertType, Sku};
use serde_json::json;

pub(super) fn floor_breaches(window: &TenantWindow) -> Vec<Candidate> {
    breaches(
        window,
        AlertType::Map,
        "map",
        |sku| sku.map,
        pricing::floor_breach_impact,
    )
}

pub(super) fn list_breaches(window: &TenantWindow) -> Vec<Candidate> {
    breaches(
        window,
        AlertType::Mrp,
        "mrp",
        |sku| sku.mrp,
        pricing::list_breach_impact,
    )
}

// Floor and list breaches differ only in the reference price they compare against.
fn breaches(
    window: &TenantWindow,
    alert_type: AlertType,
    reference_name: &str,
    reference: fn(&Sku) -> f64,
    impact_of: fn(f64, f64, f64) -> f64,
) -> Vec<Candidate> {
    window
        .sales
        .iter()
        .filter_map(|sale| {
            let sku = window.skus.get(&sale.sku_id)?;
            let reference = reference(sku);

            let impact = impact_of(reference, sale.sold_price, sale.qty as f64);
            if impact <= 0.0 {
                return None;
            }

            let mut evidence = json!({
                "soldPrice": sale.sold_price,
                "qty": sale.qty,
                "soldAt": sale.sold_at,
                "orderRef": sale.order_ref,
                "skuId": sale.sku_id,
                "dealerId": sale.dealer_id,
            });
            evidence[reference_name] = json!(reference);

            Some(Candidate {
                alert_type,
                sku_id: sale.sku_id,
                dealer_id: Some(sale.dealer_id),
                competitor_id: None,
                impact,
                severity: pricing::severity_from_impact(impact),
                dedupe_key: pricing::dedupe_key(
                    alert_type,
                    sale.sku_id,
                    Some(sale.dealer_id),
                    sale.sold_at,
                ),
                evidence,
            })
        })
        .collect()
}
