use models::Severity;

/// Near-term units assumed to be at risk when a competitor undercuts us.
/// This is a fixed approximation and not a measured quantity.
pub const UNDERCUT_FORECAST_QTY: f64 = 10.0;

/// Impacts below this amount are `Severity::Low`.
pub const LOW_CEILING: f64 = 1_000.0;
/// Impacts below this amount (and at least `LOW_CEILING`) are `Severity::Med`.
pub const MED_CEILING: f64 = 10_000.0;

/// Impact of selling `qty` units at `sold_price`, below the `floor` price.
pub fn floor_breach_impact(floor: f64, sold_price: f64, qty: f64) -> f64 {
    shortfall(floor, sold_price, qty)
}

/// Impact of selling `qty` units at `sold_price`, below the `list_price`.
pub fn list_breach_impact(list_price: f64, sold_price: f64, qty: f64) -> f64 {
    shortfall(list_price, sold_price, qty)
}

/// Impact of a competitor pricing at `competitor_price` against our `target_price`,
/// over `forecast_qty` units (usually `UNDERCUT_FORECAST_QTY`).
pub fn undercut_impact(target_price: f64, competitor_price: f64, forecast_qty: f64) -> f64 {
    shortfall(target_price, competitor_price, forecast_qty)
}

/// Value at cost of `on_hand_qty` units of stale inventory.
pub fn dead_stock_value(unit_cost: f64, on_hand_qty: f64) -> f64 {
    round2((unit_cost * on_hand_qty).max(0.0))
}

/// Map a monetary impact to its severity tier.
/// Each tier includes its lower bound.
pub fn severity_from_impact(impact: f64) -> Severity {
    if impact < LOW_CEILING {
        Severity::Low
    } else if impact < MED_CEILING {
        Severity::Med
    } else {
        Severity::High
    }
}

/// Round to two decimal places, half-up, after nudging by `f64::EPSILON`.
///
/// The nudge absorbs representation error in values like `1.005` which would
/// otherwise truncate downward. Alert amounts must match previously stored amounts
/// exactly, so this must not be "improved" (for example by switching to
/// `f64::round`, which rounds negative ties away from zero).
pub fn round2(value: f64) -> f64 {
    round_half_up((value + f64::EPSILON) * 100.0) / 100.0
}

// Nearest integer, with ties rounding toward positive infinity.
fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

fn shortfall(reference: f64, actual: f64, qty: f64) -> f64 {
    if actual >= reference {
        return 0.0;
    }
    round2(((reference - actual) * qty).max(0.0))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_breach_cases() {
        assert_eq!(floor_breach_impact(100.0, 90.0, 5.0), 50.0);
        assert_eq!(floor_breach_impact(100.0, 80.0, 2.0), 40.0);
        assert_eq!(list_breach_impact(120.0, 100.0, 2.0), 40.0);
        assert_eq!(list_breach_impact(120.0, 100.0, 1.0), 20.0);
        assert_eq!(undercut_impact(150.0, 100.0, UNDERCUT_FORECAST_QTY), 500.0);
        assert_eq!(undercut_impact(90.0, 80.0, 10.0), 100.0);
        assert_eq!(dead_stock_value(25.0, 10.0), 250.0);
        assert_eq!(dead_stock_value(55.0, 3.0), 165.0);
    }

    #[test]
    fn test_no_breach_is_zero() {
        assert_eq!(floor_breach_impact(100.0, 100.0, 5.0), 0.0);
        assert_eq!(floor_breach_impact(100.0, 100.0, 2.0), 0.0);
        assert_eq!(list_breach_impact(120.0, 130.0, 2.0), 0.0);
        assert_eq!(list_breach_impact(120.0, 150.0, 2.0), 0.0);
        assert_eq!(undercut_impact(100.0, 110.0, 10.0), 0.0);
        assert_eq!(undercut_impact(90.0, 95.0, 10.0), 0.0);
        assert_eq!(dead_stock_value(50.0, 0.0), 0.0);
        // Negative inputs clamp to zero rather than producing a negative value.
        assert_eq!(dead_stock_value(50.0, -3.0), 0.0);
    }

    #[test]
    fn test_rounding_is_deterministic() {
        assert_eq!(floor_breach_impact(100.11, 99.99, 3.0), 0.36);
        assert_eq!(floor_breach_impact(100.1, 99.99, 3.0), 0.33);
        assert_eq!(undercut_impact(100.5, 99.995, 7.0), 3.53);
        assert_eq!(undercut_impact(101.005, 100.5, 7.0), 3.53);

        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(40.0), 40.0);
        assert_eq!(round2(1234.5678), 1234.57);
    }

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(severity_from_impact(0.0), Severity::Low);
        assert_eq!(severity_from_impact(999.99), Severity::Low);
        assert_eq!(severity_from_impact(1000.0), Severity::Med);
        assert_eq!(severity_from_impact(9999.0), Severity::Med);
        assert_eq!(severity_from_impact(9999.99), Severity::Med);
        assert_eq!(severity_from_impact(10000.0), Severity::High);
        assert_eq!(severity_from_impact(1.0e9), Severity::High);
    }
}
