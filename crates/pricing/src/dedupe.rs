use chrono::{DateTime, Utc};
use models::{AlertType, Id};

/// UTC calendar day of `at`, as `YYYY-MM-DD`.
pub fn day_bucket(at: DateTime<Utc>) -> String {
    at.date_naive().format("%Y-%m-%d").to_string()
}

/// Build the deduplication key of a would-be alert.
///
/// The key is `{RULE}:{primary}:{secondary}:{YYYY-MM-DD}`, where the day is the
/// UTC day of the triggering event. Rules having no secondary entity omit that
/// segment. Identical detections on the same day always produce identical keys,
/// and detections on different days never collide.
pub fn dedupe_key(
    rule: AlertType,
    primary: Id,
    secondary: Option<Id>,
    at: DateTime<Utc>,
) -> String {
    let day = day_bucket(at);
    match secondary {
        Some(secondary) => format!("{}:{primary}:{secondary}:{day}", rule.name()),
        None => format!("{}:{primary}:{day}", rule.name()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_shapes() {
        let sku = Id::from_u64(0x11);
        let dealer = Id::from_u64(0x22);
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();

        assert_eq!(
            dedupe_key(AlertType::Map, sku, Some(dealer), at),
            "MAP:0000000000000011:0000000000000022:2024-03-09"
        );
        assert_eq!(
            dedupe_key(AlertType::DeadStock, sku, None, at),
            "DEAD_STOCK:0000000000000011:2024-03-09"
        );
    }

    #[test]
    fn test_keys_bucket_by_utc_day() {
        let sku = Id::from_u64(1);
        let competitor = Id::from_u64(2);
        let key = |at| dedupe_key(AlertType::Undercut, sku, Some(competitor), at);

        let morning = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        assert_eq!(key(morning), key(night));
        assert_ne!(key(night), key(next_day));

        // Rule type and entity order are both part of the identity.
        assert_ne!(
            dedupe_key(AlertType::Map, sku, Some(competitor), morning),
            dedupe_key(AlertType::Mrp, sku, Some(competitor), morning),
        );
        assert_ne!(
            dedupe_key(AlertType::Map, sku, Some(competitor), morning),
            dedupe_key(AlertType::Map, competitor, Some(sku), morning),
        );
    }
}
