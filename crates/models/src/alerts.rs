use super::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The business rule which raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// A dealer sold below the floor (minimum advertised) price.
    Map,
    /// A dealer sold below the list (maximum retail) price.
    Mrp,
    /// A competitor's latest observed price undercuts the floor price.
    Undercut,
    /// Inventory which hasn't sold recently.
    DeadStock,
}

impl AlertType {
    pub fn name(&self) -> &'static str {
        match self {
            AlertType::Map => "MAP",
            AlertType::Mrp => "MRP",
            AlertType::Undercut => "UNDERCUT",
            AlertType::DeadStock => "DEAD_STOCK",
        }
    }

    pub fn all() -> &'static [AlertType] {
        &[
            AlertType::Map,
            AlertType::Mrp,
            AlertType::Undercut,
            AlertType::DeadStock,
        ]
    }

    pub fn from_name(name: &str) -> Option<AlertType> {
        Self::all()
            .iter()
            .find(|ty| name.eq_ignore_ascii_case(ty.name()))
            .copied()
    }
}

/// Coarse bucket of an alert's monetary impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Med,
    High,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
        }
    }

    pub fn from_name(name: &str) -> Option<Severity> {
        [Severity::Low, Severity::Med, Severity::High]
            .into_iter()
            .find(|s| name.eq_ignore_ascii_case(s.name()))
    }
}

/// Lifecycle of an alert. Alerts are created `Open`, and are later
/// acknowledged and resolved by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Ack,
    Resolved,
}

impl AlertStatus {
    pub fn name(&self) -> &'static str {
        match self {
            AlertStatus::Open => "OPEN",
            AlertStatus::Ack => "ACK",
            AlertStatus::Resolved => "RESOLVED",
        }
    }

    pub fn from_name(name: &str) -> Option<AlertStatus> {
        [AlertStatus::Open, AlertStatus::Ack, AlertStatus::Resolved]
            .into_iter()
            .find(|s| name.eq_ignore_ascii_case(s.name()))
    }

    /// Status only moves forward: OPEN -> ACK -> RESOLVED.
    /// Acknowledgement may be skipped. Re-applying the current status is a no-op
    /// and is permitted.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        self <= next
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.name())
                }
            }
        )*
    };
}
impl_display!(AlertType, Severity, AlertStatus);

// Enums are stored as TEXT columns holding their `name()`.
#[cfg(feature = "sqlx-support")]
macro_rules! impl_sqlx_text {
    ($($ty:ty),*) => {
        $(
            impl sqlx::Type<sqlx::postgres::Postgres> for $ty {
                fn type_info() -> sqlx::postgres::PgTypeInfo {
                    <&str as sqlx::Type<sqlx::postgres::Postgres>>::type_info()
                }
                fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                    <&str as sqlx::Type<sqlx::postgres::Postgres>>::compatible(ty)
                }
            }

            impl sqlx::Encode<'_, sqlx::postgres::Postgres> for $ty {
                fn encode_by_ref(
                    &self,
                    buf: &mut sqlx::postgres::PgArgumentBuffer,
                ) -> sqlx::encode::IsNull {
                    <&str as sqlx::Encode<'_, sqlx::postgres::Postgres>>::encode_by_ref(&self.name(), buf)
                }
            }

            impl sqlx::Decode<'_, sqlx::postgres::Postgres> for $ty {
                fn decode(
                    value: sqlx::postgres::PgValueRef<'_>,
                ) -> Result<Self, sqlx::error::BoxDynError> {
                    let name = <&str as sqlx::Decode<'_, sqlx::postgres::Postgres>>::decode(value)?;
                    <$ty>::from_name(name).ok_or_else(|| {
                        format!("invalid {}: {name:?}", stringify!($ty)).into()
                    })
                }
            }
        )*
    };
}
#[cfg(feature = "sqlx-support")]
impl_sqlx_text!(AlertType, Severity, AlertStatus);

/// An alert raised by a scan. The `dedupe_key` is unique per tenant,
/// and is the sole guard against raising the same alert twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Id,
    pub tenant_id: Id,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub sku_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealer_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor_id: Option<Id>,
    pub impact_amount: f64,
    pub severity: Severity,
    pub status: AlertStatus,
    /// The inputs which produced `impact_amount`, retained for audit.
    pub evidence: serde_json::Value,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for ty in AlertType::all() {
            assert_eq!(AlertType::from_name(ty.name()), Some(*ty));
            let json = serde_json::to_string(ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.name()));
        }
        assert_eq!(AlertType::from_name("dead_stock"), Some(AlertType::DeadStock));
        assert_eq!(AlertType::from_name("nope"), None);

        assert_eq!(Severity::from_name("MED"), Some(Severity::Med));
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), r#""HIGH""#);
        assert_eq!(AlertStatus::from_name("ack"), Some(AlertStatus::Ack));
    }

    #[test]
    fn test_status_transitions() {
        use AlertStatus::*;

        assert!(Open.can_transition_to(Ack));
        assert!(Ack.can_transition_to(Resolved));
        assert!(Open.can_transition_to(Resolved));
        assert!(Ack.can_transition_to(Ack));

        assert!(!Ack.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Ack));
    }
}
