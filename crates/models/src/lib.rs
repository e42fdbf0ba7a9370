mod alerts;
mod catalog;
mod id;

pub use alerts::{Alert, AlertStatus, AlertType, Severity};
pub use catalog::{CompetitorSnapshot, SaleRow, Sku, Tenant};
pub use id::{Id, IdGenerator};
