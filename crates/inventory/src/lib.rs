//! Inventory service: the stock ledger and logical reservations.
//!
//! [`StockLedger`] owns per-(product, location) quantities and their
//! transaction history. [`InventoryService`] layers availability checks and
//! reservation holds on top of it; this is what order and purchase-order
//! flows talk to.

pub mod ledger;
pub mod service;

pub use ledger::{STOCK_RECORD_KEY_SCOPE, StockLedger, stock_record_key};
pub use service::{DEFAULT_RECEIVING_LOCATION, InventoryService};
