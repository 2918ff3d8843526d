pub mod gate;
pub mod purchase;

pub use gate::{evaluate_gate, evaluate_gate_on};
pub use purchase::{purchase, PurchaseReceipt, PurchaseRequest};
