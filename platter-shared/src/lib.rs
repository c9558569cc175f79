pub mod money;
pub mod pii;
pub mod models;

pub use money::{Money, MoneyError};
pub use pii::Masked;
