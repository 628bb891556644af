pub mod registration;
pub mod units;
