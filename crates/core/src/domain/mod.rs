pub mod analysis;
pub mod contract;
pub mod holding;
pub mod receipt;
pub mod trade;
pub mod validation;
