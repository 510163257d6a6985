pub mod period;

pub use period::resolve_period;
