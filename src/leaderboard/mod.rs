pub mod builder;
pub mod returns;

pub use builder::{build_week, BuildOutcome};
pub use returns::{account_value, weekly_return};
