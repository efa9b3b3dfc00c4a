pub mod error;
pub mod returns;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use returns::ReturnSeriesBuilder;
pub use stats::TRADING_PERIODS_PER_YEAR;
pub use traits::*;
pub use types::*;
