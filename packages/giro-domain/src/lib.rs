pub mod delta;
pub mod identity;
pub mod tabular;

mod error;
mod record;

pub use delta::{DeltaSummary, KeyedDelta, compute_keyed_delta};
pub use error::{Error, Result};
pub use record::{DeltaType, EventRecord, Location};
pub use tabular::{TabularDelta, compute_tabular_delta};
