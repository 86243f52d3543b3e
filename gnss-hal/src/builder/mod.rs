//! Builders join parser outputs from the queues into fused records. Each
//! builder owns its background threads; dropping a builder stops and joins
//! them.

mod location;
mod measurement;
mod sv_info;

pub use location::LocationBuilder;
pub use measurement::MeasurementBuilder;
pub use sv_info::GnssInfoBuilder;

use std::time::Duration;

/// Wait bound of one queue pop inside a builder.
pub(crate) const QUEUE_WAIT: Duration = Duration::from_millis(1000);
