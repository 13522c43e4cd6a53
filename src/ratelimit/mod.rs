//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod clock;
mod limiter;
mod sweeper;

pub use backend::AccessControl;
pub use bucket::{Bucket, BucketState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{BucketSnapshot, Limiter, LimiterSettings};
pub use sweeper::spawn_sweeper;
