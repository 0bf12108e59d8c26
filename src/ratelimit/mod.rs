//! Rate limiting logic and state management.

mod clock;
mod entry;
mod limiter;
mod policy;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{RateLimitEntry, WINDOW};
pub use limiter::RateLimiter;
pub use policy::IpList;
pub use sweeper::{spawn_sweeper, SweeperHandle};
