pub mod allocator;
pub mod code;
pub mod dice;
pub mod events;
pub mod log;
pub mod sweeper;

pub use allocator::{create_session, AllocationError};
pub use code::SessionCode;
pub use sweeper::{sweep_expired, SweepError, SweepReport};

/// Current time in epoch seconds, the unit every stored timestamp uses.
pub fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
