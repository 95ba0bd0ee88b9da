//! Value handles and in-place update primitives

pub mod handle;
pub mod update;

pub use handle::ValueHandle;
pub use update::TimerHandle;
