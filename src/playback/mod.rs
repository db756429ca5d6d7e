pub mod queue;
pub mod scheduler;

pub use queue::{PlaybackEvent, PlaybackQueue};
pub use scheduler::PlaybackScheduler;
