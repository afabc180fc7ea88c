//! Background loops: the queue worker and the cleanup sweeper, plus the
//! temp workspace they share.

pub mod queue;
pub mod sweeper;
pub mod ticker;
pub mod workspace;

pub use queue::{QueueWorker, TickResult};
pub use sweeper::{CleanupSweeper, SweepReport};
pub use ticker::{IntervalTicker, ManualTicker, ManualTrigger, Ticker};
pub use workspace::{InFlightGuard, TempWorkspace};
