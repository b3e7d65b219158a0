//! Queue module: per-key lanes, the registry that owns them, and the
//! completion handles handed back to submitters.

mod completion;
mod lane;
mod record;
mod registry;
mod state;

pub use completion::CompletionHandle;
pub use lane::{KeyLane, LaneStatus};
pub use record::TaskRecord;
pub use registry::{ActiveWorkers, LaneRegistry};
pub use state::LaneState;

pub(crate) use completion::completion;
pub(crate) use lane::{Abandoned, Next};
pub(crate) use registry::{Release, WorkerTicket};
