//! Domain model (ids, keys, episodes, errors).

pub mod episode;
pub mod errors;
pub mod ids;
pub mod key;

pub use episode::{Episode, EpisodeRequest, EpisodeSource};
pub use errors::{ApplyError, KeyError, SubmitError, TaskError, WaitError};
pub use ids::TaskId;
pub use key::{MAX_KEY_LEN, NamespaceKey};
