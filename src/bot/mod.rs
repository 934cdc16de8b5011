//! The reply bot: dedup state, prompt building, and the poll loop.

pub mod poller;
pub mod prompt;
pub mod seen;

pub use poller::{Poller, PollerDeps, ProcessEpoch, ReplySettings, TickReport, spawn_poller};
pub use prompt::{ReplyPrompt, strip_mention};
pub use seen::SeenSet;
