//! Logging system for tuxlog
//!
//! Provides leveled console + file logging, size-based rotation with
//! out-of-band backup compression, and retention pruning.

mod level;
mod rotate;
mod session;

pub use level::{Level, ParseLevelError};
pub use rotate::{prune_backups, rotate, Rotation, COMPRESSED_SUFFIX};
pub use session::{LogSession, SessionOptions, SetupError};
