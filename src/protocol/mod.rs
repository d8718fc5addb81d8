//! Line protocol spoken over stdin/stdout.
//!
//! One command per line; `find` and `range` answer on the response stream,
//! everything else is silent unless it fails, in which case a diagnostic is
//! written to the separate diagnostics stream.

mod command;
mod dispatcher;

pub use command::Command;
pub use dispatcher::{Dispatcher, Outcome};
