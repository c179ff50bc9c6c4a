//! Plumbing shared by the gadget daemons: logging setup and polling deadlines.

mod logger;
mod timeout;

pub use logger::{setup_logging, verbosity_level};
pub use timeout::Timeout;
