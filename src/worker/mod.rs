pub mod dispatcher;
pub mod log_file;
pub mod worker;

pub use dispatcher::{DispatchOptions, DispatchOutcome, Dispatcher};
pub use worker::{BackgroundHandle, CommandPlan};
