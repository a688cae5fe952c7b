pub mod cache;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod logging;
pub mod outcome;
pub mod render;
pub mod server;
pub mod tools;
pub mod watchdog;

pub use job::{JobRunner, PreviewRequest};
pub use outcome::{JobOutcome, ResultCode};
