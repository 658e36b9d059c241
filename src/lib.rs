pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod logging;
pub mod probe;
pub mod queue;
pub mod scan;
pub mod util;
pub mod workflow;
