//! The GPU allocation broker's reservation engine: the admission
//! predicate, the holder-process lifecycle, the request dispatcher, and
//! the reaper loop, composed into a runnable TCP service.

pub mod admission;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod reaper;
pub mod registry;
pub mod release;

pub use broker::Broker;
pub use config::{BrokerConfig, CliArgs};
pub use error::{BrokerError, BrokerResult};
