#![forbid(unsafe_code)]

pub mod calendar;
pub mod clock;
pub mod diagnostics;
pub mod domain;
mod engine;
mod error;
pub mod health;
pub mod host;
pub mod ledger;
pub mod limiter;
pub mod notify;
pub mod rules;
pub mod scheduler;
pub mod snapshot;

pub use engine::{AutoArmEngine, ControlEvent, EngineEvent, EngineMessage, Services};
pub use error::Error;
