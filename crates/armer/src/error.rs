#![forbid(unsafe_code)]

use crate::host::HostError;
use crate::rules::ExprError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("transition condition failed: {0}")]
    Evaluation(#[from] ExprError),

    #[error("event channel closed")]
    ChannelClosed,
}
