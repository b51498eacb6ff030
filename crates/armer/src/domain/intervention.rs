#![forbid(unsafe_code)]

use crate::domain::{ArmState, ChangeSource};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A manual or semi-manual request, such as a button push, a mobile action
/// or a change made directly on the panel.
///
/// A recorded `state` means somebody chose that state explicitly; `None`
/// marks a request to recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intervention {
    pub created_at: DateTime<Utc>,
    pub source: ChangeSource,
    pub state: Option<ArmState>,
}

impl Intervention {
    pub fn new(created_at: DateTime<Utc>, source: ChangeSource, state: Option<ArmState>) -> Self {
        Self {
            created_at,
            source,
            state,
        }
    }
}
