#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{ArmState, ChangeSource, Intervention};
use crate::engine::{EngineEvent, EngineMessage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Work the engine asks to be reminded of later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    DelayedArm {
        state: ArmState,
        source: ChangeSource,
        requested_at: DateTime<Utc>,
    },
    DelayedReset {
        source: ChangeSource,
        intervention: Option<Intervention>,
        requested_at: DateTime<Utc>,
    },
    CalendarEventStart {
        calendar_id: String,
        event_id: String,
    },
    CalendarEventEnd {
        calendar_id: String,
        event_id: String,
    },
    CalendarPoll {
        calendar_id: String,
    },
    Housekeeping,
}

/// Delivers [`TimerTask`]s back to the engine. A task whose token is
/// cancelled before it is due is never delivered.
pub trait Scheduler: Send + Sync {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask, cancel: CancellationToken);

    /// Deliver `task` every `period`, starting one period from now.
    fn schedule_every(&self, period: Duration, task: TimerTask, cancel: CancellationToken);
}

/// Timers backed by tokio tasks, delivered through the engine's inbox.
pub struct TokioScheduler {
    inbox: mpsc::UnboundedSender<EngineMessage>,
    clock: Arc<dyn Clock>,
}

impl TokioScheduler {
    pub fn new(inbox: mpsc::UnboundedSender<EngineMessage>, clock: Arc<dyn Clock>) -> Self {
        Self { inbox, clock }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask, cancel: CancellationToken) {
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if inbox.send(EngineEvent::Timer(task).into()).is_err() {
                        debug!("engine gone, dropping timer");
                    }
                }
            }
        });
    }

    fn schedule_every(&self, period: Duration, task: TimerTask, cancel: CancellationToken) {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if inbox.send(EngineEvent::Timer(task.clone()).into()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[derive(Debug)]
struct Entry {
    at: DateTime<Utc>,
    period: Option<Duration>,
    task: TimerTask,
    cancel: CancellationToken,
}

/// Timers that only fire when asked, for driving the engine step by step.
pub struct ManualScheduler {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<Entry>>,
}

impl ManualScheduler {
    /// `clock` anchors periodic timers.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Take the earliest live task due at or before `until`. Periodic
    /// tasks are re-armed one period later.
    pub fn pop_due(&self, until: DateTime<Utc>) -> Option<(DateTime<Utc>, TimerTask)> {
        let mut entries = self.entries.lock();
        entries.retain(|entry| !entry.cancel.is_cancelled());
        let index = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.at <= until)
            .min_by_key(|(_, entry)| entry.at)
            .map(|(index, _)| index)?;

        let entry = &mut entries[index];
        let at = entry.at;
        let task = entry.task.clone();
        let period = entry.period;
        match period {
            Some(period) => entry.at = at + period,
            None => {
                entries.remove(index);
            }
        }
        Some((at, task))
    }

    /// Live tasks in the order they will fire.
    pub fn pending(&self) -> Vec<(DateTime<Utc>, TimerTask)> {
        let mut pending: Vec<_> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| !entry.cancel.is_cancelled())
            .map(|entry| (entry.at, entry.task.clone()))
            .collect();
        pending.sort_by_key(|(at, _)| *at);
        pending
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask, cancel: CancellationToken) {
        self.entries.lock().push(Entry {
            at,
            period: None,
            task,
            cancel,
        });
    }

    fn schedule_every(&self, period: Duration, task: TimerTask, cancel: CancellationToken) {
        let at = self.clock.now() + period;
        self.entries.lock().push(Entry {
            at,
            period: Some(period),
            task,
            cancel,
        });
    }
}
