//! Replays a JSON-lines script of things happening in the home.
//!
//! ```text
//! {"event": "presence", "occupant": "person.alex", "presence": "not_home"}
//! {"event": "sun", "position": "below_horizon"}
//! {"event": "wait", "seconds": 5}
//! {"event": "reset"}
//! ```

use crate::error::Error;
use armer::domain::{CalendarEvent, PanelReading, Presence, SunPosition};
use armer::host::{MemoryHome, WorldStateReader};
use armer::{ControlEvent, EngineEvent, EngineMessage};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Presence {
        occupant: String,
        presence: Presence,
    },
    Sun {
        position: SunPosition,
    },
    Button {
        entity_id: String,
    },
    Mobile {
        action: String,
    },
    /// Somebody changes the panel by hand.
    Panel {
        state: String,
        #[serde(default)]
        changed_by: Option<String>,
    },
    CalendarEvent {
        calendar: String,
        // Flattened, so this name never appears on the wire; renamed only to
        // avoid serde's conflict check against the `event` tag.
        #[serde(flatten, rename = "calendar_event_fields")]
        event: CalendarEvent,
    },
    RemoveCalendarEvent {
        calendar: String,
        uid: String,
    },
    CalendarOffline {
        calendar: String,
        offline: bool,
    },
    Wait {
        seconds: u64,
    },
    Reset,
    Configuration,
}

/// What the replay loop has to do after applying an event to the home.
#[derive(Debug)]
pub enum Step {
    Engine(EngineEvent),
    Wait(Duration),
    Reset,
    Configuration,
    Nothing,
}

impl SimEvent {
    /// Change the home, returning what the engine should hear about it.
    pub fn apply(self, home: &MemoryHome, panel: &str) -> Step {
        match self {
            SimEvent::Presence { occupant, presence } => {
                let old = home.presence(&occupant);
                home.set_presence(&occupant, presence);
                Step::Engine(EngineEvent::OccupancyChanged {
                    occupant,
                    old,
                    new: Some(presence),
                })
            }
            SimEvent::Sun { position } => {
                home.set_sun(position);
                Step::Engine(match position {
                    SunPosition::AboveHorizon => EngineEvent::Sunrise,
                    SunPosition::BelowHorizon => EngineEvent::Sunset,
                })
            }
            SimEvent::Button { entity_id } => {
                Step::Engine(EngineEvent::ButtonPressed { entity_id })
            }
            SimEvent::Mobile { action } => Step::Engine(EngineEvent::MobileAction { action }),
            SimEvent::Panel { state, changed_by } => {
                let old = home.panel_state(panel);
                home.set_panel(
                    panel,
                    PanelReading {
                        state: state.clone(),
                        changed_by: changed_by.clone(),
                    },
                );
                Step::Engine(EngineEvent::PanelChanged {
                    old,
                    new: Some(state),
                    changed_by,
                })
            }
            SimEvent::CalendarEvent { calendar, event } => {
                home.add_calendar_event(&calendar, event);
                Step::Nothing
            }
            SimEvent::RemoveCalendarEvent { calendar, uid } => {
                home.remove_calendar_event(&calendar, &uid);
                Step::Nothing
            }
            SimEvent::CalendarOffline { calendar, offline } => {
                home.set_calendar_offline(&calendar, offline);
                Step::Nothing
            }
            SimEvent::Wait { seconds } => Step::Wait(Duration::from_secs(seconds)),
            SimEvent::Reset => Step::Reset,
            SimEvent::Configuration => Step::Configuration,
        }
    }
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str, number: usize) -> Result<Option<SimEvent>, Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| Error::InvalidEvent {
            line: number,
            source,
        })
}

/// Feed every event in `script` to the engine, in order. Engine events
/// and control requests go through the same inbox.
pub async fn replay(
    script: impl AsyncBufRead + Unpin,
    home: &MemoryHome,
    panel: &str,
    inbox: &mpsc::UnboundedSender<EngineMessage>,
) -> Result<usize, Error> {
    let mut lines = script.lines();
    let mut number = 0;
    let mut replayed = 0;

    while let Some(line) = lines.next_line().await.map_err(Error::Script)? {
        number += 1;
        let event = match parse_line(&line, number) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "skipping event");
                continue;
            }
        };
        debug!(?event, "replaying");
        replayed += 1;

        match event.apply(home, panel) {
            Step::Engine(event) => inbox.send(event.into()).map_err(|_| Error::EngineGone)?,
            Step::Wait(duration) => tokio::time::sleep(duration).await,
            Step::Reset => {
                let (reply, outcome) = oneshot::channel();
                inbox
                    .send(ControlEvent::Reset(reply).into())
                    .map_err(|_| Error::EngineGone)?;
                let state = outcome.await.map_err(|_| Error::EngineGone)?;
                info!(?state, "reset");
            }
            Step::Configuration => {
                let (reply, outcome) = oneshot::channel();
                inbox
                    .send(ControlEvent::EnquireConfiguration(reply).into())
                    .map_err(|_| Error::EngineGone)?;
                let config = outcome.await.map_err(|_| Error::EngineGone)?;
                info!(%config, "configuration");
            }
            Step::Nothing => {}
        }
    }

    Ok(replayed)
}
