#![allow(dead_code)]

use armer::clock::ManualClock;
use armer::domain::{ArmState, PanelReading, Presence, SunPosition, parse_state};
use armer::host::MemoryHome;
use armer::scheduler::ManualScheduler;
use armer::{AutoArmEngine, EngineEvent, Services};
use chrono::{DateTime, TimeZone, Utc};
use config::Config;
use std::sync::Arc;
use std::time::Duration;

pub const PANEL: &str = "alarm_control_panel.home";
pub const ALEX: &str = "person.alex";
pub const SAM: &str = "person.sam";

pub const MINUTE: Duration = Duration::from_secs(60);

/// Midday on a Monday.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

/// Two occupants and the built-in rules.
pub fn base_config() -> Config {
    let mut config = Config::new();
    config.alarm_panel.entity_id = PANEL.to_owned();
    config.occupancy.entity_id = vec![ALEX.to_owned(), SAM.to_owned()];
    config
}

pub struct Harness {
    pub home: Arc<MemoryHome>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub engine: AutoArmEngine,
}

impl Harness {
    /// Everybody home in daylight, panel at `panel`. Not yet initialized.
    pub fn new(config: Config, start: DateTime<Utc>, panel: ArmState) -> Self {
        let home = Arc::new(MemoryHome::new());
        home.set_panel(PANEL, PanelReading::new(panel.as_str()));
        home.set_presence(ALEX, Presence::Home);
        home.set_presence(SAM, Presence::Home);
        home.set_sun(SunPosition::AboveHorizon);

        let clock = Arc::new(ManualClock::new(start));
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let services = Services::in_memory(home.clone(), scheduler.clone(), clock.clone());
        let engine = AutoArmEngine::new(config, services).unwrap();
        Self {
            home,
            clock,
            scheduler,
            engine,
        }
    }

    pub async fn start(config: Config, panel: ArmState) -> Self {
        Self::start_at(config, t0(), panel).await
    }

    pub async fn start_at(config: Config, start: DateTime<Utc>, panel: ArmState) -> Self {
        let mut harness = Self::new(config, start, panel);
        harness.engine.initialize().await.unwrap();
        harness
    }

    pub fn now(&self) -> DateTime<Utc> {
        use armer::clock::Clock;
        self.clock.now()
    }

    pub fn state(&self) -> Option<ArmState> {
        parse_state(self.home.panel_state(PANEL).as_deref())
    }

    pub async fn send(&mut self, event: EngineEvent) {
        self.engine.handle_event(event).await.unwrap();
    }

    /// Move time forward, firing every timer that falls due on the way.
    pub async fn advance(&mut self, by: Duration) {
        let until = self.now() + by;
        while let Some((at, task)) = self.scheduler.pop_due(until) {
            self.clock.set(at);
            self.send(EngineEvent::Timer(task)).await;
        }
        self.clock.set(until);
    }

    /// Change an occupant's presence and tell the engine.
    pub async fn presence(&mut self, occupant: &str, presence: Presence) {
        use armer::host::WorldStateReader;
        let old = self.home.presence(occupant);
        self.home.set_presence(occupant, presence);
        self.send(EngineEvent::OccupancyChanged {
            occupant: occupant.to_owned(),
            old,
            new: Some(presence),
        })
        .await;
    }

    /// Somebody sets the panel by hand.
    pub async fn manual_panel(&mut self, state: &str) {
        let old = self.home.panel_state(PANEL);
        self.home.set_panel(
            PANEL,
            PanelReading {
                state: state.to_owned(),
                changed_by: Some("keypad".to_owned()),
            },
        );
        self.send(EngineEvent::PanelChanged {
            old,
            new: Some(state.to_owned()),
            changed_by: Some("keypad".to_owned()),
        })
        .await;
    }

    pub fn written_states(&self) -> Vec<ArmState> {
        self.home
            .panel_writes()
            .into_iter()
            .map(|(_, state, _)| state)
            .collect()
    }
}
