#![forbid(unsafe_code)]

mod actuator;
mod calendar;
mod reset;
mod triggers;

use crate::calendar::TrackedCalendar;
use crate::clock::Clock;
use crate::domain::{ArmState, ChangeSource, Presence};
use crate::error::Error;
use crate::health::HealthTracker;
use crate::host::{
    CalendarSource, ConfigIssue, DiagnosticsSink, IssueReporter, MemoryHome, NotificationSink,
    PanelWriter, WorldStateReader,
};
use crate::ledger::InterventionLedger;
use crate::limiter::RateLimiter;
use crate::notify::Notifier;
use crate::rules::{RuleIssue, RuleSet};
use crate::scheduler::{Scheduler, TimerTask};
use chrono::{DateTime, Utc};
use config::{ButtonAction, Config};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Services {
    pub world: Arc<dyn WorldStateReader>,
    pub panel: Arc<dyn PanelWriter>,
    pub calendars: Arc<dyn CalendarSource>,
    pub notifications: Arc<dyn NotificationSink>,
    pub issues: Arc<dyn IssueReporter>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Wire every host role to one [`MemoryHome`].
    pub fn in_memory(
        home: Arc<MemoryHome>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            world: home.clone(),
            panel: home.clone(),
            calendars: home.clone(),
            notifications: home.clone(),
            issues: home.clone(),
            diagnostics: home,
            scheduler,
            clock,
        }
    }
}

/// Something happened in the home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    OccupancyChanged {
        occupant: String,
        old: Option<Presence>,
        new: Option<Presence>,
    },
    Sunrise,
    Sunset,
    ButtonPressed {
        entity_id: String,
    },
    MobileAction {
        action: String,
    },
    /// The panel entity changed. States are raw so unknown values survive.
    PanelChanged {
        old: Option<String>,
        new: Option<String>,
        changed_by: Option<String>,
    },
    Timer(TimerTask),
}

/// Requests from whoever runs the engine.
#[derive(Debug)]
pub enum ControlEvent {
    Reload(Config),
    /// Recompute the state, replying with the outcome.
    Reset(oneshot::Sender<Option<ArmState>>),
    EnquireConfiguration(oneshot::Sender<Value>),
}

/// One entry in the engine's inbox. Events and control requests share the
/// queue, so they are handled in the order they were sent.
#[derive(Debug)]
pub enum EngineMessage {
    Event(EngineEvent),
    Control(ControlEvent),
}

impl From<EngineEvent> for EngineMessage {
    fn from(event: EngineEvent) -> Self {
        EngineMessage::Event(event)
    }
}

impl From<ControlEvent> for EngineMessage {
    fn from(control: ControlEvent) -> Self {
        EngineMessage::Control(control)
    }
}

pub struct AutoArmEngine {
    config: Config,
    services: Services,
    rules: RuleSet,
    rule_issues: Vec<RuleIssue>,
    ledger: InterventionLedger,
    limiter: RateLimiter,
    calendars: Vec<TrackedCalendar>,
    notifier: Notifier,
    health: HealthTracker,
    /// Button entity to what it does and how long it waits.
    buttons: BTreeMap<String, (ButtonAction, Option<Duration>)>,
    /// Parent of every timer token.
    timers: CancellationToken,
    arming_in_progress: bool,
    pre_pending_state: Option<ArmState>,
}

impl AutoArmEngine {
    /// Build an engine. Nothing is scheduled or armed until
    /// [`AutoArmEngine::initialize`].
    pub fn new(config: Config, services: Services) -> Result<Self, Error> {
        config.validate()?;

        let (rules, rule_issues) = RuleSet::build(&config.transitions);
        let limiter = RateLimiter::new(config.rate_limit.period, config.rate_limit.max_calls);
        let notifier = Notifier::new(config.notify.clone());
        let health = HealthTracker::new(services.diagnostics.clone());

        let mut buttons = BTreeMap::new();
        for (action, button) in &config.buttons {
            for entity_id in &button.entity_id {
                buttons.insert(entity_id.clone(), (*action, button.delay));
            }
        }

        Ok(Self {
            config,
            services,
            rules,
            rule_issues,
            ledger: InterventionLedger::new(),
            limiter,
            calendars: Vec::new(),
            notifier,
            health,
            buttons,
            timers: CancellationToken::new(),
            arming_in_progress: false,
            pre_pending_state: None,
        })
    }

    /// Report configuration problems, start timers and calendars, then
    /// settle the panel into the state it should be in.
    pub async fn initialize(&mut self) -> Result<(), Error> {
        info!(
            panel = %self.config.alarm_panel.entity_id,
            occupied = self.is_occupied(),
            state = %self.armed_state(),
            calendars = self.config.calendar_control.calendars.len(),
            "initializing"
        );

        for issue in std::mem::take(&mut self.rule_issues) {
            warn!(state = %issue.state, error = %issue.error, "transition disabled");
            self.health.record_initialization_error("logic");
            self.services.issues.raise(ConfigIssue::new(
                "transition_condition",
                issue.state,
                issue.error,
            ));
        }

        self.initialize_calendars().await;

        let housekeeping = self.config.housekeeping.interval;
        if !housekeeping.is_zero() {
            self.schedule_every(housekeeping, TimerTask::Housekeeping);
        }

        self.health.app_initialized();
        self.reset_armed_state(None, Some(ChangeSource::Startup)).await?;
        info!(state = %self.armed_state(), "initialized");
        Ok(())
    }

    /// Cancel every timer and forget tracked calendar events.
    pub fn shutdown(&mut self) {
        self.timers.cancel();
        for calendar in &mut self.calendars {
            calendar.shutdown();
        }
        info!("shut down");
    }

    /// Replace the configuration, starting over with fresh state.
    pub async fn reload(&mut self, config: Config) -> Result<(), Error> {
        let fresh = Self::new(config, self.services.clone())?;
        self.shutdown();
        *self = fresh;
        self.initialize().await?;
        info!("config reloaded");
        Ok(())
    }

    /// Recompute on request, counting as an explicit intervention.
    pub async fn reset_service(&mut self) -> Result<Option<ArmState>, Error> {
        let intervention = self.record_intervention(ChangeSource::Action, None);
        let state = self.reset_armed_state(Some(intervention), None).await?;
        info!(state = state.map_or("NO_CHANGE", ArmState::as_str), "reset requested");
        Ok(state)
    }

    /// The effective configuration as JSON.
    pub fn enquire_configuration(&self) -> Value {
        configuration_json(&self.config).unwrap_or_else(|err| {
            error!(%err, "failed to expose configuration");
            json!({ "error": err.to_string() })
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &InterventionLedger {
        &self.ledger
    }

    pub fn calendars(&self) -> &[TrackedCalendar] {
        &self.calendars
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn is_arming(&self) -> bool {
        self.arming_in_progress
    }

    /// State the panel was in before the last move to pending.
    pub fn pre_pending_state(&self) -> Option<ArmState> {
        self.pre_pending_state
    }

    /// Handle messages until `cancel` fires. Messages already queued when
    /// it fires are still handled. Failures inside handlers are logged and
    /// counted, never returned.
    pub async fn run_until(
        &mut self,
        cancel: CancellationToken,
        mut inbox: mpsc::UnboundedReceiver<EngineMessage>,
    ) -> Result<(), Error> {
        loop {
            tokio::select! {
                biased;
                message = inbox.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None if cancel.is_cancelled() => break,
                    None => {
                        self.shutdown();
                        return Err(Error::ChannelClosed);
                    }
                },
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    while let Ok(message) = inbox.try_recv() {
                        self.handle_message(message).await;
                    }
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    async fn handle_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Event(event) => {
                if let Err(err) = self.handle_event(event).await {
                    error!(%err, "event handling failed");
                    self.health.record_runtime_error();
                }
            }
            EngineMessage::Control(control) => {
                if let Err(err) = self.handle_control(control).await {
                    error!(%err, "control request failed");
                    self.health.record_runtime_error();
                }
            }
        }
    }

    async fn handle_control(&mut self, control: ControlEvent) -> Result<(), Error> {
        match control {
            ControlEvent::Reload(config) => self.reload(config).await?,
            ControlEvent::Reset(reply) => {
                let changed = self.reset_service().await?;
                if reply.send(changed).is_err() {
                    debug!("reset requester went away");
                }
            }
            ControlEvent::EnquireConfiguration(reply) => {
                if reply.send(self.enquire_configuration()).is_err() {
                    debug!("configuration requester went away");
                }
            }
        }
        Ok(())
    }

    /// Dispatch one event to its handler.
    pub async fn handle_event(&mut self, event: EngineEvent) -> Result<(), Error> {
        let span = tracing::debug_span!("event", ?event);
        async move {
            match event {
                EngineEvent::OccupancyChanged { occupant, old, new } => {
                    self.on_occupancy_change(&occupant, old, new).await
                }
                EngineEvent::Sunrise => self.on_sunrise().await,
                EngineEvent::Sunset => self.on_sunset().await,
                EngineEvent::ButtonPressed { entity_id } => self.on_button(&entity_id).await,
                EngineEvent::MobileAction { action } => self.on_mobile_action(&action).await,
                EngineEvent::PanelChanged {
                    old,
                    new,
                    changed_by,
                } => {
                    self.on_panel_change(old.as_deref(), new.as_deref(), changed_by.as_deref())
                        .await
                }
                EngineEvent::Timer(task) => self.on_timer(task).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn on_timer(&mut self, task: TimerTask) -> Result<(), Error> {
        match task {
            TimerTask::DelayedArm {
                state,
                source,
                requested_at,
            } => {
                if self.intervened_since(requested_at) {
                    return Ok(());
                }
                self.arm(Some(state), Some(source)).await;
                Ok(())
            }
            TimerTask::DelayedReset {
                source,
                intervention,
                requested_at,
            } => {
                if self.intervened_since(requested_at) {
                    return Ok(());
                }
                self.reset_armed_state(intervention, Some(source)).await?;
                Ok(())
            }
            TimerTask::CalendarEventStart {
                calendar_id,
                event_id,
            } => self.on_calendar_event_start(&calendar_id, &event_id).await,
            TimerTask::CalendarEventEnd {
                calendar_id,
                event_id,
            } => self.on_calendar_event_end(&calendar_id, &event_id).await,
            TimerTask::CalendarPoll { calendar_id } => {
                self.on_calendar_poll(&calendar_id).await;
                Ok(())
            }
            TimerTask::Housekeeping => {
                self.housekeeping().await;
                Ok(())
            }
        }
    }

    fn intervened_since(&self, requested_at: DateTime<Utc>) -> bool {
        let intervened = self.ledger.has_intervention_since(requested_at);
        if intervened {
            debug!(%requested_at, "delayed operation dropped after a later intervention");
        }
        intervened
    }

    fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask) -> CancellationToken {
        let token = self.timers.child_token();
        self.services.scheduler.schedule_at(at, task, token.clone());
        token
    }

    fn schedule_every(&self, period: Duration, task: TimerTask) -> CancellationToken {
        let token = self.timers.child_token();
        self.services
            .scheduler
            .schedule_every(period, task, token.clone());
        token
    }
}

fn configuration_json(config: &Config) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "alarm_panel": config.alarm_panel.entity_id,
        "diurnal": serde_json::to_value(config.diurnal)?,
        "calendar_control": serde_json::to_value(&config.calendar_control)?,
        "buttons": serde_json::to_value(&config.buttons)?,
        "occupancy": serde_json::to_value(&config.occupancy)?,
        "notify": serde_json::to_value(&config.notify)?,
        "rate_limit": serde_json::to_value(config.rate_limit)?,
    }))
}
