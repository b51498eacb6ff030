#![forbid(unsafe_code)]

mod common;

use armer::domain::{ArmState, CalendarEvent, ChangeSource, Presence, SunPosition};
use armer::limiter::RateLimiter;
use armer::EngineEvent;
use common::{ALEX, Harness, MINUTE, SAM, base_config, t0};
use config::{Button, ButtonAction, CalendarConfig, Transition};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #[test]
    fn arming_the_current_state_does_nothing(index in 0usize..ArmState::ALL.len()) {
        let state = ArmState::ALL[index];
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut harness = Harness::new(base_config(), t0(), state);
            for source in [None, Some(ChangeSource::Button), Some(ChangeSource::Calendar)] {
                assert_eq!(harness.engine.arm(Some(state), source).await, None);
            }
            assert!(harness.home.panel_writes().is_empty());
            assert!(harness.home.notifications().is_empty());
        });
    }
}

#[tokio::test]
async fn limiter_refuses_then_recovers() {
    let mut limiter = RateLimiter::new(MINUTE, 3);
    for i in 0..3 {
        assert!(!limiter.triggered(t0() + Duration::from_secs(i)));
    }
    assert!(limiter.triggered(t0() + Duration::from_secs(5)));
    assert!(!limiter.triggered(t0() + MINUTE * 3));

    let mut config = base_config();
    config.rate_limit.max_calls = 2;
    let mut harness = Harness::start(config, ArmState::ArmedHome).await;
    assert!(harness.home.panel_writes().is_empty());

    for action in ["ALARM_PANEL_DISARM", "ALARM_PANEL_AWAY", "ALARM_PANEL_DISARM"] {
        harness
            .send(EngineEvent::MobileAction {
                action: action.to_owned(),
            })
            .await;
    }
    assert_eq!(
        harness.written_states(),
        vec![ArmState::Disarmed, ArmState::ArmedAway]
    );
    assert_eq!(harness.state(), Some(ArmState::ArmedAway));

    harness.advance(MINUTE + Duration::from_secs(1)).await;
    harness
        .send(EngineEvent::MobileAction {
            action: "ALARM_PANEL_DISARM".to_owned(),
        })
        .await;
    assert_eq!(harness.state(), Some(ArmState::Disarmed));
}

#[tokio::test]
async fn active_calendar_event_blocks_every_recompute() {
    let mut config = base_config();
    config
        .calendar_control
        .calendars
        .push(CalendarConfig::new("calendar.family"));
    let mut harness = Harness::new(config, t0(), ArmState::ArmedHome);
    harness.home.add_calendar_event(
        "calendar.family",
        CalendarEvent::new("Away for the weekend", t0() - MINUTE * 60, t0() + MINUTE * 120)
            .with_uid("weekend"),
    );
    harness.engine.initialize().await.unwrap();
    assert_eq!(harness.state(), Some(ArmState::ArmedAway));

    // Everybody home in the dark would otherwise mean armed_night.
    harness.home.set_sun(SunPosition::BelowHorizon);
    let sources = [
        ChangeSource::Calendar,
        ChangeSource::Mobile,
        ChangeSource::Occupancy,
        ChangeSource::AlarmPanel,
        ChangeSource::Button,
        ChangeSource::Action,
        ChangeSource::Sunrise,
        ChangeSource::Sunset,
        ChangeSource::Zombification,
        ChangeSource::Startup,
    ];
    for source in sources {
        let outcome = harness
            .engine
            .reset_armed_state(None, Some(source))
            .await
            .unwrap();
        assert_eq!(outcome, Some(ArmState::ArmedAway), "{source}");

        let intervention = armer::domain::Intervention::new(harness.now(), source, None);
        let outcome = harness
            .engine
            .reset_armed_state(Some(intervention), None)
            .await
            .unwrap();
        assert_eq!(outcome, Some(ArmState::ArmedAway), "{source}");

        let record = harness.home.last_calculation().unwrap();
        assert!(record.active_calendar_event.is_some());
        assert!(!record.changed);
    }
    assert_eq!(harness.state(), Some(ArmState::ArmedAway));
}

#[tokio::test]
async fn manual_choice_survives_plain_triggers() {
    let mut harness = Harness::start(base_config(), ArmState::ArmedHome).await;
    harness.manual_panel("armed_away").await;

    harness.home.set_sun(SunPosition::BelowHorizon);
    harness.send(EngineEvent::Sunset).await;
    assert_eq!(harness.state(), Some(ArmState::ArmedAway));

    let record = harness.home.last_calculation().unwrap();
    let kept = record.last_state_intervention.unwrap();
    assert_eq!(kept.source, ChangeSource::AlarmPanel);
    assert_eq!(kept.state, Some(ArmState::ArmedAway));
    assert!(harness.home.panel_writes().is_empty());
}

#[tokio::test]
async fn earlier_rule_wins_when_both_match() {
    let mut config = base_config();
    config.transitions = vec![
        Transition::new("armed_night", &["occupied"]),
        Transition::new("armed_away", &["occupied"]),
    ];
    let harness = Harness::new(config, t0(), ArmState::Disarmed);
    assert_eq!(
        harness.engine.determine_state().unwrap(),
        Some(ArmState::ArmedNight)
    );
}

#[tokio::test]
async fn vacation_sticks_with_default_rules() {
    let mut harness = Harness::new(base_config(), t0(), ArmState::ArmedVacation);
    assert_eq!(
        harness.engine.determine_state().unwrap(),
        Some(ArmState::ArmedVacation)
    );

    harness.engine.initialize().await.unwrap();
    harness.presence(ALEX, Presence::NotHome).await;
    harness.presence(ALEX, Presence::Home).await;
    assert_eq!(harness.state(), Some(ArmState::ArmedVacation));
    assert!(harness.home.panel_writes().is_empty());
}

#[tokio::test]
async fn calendar_end_in_auto_mode_recomputes() {
    let mut config = base_config();
    config
        .calendar_control
        .calendars
        .push(CalendarConfig::new("calendar.family"));
    let mut harness = Harness::new(config, t0(), ArmState::ArmedAway);
    harness.home.set_presence(ALEX, Presence::NotHome);
    harness.home.set_presence(SAM, Presence::NotHome);
    harness.home.add_calendar_event(
        "calendar.family",
        CalendarEvent::new("Night shift", t0() + MINUTE * 10, t0() + MINUTE * 60)
            .with_uid("shift"),
    );
    harness.engine.initialize().await.unwrap();
    assert_eq!(harness.state(), Some(ArmState::ArmedAway));
    let tracked = harness.engine.calendars()[0].events().next().unwrap();
    assert_eq!(tracked.previous_state, Some(ArmState::ArmedAway));

    harness.advance(MINUTE * 10).await;
    assert_eq!(harness.state(), Some(ArmState::ArmedNight));

    // Back home while the event still holds the panel.
    harness.presence(ALEX, Presence::Home).await;
    assert_eq!(harness.state(), Some(ArmState::ArmedNight));

    harness.advance(MINUTE * 50).await;
    assert_eq!(harness.state(), Some(ArmState::ArmedHome));
    assert_eq!(
        harness.written_states(),
        vec![
            ArmState::ArmedNight,
            ArmState::Pending,
            ArmState::ArmedHome,
        ]
    );
}

#[tokio::test]
async fn delayed_reset_dropped_after_later_intervention() {
    let mut config = base_config();
    config.buttons.insert(
        ButtonAction::Reset,
        Button {
            alias: None,
            delay: Some(MINUTE * 10),
            entity_id: vec!["input_button.reset_alarm".to_owned()],
        },
    );
    let mut harness = Harness::start(config, ArmState::ArmedHome).await;

    harness
        .send(EngineEvent::ButtonPressed {
            entity_id: "input_button.reset_alarm".to_owned(),
        })
        .await;
    harness.advance(MINUTE * 5).await;
    harness.manual_panel("disarmed").await;

    harness.advance(MINUTE * 5).await;
    assert_eq!(harness.state(), Some(ArmState::Disarmed));
    assert!(harness.home.panel_writes().is_empty());
    assert!(harness.scheduler.pending().iter().all(|(_, task)| {
        !matches!(task, armer::scheduler::TimerTask::DelayedReset { .. })
    }));
}

#[tokio::test]
async fn housekeeping_prunes_stale_interventions() {
    let mut config = base_config();
    config.housekeeping.interval = MINUTE * 61;
    config.housekeeping.intervention_ttl = MINUTE * 60;
    let mut harness = Harness::start(config, ArmState::ArmedHome).await;

    harness
        .send(EngineEvent::MobileAction {
            action: "ALARM_PANEL_DISARM".to_owned(),
        })
        .await;
    let cutoff = t0() - MINUTE;
    assert!(harness.engine.ledger().has_intervention_since(cutoff));

    harness.advance(MINUTE * 60).await;
    assert!(harness.engine.ledger().has_intervention_since(cutoff));

    harness.advance(MINUTE).await;
    assert!(!harness.engine.ledger().has_intervention_since(cutoff));
    assert!(harness.engine.ledger().is_empty());
}
