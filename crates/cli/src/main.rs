use anyhow::Context;
use armer::clock::{Clock, SystemClock};
use armer::diagnostics::TracingDiagnostics;
use armer::domain::PanelReading;
use armer::host::MemoryHome;
use armer::scheduler::TokioScheduler;
use armer::{AutoArmEngine, ControlEvent, EngineMessage, Services};
use autoarm::{cli::Cli, signals::SignalEvent, signals::wait_for_signal, sim::replay};
use clap::Parser;
use config::Config;
use flume::bounded;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_log::AsTrace;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.log_level_filter().as_trace())
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    let config = load_config(cli.conffile.as_ref())?;
    let panel = config.alarm_panel.entity_id.clone();

    let home = Arc::new(MemoryHome::new());
    home.set_panel(&panel, PanelReading::new(cli.panel_state.as_str()));
    for calendar in &config.calendar_control.calendars {
        home.add_calendar(&calendar.entity_id);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<EngineMessage>();
    let mut services = Services::in_memory(
        home.clone(),
        Arc::new(TokioScheduler::new(inbox_tx.clone(), clock.clone())),
        clock,
    );
    services.diagnostics = Arc::new(TracingDiagnostics);

    let mut engine = AutoArmEngine::new(config.clone(), services)?;
    engine.initialize().await?;

    let cancel = CancellationToken::new();

    let (signal_tx, signal_rx) = bounded(8);
    tokio::spawn(async move {
        if let Err(err) = wait_for_signal(&signal_tx).await {
            error!(error = ?err, "Error while waiting for signal");
        }
    });

    tokio::spawn({
        let cancel = cancel.clone();
        let inbox_tx = inbox_tx.clone();
        let conffile = cli.conffile.clone();
        let mut current = config;
        async move {
            while let Ok(event) = signal_rx.recv_async().await {
                debug!(?event, "Received signal event");
                match event {
                    SignalEvent::SigUSR1 => match load_config(conffile.as_ref()) {
                        Ok(config) => {
                            current = config.clone();
                            if inbox_tx.send(ControlEvent::Reload(config).into()).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = ?err, "keeping current configuration"),
                    },
                    SignalEvent::SigUSR2 => match current.to_toml_string() {
                        Ok(toml) => info!("effective configuration:\n{toml}"),
                        Err(err) => warn!(%err, "failed to render configuration"),
                    },
                    SignalEvent::Stop => {
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    });

    tokio::spawn({
        let cancel = cancel.clone();
        let home = home.clone();
        let once = cli.once;
        let events = cli.events.clone();
        async move {
            let replayed = match events {
                Some(path) => match tokio::fs::File::open(&path).await {
                    Ok(file) => {
                        replay(BufReader::new(file), &home, &panel, &inbox_tx).await
                    }
                    Err(err) => Err(autoarm::error::Error::Script(err)),
                },
                None => {
                    replay(BufReader::new(tokio::io::stdin()), &home, &panel, &inbox_tx).await
                }
            };
            match replayed {
                Ok(count) => info!(count, "event script finished"),
                Err(err) => error!(%err, "event script failed"),
            }
            if once {
                cancel.cancel();
            }
        }
    });

    engine.run_until(cancel, inbox_rx).await?;
    info!("bye");
    Ok(())
}

fn load_config(conffile: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match conffile {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::from_toml("")?,
    };
    Ok(config)
}
