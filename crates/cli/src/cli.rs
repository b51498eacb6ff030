use armer::domain::ArmState;
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};

/// Autoarm: keeps an alarm panel in the state the house calls for
///
/// Watches occupancy, daylight, buttons, calendars and manual changes and
/// moves the alarm panel between disarmed, home, away, night and vacation.
/// This binary drives the engine against an in-memory home fed by a
/// JSON-lines event script.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// Without one the built-in defaults are used, which need at least
    /// `AUTOARM_ALARM_PANEL__ENTITY_ID` set in the environment.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// JSON-lines event script to replay.
    ///
    /// Reads stdin when absent.
    #[arg(short, long, value_parser = validate_file)]
    pub events: Option<PathBuf>,

    /// State the alarm panel starts in.
    #[arg(short, long, default_value = "disarmed", value_parser = validate_state)]
    pub panel_state: ArmState,

    /// Stop once the event script is exhausted instead of waiting for a
    /// signal.
    #[arg(short, long)]
    pub once: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

fn validate_state(state: &str) -> Result<ArmState, String> {
    state.parse().map_err(|err| format!("{err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from(["autoarm", "--panel-state", "armed_away", "--once"]).unwrap();
        assert_eq!(cli.panel_state, ArmState::ArmedAway);
        assert!(cli.once);
        assert!(cli.conffile.is_none());

        assert!(Cli::try_parse_from(["autoarm", "--panel-state", "armed_sideways"]).is_err());
        assert!(Cli::try_parse_from(["autoarm", "--conffile", "/nonexistent/autoarm.toml"]).is_err());
    }
}
