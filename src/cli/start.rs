use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;
use tracing::{Level, debug};

/// `-v` count to the default log level; `RUST_LOG` still overrides it.
const fn verbosity(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::INFO),
        2 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, set up logging and resolve the action to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments do
/// not resolve to an action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(verbosity(matches.get_count("verbose")))?;

    let action = handler(&matches)?;

    let Action::Run {
        database_config,
        metrics_config,
        settings,
        ..
    } = &action;

    debug!(
        database_config = %database_config.display(),
        metrics_config = %metrics_config.display(),
        partitions = settings.partitions.get(),
        query_timeout = ?settings.scrape.query_timeout,
        connect_timeout = ?settings.scrape.connect_timeout,
        "resolved settings"
    );

    Ok(action)
}
