pub mod run;

use crate::collectors::ExporterSettings;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Run {
        port: u16,
        listen: Option<String>,
        database_config: PathBuf,
        metrics_config: PathBuf,
        settings: ExporterSettings,
    },
}
