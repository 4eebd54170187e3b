use serde::*;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub max_level: LoggingLevel,
    /// Extra directives, e.g. `service_upload=debug,reqwest=warn`.
    #[serde(default)]
    pub level_filter: String,
    /// Show file, line, thread and target of each event.
    #[serde(default)]
    pub enable_debug_logging: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: Self::default_enable(),
            max_level: Default::default(),
            level_filter: Default::default(),
            enable_debug_logging: false,
        }
    }
}

impl TelemetryConfig {
    fn default_enable() -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Off,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(val: LoggingLevel) -> Self {
        match val {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
            LoggingLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Install the console logger. `RUST_LOG` overrides the configured filter.
pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.enable {
        return Ok(());
    }
    let level: LevelFilter = config.max_level.clone().into();
    let filter = with_directives(
        EnvFilter::builder().with_default_directive(level.into()).from_env_lossy(),
        &config.level_filter,
    );
    let debug = config.enable_debug_logging;
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(debug)
        .with_line_number(debug)
        .with_thread_ids(debug)
        .with_target(debug)
        .with_filter(filter);
    Registry::default().with(console).try_init()?;
    Ok(())
}

/// Add comma separated `directives`, skipping the ones that don't parse.
fn with_directives(filter: EnvFilter, directives: &str) -> EnvFilter {
    directives
        .split(',')
        .map(str::trim)
        .filter(|el| !el.is_empty())
        .fold(filter, |filter, el| match el.parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(e) => {
                eprintln!("Ignoring log directive {el}: {e}");
                filter
            }
        })
}
