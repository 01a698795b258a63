//! `barstack`: turn an OHLC CSV file into session-tagged chart data.
//!
//! Prints the chart response as JSON on stdout. Logs go to stderr and honour
//! `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use barstack_core::config::parse_timezone;
use barstack_core::{ColumnOverrides, Config, TimeAxis};
use barstack_stacking::ChartPipeline;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "barstack", version, about = "Session-tag and stack OHLC bars for charting")]
struct Cli {
    /// CSV file to process.
    file: PathBuf,

    /// JSON configuration file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Previous session close time (HH:MM, reference timezone).
    #[arg(long)]
    prev_close: Option<String>,

    /// Current session open time (HH:MM, reference timezone).
    #[arg(long)]
    current_open: Option<String>,

    /// Regular session open (HH:MM).
    #[arg(long)]
    regular_open: Option<String>,

    /// Regular session close (HH:MM, exclusive).
    #[arg(long)]
    regular_close: Option<String>,

    /// Timezone for timestamps without an offset (IANA name).
    #[arg(long)]
    source_tz: Option<String>,

    /// Market timezone used for classification (IANA name).
    #[arg(long)]
    reference_tz: Option<String>,

    /// Header prefix of the price columns to chart, e.g. "X · USI: " picks "X · USI: open" and so on.
    #[arg(long)]
    price_prefix: Option<String>,

    /// Exact header name of the timestamp column.
    #[arg(long)]
    time_column: Option<String>,

    /// Exact header name of the open column.
    #[arg(long)]
    open_column: Option<String>,

    /// Exact header name of the high column.
    #[arg(long)]
    high_column: Option<String>,

    /// Exact header name of the low column.
    #[arg(long)]
    low_column: Option<String>,

    /// Exact header name of the close column.
    #[arg(long)]
    close_column: Option<String>,

    /// Exact header name of the volume column.
    #[arg(long)]
    volume_column: Option<String>,

    /// Emit reference-zone wall-clock times encoded as UTC.
    #[arg(long)]
    wall_clock: bool,

    /// Shift prices to close the gap at each session open.
    #[arg(long)]
    adjust_gaps: bool,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn build_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        config.session = config
            .session
            .with_boundaries(self.prev_close.as_deref(), self.current_open.as_deref())?
            .with_regular_window(self.regular_open.as_deref(), self.regular_close.as_deref())?;

        if let Some(name) = &self.source_tz {
            config.timezones.source = parse_timezone(name)?;
        }
        if let Some(name) = &self.reference_tz {
            config.timezones.reference = parse_timezone(name)?;
        }
        if let Some(prefix) = &self.price_prefix {
            config.parser.columns = ColumnOverrides {
                time: config.parser.columns.time.take(),
                volume: config.parser.columns.volume.take(),
                ..ColumnOverrides::with_price_prefix(prefix)
            };
        }
        let columns = &mut config.parser.columns;
        for (slot, name) in [
            (&mut columns.time, &self.time_column),
            (&mut columns.open, &self.open_column),
            (&mut columns.high, &self.high_column),
            (&mut columns.low, &self.low_column),
            (&mut columns.close, &self.close_column),
            (&mut columns.volume, &self.volume_column),
        ] {
            if let Some(name) = name {
                *slot = Some(name.clone());
            }
        }

        if self.wall_clock {
            config.output.time_axis = TimeAxis::WallClock;
        }
        if self.adjust_gaps {
            config.output.adjust_price_gaps = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.build_config()?;

    let response = match ChartPipeline::new(config).process_file(&cli.file) {
        Ok(response) => response,
        Err(e) if e.is_structural() => {
            error!(file = %cli.file.display(), error = %e, "input rejected");
            std::process::exit(2);
        }
        Err(e) => return Err(e).with_context(|| format!("processing {}", cli.file.display())),
    };

    let stdout = std::io::stdout().lock();
    if cli.pretty {
        serde_json::to_writer_pretty(stdout, &response)?;
    } else {
        serde_json::to_writer(stdout, &response)?;
    }
    println!();
    Ok(())
}
