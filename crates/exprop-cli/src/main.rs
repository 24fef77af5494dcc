//! 🚀 exprop-cli -- the front door. Loads config, sets up logging, presses go.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! The real work lives in the `exprop` crate. This binary parses a few flags, wires Ctrl-C to
//! the interrupt button, and prints a summary at the end. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use exprop::{InterruptSignal, PipelineReport};

/// 📡 Propagate a data-warehouse export to a sink, in throttled, size-bounded chunks.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// 🔧 TOML config file. Without one, config comes from EXPROP_* env vars only.
    config: Option<PathBuf>,

    /// 📍 Export location, e.g. gs://bucket/prefix. Overrides the config.
    #[arg(long)]
    location: Option<String>,

    /// 📏 Flush a chunk once its pending bytes reach this. Overrides the config.
    #[arg(long)]
    size_threshold_bytes: Option<usize>,

    /// ⏱️ Minimum milliseconds between two propagations of one file. Overrides the config.
    #[arg(long)]
    min_interval_millis: Option<u64>,

    /// 🙈 Don't draw progress bars.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Some(config_file) = args.config.as_deref() {
        // -- figment treats a missing file as an empty one. we'd rather hear about it.
        let exists = config_file.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether '{}' exists. If it's a relative path, try an absolute one.",
                config_file.display()
            )
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Configuration file '{}' does not exist. Double check the path and the cwd.",
                config_file.display()
            );
        }
    }

    // -- the location may come from the flag alone, so it has to be in before extraction
    let mut app_config =
        exprop::app_config::load_config_with_location(args.config.as_deref(), args.location.as_deref())
            .context("💀 In exprop-cli, main, we couldn't load the configuration")?;
    if let Some(size_threshold_bytes) = args.size_threshold_bytes {
        app_config.propagation.size_threshold_bytes = size_threshold_bytes;
    }
    if let Some(min_interval_millis) = args.min_interval_millis {
        app_config.propagation.min_interval_millis = min_interval_millis;
    }
    if args.no_progress {
        app_config.runtime.show_progress = false;
    }

    let (interrupter, interrupt) = InterruptSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🚨 Ctrl-C: stopping at the next throttle wait. Chunks already sent stay sent.");
            interrupter.interrupt();
        }
    });

    match exprop::run(app_config, interrupt).await {
        Ok(report) => {
            println!("{}", summary_table(&report));
            if !report.failed_files.is_empty() || report.failed_propagations() > 0 {
                warn!(
                    "⚠️ {} file(s) stopped early and {} chunk(s) were refused. See the log above.",
                    report.failed_files.len(),
                    report.failed_propagations()
                );
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            std::process::exit(1);
        }
    }
}

/// 📊 One row per file, plus a totals row.
fn summary_table(report: &PipelineReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["source", "chunks", "refused", "KiB sent", "status"]);

    for file in &report.files {
        table.add_row(vec![
            Cell::new(&file.source_location),
            Cell::new(file.chunks).set_alignment(CellAlignment::Right),
            Cell::new(file.refused).set_alignment(CellAlignment::Right),
            Cell::new(file.bytes_sent / 1024).set_alignment(CellAlignment::Right),
            Cell::new(file.failure.as_deref().unwrap_or("ok")),
        ]);
    }

    table.add_row(vec![
        Cell::new(format!(
            "{} file(s), {} line(s)",
            report.files_processed, report.lines_read
        )),
        Cell::new(report.outcomes.len()).set_alignment(CellAlignment::Right),
        Cell::new(report.failed_propagations()).set_alignment(CellAlignment::Right),
        Cell::new(report.propagated_bytes() / 1024).set_alignment(CellAlignment::Right),
        Cell::new("total"),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use exprop::FileSummary;

    use super::*;

    #[test]
    fn the_one_where_a_file_with_nothing_to_send_still_gets_a_row() {
        let report = PipelineReport {
            files: vec![
                FileSummary {
                    source_location: "gs://bucket/exports/000-blank".to_string(),
                    ..FileSummary::default()
                },
                FileSummary {
                    source_location: "gs://bucket/exports/001-broken".to_string(),
                    failure: Some("💀 line is not UTF-8".to_string()),
                    ..FileSummary::default()
                },
            ],
            files_processed: 2,
            ..PipelineReport::default()
        };

        let the_table = summary_table(&report).to_string();

        assert!(the_table.contains("000-blank"), "got:\n{the_table}");
        assert!(the_table.contains("001-broken"), "got:\n{the_table}");
        assert!(the_table.contains("not UTF-8"), "got:\n{the_table}");
        assert!(the_table.contains("2 file(s), 0 line(s)"), "got:\n{the_table}");
    }
}
