//! pcaptel CLI entry point.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pcaptel::cli::{Args, ReportFormatter};
use pcaptel::Capture;
use pcaptel_core::PacketAnalyzer;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    let capture = Capture::load(&args.file)
        .with_context(|| format!("Failed to open capture file: {}", args.file.display()))?;
    debug!(stats = ?capture.stats, "decode finished");

    let analyzer =
        PacketAnalyzer::new(args.analysis_config()).with_cancel_token(args.cancel_token());
    let report = capture
        .analyze(&analyzer)
        .with_context(|| format!("Failed to analyze {}", args.file.display()))?;

    let formatter = ReportFormatter::new(args.format);
    let source = args.file.display().to_string();

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            formatter.write(&report, &source, &mut writer)?;
            writer.flush()?;
            eprintln!("Wrote report to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            formatter.write(&report, &source, &mut stdout)?;
        }
    }

    Ok(())
}
