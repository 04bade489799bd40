//! Command-line argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pcaptel_core::config::TOP_N;
use pcaptel_core::{AnalysisConfig, CancelToken};

use super::OutputFormat;

/// Network performance telemetry from packet captures.
#[derive(Parser, Debug)]
#[command(name = "pcaptel")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file to analyze (PCAP or PCAPNG, optionally gzipped)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Report format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Number of entries in the top address and port tables
    #[arg(long = "top", value_name = "N", default_value_t = TOP_N)]
    pub top: usize,

    /// Abort the analysis after this many milliseconds
    #[arg(long = "deadline-ms", value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Analysis thresholds with the command-line overrides applied.
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig::default().with_top_n(self.top)
    }

    /// Cancel token carrying the deadline, if one was given.
    ///
    /// The deadline starts counting when this is called.
    pub fn cancel_token(&self) -> CancelToken {
        match self.deadline_ms {
            Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
            None => CancelToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pcaptel", "capture.pcap"]).unwrap();
        assert_eq!(args.file, PathBuf::from("capture.pcap"));
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.top, 10);
        assert!(args.deadline_ms.is_none());
        assert_eq!(args.verbose, 0);
        assert!(!args.cancel_token().is_cancelled());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "pcaptel",
            "--format",
            "json",
            "--top",
            "3",
            "--deadline-ms",
            "500",
            "-vv",
            "capture.pcapng.gz",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.analysis_config().top_n, 3);
        assert_eq!(args.deadline_ms, Some(500));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_file_required() {
        assert!(Args::try_parse_from(["pcaptel"]).is_err());
    }
}
