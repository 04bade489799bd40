//! Report rendering.
//!
//! The JSON rendering is the serialized [`AnalysisReport`]. The text
//! rendering lays the same report out as titled sections with tables.

use std::fmt::Display;
use std::io::Write;

use chrono::DateTime;
use clap::ValueEnum;
use comfy_table::Table;
use pcaptel_core::report::{CountShare, RankedEntry};
use pcaptel_core::AnalysisReport;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report (default)
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Formats analysis reports for output.
pub struct ReportFormatter {
    format: OutputFormat,
}

impl ReportFormatter {
    /// Create a new formatter with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render `report` for the capture named `source`.
    pub fn write<W: Write>(
        &self,
        report: &AnalysisReport,
        source: &str,
        writer: &mut W,
    ) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Text => write_text(report, source, writer),
            OutputFormat::Json => write_json(report, writer),
        }
    }
}

fn write_json<W: Write>(report: &AnalysisReport, writer: &mut W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report).map_err(std::io::Error::from)?;
    writeln!(writer)
}

fn write_text<W: Write>(report: &AnalysisReport, source: &str, w: &mut W) -> std::io::Result<()> {
    let overview = &report.overview;

    section(w, "Capture Overview")?;
    writeln!(w, "File: {source}")?;
    writeln!(w, "Total Packets: {}", overview.total_packets)?;
    writeln!(w, "Total Bytes: {}", overview.total_bytes)?;
    writeln!(w, "Capture Duration: {:.2} seconds", overview.duration_seconds)?;
    if overview.total_packets > 0 {
        writeln!(w, "Start Time: {}", format_time(overview.time_range.start))?;
        writeln!(w, "End Time: {}", format_time(overview.time_range.end))?;
        writeln!(
            w,
            "Packet Size: avg {:.2}, min {}, max {} bytes",
            overview.packet_size.avg, overview.packet_size.min, overview.packet_size.max
        )?;
    }

    section(w, "Protocol Distribution")?;
    share_table(w, "Protocol", &overview.protocol_distribution)?;

    section(w, "Packet Type Counts")?;
    share_table(w, "Type", &overview.packet_type_counts)?;

    section(w, "Top Source IP Addresses")?;
    ranked_table(w, "Address", &overview.ip_stats.sources)?;
    section(w, "Top Destination IP Addresses")?;
    ranked_table(w, "Address", &overview.ip_stats.destinations)?;
    section(w, "Top Source Ports")?;
    ranked_table(w, "Port", &overview.port_stats.sources)?;
    section(w, "Top Destination Ports")?;
    ranked_table(w, "Port", &overview.port_stats.destinations)?;

    section(w, "Protocol-Specific Statistics")?;
    let mut table = Table::new();
    table.set_header(vec![
        "Protocol",
        "Samples",
        "Avg Latency (ms)",
        "Max Latency (ms)",
        "Min Latency (ms)",
        "Std Dev (ms)",
        "Avg Jitter (ms)",
        "Avg Size (bytes)",
    ]);
    for (proto, latency) in &report.latency {
        let jitter = report.jitter.get(proto).map(|j| j.avg).unwrap_or(0.0);
        let size = report.protocol_packet_size.get(proto).copied().unwrap_or(0.0);
        table.add_row(vec![
            proto.clone(),
            latency.count.to_string(),
            format!("{:.2}", latency.avg),
            format!("{:.2}", latency.max),
            format!("{:.2}", latency.min),
            format!("{:.2}", latency.std_dev),
            format!("{jitter:.2}"),
            format!("{size:.2}"),
        ]);
    }
    writeln!(w, "{table}")?;

    section(w, "Delay Categories")?;
    let mut table = Table::new();
    table.set_header(vec!["Category", "Count", "Avg (ms)", "Max (ms)"]);
    for (category, stats) in &report.delay_categories {
        table.add_row(vec![
            category.clone(),
            stats.count.to_string(),
            format!("{:.2}", stats.avg),
            format!("{:.2}", stats.max),
        ]);
    }
    writeln!(w, "{table}")?;

    section(w, "Retransmission Analysis")?;
    writeln!(w, "Total Retransmissions: {}", report.retransmissions.total)?;
    if !report.retransmissions.events.is_empty() {
        writeln!(w, "\nFirst Retransmission Events:")?;
        for event in &report.retransmissions.events {
            writeln!(
                w,
                "  Time: {} - Flow: {} ({}, seq {})",
                format_time(event.timestamp),
                event.flow,
                event.protocol,
                event.seq
            )?;
        }
    }

    if let Some(loss) = &report.packet_loss {
        section(w, "Packet Loss")?;
        writeln!(
            w,
            "Overall: {} of {} segments lost ({:.2}%), {} loss events",
            loss.overall.lost,
            loss.overall.transmitted,
            loss.overall.loss_percentage,
            loss.overall.loss_events
        )?;
        let mut table = Table::new();
        table.set_header(vec!["Protocol", "Transmitted", "Lost", "Loss (%)"]);
        for (proto, stats) in &loss.per_protocol {
            table.add_row(vec![
                proto.clone(),
                stats.transmitted.to_string(),
                stats.lost.to_string(),
                format!("{:.2}", stats.loss_percentage),
            ]);
        }
        writeln!(w, "{table}")?;
    }

    if let Some(iot) = &report.iot_metrics {
        section(w, "IoT Patterns")?;
        writeln!(
            w,
            "Bundles: {} (avg {:.2} bytes, max {:.0} bytes)",
            iot.bundle_sizes.count, iot.bundle_sizes.avg, iot.bundle_sizes.max
        )?;
        writeln!(
            w,
            "Aggregation Interval: avg {:.3} s over {} intervals",
            iot.aggregation_intervals.avg, iot.aggregation_intervals.count
        )?;
        writeln!(
            w,
            "Cloud Uploads: {} totalling {} bytes (avg delay {:.2} ms)",
            iot.uploads.count, iot.uploads.total_bytes, iot.uploads.delay_ms.avg
        )?;
        if !iot.devices.is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["Device", "Small", "Bundle", "Total"]);
            for (device, mix) in &iot.devices {
                table.add_row(vec![
                    device.clone(),
                    mix.small.to_string(),
                    mix.bundle.to_string(),
                    mix.total.to_string(),
                ]);
            }
            writeln!(w, "{table}")?;
        }
    }

    section(w, "Performance Insights")?;
    let throughput = &report.throughput;
    writeln!(
        w,
        "Average Packet Rate: {:.2} packets/second",
        throughput.packets_per_second
    )?;
    writeln!(w, "\nProtocol-specific Rates:")?;
    for (proto, rate) in &throughput.protocol_rates {
        writeln!(w, "  {proto:<10}: {rate:.2} packets/second")?;
    }
    writeln!(w, "\nAverage Network Load: {:.2} Mbps", throughput.bandwidth_mbps)
}

fn section<W: Write>(w: &mut W, title: &str) -> std::io::Result<()> {
    writeln!(w, "\n=== {title} ===")
}

fn share_table<W: Write>(w: &mut W, label: &str, rows: &[CountShare]) -> std::io::Result<()> {
    let mut table = Table::new();
    table.set_header(vec![label, "Packets", "Share (%)"]);
    for row in rows {
        table.add_row(vec![
            row.label.clone(),
            row.count.to_string(),
            format!("{:.2}", row.percentage),
        ]);
    }
    writeln!(w, "{table}")
}

fn ranked_table<W: Write, K: Display>(
    w: &mut W,
    label: &str,
    rows: &[RankedEntry<K>],
) -> std::io::Result<()> {
    let mut table = Table::new();
    table.set_header(vec![label, "Packets", "Share (%)"]);
    for row in rows {
        table.add_row(vec![
            row.key.to_string(),
            row.count.to_string(),
            format!("{:.2}", row.percentage),
        ]);
    }
    writeln!(w, "{table}")
}

/// Format capture seconds as a UTC date, falling back to raw seconds.
fn format_time(secs: f64) -> String {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string())
        .unwrap_or_else(|| format!("{secs:.6}"))
}
