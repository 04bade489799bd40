//! Loading a capture file into engine records.

use std::path::Path;

use pcaptel_core::{AnalysisReport, PacketAnalyzer, PacketRecord};
use tracing::{info, warn};

use crate::decode::{DecodeStats, FrameDecoder};
use crate::error::Result;
use crate::pcap::PcapReader;

/// A decoded capture, in file order.
#[derive(Debug, Clone)]
pub struct Capture {
    pub records: Vec<PacketRecord>,
    pub stats: DecodeStats,
}

impl Capture {
    /// Read and decode every frame of a PCAP/PCAPNG file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = PcapReader::open(path.as_ref())?;
        let mut decoder = FrameDecoder::new();
        let mut records = Vec::new();

        for raw in reader {
            records.push(decoder.decode(&raw?));
        }

        let stats = decoder.stats();
        if stats.partial > 0 || stats.unsupported_link > 0 {
            warn!(
                partial = stats.partial,
                unsupported_link = stats.unsupported_link,
                "some frames could not be fully decoded"
            );
        }
        info!(frames = stats.frames, path = %path.as_ref().display(), "capture loaded");

        Ok(Self { records, stats })
    }

    pub fn analyze(&self, analyzer: &PacketAnalyzer) -> Result<AnalysisReport> {
        Ok(analyzer.analyze(&self.records)?)
    }
}
