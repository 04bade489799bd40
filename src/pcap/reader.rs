//! PCAP file reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::debug;

use super::RawPacket;
use crate::error::{Error, PcapError as OurPcapError};

/// Buffer size for reading PCAP files (64KB).
const BUFFER_SIZE: usize = 65536;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Default PCAPNG timestamp resolution (microseconds).
const DEFAULT_NG_RESOLUTION: u64 = 1_000_000;

type Stream = BufReader<Box<dyn Read + Send>>;

/// Reader for PCAP and PCAPNG files, with optional gzip decompression.
pub struct PcapReader {
    inner: ReaderInner,
    frame_number: u64,
    link_type: u16,
}

enum ReaderInner {
    Legacy {
        reader: LegacyPcapReader<Stream>,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<Stream>,
        interfaces: Vec<Interface>,
    },
}

/// Per-interface parameters from a PCAPNG interface description block.
#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: u16,
    /// Timestamp units per second.
    resolution: u64,
    /// Seconds added to every timestamp.
    offset: i64,
}

impl PcapReader {
    /// Open a PCAP file for reading.
    ///
    /// Automatically detects and decompresses gzipped files.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();

        // Check if file is gzipped (by extension or magic bytes)
        let is_gzipped = is_gzip_file(path)?;

        let mut buf_reader = open_stream(path, is_gzipped)?;

        // Peek at magic number to determine PCAP format
        let mut magic = [0u8; 4];
        buf_reader.read_exact(&mut magic).map_err(|_| {
            Error::Pcap(OurPcapError::InvalidFormat {
                reason: "File too short to read magic number".to_string(),
            })
        })?;

        // Re-open since we consumed the magic bytes
        drop(buf_reader);
        let buf_reader = open_stream(path, is_gzipped)?;

        debug!(path = %path.display(), gzip = is_gzipped, magic = ?magic, "opening capture");

        match &magic {
            // PCAP magic (little endian / big endian)
            [0xd4, 0xc3, 0xb2, 0xa1] | [0xa1, 0xb2, 0xc3, 0xd4] => {
                Self::open_legacy(buf_reader, false)
            }
            // PCAP nanosecond (little endian / big endian)
            [0x4d, 0x3c, 0xb2, 0xa1] | [0xa1, 0xb2, 0x3c, 0x4d] => {
                Self::open_legacy(buf_reader, true)
            }
            // PCAPNG
            [0x0a, 0x0d, 0x0d, 0x0a] => Self::open_ng(buf_reader),
            _ => Err(Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Unknown magic number: {magic:02x?}"),
            })),
        }
    }

    fn open_legacy(reader: Stream, nanosecond: bool) -> Result<Self, Error> {
        let pcap_reader = LegacyPcapReader::new(BUFFER_SIZE, reader).map_err(|e| {
            Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Failed to parse PCAP header: {e}"),
            })
        })?;

        Ok(Self {
            inner: ReaderInner::Legacy {
                reader: pcap_reader,
                nanosecond,
            },
            frame_number: 0,
            link_type: 1, // Default to Ethernet, updated from the header
        })
    }

    fn open_ng(reader: Stream) -> Result<Self, Error> {
        let pcap_reader = PcapNGReader::new(BUFFER_SIZE, reader).map_err(|e| {
            Error::Pcap(OurPcapError::InvalidFormat {
                reason: format!("Failed to parse PCAPNG header: {e}"),
            })
        })?;

        Ok(Self {
            inner: ReaderInner::Ng {
                reader: pcap_reader,
                interfaces: Vec::new(),
            },
            frame_number: 0,
            link_type: 1, // Updated from interface description blocks
        })
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next packet.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        match &mut self.inner {
            ReaderInner::Legacy { reader, nanosecond } => {
                next_legacy(reader, *nanosecond, &mut self.frame_number, &mut self.link_type)
            }
            ReaderInner::Ng { reader, interfaces } => {
                next_ng(reader, interfaces, &mut self.frame_number, &mut self.link_type)
            }
        }
    }
}

fn next_legacy(
    reader: &mut LegacyPcapReader<Stream>,
    nanosecond: bool,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawPacket>, Error> {
    let fraction_scale: i64 = if nanosecond { 1 } else { 1_000 };
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;

                    let timestamp_ns = i64::from(packet.ts_sec) * NANOS_PER_SEC
                        + i64::from(packet.ts_usec) * fraction_scale;

                    let raw = RawPacket::new(
                        *frame_number,
                        timestamp_ns,
                        packet.caplen,
                        packet.origlen,
                        *link_type,
                        packet.data.to_vec(),
                    );

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u16;
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => refill(reader)?,
            Err(e) => return Err(parse_error(e)),
        }
    }
}

fn next_ng(
    reader: &mut PcapNGReader<Stream>,
    interfaces: &mut Vec<Interface>,
    frame_number: &mut u64,
    link_type: &mut u16,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::pcapng::Block;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                    // Interface ids are scoped to a section.
                    interfaces.clear();
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                    let interface = Interface {
                        link_type: idb.linktype.0 as u16,
                        resolution: ts_resolution(idb.if_tsresol),
                        offset: idb.if_tsoffset,
                    };
                    *link_type = interface.link_type;
                    interfaces.push(interface);
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                    *frame_number += 1;

                    let interface = interfaces.get(epb.if_id as usize).copied().unwrap_or(
                        Interface {
                            link_type: *link_type,
                            resolution: DEFAULT_NG_RESOLUTION,
                            offset: 0,
                        },
                    );
                    let units = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);

                    let raw = RawPacket::new(
                        *frame_number,
                        units_to_nanos(units, interface.resolution, interface.offset),
                        epb.caplen,
                        epb.origlen,
                        interface.link_type,
                        epb.data.to_vec(),
                    );

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                    *frame_number += 1;

                    let raw = RawPacket::new(
                        *frame_number,
                        0, // No timestamp in simple packets
                        spb.data.len() as u32,
                        spb.origlen,
                        interfaces.first().map(|i| i.link_type).unwrap_or(*link_type),
                        spb.data.to_vec(),
                    );

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => refill(reader)?,
            Err(e) => return Err(parse_error(e)),
        }
    }
}

fn refill<R: PcapReaderIterator>(reader: &mut R) -> Result<(), Error> {
    reader.refill().map_err(|e| {
        Error::Pcap(OurPcapError::InvalidFormat {
            reason: format!("Refill error: {e}"),
        })
    })
}

fn parse_error<I: std::fmt::Debug>(e: PcapError<I>) -> Error {
    Error::Pcap(OurPcapError::InvalidFormat {
        reason: format!("Parse error: {e:?}"),
    })
}

/// Decode an `if_tsresol` option value into units per second.
///
/// The high bit selects a power of two, otherwise a power of ten. Zero
/// means the option was absent.
fn ts_resolution(tsresol: u8) -> u64 {
    if tsresol == 0 {
        return DEFAULT_NG_RESOLUTION;
    }
    let exponent = u32::from(tsresol & 0x7f);
    let resolution = if tsresol & 0x80 != 0 {
        2u64.checked_pow(exponent)
    } else {
        10u64.checked_pow(exponent)
    };
    resolution.unwrap_or(DEFAULT_NG_RESOLUTION)
}

fn units_to_nanos(units: u64, resolution: u64, offset_secs: i64) -> i64 {
    let nanos = u128::from(units) * NANOS_PER_SEC as u128 / u128::from(resolution.max(1));
    let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
    nanos.saturating_add(offset_secs.saturating_mul(NANOS_PER_SEC))
}

fn open_stream(path: &Path, is_gzipped: bool) -> Result<Stream, Error> {
    let file = File::open(path).map_err(|_| {
        Error::Pcap(OurPcapError::FileNotFound {
            path: path.display().to_string(),
        })
    })?;

    let reader: Box<dyn Read + Send> = if is_gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    Ok(BufReader::with_capacity(BUFFER_SIZE, reader))
}

/// Check if a file is gzipped by extension or magic bytes.
fn is_gzip_file<P: AsRef<Path>>(path: P) -> Result<bool, Error> {
    let path = path.as_ref();

    if is_gzip_extension(path) {
        return Ok(true);
    }

    let mut file = File::open(path).map_err(|_| {
        Error::Pcap(OurPcapError::FileNotFound {
            path: path.display().to_string(),
        })
    })?;

    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(_) => Ok(false), // File too short to be gzipped
    }
}

/// Check if a path appears to be a gzip file by extension only.
pub fn is_gzip_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|f| f.to_str())
        .map(|name| name.to_lowercase().ends_with(".gz"))
        .unwrap_or(false)
}

/// Iterator adapter for PcapReader.
impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_detect_gzip_by_extension() {
        assert!(is_gzip_extension("test.pcap.gz"));
        assert!(is_gzip_extension("TEST.PCAP.GZ"));
        assert!(!is_gzip_extension("test.pcap"));
        assert!(!is_gzip_extension("test.pcapng"));
    }

    #[test]
    fn test_detect_gzip_by_magic_bytes() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&GZIP_MAGIC).unwrap();
        temp.write_all(&[0x00, 0x00]).unwrap();
        temp.flush().unwrap();

        assert!(is_gzip_file(temp.path()).unwrap());
    }

    #[test]
    fn test_non_gzip_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap();
        temp.flush().unwrap();

        assert!(!is_gzip_file(temp.path()).unwrap());
    }

    #[test]
    fn test_missing_file() {
        let err = PcapReader::open("/nonexistent/capture.pcap").err().unwrap();
        assert!(matches!(err, Error::Pcap(OurPcapError::FileNotFound { .. })));
    }

    #[test]
    fn test_unknown_magic() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a capture").unwrap();
        temp.flush().unwrap();

        let err = PcapReader::open(temp.path()).err().unwrap();
        assert!(matches!(err, Error::Pcap(OurPcapError::InvalidFormat { .. })));
    }

    #[test]
    fn test_read_microsecond_pcap() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&minimal_pcap(0xa1b2_c3d4, 1_000_000_000, 250_000)).unwrap();
        temp.flush().unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        let raw = reader.next_packet().unwrap().unwrap();
        assert_eq!(raw.frame_number, 1);
        assert_eq!(raw.link_type, 1);
        assert_eq!(raw.timestamp_ns, 1_000_000_000 * NANOS_PER_SEC + 250_000_000);
        assert!(reader.next_packet().unwrap().is_none());
        assert_eq!(reader.frame_count(), 1);
    }

    #[test]
    fn test_read_nanosecond_pcap() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&minimal_pcap(0xa1b2_3c4d, 10, 123_456_789)).unwrap();
        temp.flush().unwrap();

        let packets: Vec<_> = PcapReader::open(temp.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp_ns, 10 * NANOS_PER_SEC + 123_456_789);
    }

    #[test]
    fn test_create_and_read_gzip_pcap() {
        let temp = NamedTempFile::with_suffix(".pcap.gz").unwrap();
        {
            let file = File::create(temp.path()).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder
                .write_all(&minimal_pcap(0xa1b2_c3d4, 1_000_000_000, 0))
                .unwrap();
            encoder.finish().unwrap();
        }

        let mut reader = PcapReader::open(temp.path()).unwrap();
        assert!(reader.next_packet().unwrap().is_some());
    }

    #[test]
    fn test_ts_resolution() {
        assert_eq!(ts_resolution(0), 1_000_000);
        assert_eq!(ts_resolution(6), 1_000_000);
        assert_eq!(ts_resolution(9), 1_000_000_000);
        assert_eq!(ts_resolution(0x80 | 10), 1024);
        // 10^127 overflows
        assert_eq!(ts_resolution(127), 1_000_000);
    }

    #[test]
    fn test_units_to_nanos() {
        assert_eq!(units_to_nanos(1_500_000, 1_000_000, 0), 1_500_000_000);
        assert_eq!(units_to_nanos(1_500, 1_000, 2), 3_500_000_000);
        assert_eq!(units_to_nanos(7, 1_000_000_000, 0), 7);
    }

    /// A minimal little-endian PCAP file with one Ethernet header.
    fn minimal_pcap(magic: u32, ts_sec: u32, ts_frac: u32) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&magic.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes()); // Version major
        data.extend_from_slice(&4u16.to_le_bytes()); // Version minor
        data.extend_from_slice(&0i32.to_le_bytes()); // Thiszone
        data.extend_from_slice(&0u32.to_le_bytes()); // Sigfigs
        data.extend_from_slice(&65535u32.to_le_bytes()); // Snaplen
        data.extend_from_slice(&1u32.to_le_bytes()); // Network (Ethernet)

        let frame = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
            0x08, 0x00, // EtherType (IPv4)
        ];

        data.extend_from_slice(&ts_sec.to_le_bytes());
        data.extend_from_slice(&ts_frac.to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&frame);

        data
    }
}
