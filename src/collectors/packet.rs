//! Packet-level metadata: raw IP frames from a tunnel-style reader, or a replayed capture CSV
//! (`ts,length,src,dst`). Only sizes, timestamps and addresses are kept; payloads are never read.

use super::{Direction, MonotonicClock, SampleError, SourceError, TrafficSample};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Split};
use tracing::trace;

/// Tunnel MTU is far below this; one read returns at most one datagram.
const MAX_FRAME_LEN: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketMeta {
    pub ts: f64,
    pub length: u64,
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl PacketMeta {
    /// Direction relative to `device`; `None` when the device is neither endpoint.
    pub fn to_sample(&self, device: IpAddr) -> Option<TrafficSample> {
        let direction = if self.dst == device {
            Direction::Download
        } else if self.src == device {
            Direction::Upload
        } else {
            return None;
        };
        Some(TrafficSample::new(self.ts, self.length, direction))
    }
}

/// Source and destination addresses from an IPv4 or IPv6 header.
pub fn parse_ip_header(frame: &[u8]) -> Result<(IpAddr, IpAddr), SampleError> {
    let first = frame.first().ok_or(SampleError::Empty)?;
    match first >> 4 {
        4 => {
            if frame.len() < 20 {
                return Err(SampleError::Truncated {
                    version: 4,
                    len: frame.len(),
                });
            }
            let src = Ipv4Addr::new(frame[12], frame[13], frame[14], frame[15]);
            let dst = Ipv4Addr::new(frame[16], frame[17], frame[18], frame[19]);
            Ok((IpAddr::V4(src), IpAddr::V4(dst)))
        }
        6 => {
            if frame.len() < 40 {
                return Err(SampleError::Truncated {
                    version: 6,
                    len: frame.len(),
                });
            }
            let mut src = [0u8; 16];
            let mut dst = [0u8; 16];
            src.copy_from_slice(&frame[8..24]);
            dst.copy_from_slice(&frame[24..40]);
            Ok((IpAddr::V6(Ipv6Addr::from(src)), IpAddr::V6(Ipv6Addr::from(dst))))
        }
        v => Err(SampleError::UnsupportedVersion(v)),
    }
}

/// Parse one capture CSV line. Header, blank and `#` marker lines yield `Ok(None)`.
pub fn parse_capture_row(line: &str, line_no: u64) -> Result<Option<PacketMeta>, SampleError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("ts,") {
        return Ok(None);
    }
    let bad = |reason: &str| SampleError::BadRow {
        line: line_no,
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(bad("expected 4 fields"));
    }
    let ts: f64 = fields[0].parse().map_err(|_| bad("bad timestamp"))?;
    if !ts.is_finite() {
        return Err(bad("non-finite timestamp"));
    }
    let length: u64 = fields[1].parse().map_err(|_| bad("bad length"))?;
    let src: IpAddr = fields[2].parse().map_err(|_| bad("bad source address"))?;
    let dst: IpAddr = fields[3].parse().map_err(|_| bad("bad destination address"))?;
    Ok(Some(PacketMeta {
        ts,
        length,
        src,
        dst,
    }))
}

enum Feed {
    Frames {
        reader: Box<dyn AsyncRead + Unpin + Send>,
        buf: Vec<u8>,
        clock: MonotonicClock,
    },
    Replay {
        lines: Split<Box<dyn AsyncBufRead + Unpin + Send>>,
        line_no: u64,
    },
}

pub struct PacketSource {
    feed: Feed,
    device: IpAddr,
    malformed: u64,
    foreign: u64,
}

impl PacketSource {
    /// Each read on `reader` must yield exactly one IP datagram (tunnel-interface semantics).
    pub fn frames<R>(reader: R, device: IpAddr, clock: MonotonicClock) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::with_feed(
            Feed::Frames {
                reader: Box::new(reader),
                buf: vec![0u8; MAX_FRAME_LEN],
                clock,
            },
            device,
        )
    }

    pub fn replay<R>(reader: R, device: IpAddr) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self::with_feed(
            Feed::Replay {
                lines: reader.split(b'\n'),
                line_no: 0,
            },
            device,
        )
    }

    pub async fn open_replay(path: &Path, device: IpAddr) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::replay(BufReader::new(file), device))
    }

    fn with_feed(feed: Feed, device: IpAddr) -> Self {
        Self {
            feed,
            device,
            malformed: 0,
            foreign: 0,
        }
    }

    pub fn device(&self) -> IpAddr {
        self.device
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Well-formed packets that did not involve the device.
    pub fn foreign(&self) -> u64 {
        self.foreign
    }

    /// Next device sample. Malformed and foreign packets are skipped.
    pub async fn next_sample(&mut self) -> Result<Option<TrafficSample>, SourceError> {
        loop {
            let meta = match self.next_meta().await? {
                None => return Ok(None),
                Some(Ok(meta)) => meta,
                Some(Err(e)) => {
                    self.malformed += 1;
                    trace!(error = %e, "dropping malformed packet");
                    continue;
                }
            };
            match meta.to_sample(self.device) {
                Some(sample) => return Ok(Some(sample)),
                None => self.foreign += 1,
            }
        }
    }

    async fn next_meta(&mut self) -> Result<Option<Result<PacketMeta, SampleError>>, SourceError> {
        match &mut self.feed {
            Feed::Frames { reader, buf, clock } => {
                let n = reader.read(buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                let ts = clock.now_secs();
                let parsed = parse_ip_header(&buf[..n]).map(|(src, dst)| PacketMeta {
                    ts,
                    length: n as u64,
                    src,
                    dst,
                });
                Ok(Some(parsed))
            }
            Feed::Replay { lines, line_no } => loop {
                let Some(raw) = lines.next_segment().await? else {
                    return Ok(None);
                };
                *line_no += 1;
                let line = match String::from_utf8(raw) {
                    Ok(l) => l,
                    Err(_) => {
                        return Ok(Some(Err(SampleError::BadRow {
                            line: *line_no,
                            reason: "not utf-8".to_string(),
                        })))
                    }
                };
                match parse_capture_row(&line, *line_no) {
                    Ok(Some(meta)) => return Ok(Some(Ok(meta))),
                    Ok(None) => continue,
                    Err(e) => return Ok(Some(Err(e))),
                }
            },
        }
    }
}
