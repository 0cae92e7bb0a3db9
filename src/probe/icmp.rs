//! ICMP echo probing with native sockets and a `ping` command fallback.
//!
//! Native echoes run on blocking sockets inside `spawn_blocking` so the
//! round trip is timed without runtime scheduling noise.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{PingOptions, Pinger, ProbeError, clean_latency, summarize};
use crate::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcmpCapability {
    Raw,
    Datagram,
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

fn detect_icmp_capability() -> IcmpCapability {
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        info!("ping: using native ICMP (raw socket)");
        return IcmpCapability::Raw;
    }

    // unprivileged on Linux when ping_group_range allows it, always on macOS
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        info!("ping: using native ICMP (datagram socket)");
        return IcmpCapability::Datagram;
    }

    info!("ping: native ICMP unavailable, using the ping command");
    IcmpCapability::CommandOnly
}

/// Production [`Pinger`]
#[derive(Debug, Clone)]
pub struct IcmpPinger {
    capability: IcmpCapability,
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self::new()
    }
}

impl IcmpPinger {
    pub fn new() -> Self {
        Self {
            capability: *ICMP_CAPABILITY.get_or_init(detect_icmp_capability),
        }
    }

    #[instrument(skip(self, options))]
    async fn ping_host(&self, address: &str, options: &PingOptions) -> ProbeResult {
        let timestamp = Utc::now();

        if self.capability == IcmpCapability::CommandOnly {
            return run_ping_command(address, options).await;
        }

        let ip = match resolve_address(address).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!("cannot resolve {address}: {e}");
                return ProbeResult::unreachable(address, timestamp);
            }
        };

        let raw = self.capability == IcmpCapability::Raw;
        let mut round_trips = Vec::with_capacity(options.count as usize);

        for n in 0..options.count {
            if n > 0 {
                tokio::time::sleep(options.spacing).await;
            }

            let timeout = options.timeout;
            let echo = tokio::task::spawn_blocking(move || blocking_echo(ip, raw, timeout))
                .await
                .map_err(|e| ProbeError::Network(format!("echo task failed: {e}")))
                .and_then(|r| r);

            match echo {
                Ok(rtt) => round_trips.push(Some(rtt)),
                Err(ProbeError::Timeout(_)) => round_trips.push(None),
                Err(ProbeError::Network(msg)) if msg.contains("Permission denied") => {
                    warn!("native ping to {address} not permitted, falling back to command: {msg}");
                    return run_ping_command(address, options).await;
                }
                Err(e) => {
                    debug!("echo to {address} failed: {e}");
                    round_trips.push(None);
                }
            }
        }

        summarize(address, &round_trips, timestamp)
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn ping_batch(&self, addresses: &[String], options: &PingOptions) -> Vec<ProbeResult> {
        join_all(addresses.iter().map(|a| self.ping_host(a, options))).await
    }
}

async fn resolve_address(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host(format!("{address}:0"))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {e}")))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {address}")))
}

fn next_echo_id() -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

/// One echo request/reply on a blocking socket
fn blocking_echo(ip: IpAddr, raw: bool, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, protocol, request_type, reply_type) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4, 8u8, 0u8),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6, 128u8, 129u8),
    };
    let kind = if raw { Type::RAW } else { Type::DGRAM };

    let socket = Socket::new(domain, kind, Some(protocol)).map_err(|e| {
        ProbeError::Network(format!("failed to create ICMP socket: {e}"))
    })?;
    socket
        .set_read_timeout(Some(timeout))
        .and_then(|_| socket.set_write_timeout(Some(timeout)))
        .map_err(|e| ProbeError::Network(format!("failed to set timeout: {e}")))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| ProbeError::Network(format!("failed to connect: {e}")))?;

    let (identifier, sequence) = next_echo_id();
    let packet = build_echo_request(request_type, identifier, sequence, ip.is_ipv4());

    let start = Instant::now();
    socket.send(&packet).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            ProbeError::Network(format!("Permission denied: {e}"))
        }
        _ => ProbeError::Network(format!("failed to send: {e}")),
    })?;

    let mut buf = [0u8; 1500];
    loop {
        // stray ICMP traffic must not extend the wait past the echo timeout
        let Some(remaining) = remaining_budget(timeout, start.elapsed()) else {
            return Err(ProbeError::Timeout(timeout));
        };
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| ProbeError::Network(format!("failed to set timeout: {e}")))?;

        let len = (&socket).read(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                ProbeError::Timeout(timeout)
            }
            _ => ProbeError::Network(format!("failed to receive: {e}")),
        })?;
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if is_our_reply(&buf[..len], reply_type, raw.then_some(identifier), sequence) {
            return Ok(elapsed);
        }
    }
}

/// Time left of `timeout` after `elapsed`, `None` once it is used up
fn remaining_budget(timeout: Duration, elapsed: Duration) -> Option<Duration> {
    timeout.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// Raw IPv4 sockets deliver the IP header too. Datagram sockets get their
/// identifier rewritten by the kernel, so only the sequence is compared there.
fn is_our_reply(buf: &[u8], reply_type: u8, identifier: Option<u16>, sequence: u16) -> bool {
    let offset = match buf.first() {
        Some(b) if b >> 4 == 4 => usize::from(b & 0x0f) * 4,
        _ => 0,
    };
    let Some(icmp) = buf.get(offset..offset + 8) else {
        return false;
    };

    let id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let seq = u16::from_be_bytes([icmp[6], icmp[7]]);

    icmp[0] == reply_type && seq == sequence && identifier.is_none_or(|expected| expected == id)
}

fn build_echo_request(icmp_type: u8, identifier: u16, sequence: u16, checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = icmp_type;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    packet[8..16].copy_from_slice(&stamp.to_be_bytes());

    // the kernel fills in the ICMPv6 checksum
    if checksum {
        let sum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }

    packet
}

/// RFC 1071 internet checksum
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

async fn run_ping_command(address: &str, options: &PingOptions) -> ProbeResult {
    let timestamp = Utc::now();
    let interval = options.spacing.as_secs_f64().max(0.2);
    let wait = options.timeout.as_secs().max(1);

    let output = Command::new("ping")
        .args([
            "-n",
            "-c",
            &options.count.to_string(),
            "-i",
            &format!("{interval:.1}"),
            "-W",
            &wait.to_string(),
            address,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            warn!("failed to execute ping for {address}: {e}");
            return ProbeResult::unreachable(address, timestamp);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    match parse_ping_summary(&stdout) {
        Ok(summary) => ProbeResult {
            target_address: address.to_string(),
            is_reachable: summary.min_rtt_ms.is_some(),
            latency_ms: summary.min_rtt_ms.map(clean_latency),
            packet_loss: summary.packet_loss,
            timestamp,
        },
        Err(e) => {
            debug!("{e}");
            ProbeResult::unreachable(address, timestamp)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PingSummary {
    packet_loss: f64,
    min_rtt_ms: Option<f64>,
}

/// Read loss and minimum round trip from the statistics footer of `ping`
fn parse_ping_summary(output: &str) -> Result<PingSummary, ProbeError> {
    static LOSS: OnceLock<Regex> = OnceLock::new();
    static RTT: OnceLock<Regex> = OnceLock::new();

    let loss = LOSS.get_or_init(|| {
        Regex::new(r"(?P<loss>[0-9.]+)% packet loss").expect("valid packet loss pattern")
    });
    let rtt = RTT.get_or_init(|| {
        Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = (?P<min>[0-9.]+)/")
            .expect("valid rtt pattern")
    });

    let packet_loss = loss
        .captures(output)
        .and_then(|caps| caps.name("loss"))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Command(format!("unexpected ping output: {output}")))?;

    let min_rtt_ms = rtt
        .captures(output)
        .and_then(|caps| caps.name("min"))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    Ok(PingSummary {
        packet_loss,
        min_rtt_ms,
    })
}
