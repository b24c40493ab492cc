//! Live packet capture via libpcap: adapter discovery, persisted adapter
//! selection, kernel-level BPF filtering, and a blocking read loop that
//! hands UDP payloads to a caller-supplied handler.
//!
//! # Adapter selection
//! Precedence, highest first: an explicit `--ip` override, the IPv4 address
//! persisted in `ip.txt` under the working directory, an interactive prompt
//! over stdin listing every IPv4-bearing interface.
//!
//! # Kernel filter
//! The installed BPF expression is always
//! `udp and (dst port 5056 or src port 5056)`.
//!
//! # Closing
//! The read loop polls a shared cancellation flag every [`READ_TIMEOUT`]
//! rather than blocking forever, since libpcap offers no portable, safe way
//! to interrupt an in-progress blocking read from another thread.
//! [`Capturer::close`] (or a cloned [`Capturer::stop_token`]) sets that flag;
//! the loop observes it at its next wakeup.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use pcap::{Capture, Device};
use thiserror::Error;

pub const ALBION_PORT: u16 = 5056;
const SNAP_LEN: i32 = 65536;
const PROMISCUOUS: bool = false;
const IP_FILE_NAME: &str = "ip.txt";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to list capture devices: {0}")]
    ListDevices(#[source] pcap::Error),
    #[error("no network interfaces with an IPv4 address were found")]
    NoInterfaces,
    #[error("invalid IP address: {0}")]
    InvalidIp(String),
    #[error("no capture device found with IP {0}")]
    AdapterNotFound(String),
    #[error("failed to open capture device {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: pcap::Error,
    },
    #[error("failed to install BPF filter {filter:?}: {source}")]
    FilterInstall {
        filter: String,
        #[source]
        source: pcap::Error,
    },
    #[error("failed to read from stdin: {0}")]
    Stdin(#[source] io::Error),
    #[error("failed to persist selected adapter to {path}: {source}")]
    PersistIp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A capture-capable network interface with a human-readable name, its
/// first IPv4 address, and the underlying pcap device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub device: String,
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t ip address: {}", self.name, self.address)
    }
}

/// Enumerates every capture device that carries at least one IPv4 address,
/// taking the first IPv4 address per device (mirroring the original tool's
/// adapter picker).
pub fn list_interfaces() -> Result<Vec<NetworkInterface>, CaptureError> {
    let devices = Device::list().map_err(CaptureError::ListDevices)?;
    let mut interfaces = Vec::new();
    for device in devices {
        let ipv4 = device.addresses.iter().find_map(|addr| match addr.addr {
            std::net::IpAddr::V4(ip) => Some(ip),
            std::net::IpAddr::V6(_) => None,
        });
        if let Some(address) = ipv4 {
            interfaces.push(NetworkInterface {
                name: device
                    .desc
                    .clone()
                    .unwrap_or_else(|| device.name.clone()),
                address,
                device: device.name,
            });
        }
    }
    Ok(interfaces)
}

/// Finds the pcap device name bound to the given IPv4 address.
pub fn find_device_by_ip(ip: Ipv4Addr) -> Result<String, CaptureError> {
    let devices = Device::list().map_err(CaptureError::ListDevices)?;
    for device in &devices {
        let matches = device
            .addresses
            .iter()
            .any(|addr| addr.addr == std::net::IpAddr::V4(ip));
        if matches {
            return Ok(device.name.clone());
        }
    }
    Err(CaptureError::AdapterNotFound(ip.to_string()))
}

fn ip_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(IP_FILE_NAME)
}

fn read_persisted_ip(app_dir: &Path) -> Option<Ipv4Addr> {
    let contents = fs::read_to_string(ip_file_path(app_dir)).ok()?;
    contents.trim().parse().ok()
}

fn persist_ip(app_dir: &Path, ip: Ipv4Addr) -> Result<(), CaptureError> {
    let path = ip_file_path(app_dir);
    fs::write(&path, ip.to_string()).map_err(|source| CaptureError::PersistIp { path, source })
}

/// Prompts on stdin for an adapter choice, persisting the selection to
/// `ip.txt` for future runs.
fn prompt_for_adapter(app_dir: &Path) -> Result<Ipv4Addr, CaptureError> {
    let interfaces = list_interfaces()?;
    if interfaces.is_empty() {
        return Err(CaptureError::NoInterfaces);
    }

    println!("\nPlease select the adapter used to connect to the Internet:");
    for (i, iface) in interfaces.iter().enumerate() {
        println!("  {}. {}", i + 1, iface);
    }
    println!();

    loop {
        print!("Enter the adapter number: ");
        io::stdout().flush().map_err(CaptureError::Stdin)?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .map_err(CaptureError::Stdin)?;
        let input = input.trim();

        let Ok(idx) = input.parse::<usize>() else {
            println!("Invalid input, please try again.\n");
            continue;
        };
        if idx < 1 || idx > interfaces.len() {
            println!("Invalid input, please try again.\n");
            continue;
        }

        let selected = &interfaces[idx - 1];
        println!("\nYou have selected \"{} - {}\"\n", selected.name, selected.address);

        if let Err(err) = persist_ip(app_dir, selected.address) {
            tracing::warn!(%err, "could not persist selected adapter");
        }

        return Ok(selected.address);
    }
}

/// Resolves the adapter IPv4 address to capture on, following the
/// override → persisted-file → interactive-prompt precedence.
pub fn resolve_adapter_ip(
    app_dir: &Path,
    ip_override: Option<&str>,
) -> Result<Ipv4Addr, CaptureError> {
    if let Some(raw) = ip_override {
        return raw
            .parse()
            .map_err(|_| CaptureError::InvalidIp(raw.to_owned()));
    }
    if let Some(ip) = read_persisted_ip(app_dir) {
        return Ok(ip);
    }
    prompt_for_adapter(app_dir)
}

/// Invoked once per captured UDP payload.
pub type PacketHandler = Box<dyn FnMut(&[u8]) + Send>;

/// How long a single blocking read waits before `run`'s loop wakes up to
/// check whether it has been asked to close. Bounds how long `close` takes
/// to be observed without busy-polling.
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

/// Owns an open pcap handle bound to one adapter with the Albion-port BPF
/// filter installed.
pub struct Capturer {
    handle: Capture<pcap::Active>,
    interface: NetworkInterface,
    stop: tokio_util::sync::CancellationToken,
}

impl Capturer {
    /// Resolves the adapter (by override, persisted file, or prompt), opens
    /// it, and installs the kernel filter. If the resolved IP no longer maps
    /// to a device and no override was given, falls back to an interactive
    /// re-prompt exactly once.
    pub fn new(app_dir: &Path, ip_override: Option<&str>) -> Result<Self, CaptureError> {
        let mut ip = resolve_adapter_ip(app_dir, ip_override)?;
        let device_name = match find_device_by_ip(ip) {
            Ok(name) => name,
            Err(err) => {
                if ip_override.is_some() {
                    return Err(err);
                }
                tracing::warn!(%ip, "adapter not found, prompting for a new one");
                ip = prompt_for_adapter(app_dir)?;
                find_device_by_ip(ip)?
            }
        };

        tracing::info!(%ip, device = %device_name, "opening capture device");

        let handle = Capture::from_device(device_name.as_str())
            .map_err(|source| CaptureError::Open {
                device: device_name.clone(),
                source,
            })?
            .snaplen(SNAP_LEN)
            .promisc(PROMISCUOUS)
            .timeout(READ_TIMEOUT.as_millis() as i32)
            .open()
            .map_err(|source| CaptureError::Open {
                device: device_name.clone(),
                source,
            })?;

        let filter = bpf_filter();
        let mut handle = handle;
        handle
            .filter(&filter, true)
            .map_err(|source| CaptureError::FilterInstall { filter, source })?;

        Ok(Capturer {
            handle,
            interface: NetworkInterface {
                name: device_name.clone(),
                address: ip,
                device: device_name,
            },
            stop: tokio_util::sync::CancellationToken::new(),
        })
    }

    pub fn interface(&self) -> &NetworkInterface {
        &self.interface
    }

    /// A cheap, cloneable handle whose cancellation stops this capturer's
    /// read loop. Obtain it before moving the capturer onto its own thread,
    /// since [`Capturer::run`] takes the capturer by unique reference.
    pub fn stop_token(&self) -> tokio_util::sync::CancellationToken {
        self.stop.clone()
    }

    /// Signals the read loop in [`Capturer::run`] to stop at its next
    /// timeout tick. Idempotent, and safe to call from a different thread
    /// than the one running `run` (prefer [`Capturer::stop_token`] for that
    /// case, since `run` holds the capturer by unique reference).
    pub fn close(&self) {
        self.stop.cancel();
    }

    /// Blocking read loop. Calls `on_packet` with the UDP payload of every
    /// captured datagram until [`Capturer::close`] is observed, the capture
    /// handle runs out of packets, or a terminal read error occurs.
    /// Intended to run on a dedicated thread; wakes at least every
    /// `READ_TIMEOUT` to check for a close request even with no traffic.
    pub fn run(&mut self, mut on_packet: PacketHandler) -> Result<(), CaptureError> {
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }
            match self.handle.next_packet() {
                Ok(packet) => {
                    if let Some(payload) = udp_payload(packet.data) {
                        if !payload.is_empty() {
                            on_packet(payload);
                        }
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => return Ok(()),
                Err(err) => {
                    tracing::warn!(%err, "capture read failed, stopping");
                    return Ok(());
                }
            }
        }
    }
}

fn bpf_filter() -> String {
    format!("udp and (dst port {ALBION_PORT} or src port {ALBION_PORT})")
}

/// Extracts the UDP payload from a raw Ethernet/IPv4(or IPv6) frame.
/// Returns `None` for anything that isn't a UDP datagram the BPF filter
/// should already have excluded everything else, this is just defense in
/// depth against malformed captures.
fn udp_payload(frame: &[u8]) -> Option<&[u8]> {
    const ETH_HEADER_LEN: usize = 14;
    if frame.len() < ETH_HEADER_LEN + 1 {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let ip_start = ETH_HEADER_LEN;
    match ethertype {
        0x0800 => {
            // IPv4
            if frame.len() < ip_start + 20 {
                return None;
            }
            let ihl = (frame[ip_start] & 0x0F) as usize * 4;
            let protocol = frame[ip_start + 9];
            if protocol != 17 {
                return None;
            }
            udp_from(&frame[ip_start + ihl..])
        }
        0x86DD => {
            // IPv6: fixed 40-byte header, next-header must be UDP (17) for
            // the simple (no extension headers) case this tool expects.
            if frame.len() < ip_start + 40 {
                return None;
            }
            let next_header = frame[ip_start + 6];
            if next_header != 17 {
                return None;
            }
            udp_from(&frame[ip_start + 40..])
        }
        _ => None,
    }
}

fn udp_from(udp_segment: &[u8]) -> Option<&[u8]> {
    const UDP_HEADER_LEN: usize = 8;
    if udp_segment.len() < UDP_HEADER_LEN {
        return None;
    }
    Some(&udp_segment[UDP_HEADER_LEN..])
}
