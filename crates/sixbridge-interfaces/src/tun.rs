//! TUN device facing the host IPv6 stack.
//!
//! The device is opened in TUN mode with packet information enabled, so each
//! read and write carries a 4-byte prefix (2 bytes flags, 2 bytes protocol)
//! ahead of the IP datagram. Only IPv6 datagrams are passed on.
//!
//! The descriptor is switched to non-blocking mode and polled from a
//! dedicated OS thread that feeds an async channel, so `stop()` can end the
//! reader and release the device without waiting for traffic. Writes go
//! through `spawn_blocking`.

use std::io;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use tun_tap::{Iface, Mode};

use sixbridge_core::constants::ETHERTYPE_IPV6;

use crate::error::InterfaceError;
use crate::netconf;
use crate::traits::{Interface, TunDevice};

/// Length of the packet-information prefix on every TUN frame.
pub const TUN_PI_SIZE: usize = 4;

/// Read buffer for one TUN frame, prefix included.
pub const TUN_RECV_BUFFER: usize = 2048;

const RX_QUEUE_DEPTH: usize = 64;

/// How long the reader sleeps when the device has nothing to read.
pub const TUN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for a [`TunInterface`].
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Requested interface name, e.g. `tun0`.
    pub name: String,
}

impl TunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Remove the packet-information prefix, keeping only IPv6 payloads.
pub fn strip_packet_info(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < TUN_PI_SIZE {
        return None;
    }
    let proto = u16::from_be_bytes([frame[2], frame[3]]);
    if proto != ETHERTYPE_IPV6 {
        return None;
    }
    Some(&frame[TUN_PI_SIZE..])
}

/// Prepend the packet-information prefix for an IPv6 datagram.
pub fn with_packet_info(datagram: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(TUN_PI_SIZE + datagram.len());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&ETHERTYPE_IPV6.to_be_bytes());
    frame.extend_from_slice(datagram);
    frame
}

/// Poll `recv` until `stop` is set or the channel closes.
///
/// `recv` must not block: `WouldBlock` means "nothing yet". Frames that are
/// not IPv6 are dropped.
fn read_loop(
    mut recv: impl FnMut(&mut [u8]) -> io::Result<usize>,
    tx: mpsc::Sender<Vec<u8>>,
    stop: &AtomicBool,
    name: &str,
) {
    let mut buf = vec![0u8; TUN_RECV_BUFFER];
    while !stop.load(Ordering::Acquire) {
        let n = match recv(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(TUN_POLL_INTERVAL);
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{}: read error: {}", name, e);
                break;
            }
        };
        let Some(datagram) = strip_packet_info(&buf[..n]) else {
            debug!("{}: dropping non-IPv6 frame ({} bytes)", name, n);
            continue;
        };
        if tx.blocking_send(datagram.to_vec()).is_err() {
            break;
        }
    }
    debug!("{}: read loop exited", name);
}

/// A kernel TUN device.
pub struct TunInterface {
    config: TunConfig,
    /// Open device; taken by `stop()` so the descriptor closes once the
    /// reader thread and any in-flight write let go of it.
    iface: std::sync::Mutex<Option<Arc<Iface>>>,
    /// Name the kernel gave the device.
    ifname: OnceLock<String>,
    rx_sender: std::sync::Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    rx_receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
    online: AtomicBool,
    stop: Arc<AtomicBool>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TunInterface {
    /// Create the interface. The device itself is opened by `start()`.
    pub fn new(config: TunConfig) -> Self {
        let (tx, rx) = mpsc::channel(RX_QUEUE_DEPTH);
        Self {
            config,
            iface: std::sync::Mutex::new(None),
            ifname: OnceLock::new(),
            rx_sender: std::sync::Mutex::new(Some(tx)),
            rx_receiver: Mutex::new(rx),
            online: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            reader: std::sync::Mutex::new(None),
        }
    }

    fn device(&self) -> Result<Arc<Iface>, InterfaceError> {
        self.iface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(InterfaceError::NotConnected)
    }

    fn take_sender(&self) -> Result<mpsc::Sender<Vec<u8>>, InterfaceError> {
        self.rx_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                InterfaceError::Configuration(format!("{} already started", self.config.name))
            })
    }
}

impl Interface for TunInterface {
    fn name(&self) -> &str {
        match self.ifname.get() {
            Some(name) => name,
            None => &self.config.name,
        }
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), InterfaceError> {
        let tx = self.take_sender()?;
        let iface = Iface::new(&self.config.name, Mode::Tun)?;
        iface.set_non_blocking()?;
        let iface = Arc::new(iface);
        let name = self.ifname.get_or_init(|| iface.name().to_string()).clone();

        let stop = Arc::clone(&self.stop);
        let device = Arc::clone(&iface);
        let loop_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("tun-rx-{name}"))
            .spawn(move || read_loop(|buf| device.recv(buf), tx, &stop, &loop_name))?;

        *self.iface.lock().unwrap_or_else(PoisonError::into_inner) = Some(iface);
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.online.store(true, Ordering::SeqCst);
        info!("{}: tun device open", name);
        Ok(())
    }

    async fn stop(&self) -> Result<(), InterfaceError> {
        self.stop.store(true, Ordering::Release);
        self.online.store(false, Ordering::SeqCst);
        let iface = self.iface.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(iface);

        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            // Returns within one poll interval.
            let joined = tokio::task::spawn_blocking(move || reader.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("{}: reader thread panicked", self.name());
            }
            debug!("{}: tun device closed", self.name());
        }
        Ok(())
    }

    async fn transmit(&self, data: &[u8]) -> Result<(), InterfaceError> {
        if !self.is_connected() {
            return Err(InterfaceError::NotConnected);
        }
        let iface = self.device()?;
        let frame = with_packet_info(data);
        tokio::task::spawn_blocking(move || iface.send(&frame))
            .await
            .map_err(|e| InterfaceError::TransmitFailed(e.to_string()))??;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, InterfaceError> {
        let mut rx = self.rx_receiver.lock().await;
        rx.recv().await.ok_or(InterfaceError::Stopped)
    }
}

impl TunDevice for TunInterface {
    async fn add_address(&self, addr: Ipv6Addr, prefix_len: u8) -> Result<(), InterfaceError> {
        netconf::ip_addr_add(self.name(), addr, prefix_len).await
    }

    async fn set_up(&self) -> Result<(), InterfaceError> {
        netconf::ip_link_up(self.name()).await
    }
}
