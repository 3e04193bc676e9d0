//! SLIP-framed serial link to the node.
//!
//! The interface is generic over its read and write halves so the same code
//! drives a TTY in production and an in-memory duplex stream in tests. The
//! device is opened twice, once per direction, so a blocked reader never
//! holds up the writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use sixbridge_core::framing::slip::slip_encode;

use crate::error::InterfaceError;
use crate::framing::{SerialFrame, SlipDecoder};
use crate::traits::Interface;

/// Baud rate used when the configuration does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Size of the buffer handed to each `read` on the device.
pub const SERIAL_RECV_BUFFER: usize = 1024;

/// Depth of the queue between the read loop and [`Interface::receive`].
const RX_QUEUE_DEPTH: usize = 64;

/// Configuration for a [`SerialInterface`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Human-readable name for this interface.
    pub name: String,
    /// Path of the TTY device.
    pub device: PathBuf,
    /// Line speed; the port is always 8N1 without flow control.
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        Self {
            name: format!("serial[{}]", device.display()),
            device,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

struct SerialInner<W> {
    writer: Mutex<W>,
    /// Set by `start()`, cleared by `stop()` or when the line goes away.
    online: AtomicBool,
}

/// Serial interface carrying SLIP-framed protocol packets.
///
/// Text lines the node prints between packets are logged under the `node`
/// target and never reach [`Interface::receive`].
pub struct SerialInterface<R, W> {
    config: SerialConfig,
    /// Read half and queue sender, handed to the read loop by `start()`.
    pending: std::sync::Mutex<Option<(R, mpsc::Sender<Vec<u8>>)>>,
    inner: Arc<SerialInner<W>>,
    stop_tx: watch::Sender<bool>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    rx_receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl<R, W> SerialInterface<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap already-open read and write halves.
    pub fn new(config: SerialConfig, reader: R, writer: W) -> Self {
        let (tx, rx) = mpsc::channel(RX_QUEUE_DEPTH);
        Self {
            config,
            pending: std::sync::Mutex::new(Some((reader, tx))),
            inner: Arc::new(SerialInner {
                writer: Mutex::new(writer),
                online: AtomicBool::new(false),
            }),
            stop_tx: watch::Sender::new(false),
            read_task: Mutex::new(None),
            rx_receiver: Mutex::new(rx),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn take_pending(&self) -> Result<(R, mpsc::Sender<Vec<u8>>), InterfaceError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| InterfaceError::Configuration("serial state poisoned".into()))?;
        pending.take().ok_or_else(|| {
            InterfaceError::Configuration(format!("{} already started", self.config.name))
        })
    }

    /// Read bytes from the device, split them into packets and text lines.
    async fn read_loop(
        inner: Arc<SerialInner<W>>,
        mut reader: R,
        tx: mpsc::Sender<Vec<u8>>,
        mut stop_rx: watch::Receiver<bool>,
        name: String,
    ) {
        let mut decoder = SlipDecoder::new();
        let mut buf = vec![0u8; SERIAL_RECV_BUFFER];

        while !*stop_rx.borrow() {
            let n = tokio::select! {
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            warn!("{}: device closed (EOF)", name);
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            warn!("{}: read error: {}", name, e);
                            break;
                        }
                    }
                }
                _ = stop_rx.changed() => break,
            };

            for frame in decoder.feed(&buf[..n]) {
                match frame {
                    SerialFrame::Packet(packet) => {
                        if tx.send(packet).await.is_err() {
                            debug!("{}: receiver dropped", name);
                            inner.online.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                    SerialFrame::Text(line) => info!(target: "node", "{}", line),
                }
            }
        }

        inner.online.store(false, Ordering::SeqCst);
    }
}

/// A serial interface over a real TTY.
pub type DeviceSerial = SerialInterface<ReadHalf<SerialStream>, WriteHalf<SerialStream>>;

impl DeviceSerial {
    /// Open the TTY in raw 8N1 mode at the configured baud rate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: SerialConfig) -> Result<Self, InterfaceError> {
        let port = tokio_serial::new(config.device.to_string_lossy(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        let (reader, writer) = tokio::io::split(port);

        info!(
            "{}: opened {} at {} baud",
            config.name,
            config.device.display(),
            config.baud_rate
        );
        Ok(Self::new(config, reader, writer))
    }
}

impl<R, W> Interface for SerialInterface<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_connected(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), InterfaceError> {
        let (reader, tx) = self.take_pending()?;
        let inner = Arc::clone(&self.inner);
        let stop_rx = self.stop_tx.subscribe();
        let name = self.config.name.clone();

        self.inner.online.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(Self::read_loop(inner, reader, tx, stop_rx, name));
        *self.read_task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), InterfaceError> {
        self.stop_tx.send_replace(true);
        self.inner.online.store(false, Ordering::SeqCst);
        let handle = self.read_task.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("{}: read loop failed: {}", self.config.name, e);
        }
        Ok(())
    }

    async fn transmit(&self, data: &[u8]) -> Result<(), InterfaceError> {
        if !self.is_connected() {
            return Err(InterfaceError::NotConnected);
        }

        let framed = slip_encode(data);
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, InterfaceError> {
        let mut rx = self.rx_receiver.lock().await;
        rx.recv().await.ok_or(InterfaceError::Stopped)
    }
}
