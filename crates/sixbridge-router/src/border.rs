//! Border router driver.
//!
//! Wires the serial link, the flow-control engine, the TUN device and the
//! context cache together, and exposes the operations an operator (or a
//! routing daemon) uses to manage contexts and addresses.
//!
//! Background tasks, all watching one stop signal and joined on shutdown:
//! - serial writer: drains the engine's outbound queue onto the serial line;
//! - serial reader: feeds packets into the engine and dispatches deliveries;
//! - retransmission timer;
//! - TUN reader: forwards host datagrams to the node (spawned after the
//!   handshake).

use std::future::Future;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sixbridge_core::ContextPacket;
use sixbridge_interfaces::{Interface, InterfaceError, TunDevice};
use sixbridge_protocol::mux::{Inbound, demultiplex};

use crate::config::RouterConfig;
use crate::context::{ContextCache, ContextEntry};
use crate::error::{FlowError, RouterError};
use crate::link::FlowControl;
use crate::mux::Multiplexer;

/// Depth of the queue between the engine and the serial writer.
const OUTBOUND_QUEUE_DEPTH: usize = 128;

/// Router address for a node: `abcd::1034:00ff:fe00:<suffix>`.
pub fn router_address(suffix: u16) -> Ipv6Addr {
    Ipv6Addr::new(0xabcd, 0, 0, 0, 0x1034, 0x00ff, 0xfe00, suffix)
}

/// Parse a node suffix written in hexadecimal, with or without `0x`.
pub fn parse_suffix(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid node suffix {s:?}: {e}"))
}

/// Host side of a 6LoWPAN serial border router.
pub struct BorderRouter<S, T> {
    config: RouterConfig,
    addr: Ipv6Addr,
    serial: S,
    tun: T,
    flow: Arc<FlowControl>,
    mux: Multiplexer,
    contexts: Mutex<ContextCache>,
    addr_version: Mutex<u16>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    /// `initialize()` has been called; it only runs once.
    started: AtomicBool,
    /// Serial link up and background tasks alive.
    running: AtomicBool,
    stop: watch::Sender<bool>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl<S, T> BorderRouter<S, T>
where
    S: Interface + 'static,
    T: TunDevice + 'static,
{
    /// Create a router for the node reachable over `serial`. `addr` is the
    /// router's own address, configured on `tun` and sent in the SYN.
    pub fn new(config: RouterConfig, addr: Ipv6Addr, serial: S, tun: T) -> Result<Self, RouterError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let flow = Arc::new(FlowControl::new(config.flow_control.clone(), tx)?);

        Ok(Self {
            mux: Multiplexer::new(Arc::clone(&flow)),
            flow,
            config,
            addr,
            serial,
            tun,
            contexts: Mutex::new(ContextCache::new()),
            addr_version: Mutex::new(0),
            outbound_rx: Mutex::new(Some(rx)),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop: watch::Sender::new(false),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn flow(&self) -> &FlowControl {
        &self.flow
    }

    pub fn tun(&self) -> &T {
        &self.tun
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !*self.stop.borrow()
    }

    pub fn context(&self, cid: u8) -> Option<ContextEntry> {
        self.contexts().get(cid).copied()
    }

    fn contexts(&self) -> MutexGuard<'_, ContextCache> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_started(&self) -> Result<(), RouterError> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RouterError::NotStarted)
        }
    }

    // ------------------------------------------------------------------ //
    // Lifecycle
    // ------------------------------------------------------------------ //

    /// Bring the router up.
    ///
    /// Opens the serial link and starts its tasks, configures the TUN device,
    /// completes the handshake with the node and finally starts forwarding
    /// host traffic. Returns once the link is established.
    ///
    /// On failure everything already started is shut down again. A router
    /// is brought up at most once; build a new one to retry.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), RouterError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RouterError::AlreadyRunning);
        }
        let result = self.bring_up().await;
        if let Err(e) = &result {
            error!("border router failed to start: {}", e);
            self.shutdown().await;
        }
        result
    }

    async fn bring_up(self: &Arc<Self>) -> Result<(), RouterError> {
        let outbound = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RouterError::AlreadyRunning)?;

        self.serial.start().await?;
        self.running.store(true, Ordering::SeqCst);

        let router = Arc::clone(self);
        self.spawn(async move { router.serial_writer(outbound).await })
            .await;
        let router = Arc::clone(self);
        self.spawn(async move { router.serial_reader().await }).await;
        let flow = Arc::clone(&self.flow);
        let stop = self.stop.subscribe();
        self.spawn(async move { flow.run_retransmit_timer(stop).await })
            .await;

        self.tun.start().await?;
        self.tun
            .add_address(self.addr, self.config.tun.prefix_len)
            .await?;
        self.tun.set_up().await?;
        info!(
            "{}: address {}/{}",
            self.tun.name(),
            self.addr,
            self.config.tun.prefix_len
        );

        info!("waiting for node on {}", self.serial.name());
        tokio::select! {
            result = self.flow.init(self.addr) => result?,
            _ = self.stopped() => return Err(FlowError::LinkClosed.into()),
        }

        let router = Arc::clone(self);
        self.spawn(async move { router.tun_reader().await }).await;

        info!("border router up at {}", self.addr);
        Ok(())
    }

    async fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.lock().await.spawn(task);
    }

    /// Stop every background task and both interfaces.
    ///
    /// Senders still waiting for a window slot fail with
    /// [`FlowError::LinkClosed`].
    pub async fn shutdown(&self) {
        info!("shutting down border router");
        self.stop.send_replace(true);
        self.running.store(false, Ordering::SeqCst);
        self.flow.close();

        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("background task failed: {}", e);
            }
        }
        drop(tasks);

        if let Err(e) = self.serial.stop().await {
            warn!("{}: stop failed: {}", self.serial.name(), e);
        }
        if let Err(e) = self.tun.stop().await {
            warn!("{}: stop failed: {}", self.tun.name(), e);
        }
    }

    /// Resolve once a shutdown has been requested.
    pub async fn stopped(&self) {
        let mut stop = self.stop.subscribe();
        // The sender lives in `self`, so this only returns once stopped.
        let _ = stop.wait_for(|stopped| *stopped).await;
    }

    /// Request shutdown without waiting for it. Used by signal handlers.
    pub fn request_shutdown(&self) {
        self.stop.send_replace(true);
    }

    // ------------------------------------------------------------------ //
    // Operations
    // ------------------------------------------------------------------ //

    /// Cache a compression context and push it to the node.
    pub async fn update_context(
        &self,
        cid: u8,
        prefix: Ipv6Addr,
        len: u8,
        comp: bool,
        lifetime: u16,
    ) -> Result<(), RouterError> {
        self.ensure_started()?;
        let entry = ContextEntry {
            prefix,
            len,
            comp,
            lifetime,
        };
        let record = self
            .push_context(cid, |cache| cache.update(cid, entry))
            .await?;
        info!(cid, version = record.version, "context updated");
        Ok(())
    }

    /// Re-send an existing context under a new version.
    pub async fn renew_existing_context(&self, cid: u8) -> Result<(), RouterError> {
        self.ensure_started()?;
        let record = self.push_context(cid, |cache| cache.renew(cid)).await?;
        debug!(cid, version = record.version, "context renewed");
        Ok(())
    }

    /// Withdraw a context from the node and forget it.
    pub async fn remove_context(&self, cid: u8) -> Result<(), RouterError> {
        self.ensure_started()?;
        let record = self.push_context(cid, |cache| cache.remove(cid)).await?;
        info!(cid, version = record.version, "context removed");
        Ok(())
    }

    /// Apply `change` to the cache and send the resulting record.
    ///
    /// If the record cannot be sent the cached entry is put back, so the
    /// cache never claims a context the node was not told about. The slot
    /// version stays bumped.
    async fn push_context(
        &self,
        cid: u8,
        change: impl FnOnce(&mut ContextCache) -> Result<ContextPacket, RouterError>,
    ) -> Result<ContextPacket, RouterError> {
        let (previous, record) = {
            let mut cache = self.contexts();
            let previous = cache.get(cid).copied();
            (previous, change(&mut *cache)?)
        };
        if let Err(e) = self.mux.send_context(&record).await {
            warn!(cid, "context not sent, keeping previous entry: {}", e);
            self.contexts().restore(cid, previous);
            return Err(e);
        }
        Ok(record)
    }

    /// Configure `addr` on the TUN device and announce it to the node.
    pub async fn add_addr(&self, addr: Ipv6Addr) -> Result<(), RouterError> {
        self.ensure_started()?;
        self.tun
            .add_address(addr, self.config.tun.prefix_len)
            .await?;
        let version = {
            let mut version = self
                .addr_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *version = version.wrapping_add(1);
            *version
        };
        info!(%addr, version, "address added");
        self.mux.send_addr(version, addr).await?;
        Ok(())
    }

    /// Send an IPv6 datagram to the node.
    pub async fn send_ipv6(&self, datagram: &[u8]) -> Result<u8, RouterError> {
        self.ensure_started()?;
        self.mux.send_ipv6(datagram).await
    }

    // ------------------------------------------------------------------ //
    // Background tasks
    // ------------------------------------------------------------------ //

    async fn serial_writer(self: Arc<Self>, mut outbound: mpsc::Receiver<Vec<u8>>) {
        let mut stop = self.stop.subscribe();
        while !*stop.borrow() {
            let bytes = tokio::select! {
                bytes = outbound.recv() => match bytes {
                    Some(bytes) => bytes,
                    None => break,
                },
                _ = stop.changed() => break,
            };
            match self.serial.transmit(&bytes).await {
                Ok(()) => {}
                Err(InterfaceError::NotConnected) => {
                    error!("{}: serial link lost", self.serial.name());
                    break;
                }
                Err(e) => warn!("{}: write failed: {}", self.serial.name(), e),
            }
        }
        debug!("serial writer exited");
    }

    async fn serial_reader(self: Arc<Self>) {
        let mut stop = self.stop.subscribe();
        while !*stop.borrow() {
            let packet = tokio::select! {
                packet = self.serial.receive() => match packet {
                    Ok(packet) => packet,
                    Err(e) => {
                        error!("{}: serial link lost: {}", self.serial.name(), e);
                        self.request_shutdown();
                        break;
                    }
                },
                _ = stop.changed() => break,
            };
            self.handle_serial(packet).await;
        }
        debug!("serial reader exited");
    }

    async fn tun_reader(self: Arc<Self>) {
        let mut stop = self.stop.subscribe();
        while !*stop.borrow() {
            let datagram = tokio::select! {
                datagram = self.tun.receive() => match datagram {
                    Ok(datagram) => datagram,
                    Err(e) => {
                        error!("{}: tun read failed: {}", self.tun.name(), e);
                        break;
                    }
                },
                _ = stop.changed() => break,
            };
            // Waits for a free send slot; must stay cancellable.
            let sent = tokio::select! {
                sent = self.mux.send_ipv6(&datagram) => sent,
                _ = stop.changed() => break,
            };
            match sent {
                Ok(_) => {}
                Err(RouterError::Mux(e)) => debug!("dropping datagram from host: {}", e),
                Err(e) => {
                    error!("forwarding to node stopped: {}", e);
                    self.request_shutdown();
                    break;
                }
            }
        }
        debug!("tun reader exited");
    }

    /// Feed one packet from the node through the engine and dispatch what
    /// it delivers.
    async fn handle_serial(&self, packet: Vec<u8>) {
        let delivered = match self.flow.receive(packet).await {
            Ok(delivered) => delivered,
            Err(FlowError::Packet(e)) => {
                warn!("dropping malformed packet from node: {}", e);
                return;
            }
            Err(e) => {
                debug!("receive failed: {}", e);
                return;
            }
        };

        for packet in delivered {
            match demultiplex(&packet) {
                Ok(inbound) => self.dispatch(inbound).await,
                Err(e) => warn!("dropping packet from node: {}", e),
            }
        }
    }

    async fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Diagnostic(text) => info!(target: "node", "{}", text),
            Inbound::Ipv6(datagram) => {
                if let Err(e) = self.tun.transmit(&datagram).await {
                    warn!("{}: write failed: {}", self.tun.name(), e);
                }
            }
            Inbound::SynAck => self.flow.signal_established(),
            Inbound::Context(context) => {
                // Contexts flow from the router to the node only.
                info!(
                    cid = context.cid,
                    version = context.version,
                    "context from node ignored"
                );
            }
            Inbound::Address(address) => {
                info!(addr = %address.addr, version = address.version, "node assigned address");
                if let Err(e) = self
                    .tun
                    .add_address(address.addr, self.config.tun.prefix_len)
                    .await
                {
                    warn!("{}: failed to add {}: {}", self.tun.name(), address.addr, e);
                }
            }
        }
    }
}
