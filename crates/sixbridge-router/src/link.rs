//! Runtime half of the flow-control engine.
//!
//! [`FlowControl`] wraps the pure [`SlidingWindow`] with what it needs to run
//! against a real link:
//!
//! - a mutex around all window state, never held across an `.await`;
//! - a semaphore with one permit per send slot, so `send()` waits while the
//!   window is full;
//! - a `watch` flag for connection establishment;
//! - one retransmission timer task holding a min-heap of
//!   `(deadline, slot, generation)` entries. An entry whose generation no
//!   longer owns its slot has been acknowledged or superseded and is dropped.
//!
//! Outbound bytes (data, ACKs, SYNs, retransmissions) go to an mpsc queue
//! drained by the serial writer task.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use sixbridge_core::PacketType;
use sixbridge_core::packet::{Header, ack_packet};
use sixbridge_protocol::SlidingWindow;

use crate::config::FlowControlSection;
use crate::error::FlowError;

/// A scheduled retransmission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Retransmit {
    deadline: Instant,
    slot: usize,
    generation: u64,
    /// Retransmissions already made for this frame.
    attempts: u32,
}

/// Flow-controlled link to the node.
pub struct FlowControl {
    config: FlowControlSection,
    window: Mutex<SlidingWindow>,
    permits: Semaphore,
    established: watch::Sender<bool>,
    failed: AtomicBool,
    outbound: mpsc::Sender<Vec<u8>>,
    timers: mpsc::UnboundedSender<Retransmit>,
    timer_rx: Mutex<Option<mpsc::UnboundedReceiver<Retransmit>>>,
}

impl FlowControl {
    /// Create the engine. Every byte it wants on the wire is pushed to
    /// `outbound`.
    pub fn new(
        config: FlowControlSection,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<Self, FlowError> {
        let window = SlidingWindow::new(config.send_window, config.recv_window)?;
        let (timers, timer_rx) = mpsc::unbounded_channel();
        let (established, _) = watch::channel(false);

        Ok(Self {
            permits: Semaphore::new(usize::from(config.send_window)),
            config,
            window: Mutex::new(window),
            established,
            failed: AtomicBool::new(false),
            outbound,
            timers,
            timer_rx: Mutex::new(Some(timer_rx)),
        })
    }

    fn window(&self) -> MutexGuard<'_, SlidingWindow> {
        // Window updates never panic midway, so a poisoned lock still holds
        // consistent state.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_established(&self) -> bool {
        *self.established.borrow()
    }

    /// Whether the retransmission limit was hit and the link given up.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Mark the handshake complete and release waiting senders.
    pub fn signal_established(&self) {
        if !self.established.send_replace(true) {
            info!("link: connection established");
        }
    }

    /// Sequence numbers as `(last_frame, last_ack, next_exp)`.
    pub fn sequence_state(&self) -> (u8, u8, u8) {
        let window = self.window();
        (window.last_frame(), window.last_ack(), window.next_exp())
    }

    // ------------------------------------------------------------------ //
    // Handshake
    // ------------------------------------------------------------------ //

    /// Reset the link and run the handshake.
    ///
    /// Sends a SYN carrying `addr` every `syn_interval` until the node's
    /// SYNACK arrives through [`receive`](Self::receive). Retries forever
    /// unless `max_syn_attempts` is set.
    pub async fn init(&self, addr: Ipv6Addr) -> Result<(), FlowError> {
        self.established.send_replace(false);
        let syn = {
            let mut window = self.window();
            let outstanding = usize::from(window.outstanding());
            window.reset();
            if outstanding > 0 {
                self.permits.add_permits(outstanding);
            }
            window.syn(addr).encode()
        };

        let mut established = self.established.subscribe();
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = self.config.max_syn_attempts
                && attempts >= max
            {
                warn!("link: no SYNACK after {} attempts", attempts);
                return Err(FlowError::HandshakeTimeout { attempts });
            }

            attempts += 1;
            debug!("link: sending SYN (attempt {})", attempts);
            self.transmit(syn.clone()).await?;

            let wait = tokio::time::sleep(self.config.syn_interval());
            tokio::select! {
                result = established.wait_for(|e| *e) => {
                    return result.map(|_| ()).map_err(|_| FlowError::LinkClosed);
                }
                _ = wait => {}
            }
        }
    }

    /// Resolve once the handshake has completed.
    pub async fn wait_established(&self) -> Result<(), FlowError> {
        let mut established = self.established.subscribe();
        established
            .wait_for(|e| *e)
            .await
            .map(|_| ())
            .map_err(|_| FlowError::LinkClosed)
    }

    // ------------------------------------------------------------------ //
    // Send path
    // ------------------------------------------------------------------ //

    /// Send a packet (header included) through the window.
    ///
    /// Waits for the handshake and for a free send slot, then stamps the next
    /// sequence number, schedules its retransmission and transmits it.
    /// Returns the assigned sequence number.
    ///
    /// The frame is queued for the wire under the same lock that numbers
    /// it, so concurrent senders reach the line in sequence order.
    pub async fn send(&self, packet: Vec<u8>) -> Result<u8, FlowError> {
        self.wait_established().await?;

        let permit = self.permits.acquire().await.map_err(|_| {
            if self.has_failed() {
                FlowError::PeerUnreachable
            } else {
                FlowError::LinkClosed
            }
        })?;
        // Returned by `acknowledge` through add_permits.
        permit.forget();

        let Ok(queued) = self.outbound.reserve().await else {
            self.permits.add_permits(1);
            return Err(FlowError::LinkClosed);
        };

        let (seq, slot, generation) = {
            let mut window = self.window();
            let assigned = match window.assign(packet) {
                Ok(assigned) => assigned,
                Err(e) => {
                    self.permits.add_permits(1);
                    return Err(e.into());
                }
            };
            trace!(seq = assigned.seq, len = assigned.frame.len(), "link: send");
            queued.send(assigned.frame);
            (assigned.seq, assigned.slot, assigned.generation)
        };

        self.timers
            .send(Retransmit {
                deadline: Instant::now() + self.config.retransmit_timeout(),
                slot,
                generation,
                attempts: 0,
            })
            .map_err(|_| FlowError::LinkClosed)?;
        Ok(seq)
    }

    /// Close the link: senders waiting for a slot, and any later sends,
    /// fail with [`FlowError::LinkClosed`].
    pub fn close(&self) {
        if !self.permits.is_closed() {
            debug!("link: closed");
            self.permits.close();
        }
    }

    async fn transmit(&self, bytes: Vec<u8>) -> Result<(), FlowError> {
        self.outbound
            .send(bytes)
            .await
            .map_err(|_| FlowError::LinkClosed)
    }

    // ------------------------------------------------------------------ //
    // Receive path
    // ------------------------------------------------------------------ //

    /// Process one packet from the serial line.
    ///
    /// ACKs release send slots. Anything else is a data frame for the receive
    /// window; the cumulative ACK is transmitted and the packets now
    /// deliverable are returned in sequence order.
    pub async fn receive(&self, packet: Vec<u8>) -> Result<Vec<Vec<u8>>, FlowError> {
        let header = Header::parse(&packet)?;

        if header.packet_type == PacketType::Ack {
            let freed = self.window().acknowledge(header.seq_num);
            if freed > 0 {
                trace!(seq = header.seq_num, freed, "link: ack");
                self.permits.add_permits(freed);
            }
            return Ok(Vec::new());
        }

        let accepted = self.window().accept(header.seq_num, packet);
        if let Some(ack) = accepted.ack {
            self.transmit(ack_packet(ack).to_vec()).await?;
        }
        Ok(accepted.delivered)
    }

    // ------------------------------------------------------------------ //
    // Retransmission timer
    // ------------------------------------------------------------------ //

    /// Run the retransmission timer until `stop` fires or the link fails.
    ///
    /// Only one timer may run per link; a second call returns immediately.
    pub async fn run_retransmit_timer(&self, mut stop: watch::Receiver<bool>) {
        let receiver = self
            .timer_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            warn!("link: retransmit timer already running");
            return;
        };

        let mut heap: BinaryHeap<Reverse<Retransmit>> = BinaryHeap::new();
        while !*stop.borrow() {
            let next = heap.peek().map(|Reverse(entry)| entry.deadline);
            tokio::select! {
                entry = receiver.recv() => match entry {
                    Some(entry) => heap.push(Reverse(entry)),
                    None => break,
                },
                _ = sleep_until(next) => {
                    if let Err(e) = self.fire_due(&mut heap).await {
                        warn!("link: retransmit timer stopped: {}", e);
                        break;
                    }
                }
                _ = stop.changed() => break,
            }
        }
        debug!("link: retransmit timer exited");
    }

    async fn fire_due(&self, heap: &mut BinaryHeap<Reverse<Retransmit>>) -> Result<(), FlowError> {
        let now = Instant::now();
        while let Some(Reverse(entry)) = heap.peek().copied() {
            if entry.deadline > now {
                break;
            }
            heap.pop();

            let frame = self.window().retransmission(entry.slot, entry.generation);
            let Some(frame) = frame else {
                continue;
            };

            let attempts = entry.attempts + 1;
            if let Some(max) = self.config.max_retransmissions
                && attempts > max
            {
                self.fail();
                heap.clear();
                return Err(FlowError::PeerUnreachable);
            }

            debug!(
                slot = entry.slot,
                attempts, "link: retransmitting unacknowledged frame"
            );
            self.transmit(frame).await?;
            heap.push(Reverse(Retransmit {
                deadline: now + self.config.retransmit_timeout(),
                attempts,
                ..entry
            }));
        }
        Ok(())
    }

    fn fail(&self) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            tracing::error!("link: peer unreachable, giving up");
            self.permits.close();
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
