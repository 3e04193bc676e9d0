//! End-to-end tests: a border router talking to a simulated node over an
//! in-memory serial line, with a recording TUN device on the host side.

use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;

use sixbridge_core::constants::{ConfType, PacketType};
use sixbridge_core::framing::slip::slip_encode;
use sixbridge_core::packet::{ack_packet, conf_type, l3_packet, raw_packet, set_seq_num};
use sixbridge_core::{AddrPacket, ContextPacket, Header, SynPacket};
use sixbridge_interfaces::{
    Interface, InterfaceError, SerialConfig, SerialFrame, SerialInterface, SlipDecoder, TunDevice,
};
use sixbridge_protocol::mux::wrap_addr;
use sixbridge_router::config::RouterConfig;
use sixbridge_router::{BorderRouter, FlowError, RouterError, router_address};

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Recording TUN device
// ---------------------------------------------------------------------------

struct MockTun {
    online: AtomicBool,
    up: AtomicBool,
    /// Make `add_address` fail like a missing `ip` binary would.
    fail_add: AtomicBool,
    from_host: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    to_host: mpsc::UnboundedSender<Vec<u8>>,
    addresses: Mutex<Vec<(Ipv6Addr, u8)>>,
}

struct TunHandle {
    from_host: mpsc::UnboundedSender<Vec<u8>>,
    to_host: mpsc::UnboundedReceiver<Vec<u8>>,
}

fn mock_tun() -> (MockTun, TunHandle) {
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let tun = MockTun {
        online: AtomicBool::new(false),
        up: AtomicBool::new(false),
        fail_add: AtomicBool::new(false),
        from_host: tokio::sync::Mutex::new(host_rx),
        to_host: out_tx,
        addresses: Mutex::new(Vec::new()),
    };
    (
        tun,
        TunHandle {
            from_host: host_tx,
            to_host: out_rx,
        },
    )
}

impl MockTun {
    fn addresses(&self) -> Vec<(Ipv6Addr, u8)> {
        self.addresses.lock().unwrap().clone()
    }
}

impl Interface for MockTun {
    fn name(&self) -> &str {
        "tun-mock"
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), InterfaceError> {
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), InterfaceError> {
        self.online.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn transmit(&self, data: &[u8]) -> Result<(), InterfaceError> {
        self.to_host
            .send(data.to_vec())
            .map_err(|_| InterfaceError::NotConnected)
    }

    async fn receive(&self) -> Result<Vec<u8>, InterfaceError> {
        self.from_host
            .lock()
            .await
            .recv()
            .await
            .ok_or(InterfaceError::Stopped)
    }
}

impl TunDevice for MockTun {
    async fn add_address(&self, addr: Ipv6Addr, prefix_len: u8) -> Result<(), InterfaceError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(InterfaceError::CommandFailed {
                command: format!("ip -6 addr add {addr}/{prefix_len} dev tun-mock"),
                status: "exit status: 2".into(),
                stderr: "Cannot find device".into(),
            });
        }
        self.addresses.lock().unwrap().push((addr, prefix_len));
        Ok(())
    }

    async fn set_up(&self) -> Result<(), InterfaceError> {
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated node
// ---------------------------------------------------------------------------

/// Node side of the serial line. Answers SYNs with a SYNACK, runs a
/// stop-and-wait receiver for host frames and reports what the host sent.
struct SimNode {
    /// Data frames from the host, in arrival order.
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    /// ACKs from the host.
    acks: mpsc::UnboundedReceiver<u8>,
    /// SYNs from the host.
    syns: mpsc::UnboundedReceiver<SynPacket>,
    /// Packets for the node to send; the node stamps its sequence number.
    send: mpsc::UnboundedSender<Vec<u8>>,
    /// Raw bytes for the node to write as-is.
    raw: mpsc::UnboundedSender<Vec<u8>>,
}

fn spawn_node(stream: DuplexStream) -> SimNode {
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (acks_tx, acks) = mpsc::unbounded_channel();
    let (syns_tx, syns) = mpsc::unbounded_channel();
    let (send, mut send_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (raw, mut raw_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = SlipDecoder::new();
        let mut next_seq = 0u8;
        let mut host_next = 0u8;
        let mut buf = [0u8; 512];

        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    for frame in decoder.feed(&buf[..n]) {
                        let SerialFrame::Packet(packet) = frame else { continue };
                        let header = Header::parse(&packet).unwrap();
                        if header.packet_type == PacketType::Ack {
                            let _ = acks_tx.send(header.seq_num);
                        } else if conf_type(&packet) == Ok(ConfType::Syn) {
                            let syn = SynPacket::decode(&packet).unwrap();
                            next_seq = syn.next_exp;
                            host_next = syn.next_seq_num;
                            let synack = [0x00, PacketType::Config as u8, next_seq, ConfType::SynAck as u8];
                            next_seq = next_seq.wrapping_add(1);
                            let _ = syns_tx.send(syn);
                            writer.write_all(&slip_encode(&synack)).await.unwrap();
                        } else {
                            if header.seq_num == host_next {
                                host_next = host_next.wrapping_add(1);
                                let _ = frames_tx.send(packet);
                            }
                            let ack = ack_packet(host_next.wrapping_sub(1));
                            writer.write_all(&slip_encode(&ack)).await.unwrap();
                        }
                    }
                }
                Some(mut packet) = send_rx.recv() => {
                    set_seq_num(&mut packet, next_seq);
                    next_seq = next_seq.wrapping_add(1);
                    writer.write_all(&slip_encode(&packet)).await.unwrap();
                }
                bytes = raw_rx.recv() => match bytes {
                    Some(bytes) => writer.write_all(&bytes).await.unwrap(),
                    // Test dropped the node: hang up the line.
                    None => break,
                },
            }
        }
    });

    SimNode {
        frames,
        acks,
        syns,
        send,
        raw,
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

type TestSerial = SerialInterface<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
type TestRouter = BorderRouter<TestSerial, MockTun>;

const SUFFIX: u16 = 0x0042;

fn test_config() -> RouterConfig {
    RouterConfig::parse(
        r#"
        [flow_control]
        retransmit_timeout_ms = 1000
        syn_interval_ms = 1000
        "#,
    )
    .unwrap()
}

/// Host end of a fresh serial line, and the node end.
fn serial_line() -> (TestSerial, DuplexStream) {
    let (host, node) = tokio::io::duplex(16 * 1024);
    let (reader, writer) = tokio::io::split(host);
    let serial = SerialInterface::new(SerialConfig::new("/dev/ttySIM0"), reader, writer);
    (serial, node)
}

fn router() -> (Arc<TestRouter>, SimNode, TunHandle) {
    let (serial, node) = serial_line();
    let (tun, handle) = mock_tun();

    let router = BorderRouter::new(test_config(), router_address(SUFFIX), serial, tun).unwrap();
    (Arc::new(router), spawn_node(node), handle)
}

async fn started() -> (Arc<TestRouter>, SimNode, TunHandle) {
    let (router, node, tun) = router();
    timeout(WAIT, router.initialize()).await.unwrap().unwrap();
    (router, node, tun)
}

fn ipv6_datagram(payload: &[u8]) -> Vec<u8> {
    let mut d = vec![0u8; 40];
    d[0] = 0x60;
    d[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    d[6] = 58;
    d[7] = 64;
    d.extend_from_slice(payload);
    d
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_configures_tun_and_completes_handshake() {
    let (router, mut node, _tun) = started().await;

    assert!(router.flow().is_established());
    assert!(router.is_running());
    assert!(router.tun().up.load(Ordering::SeqCst));
    assert_eq!(
        router.tun().addresses(),
        vec![(router_address(SUFFIX), 64)]
    );

    let syn = next(&mut node.syns).await;
    assert_eq!(syn.addr, router_address(SUFFIX));
    assert_eq!(syn.next_seq_num, 0);
    assert_eq!(syn.next_exp, 0);

    // The SYNACK was acknowledged as frame 0.
    assert_eq!(next(&mut node.acks).await, 0);

    router.shutdown().await;
    assert!(!router.is_running());
}

#[tokio::test]
async fn initialize_twice_is_rejected() {
    let (router, _node, _tun) = started().await;
    assert!(matches!(
        router.initialize().await,
        Err(RouterError::AlreadyRunning)
    ));
    router.shutdown().await;
}

#[tokio::test]
async fn operations_before_initialize_fail() {
    let (router, _node, _tun) = router();
    assert!(matches!(
        router.add_addr(Ipv6Addr::LOCALHOST).await,
        Err(RouterError::NotStarted)
    ));
    assert!(matches!(
        router.renew_existing_context(0).await,
        Err(RouterError::NotStarted)
    ));
}

#[tokio::test]
async fn host_datagrams_reach_the_node_in_order() {
    let (router, mut node, tun) = started().await;

    for tag in 0..5u8 {
        tun.from_host.send(ipv6_datagram(&[tag; 8])).unwrap();
    }
    for tag in 0..5u8 {
        let frame = next(&mut node.frames).await;
        assert_eq!(frame[1], PacketType::L3 as u8);
        assert_eq!(frame[2], tag, "sequence numbers follow send order");
        assert_eq!(&frame[3..5], &[0x86, 0xDD]);
        assert_eq!(&frame[5..], &ipv6_datagram(&[tag; 8])[..]);
    }

    router.shutdown().await;
}

#[tokio::test]
async fn node_datagrams_reach_the_tun() {
    let (router, node, mut tun) = started().await;

    let datagram = ipv6_datagram(b"echo reply");
    node.send.send(l3_packet(0x86DD, &datagram).unwrap()).unwrap();

    assert_eq!(next(&mut tun.to_host).await, datagram);
    router.shutdown().await;
}

#[tokio::test]
async fn node_console_output_does_not_disturb_the_link() {
    let (router, mut node, mut tun) = started().await;

    node.raw.send(b"main(): This is RIOT!\r\n".to_vec()).unwrap();
    node.send.send(raw_packet(b"diagnostic\n").unwrap()).unwrap();
    let datagram = ipv6_datagram(b"after text");
    node.send.send(l3_packet(0x86DD, &datagram).unwrap()).unwrap();

    assert_eq!(next(&mut tun.to_host).await, datagram);
    // SYNACK, RAW and L3 acknowledged in turn.
    for expected in 0..3u8 {
        assert_eq!(next(&mut node.acks).await, expected);
    }
    router.shutdown().await;
}

#[tokio::test]
async fn address_from_node_is_added_to_tun() {
    let (router, node, _tun) = started().await;

    let addr: Ipv6Addr = "abcd::1".parse().unwrap();
    node.send.send(wrap_addr(1, addr)).unwrap();

    timeout(WAIT, async {
        while !router.tun().addresses().contains(&(addr, 64)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    router.shutdown().await;
}

#[tokio::test]
async fn context_lifecycle_is_pushed_to_node() {
    let (router, mut node, _tun) = started().await;
    let prefix: Ipv6Addr = "abcd::".parse().unwrap();

    router.update_context(1, prefix, 64, true, 60).await.unwrap();
    let update = ContextPacket::decode(&next(&mut node.frames).await).unwrap();
    assert_eq!((update.cid, update.version, update.lifetime), (1, 1, 60));
    assert_eq!(update.prefix, prefix);
    assert!(update.comp);

    router.renew_existing_context(1).await.unwrap();
    let renew = ContextPacket::decode(&next(&mut node.frames).await).unwrap();
    assert_eq!((renew.version, renew.lifetime), (2, 60));

    router.remove_context(1).await.unwrap();
    let removal = ContextPacket::decode(&next(&mut node.frames).await).unwrap();
    assert_eq!((removal.version, removal.lifetime), (3, 0));
    assert_eq!(router.context(1), None);

    assert!(matches!(
        router.renew_existing_context(1).await,
        Err(RouterError::ContextNotFound(1))
    ));
    assert!(matches!(
        router.update_context(16, prefix, 64, true, 1).await,
        Err(RouterError::InvalidContextId(16))
    ));
    router.shutdown().await;
}

#[tokio::test]
async fn add_addr_configures_tun_and_notifies_node() {
    let (router, mut node, _tun) = started().await;
    let addr: Ipv6Addr = "abcd::beef".parse().unwrap();

    router.add_addr(addr).await.unwrap();
    router.add_addr(addr).await.unwrap();

    let first = AddrPacket::decode(&next(&mut node.frames).await).unwrap();
    let second = AddrPacket::decode(&next(&mut node.frames).await).unwrap();
    assert_eq!((first.version, first.addr), (1, addr));
    assert_eq!(second.version, 2);
    assert!(router.tun().addresses().contains(&(addr, 64)));
    router.shutdown().await;
}

#[tokio::test]
async fn send_ipv6_rejects_non_ipv6() {
    let (router, _node, _tun) = started().await;
    let mut ipv4 = ipv6_datagram(&[0; 4]);
    ipv4[0] = 0x45;
    assert!(matches!(
        router.send_ipv6(&ipv4).await,
        Err(RouterError::Mux(_))
    ));
    router.shutdown().await;
}

#[tokio::test]
async fn lost_serial_line_stops_the_router() {
    let (router, node, _tun) = started().await;
    drop(node);

    // Dropping the node handle ends its task, which closes the line.
    timeout(WAIT, router.stopped()).await.unwrap();
    router.shutdown().await;
}

#[tokio::test]
async fn failed_tun_setup_shuts_the_router_down() {
    let (serial, _line) = serial_line();
    let (tun, _handle) = mock_tun();
    tun.fail_add.store(true, Ordering::SeqCst);
    let router =
        Arc::new(BorderRouter::new(test_config(), router_address(SUFFIX), serial, tun).unwrap());

    assert!(matches!(
        timeout(WAIT, router.initialize()).await.unwrap(),
        Err(RouterError::Interface(InterfaceError::CommandFailed { .. }))
    ));
    assert!(!router.is_running());
    assert!(!router.tun().is_connected());
    timeout(WAIT, router.stopped()).await.unwrap();

    assert!(matches!(
        router.initialize().await,
        Err(RouterError::AlreadyRunning)
    ));
}

#[tokio::test]
async fn handshake_timeout_shuts_the_router_down() {
    // Nobody answers on the other end of the line.
    let (serial, _line) = serial_line();
    let (tun, _handle) = mock_tun();
    let config = RouterConfig::parse(
        r#"
        [flow_control]
        syn_interval_ms = 50
        max_syn_attempts = 3
        "#,
    )
    .unwrap();
    let router = Arc::new(BorderRouter::new(config, router_address(SUFFIX), serial, tun).unwrap());

    let err = timeout(WAIT, router.initialize()).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        RouterError::Flow(FlowError::HandshakeTimeout { attempts: 3 })
    ));
    assert!(!router.is_running());
    assert!(!router.tun().is_connected());
    timeout(WAIT, router.stopped()).await.unwrap();
}

#[tokio::test]
async fn context_change_that_cannot_be_sent_is_rolled_back() {
    let (router, mut node, _tun) = started().await;
    let prefix: Ipv6Addr = "abcd::".parse().unwrap();
    router.update_context(2, prefix, 64, true, 60).await.unwrap();
    next(&mut node.frames).await;

    // The link is gone: nothing more reaches the node.
    router.shutdown().await;

    let other: Ipv6Addr = "dead::".parse().unwrap();
    assert!(matches!(
        router.update_context(2, other, 48, false, 5).await,
        Err(RouterError::Flow(FlowError::LinkClosed))
    ));
    assert!(router.remove_context(2).await.is_err());
    assert!(router.renew_existing_context(2).await.is_err());

    let kept = router.context(2).unwrap();
    assert_eq!((kept.prefix, kept.len, kept.comp, kept.lifetime), (prefix, 64, true, 60));
}
