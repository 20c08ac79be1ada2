//! End-to-end relay scenarios over real sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use rtc_relay::rtp::RtpPacket;
use rtc_relay::transport::{
    RelayCipher, RelayPublisher, RtpTransport, Transport, TransportConfig, TransportIo,
};
use rtc_relay::{RegistryConfig, RelayServer, Router, ServerConfig};

const WAIT: Duration = Duration::from_secs(5);

fn local_config() -> ServerConfig {
    ServerConfig::default()
        .bind("127.0.0.1:0".parse().unwrap())
        .registry(RegistryConfig::default().check_interval(Duration::from_millis(50)))
}

fn local_addr(server: &RelayServer) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], server.local_addr().port()))
}

async fn wait_for_router(server: &RelayServer, id: &str) -> Arc<Router> {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(router) = server.get_router(id).await {
                if router.publisher().is_some() {
                    return router;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("router was not created")
}

fn subscriber() -> (Arc<RtpTransport>, TransportIo) {
    RtpTransport::detached("127.0.0.1:40000".parse().unwrap(), &TransportConfig::default())
}

async fn recv_packets(outbound: &mut mpsc::Receiver<RtpPacket>, count: usize) -> Vec<RtpPacket> {
    let mut packets = Vec::with_capacity(count);
    for _ in 0..count {
        let packet = tokio::time::timeout(WAIT, outbound.recv())
            .await
            .expect("packet not delivered")
            .expect("subscriber queue closed");
        packets.push(packet);
    }
    packets
}

async fn relay_round_trip(config: ServerConfig, cipher: Option<RelayCipher>) {
    let server = RelayServer::init(config).await.unwrap();
    let mut reaped = server.take_clean_channel().unwrap();

    let mut publisher = RelayPublisher::publish(local_addr(&server), "s1", cipher)
        .await
        .unwrap();
    let router = wait_for_router(&server, "s1").await;

    let (sub, mut io) = subscriber();
    router.add_subscriber("viewer", sub.clone()).unwrap();

    for seq in 1..=3u16 {
        let payload = Bytes::from(vec![seq as u8; 32]);
        let packet = RtpPacket::new(96, seq, seq as u32 * 3000, 0xCAFE, payload);
        publisher.send_rtp(&packet).await.unwrap();
    }

    let received = recv_packets(&mut io.outbound, 3).await;
    let sequences: Vec<u16> = received.iter().map(|p| p.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(received.iter().all(|p| p.ssrc == 0xCAFE));
    assert_eq!(&received[1].payload[..], &[2u8; 32][..]);

    // Publisher going away gets the session reaped and reported
    publisher.disconnect().await;

    let id = tokio::time::timeout(WAIT, reaped.recv())
        .await
        .expect("session was not reaped")
        .unwrap();
    assert_eq!(id, "s1");
    assert!(server.get_router("s1").await.is_none());
    assert!(router.is_closed());
    assert!(!sub.is_alive());
    assert!(server.monitor_stats().reaped >= 1);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plain_relay_round_trip() {
    relay_round_trip(local_config(), None).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_encrypted_relay_round_trip() {
    let config = local_config().crypto("relay-key", "relay-salt");
    let cipher = RelayCipher::new("relay-key", "relay-salt").unwrap();

    relay_round_trip(config, Some(cipher)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_encrypted_relay_rejects_plain_peer() {
    let server = RelayServer::init(local_config().crypto("relay-key", "relay-salt"))
        .await
        .unwrap();

    let mut publisher = RelayPublisher::publish(local_addr(&server), "s1", None).await.unwrap();
    let _ = publisher
        .send_rtp(&RtpPacket::new(96, 1, 0, 1, Bytes::from_static(b"x")))
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.get_router("s1").await.is_none());

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_without_session_id_is_dropped() {
    let config = local_config().id_poll(Duration::from_millis(1), 20);
    let server = RelayServer::init(config).await.unwrap();

    let mut stream = TcpStream::connect(local_addr(&server)).await.unwrap();

    // The server closes the link once the negotiation deadline passes
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("connection was not dropped");
    assert!(matches!(read, Ok(0) | Err(_)));

    assert!(server.registry().is_empty().await);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_publisher_replaces_session() {
    let server = RelayServer::init(local_config()).await.unwrap();
    let addr = local_addr(&server);

    let _first = RelayPublisher::publish(addr, "s1", None).await.unwrap();
    let old = wait_for_router(&server, "s1").await;

    let _second = RelayPublisher::publish(addr, "s1", None).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while !old.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("previous router was not closed");

    let current = wait_for_router(&server, "s1").await;
    assert!(!Arc::ptr_eq(&old, &current));
    assert_eq!(server.registry().len().await, 1);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_twice() {
    let server = RelayServer::init(local_config()).await.unwrap();
    let addr = local_addr(&server);

    let _publisher = RelayPublisher::publish(addr, "s1", None).await.unwrap();
    let router = wait_for_router(&server, "s1").await;

    server.close().await;
    server.close().await;

    assert!(router.is_closed());
    assert!(server.registry().is_empty().await);
    assert!(server.registry().is_stopped());
}
