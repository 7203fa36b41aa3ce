//! Node failure and eviction tests
//!
//! Scripted storage nodes drop their control connections; the coordinator
//! must evict them, prune replica sets, and keep serving with what is left.

use replistore::common::config::CoordinatorConfig;
use replistore::Coordinator;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

struct Wire {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Wire {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        assert!(n > 0, "connection closed");
        line.trim_matches('\0').trim().to_string()
    }
}

async fn start_coordinator(replication: usize) -> SocketAddr {
    let config = CoordinatorConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        replication,
        timeout_ms: 10_000,
        probe_period_ms: 200,
        rebalance_period_ms: 60_000,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = Coordinator::new(config).serve_with(listener).await;
    });
    addr
}

async fn join_node(addr: SocketAddr, port: u16) -> Wire {
    let mut wire = Wire::connect(addr).await;
    wire.send(&format!("JOIN {port}")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    wire
}

#[tokio::test]
async fn test_disconnect_prunes_replica_sets() {
    let addr = start_coordinator(2).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;
    let _n3 = join_node(addr, 9003).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 42").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    // the first replica's control connection drops
    drop(n1);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // the entry survives under-replicated and still lists
    client.send("LIST").await;
    assert_eq!(client.recv().await, "LIST a.txt");

    // loads only ever offer surviving replicas
    client.send("LOAD a.txt").await;
    assert_eq!(client.recv().await, "LOAD_FROM 9002 42");
    client.send("RELOAD a.txt").await;
    assert_eq!(client.recv().await, "ERROR_LOAD");

    // new stores select from the remaining membership
    client.send("STORE b.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9002 9003");
}

#[tokio::test]
async fn test_capacity_error_after_eviction() {
    let addr = start_coordinator(2).await;
    let _n1 = join_node(addr, 9001).await;
    let n2 = join_node(addr, 9002).await;

    drop(n2);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");
    client.send("LIST").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");
}

#[tokio::test]
async fn test_node_rejoins_after_disconnect() {
    let addr = start_coordinator(2).await;
    let mut n1 = join_node(addr, 9001).await;
    let n2 = join_node(addr, 9002).await;

    drop(n2);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");

    // the node comes back under the same port on a fresh connection
    let mut n2 = join_node(addr, 9002).await;

    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");
}
