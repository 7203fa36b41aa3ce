//! Wire-level tests for the coordinator's replication protocol
//!
//! A real coordinator serves on an ephemeral port; raw scripted connections
//! stand in for storage nodes and clients so every control line is explicit.

use replistore::common::config::CoordinatorConfig;
use replistore::Coordinator;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

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

    /// Next line, liveness-probe NUL bytes stripped.
    async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = timeout(RECV_DEADLINE, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        assert!(n > 0, "connection closed");
        line.trim_matches('\0').trim().to_string()
    }

    /// Assert nothing arrives within the window.
    async fn expect_silence(&mut self, window_ms: u64) {
        let mut line = String::new();
        let res = timeout(
            Duration::from_millis(window_ms),
            self.reader.read_line(&mut line),
        )
        .await;
        assert!(res.is_err(), "unexpected line: {line}");
    }
}

async fn start_coordinator(replication: usize, timeout_ms: u64) -> SocketAddr {
    let config = CoordinatorConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        replication,
        timeout_ms,
        probe_period_ms: 60_000,
        rebalance_period_ms: 60_000,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = Coordinator::new(config).serve_with(listener).await;
    });
    addr
}

/// Join a scripted node and give the coordinator time to register it, so
/// registration order (and thus replica selection) is deterministic.
async fn join_node(addr: SocketAddr, port: u16) -> Wire {
    let mut wire = Wire::connect(addr).await;
    wire.send(&format!("JOIN {port}")).await;
    settle().await;
    wire
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_store_reaches_quorum_and_lists() {
    let addr = start_coordinator(3, 10_000).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;
    let mut n3 = join_node(addr, 9003).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 100").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002 9003");

    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    n3.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    let mut lister = Wire::connect(addr).await;
    lister.send("LIST").await;
    assert_eq!(lister.recv().await, "LIST a.txt");
}

#[tokio::test]
async fn test_store_and_list_refused_below_replication() {
    let addr = start_coordinator(3, 10_000).await;
    let _n1 = join_node(addr, 9001).await;
    let _n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 100").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");

    client.send("LIST").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");
}

#[tokio::test]
async fn test_store_conflict_on_complete_file() {
    let addr = start_coordinator(2, 10_000).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    let mut second = Wire::connect(addr).await;
    second.send("STORE a.txt 10").await;
    assert_eq!(second.recv().await, "ERROR_FILE_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_duplicate_acks_never_double_count() {
    let addr = start_coordinator(2, 10_000).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");

    n1.send("STORE_ACK a.txt").await;
    n1.send("STORE_ACK a.txt").await;
    client.expect_silence(300).await;

    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");
}

#[tokio::test]
async fn test_duplicate_store_coalesces_and_resets_progress() {
    let addr = start_coordinator(2, 10_000).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut first = Wire::connect(addr).await;
    first.send("STORE a.txt 10").await;
    assert_eq!(first.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    settle().await;

    // second concurrent store for the same filename: same assignment, and
    // the earlier ack progress is discarded (known quirk, kept faithfully)
    let mut second = Wire::connect(addr).await;
    second.send("STORE a.txt 10").await;
    assert_eq!(second.recv().await, "STORE_TO 9001 9002");

    n2.send("STORE_ACK a.txt").await;
    second.expect_silence(300).await;

    n1.send("STORE_ACK a.txt").await;
    assert_eq!(second.recv().await, "STORE_COMPLETE");
    // the first client's pending handle was replaced by the second's
    first.expect_silence(300).await;
}

#[tokio::test]
async fn test_store_aborts_on_deadline() {
    let addr = start_coordinator(2, 500).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");

    // only one replica acknowledges before the deadline
    n1.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "ERROR_NOT_ENOUGH_DSTORES");

    let mut lister = Wire::connect(addr).await;
    lister.send("LIST").await;
    assert_eq!(lister.recv().await, "LIST");

    // a late ack targets nothing and is silently ignored
    n2.send("STORE_ACK a.txt").await;
    settle().await;

    // the aborted name is free for a fresh store
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    client.expect_silence(200).await;
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");
}

#[tokio::test]
async fn test_load_walks_replicas_until_exhausted() {
    let addr = start_coordinator(2, 10_000).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 42").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    client.send("LOAD a.txt").await;
    assert_eq!(client.recv().await, "LOAD_FROM 9001 42");
    client.send("RELOAD a.txt").await;
    assert_eq!(client.recv().await, "LOAD_FROM 9002 42");
    client.send("RELOAD a.txt").await;
    assert_eq!(client.recv().await, "ERROR_LOAD");

    // exhaustion discarded the cursor; the next load walks afresh
    client.send("LOAD a.txt").await;
    assert_eq!(client.recv().await, "LOAD_FROM 9001 42");

    // any unrelated command discards the cursor too
    client.send("LIST").await;
    assert_eq!(client.recv().await, "LIST a.txt");
    client.send("RELOAD a.txt").await;
    assert_eq!(client.recv().await, "LOAD_FROM 9001 42");
}

#[tokio::test]
async fn test_load_unknown_file_fails() {
    let addr = start_coordinator(1, 10_000).await;
    let _n1 = join_node(addr, 9001).await;

    let mut client = Wire::connect(addr).await;
    client.send("LOAD missing.txt").await;
    assert_eq!(client.recv().await, "ERROR_FILE_DOES_NOT_EXIST");
}

#[tokio::test]
async fn test_remove_is_client_asynchronous() {
    let addr = start_coordinator(2, 500).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    // the client is answered before any replica confirms
    client.send("REMOVE a.txt").await;
    assert_eq!(client.recv().await, "REMOVE_COMPLETE");

    // each assigned replica gets the delete instruction
    assert_eq!(n1.recv().await, "REMOVE a.txt");
    assert_eq!(n2.recv().await, "REMOVE a.txt");

    // in-flight removes are invisible to listing and loading
    client.send("LIST").await;
    assert_eq!(client.recv().await, "LIST");
    client.send("LOAD a.txt").await;
    assert_eq!(client.recv().await, "ERROR_FILE_DOES_NOT_EXIST");

    n1.send("REMOVE_ACK a.txt").await;
    n2.send("REMOVE_ACK a.txt").await;
    settle().await;

    client.send("REMOVE a.txt").await;
    assert_eq!(client.recv().await, "ERROR_FILE_DOES_NOT_EXIST");
}

#[tokio::test]
async fn test_remove_deadline_cleans_up_without_acks() {
    let addr = start_coordinator(2, 500).await;
    let mut n1 = join_node(addr, 9001).await;
    let mut n2 = join_node(addr, 9002).await;

    let mut client = Wire::connect(addr).await;
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
    n1.send("STORE_ACK a.txt").await;
    n2.send("STORE_ACK a.txt").await;
    assert_eq!(client.recv().await, "STORE_COMPLETE");

    client.send("REMOVE a.txt").await;
    assert_eq!(client.recv().await, "REMOVE_COMPLETE");

    // no replica ever acknowledges; the deadline deletes the entry anyway
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    client.send("LIST").await;
    assert_eq!(client.recv().await, "LIST");
    client.send("STORE a.txt 10").await;
    assert_eq!(client.recv().await, "STORE_TO 9001 9002");
}

#[tokio::test]
async fn test_remove_unknown_file_fails() {
    let addr = start_coordinator(1, 10_000).await;
    let _n1 = join_node(addr, 9001).await;

    let mut client = Wire::connect(addr).await;
    client.send("REMOVE ghost.txt").await;
    assert_eq!(client.recv().await, "ERROR_FILE_DOES_NOT_EXIST");
}
