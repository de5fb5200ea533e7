//! End-to-end tests: a real listener, real sockets, and an append-only file
//! surviving a restart.

use lapsekv::commands::CommandHandler;
use lapsekv::connection::{handle_connection, ConnectionStats};
use lapsekv::persistence::{self, AofWriter, Persistence, PersistenceConfig};
use lapsekv::storage::{Context, KeyValueStore, ManualClock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

struct TestServer {
    addr: SocketAddr,
    root: Context,
}

async fn start_server(store: Arc<KeyValueStore>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(ConnectionStats::new());
    let root = Context::background();
    let accept_root = root.clone();

    tokio::spawn(async move {
        while let Ok((stream, client_addr)) = listener.accept().await {
            tokio::spawn(handle_connection(
                stream,
                client_addr,
                CommandHandler::new(Arc::clone(&store)),
                accept_root.child(),
                Arc::clone(&stats),
            ));
        }
    });

    TestServer { addr, root }
}

struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: BufReader::new(TcpStream::connect(addr).await.unwrap()),
        }
    }

    async fn send(&mut self, line: &str) -> String {
        self.stream
            .get_mut()
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
        let mut reply = String::new();
        self.stream.read_line(&mut reply).await.unwrap();
        reply.trim_end_matches("\r\n").to_string()
    }
}

#[tokio::test]
async fn test_full_session() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let store = Arc::new(KeyValueStore::with_clock(clock.clone()));
    let server = start_server(Arc::clone(&store)).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(client.send("PING").await, "PONG");
    assert_eq!(client.send("SET user:1 alice").await, "OK");
    assert_eq!(client.send("SET user:2 bob").await, "OK");
    assert_eq!(client.send("SET session:9 token").await, "OK");
    assert_eq!(client.send("GET user:1").await, "alice");
    assert_eq!(client.send("EXISTS user:2").await, "1");
    assert_eq!(client.send("DBSIZE").await, "3");

    let mut users: Vec<String> = client
        .send("KEYS user:*")
        .await
        .split(' ')
        .map(str::to_string)
        .collect();
    users.sort();
    assert_eq!(users, vec!["user:1", "user:2"]);
    assert_eq!(client.send("KEYS nothing:*").await, "");

    assert_eq!(client.send("EXPIRE session:9 10").await, "OK");
    assert_eq!(client.send("TTL session:9").await, "10");
    assert_eq!(client.send("TTL user:1").await, "-1");
    assert_eq!(client.send("EXPIRE ghost 10").await, "ERR operation failed");

    clock.advance(11);
    assert_eq!(client.send("GET session:9").await, "nil");
    assert_eq!(client.send("TTL session:9").await, "-1");
    // Still counted until the sweeper runs
    assert_eq!(client.send("DBSIZE").await, "3");
    assert_eq!(store.sweep_expired(), 1);
    assert_eq!(client.send("DBSIZE").await, "2");

    assert_eq!(client.send("DEL user:2").await, "1");
    assert_eq!(client.send("DEL user:2").await, "0");
    assert_eq!(
        client.send("EXPIRE user:1 abc").await,
        "ERR: value is not an integer or out of range: abc"
    );
    assert_eq!(client.send("QUIT").await, "OK");

    server.root.cancel();
}

#[tokio::test]
async fn test_clients_share_one_store() {
    let store = Arc::new(KeyValueStore::new());
    let server = start_server(store).await;

    let mut writer = Client::connect(server.addr).await;
    let mut reader = Client::connect(server.addr).await;

    assert_eq!(writer.send("SET shared value").await, "OK");
    assert_eq!(reader.send("GET shared").await, "value");
    assert_eq!(reader.send("PERSIST shared").await, "OK");
}

#[tokio::test]
async fn test_aof_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = PersistenceConfig {
        enabled: true,
        filepath: dir.path().join("appendonly.aof"),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let ctx = Context::background();

    // First run
    {
        let aof: Arc<AofWriter> = Arc::new(persistence::open(&config).await.unwrap().unwrap());
        let store = KeyValueStore::with_clock(clock.clone())
            .with_persistence(Arc::clone(&aof) as Arc<dyn Persistence>);

        store.set(&ctx, "keep", "1");
        store.set(&ctx, "short", "2");
        store.set(&ctx, "long", "3");
        store.set(&ctx, "gone", "4");
        assert!(store.expire(&ctx, "short", 5));
        assert!(store.expire(&ctx, "long", 100));
        assert!(store.expire(&ctx, "keep", 5));
        assert!(store.persist(&ctx, "keep"));
        assert_eq!(store.del(&ctx, "gone"), 1);

        aof.shutdown().await;
        assert_eq!(aof.dropped(), 0);
    }

    // The server was down for 10 seconds
    clock.advance(10);

    let store = KeyValueStore::with_clock(clock.clone());
    let replayed = persistence::replay(&config.filepath, |m| store.restore(m)).unwrap();
    assert_eq!(replayed, 9);

    assert_eq!(store.get(&ctx, "keep"), Some("1".to_string()));
    assert_eq!(store.ttl(&ctx, "keep"), -1);
    assert_eq!(store.get(&ctx, "short"), None);
    assert_eq!(store.get(&ctx, "long"), Some("3".to_string()));
    assert_eq!(store.ttl(&ctx, "long"), 90);
    assert!(!store.exists(&ctx, "gone"));
}

#[tokio::test]
async fn test_sweeper_reclaims_behind_live_server() {
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(KeyValueStore::with_clock(clock.clone()));
    store.start_cleanup(Duration::from_millis(20)).unwrap();
    let server = start_server(Arc::clone(&store)).await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(client.send("SET temp x").await, "OK");
    assert_eq!(client.send("EXPIRE temp 1").await, "OK");
    clock.advance(2);

    let mut size = String::new();
    for _ in 0..100 {
        size = client.send("DBSIZE").await;
        if size == "0" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(size, "0");
    assert_eq!(store.expired_count(), 1);

    store.stop_cleanup().unwrap();
    assert!(store.stop_cleanup().is_err());
}
