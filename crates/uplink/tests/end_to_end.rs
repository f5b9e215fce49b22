//! End-to-end tests: a real hub and validator talking over loopback
//! WebSockets, probing loopback HTTP targets.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uplink::config::{DispatchConfig, ValidatorConfig};
use uplink::crypto::generate_keypair;
use uplink::hub::{Hub, MemoryStorage, Tick};
use uplink::{CheckOutcome, ValidatorNode};

/// Serve `HTTP/1.1 <status>` to every connection, returning the base URL
async fn spawn_http_target(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}/")
}

/// URL on a port nothing listens on
async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        period_seconds: 1,
        reward_per_check: 100,
        callback_ttl_seconds: 30,
        sweep_interval_seconds: 1,
    }
}

/// Start a hub over `storage`, returning its WebSocket URL
async fn spawn_hub(storage: Arc<MemoryStorage>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::new(storage, fast_dispatch());
    tokio::spawn(hub.run(listener));
    format!("ws://{addr}")
}

fn spawn_validator(hub_url: &str) -> String {
    let mut config = ValidatorConfig::default();
    config.hub.url = hub_url.to_string();
    config.probe.timeout_seconds = 2;

    let node = ValidatorNode::new(&config, generate_keypair()).unwrap();
    let public_key = node.public_key_hex();
    tokio::spawn(async move {
        let _ = node.run().await;
    });
    public_key
}

async fn wait_for_ticks(storage: &MemoryStorage, count: usize) -> Vec<Tick> {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let ticks = storage.ticks().await;
            if ticks.len() >= count {
                return ticks;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("timed out waiting for recorded ticks")
}

#[tokio::test]
async fn test_healthy_target_is_attested_and_rewarded() {
    let _ = tracing_subscriber::fmt::try_init();

    let storage = Arc::new(MemoryStorage::new());
    let target_id = storage.add_target(&spawn_http_target("200 OK").await).await;
    let hub_url = spawn_hub(storage.clone()).await;
    let public_key = spawn_validator(&hub_url);

    let ticks = wait_for_ticks(&storage, 1).await;

    let validators = storage.validators().await;
    assert_eq!(validators.len(), 1);
    assert_eq!(validators[0].public_key, public_key);

    let tick = &ticks[0];
    assert_eq!(tick.target_id, target_id);
    assert_eq!(tick.validator_id, validators[0].id);
    assert_eq!(tick.outcome, CheckOutcome::Good);

    // Every recorded tick carries exactly one reward increment
    let (validators, ticks) = storage.ledger().await;
    assert_eq!(validators[0].pending_reward, 100 * ticks.len() as u64);
}

#[tokio::test]
async fn test_unreachable_target_is_bad_but_rewarded() {
    let storage = Arc::new(MemoryStorage::new());
    storage.add_target(&unreachable_url().await).await;
    let hub_url = spawn_hub(storage.clone()).await;
    spawn_validator(&hub_url);

    let ticks = wait_for_ticks(&storage, 1).await;

    assert_eq!(ticks[0].outcome, CheckOutcome::Bad);
    assert_eq!(ticks[0].latency_ms, 0);
    let validator = storage.validator(&ticks[0].validator_id).await.unwrap();
    assert!(validator.pending_reward >= 100);
}

#[tokio::test]
async fn test_error_status_is_bad() {
    let storage = Arc::new(MemoryStorage::new());
    storage.add_target(&spawn_http_target("500 Internal Server Error").await).await;
    let hub_url = spawn_hub(storage.clone()).await;
    spawn_validator(&hub_url);

    let ticks = wait_for_ticks(&storage, 1).await;
    assert_eq!(ticks[0].outcome, CheckOutcome::Bad);
}

#[tokio::test]
async fn test_every_validator_attests_every_target() {
    let storage = Arc::new(MemoryStorage::new());
    storage.add_target(&spawn_http_target("200 OK").await).await;
    storage.add_target(&spawn_http_target("200 OK").await).await;
    let hub_url = spawn_hub(storage.clone()).await;
    spawn_validator(&hub_url);
    spawn_validator(&hub_url);

    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let ticks = storage.ticks().await;
            let mut pairs: Vec<_> =
                ticks.iter().map(|t| (t.validator_id.clone(), t.target_id.clone())).collect();
            pairs.sort();
            pairs.dedup();
            if pairs.len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("every (validator, target) pair should be attested");
}
