//! TCP transport integration tests
//!
//! Runs the pool over real loopback sockets.

mod common;

use common::create_test_listener;
use poolagent::config::PoolConfig;
use poolagent::transport::{Connection, TcpConnector};
use poolagent::{PoolAgent, PoolKey};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_tcp_connection_reused_across_requests() {
    let (listener, addr) = create_test_listener().await;
    let agent = PoolAgent::new(PoolConfig::default(), TcpConnector::with_defaults()).unwrap();
    let host = addr.ip().to_string();

    let conn = agent.acquire(&host, addr.port()).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    {
        let mut slot = conn.lock().await;
        let stream = slot.as_mut().unwrap();
        stream.write_all(b"ping").await.unwrap();
    }
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    conn.release();
    let again = agent.acquire(&host, addr.port()).await.unwrap();
    {
        let mut slot = again.lock().await;
        let stream = slot.as_mut().unwrap();
        stream.write_all(b"pong").await.unwrap();
    }
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    assert_eq!(agent.stats().total_created, 1);
    assert_eq!(agent.stats().total_reused, 1);
}

#[tokio::test]
async fn test_tcp_connect_failure_frees_slot() {
    let (listener, addr) = create_test_listener().await;
    drop(listener);

    let config = PoolConfig {
        max_sockets: 1,
        ..Default::default()
    };
    let agent = PoolAgent::new(config, TcpConnector::with_defaults()).unwrap();
    let key = PoolKey::new(addr.ip().to_string(), addr.port());

    let conn = agent.acquire(key.host(), key.port()).await.unwrap();
    assert!(conn.lock().await.is_none());

    tokio::time::timeout(Duration::from_secs(5), async {
        while agent.snapshot(&key).is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(conn.is_closed());
    assert_eq!(agent.stats().total_closed, 1);
}

#[tokio::test]
async fn test_tcp_upgrade_leaves_pool() {
    let (listener, addr) = create_test_listener().await;
    let config = PoolConfig {
        max_sockets: 1,
        ..Default::default()
    };
    let agent = PoolAgent::new(config, TcpConnector::with_defaults()).unwrap();
    let key = PoolKey::new(addr.ip().to_string(), addr.port());

    let conn = agent.acquire(key.host(), key.port()).await.unwrap();
    let (_server, _) = listener.accept().await.unwrap();

    let stream = conn.upgrade().await;
    assert!(stream.is_some());
    assert_eq!(agent.stats().total_detached, 1);

    // Slot stays occupied under the default policy
    assert_eq!(agent.snapshot(&key).unwrap().open, 1);
    conn.release();
    assert_eq!(agent.snapshot(&key).unwrap().idle, 0);
}

#[tokio::test]
async fn test_tcp_idle_connection_evicted() {
    let (listener, addr) = create_test_listener().await;
    let config = PoolConfig {
        available_timeout: 50,
        ..Default::default()
    };
    let agent = PoolAgent::new(config, TcpConnector::with_defaults()).unwrap();
    let key = PoolKey::new(addr.ip().to_string(), addr.port());

    let conn = agent.acquire(key.host(), key.port()).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();
    assert!(conn.lock().await.is_some());
    conn.release();

    // The server sees EOF once the pool destroys the idle connection
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), server.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
    assert!(conn.is_closed());

    tokio::time::timeout(Duration::from_secs(5), async {
        while agent.snapshot(&key).is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(agent.stats().total_evicted, 1);
}

#[tokio::test]
async fn test_tcp_peer_close_not_reused() {
    let (listener, addr) = create_test_listener().await;
    let agent = PoolAgent::new(PoolConfig::default(), TcpConnector::with_defaults()).unwrap();
    let key = PoolKey::new(addr.ip().to_string(), addr.port());

    let conn = agent.acquire(key.host(), key.port()).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    assert!(conn.lock().await.is_some());

    drop(server);
    tokio::time::sleep(Duration::from_millis(200)).await;
    conn.release();
    assert!(conn.is_closed());

    let again = agent.acquire(key.host(), key.port()).await.unwrap();
    let (_server, _) = listener.accept().await.unwrap();
    assert!(again.lock().await.is_some());

    assert!(!again.is_closed());
    assert_eq!(agent.stats().total_created, 2);
    assert_eq!(agent.stats().total_reused, 0);
    assert_eq!(agent.stats().total_closed, 1);
}

#[tokio::test]
async fn test_tcp_peer_close_while_idle_leaves_pool() {
    let (listener, addr) = create_test_listener().await;
    let agent = PoolAgent::new(PoolConfig::default(), TcpConnector::with_defaults()).unwrap();
    let key = PoolKey::new(addr.ip().to_string(), addr.port());

    let conn = agent.acquire(key.host(), key.port()).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    assert!(conn.lock().await.is_some());

    conn.release();
    assert_eq!(agent.snapshot(&key).unwrap().idle, 1);
    drop(server);

    tokio::time::timeout(Duration::from_secs(5), async {
        while agent.snapshot(&key).is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(conn.is_closed());
    assert_eq!(agent.stats().total_closed, 1);
    assert_eq!(agent.stats().total_evicted, 0);
}
