use crate::common::{BindFailurePolicy, HelloServerTrait, ServerConfig, Variant};
use crate::stream::StreamProtocol;
use crate::{HelloError, HelloHandler, HelloServer, TcpProtocol};
use std::time::Duration;
use tokio::net::TcpStream;

fn loopback_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_tcp_protocol_bind_and_accept() {
    let mut listener = TcpProtocol::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = TcpProtocol::local_addr(&listener).unwrap();
    assert_ne!(addr.port(), 0);

    let client_handle = tokio::spawn(async move { TcpProtocol::connect(addr).await.unwrap() });

    let (_stream, client_addr) = TcpProtocol::accept(&mut listener).await.unwrap();
    assert!(client_addr.ip().is_loopback());

    let _client_stream = client_handle.await.unwrap();
}

#[tokio::test]
async fn test_tcp_protocol_bind_conflict_is_bind_error() {
    let first = TcpProtocol::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = TcpProtocol::local_addr(&first).unwrap();

    match TcpProtocol::bind(addr).await {
        Err(HelloError::Bind { addr: failed, source }) => {
            assert_eq!(failed, addr);
            assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
        }
        Err(other) => panic!("expected bind error, got {other}"),
        Ok(_) => panic!("second bind on {addr} unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_server_new_is_unbound() {
    let server = HelloServer::new(loopback_config(), HelloHandler::default());
    assert_eq!(server.shutdown_signal().receiver_count(), 0);
    assert_eq!(server.config().variant, Variant::Vendored);
}

#[tokio::test]
async fn test_bind_reports_real_port() {
    let server = HelloServer::new(loopback_config(), HelloHandler::default());
    let listening = server.bind().await.unwrap();
    assert_ne!(listening.local_addr().port(), 0);
    assert!(TcpStream::connect(listening.local_addr()).await.is_ok());
}

#[tokio::test]
async fn test_shutdown_before_serve_is_observed() {
    let server = HelloServer::new(loopback_config(), HelloHandler::default());
    let listening = server.bind().await.unwrap();
    server.shutdown_signal().send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), listening.serve()).await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn test_run_exit_policy_returns_bind_error() {
    let occupied = TcpProtocol::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = TcpProtocol::local_addr(&occupied).unwrap();

    let config = ServerConfig {
        bind_addr: addr,
        on_bind_failure: BindFailurePolicy::Exit,
        ..ServerConfig::default()
    };
    let server = HelloServer::new(config, HelloHandler::default());

    let result = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
    assert!(matches!(result, Ok(Err(HelloError::Bind { .. }))));
}

#[tokio::test]
async fn test_run_linger_policy_waits_for_shutdown() {
    let occupied = TcpProtocol::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = TcpProtocol::local_addr(&occupied).unwrap();

    let config = ServerConfig {
        bind_addr: addr,
        on_bind_failure: BindFailurePolicy::Linger,
        ..ServerConfig::default()
    };
    let server = std::sync::Arc::new(HelloServer::new(config, HelloHandler::default()));
    let shutdown = server.shutdown_signal();

    let runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!runner.is_finished(), "lingering server returned early");

    shutdown.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
