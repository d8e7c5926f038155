use redis_latency_monitor::cli::{MonitorConfig, OutputDestination, ProbeMode, TimestampStyle};
use redis_latency_monitor::probe::{CommandProbe, ConnectProbe, Prober};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Spawn a mock server that answers every received line with `+PONG\r\n`
/// and forwards each received line to the returned channel.
async fn spawn_mock_server() -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };

            let tx = tx.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();

                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let _ = tx.send(line.clone());
                            if write_half.write_all(b"+PONG\r\n").await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

fn config(addr: SocketAddr, mode: ProbeMode) -> MonitorConfig {
    MonitorConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        auth_secret: None,
        connect_timeout: Duration::from_secs(1),
        interval: Duration::from_secs(1),
        probe_mode: mode,
        output: OutputDestination::InteractiveTable,
        timestamp_style: TimestampStyle::HumanReadable,
        error_log: None,
    }
}

#[tokio::test]
async fn command_probe_round_trip_smoke() {
    let (addr, mut received) = spawn_mock_server().await;

    let mut probe = CommandProbe::new(&config(addr, ProbeMode::CommandLatency));
    probe.prepare().await.expect("initial connect");

    for _ in 0..5 {
        let elapsed_us = probe.probe().await.expect("probe round-trip");
        assert!(elapsed_us > 0);
        assert!(elapsed_us < 1_000_000, "local PING should be well under 1s");
    }

    let first = received.recv().await.unwrap();
    assert_eq!(first, "PING\r\n");
}

#[tokio::test]
async fn command_probe_sends_auth_once_per_connection() {
    let (addr, mut received) = spawn_mock_server().await;

    let mut config = config(addr, ProbeMode::CommandLatency);
    config.auth_secret = Some("sesame".to_string());

    let mut probe = CommandProbe::new(&config);
    probe.prepare().await.expect("initial connect");
    probe.probe().await.expect("probe after auth");

    assert_eq!(received.recv().await.unwrap(), "AUTH sesame\r\n");
    assert_eq!(received.recv().await.unwrap(), "PING\r\n");
}

#[tokio::test]
async fn command_probe_initial_connect_failure_is_fatal() {
    // Bind then drop to obtain a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut probe = CommandProbe::new(&config(addr, ProbeMode::CommandLatency));
    assert!(probe.prepare().await.is_err());

    // Each subsequent probe retries the dial and keeps failing without
    // panicking, which is what keeps the sampling loop alive.
    assert!(probe.probe().await.is_err());
    assert!(probe.probe().await.is_err());
}

#[tokio::test]
async fn connect_probe_measures_dial() {
    let (addr, _received) = spawn_mock_server().await;

    let mut probe = ConnectProbe::new(&config(addr, ProbeMode::ConnectLatency));
    probe.prepare().await.expect("connect mode has no setup");

    let elapsed_us = probe.probe().await.expect("dial");
    assert!(elapsed_us > 0);
}

#[tokio::test]
async fn connect_probe_dial_failure_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut probe = ConnectProbe::new(&config(addr, ProbeMode::ConnectLatency));
    assert!(probe.probe().await.is_err());
    assert!(probe.probe().await.is_err());
}
