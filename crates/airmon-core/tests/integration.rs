//! Integration tests for airmon-core
//!
//! The loopback tests run a fake board on a local TCP socket. The hardware
//! test needs a real board and should be run with:
//! `AIRMON_DEVICE=192.168.4.1:8080 cargo test --package airmon-core -- --ignored --nocapture`

use std::env;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

use airmon_core::{
    Classifier, DataSource, DeviceLink, Ingestor, LinkConfig, MockRemote, RemoteReading,
    RemoteStore, SampleStream, StreamOptions,
};
use airmon_types::{AlertLevel, ControlCommand, DataOrigin};

const FRAMES: [&str; 3] = [
    r#"{"device":"AirMonitor_TI3042","version":"1.0","timestamp":0,"air_quality":{"ppm":145,"level":"good","temperature":23.5,"humidity":62},"system":{"fan_status":false,"buzzer_active":false,"auto_mode":true,"uptime":7500},"thresholds":{"warning":200,"critical":400}}"#,
    r#"{"device":"AirMonitor_TI3042","version":"1.0","timestamp":0,"air_quality":{"ppm":234,"level":"moderate","temperature":24.8,"humidity":58},"system":{"fan_status":true,"buzzer_active":false,"auto_mode":true,"uptime":7620},"thresholds":{"warning":200,"critical":400}}"#,
    r#"{"device":"AirMonitor_TI3042","version":"1.0","timestamp":0,"air_quality":{"ppm":421,"level":"critical","temperature":26.1,"humidity":48},"system":{"fan_status":true,"buzzer_active":true,"auto_mode":true,"uptime":7740},"thresholds":{"warning":200,"critical":400}}"#,
];

/// Start a fake board that sends `FRAMES` and echoes back the first command it receives.
async fn spawn_board() -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        for frame in FRAMES {
            write_half
                .write_all(format!("{frame}\n").as_bytes())
                .await
                .unwrap();
        }
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    });

    (addr, handle)
}

#[tokio::test]
async fn test_tcp_link_end_to_end() {
    let (addr, board) = spawn_board().await;
    let mut link = DeviceLink::connect(&addr, LinkConfig::default())
        .await
        .unwrap();
    let ingestor = Ingestor::new("AirMonitor_TI3042_001", Classifier::default());

    let mut levels = Vec::new();
    for _ in 0..FRAMES.len() {
        let sample = link.next_sample().await.unwrap();
        assert_eq!(sample.origin, DataOrigin::Mq135);
        levels.push(ingestor.ingest(&sample).alert_level);
    }
    assert_eq!(
        levels,
        vec![AlertLevel::Normal, AlertLevel::Warning, AlertLevel::Critical]
    );

    link.send_command(&ControlCommand::fan(false)).await.unwrap();
    let received = timeout(Duration::from_secs(5), board).await.unwrap().unwrap();
    assert_eq!(received.trim(), r#"{"action":"control","fan":{"enable":false}}"#);
}

#[tokio::test]
async fn test_stream_to_remote() {
    let (addr, _board) = spawn_board().await;
    let link = DeviceLink::connect(&addr, LinkConfig::default())
        .await
        .unwrap();
    let mut stream =
        SampleStream::spawn(link, StreamOptions::with_interval(Duration::from_millis(5)));
    let ingestor = Ingestor::new("AirMonitor_TI3042_001", Classifier::default());
    let remote = MockRemote::new();

    for _ in 0..FRAMES.len() {
        let sample = timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reading = ingestor.ingest(&sample);
        remote
            .save_reading("u1", &RemoteReading::from_reading(&reading, "u1"))
            .await
            .unwrap();
    }

    let latest = remote.latest_readings("u1", 10).await.unwrap();
    assert_eq!(latest.len(), FRAMES.len());
    assert!(latest.iter().any(|doc| doc.alert_level == AlertLevel::Critical));
    stream.close();
}

#[tokio::test]
#[ignore = "requires an AirMonitor board"]
async fn test_read_from_hardware() {
    let addr = env::var("AIRMON_DEVICE").unwrap_or_else(|_| "192.168.4.1:8080".to_string());
    let mut link = DeviceLink::connect(&addr, LinkConfig::default())
        .await
        .unwrap();

    let frame = link.read_frame().await.unwrap();
    println!(
        "{}: {} ppm ({}), {:.1} C, {}% RH, uptime {}",
        frame.device,
        frame.air_quality.ppm,
        frame.air_quality.level,
        frame.air_quality.temperature,
        frame.air_quality.humidity,
        frame.system.formatted_uptime()
    );
}
