//! Line-delimited JSON link to the ESP32 board.
//!
//! The firmware writes one [`SensorData`] document per line and reads one
//! [`ControlCommand`] per line. The link works over any async byte stream,
//! typically a TCP socket to the board's Wi-Fi bridge or a serial adapter.
//!
//! ```no_run
//! use airmon_core::link::{DeviceLink, LinkConfig};
//! use airmon_types::ControlCommand;
//!
//! # async fn example() -> airmon_core::Result<()> {
//! let mut link = DeviceLink::connect("192.168.4.1:8080", LinkConfig::default()).await?;
//! let frame = link.read_frame().await?;
//! println!("{} ppm", frame.air_quality.ppm);
//! link.write_command(&ControlCommand::fan(true)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tracing::{debug, info, warn};

use airmon_types::{ControlCommand, DataOrigin, ParseError, SensorData};

use crate::codec::{decode_frame, encode_line};
use crate::error::{Error, Result};
use crate::ingest::Sample;
use crate::traits::DataSource;

/// Options for a [`DeviceLink`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long to wait for the TCP connection.
    pub connect_timeout: Duration,
    /// How long to wait for more bytes before giving up.
    ///
    /// A timeout keeps whatever part of a line already arrived.
    pub read_timeout: Duration,
    /// Longest accepted line, in bytes, terminator excluded. Nothing longer
    /// is ever buffered.
    pub max_line_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_line_len: 8 * 1024,
        }
    }
}

/// A connection to the board over a byte stream.
pub struct DeviceLink<S> {
    peer: String,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    config: LinkConfig,
    lines: AnyDelimiterCodec,
    buffer: BytesMut,
    last_frame: Option<SensorData>,
}

impl<S> std::fmt::Debug for DeviceLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("peer", &self.peer)
            .field("config", &self.config)
            .finish()
    }
}

impl DeviceLink<TcpStream> {
    /// Open a TCP connection to the board.
    pub async fn connect(addr: &str, config: LinkConfig) -> Result<Self> {
        info!("Connecting to device at {}", addr);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout("connect", config.connect_timeout))??;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(addr, stream, config))
    }
}

impl<S> DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Wrap an already-open stream.
    pub fn from_stream(peer: impl Into<String>, stream: S, config: LinkConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            peer: peer.into(),
            reader: read_half,
            writer: write_half,
            lines: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                config.max_line_len,
            ),
            buffer: BytesMut::with_capacity(1024),
            config,
            last_frame: None,
        }
    }

    /// Address or name of the peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The most recent frame successfully decoded.
    pub fn last_frame(&self) -> Option<&SensorData> {
        self.last_frame.as_ref()
    }

    /// Read the next status frame.
    ///
    /// Blank lines are skipped. A malformed, non-UTF-8 or over-long line
    /// yields [`Error::Parse`] (with the payload attached when there is one);
    /// the link stays usable and resumes at the next line.
    pub async fn read_frame(&mut self) -> Result<SensorData> {
        loop {
            let chunk = match self.lines.decode(&mut self.buffer) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.fill_buffer().await?;
                    continue;
                }
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    warn!(
                        "Dropping line from {} longer than {} bytes",
                        self.peer, self.config.max_line_len
                    );
                    return Err(ParseError::LineTooLong {
                        limit: self.config.max_line_len,
                    }
                    .into());
                }
                Err(AnyDelimiterCodecError::Io(e)) => return Err(e.into()),
            };

            let line = std::str::from_utf8(&chunk).map_err(|_| ParseError::InvalidUtf8 {
                payload: String::from_utf8_lossy(&chunk).into_owned(),
                len: chunk.len(),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let frame = decode_frame(line)?;
            debug!(
                "Frame from {}: {} ppm ({})",
                self.peer, frame.air_quality.ppm, frame.air_quality.level
            );
            self.last_frame = Some(frame.clone());
            return Ok(frame);
        }
    }

    /// Append whatever the peer sends next to the line buffer.
    ///
    /// `read_buf` keeps received bytes in the buffer even when the timeout
    /// fires, so a slow line is completed on the next call.
    async fn fill_buffer(&mut self) -> Result<()> {
        let read = tokio::time::timeout(
            self.config.read_timeout,
            self.reader.read_buf(&mut self.buffer),
        )
        .await
        .map_err(|_| Error::timeout("read_frame", self.config.read_timeout))??;

        if read == 0 {
            if !self.buffer.is_empty() {
                debug!(
                    "Discarding {} bytes of unterminated line from {}",
                    self.buffer.len(),
                    self.peer
                );
            }
            return Err(Error::closed(&self.peer));
        }
        Ok(())
    }

    /// Send a control command as one line.
    pub async fn write_command(&mut self, command: &ControlCommand) -> Result<()> {
        let line = encode_line(command)?;
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        debug!("Sent command to {}: {} bytes", self.peer, line.len());
        Ok(())
    }
}

#[async_trait]
impl<S> DataSource for DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn name(&self) -> &str {
        &self.peer
    }

    async fn next_sample(&mut self) -> Result<Sample> {
        let frame = self.read_frame().await?;
        Ok(Sample::from_frame(&frame, DataOrigin::Mq135))
    }

    async fn send_command(&mut self, command: &ControlCommand) -> Result<()> {
        self.write_command(command).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    const FRAME: &str = r#"{"device":"AirMonitor_TI3042","version":"1.0","timestamp":0,"air_quality":{"ppm":234,"level":"moderate","temperature":24.8,"humidity":58},"system":{"fan_status":true,"buzzer_active":true,"auto_mode":true,"uptime":7620},"thresholds":{"warning":200,"critical":400}}"#;

    fn config() -> LinkConfig {
        LinkConfig {
            read_timeout: Duration::from_millis(200),
            ..LinkConfig::default()
        }
    }

    #[tokio::test]
    async fn test_read_frames_and_skip_blank_lines() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());

        board
            .write_all(format!("\n{FRAME}\n\r\n{FRAME}\n").as_bytes())
            .await
            .unwrap();

        assert_eq!(link.read_frame().await.unwrap().air_quality.ppm, 234);
        assert_eq!(link.read_frame().await.unwrap().air_quality.ppm, 234);
        assert!(link.last_frame().is_some());
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_link_usable() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());

        board
            .write_all(format!("{{garbage\n{FRAME}\n").as_bytes())
            .await
            .unwrap();

        let err = link.read_frame().await.unwrap_err();
        assert!(err.is_frame_error());
        match err {
            Error::Parse(parse) => assert_eq!(parse.payload(), Some("{garbage")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(link.read_frame().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client, board) = duplex(64);
        let mut link = DeviceLink::from_stream("board", client, config());
        drop(board);

        let err = link.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _board) = duplex(64);
        let mut link = DeviceLink::from_stream("quiet", client, config());

        let err = link.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    fn small_lines() -> LinkConfig {
        LinkConfig {
            max_line_len: 16,
            ..config()
        }
    }

    #[tokio::test]
    async fn test_oversized_line_rejected() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, small_lines());

        board.write_all(format!("{FRAME}\n").as_bytes()).await.unwrap();
        let err = link.read_frame().await.unwrap_err();
        assert!(err.is_frame_error());
        assert!(matches!(err, Error::Parse(ParseError::LineTooLong { limit: 16 })));
    }

    #[tokio::test]
    async fn test_unterminated_line_is_bounded() {
        let (client, mut board) = duplex(64 * 1024);
        let mut link = DeviceLink::from_stream("test", client, small_lines());

        // No newline ever arrives; the link must not keep buffering.
        board.write_all(&[b'x'; 32 * 1024]).await.unwrap();
        let err = link.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::LineTooLong { .. })));
        assert!(link.buffer.len() < 32 * 1024);

        // The rest of the long line is skipped; the next line decodes.
        board.write_all(b"xxxx\n{}\n").await.unwrap();
        let mut skipped_to = None;
        for _ in 0..4 {
            match link.read_frame().await {
                Err(Error::Parse(ParseError::Json { payload, .. })) => {
                    skipped_to = Some(payload);
                    break;
                }
                Err(Error::Parse(ParseError::LineTooLong { .. })) => continue,
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!(skipped_to.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_frame_error() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());

        board.write_all(b"{\"device\":\"\xff\xfe\"}\n").await.unwrap();
        board.write_all(format!("{FRAME}\n").as_bytes()).await.unwrap();

        let err = link.read_frame().await.unwrap_err();
        assert!(err.is_frame_error());
        match err {
            Error::Parse(parse @ ParseError::InvalidUtf8 { .. }) => {
                assert!(parse.payload().unwrap().starts_with("{\"device\":"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(link.read_frame().await.unwrap().air_quality.ppm, 234);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_line() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());

        let (head, tail) = FRAME.split_at(40);
        board.write_all(head.as_bytes()).await.unwrap();
        let err = link.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        board.write_all(format!("{tail}\n").as_bytes()).await.unwrap();
        assert_eq!(link.read_frame().await.unwrap().air_quality.ppm, 234);
    }

    #[tokio::test]
    async fn test_write_command_line() {
        let (client, board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());

        link.send_command(&ControlCommand::buzzer(false)).await.unwrap();

        let mut reader = BufReader::new(board);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"action\":\"control\",\"buzzer\":{\"enable\":false}}\n");
    }

    #[tokio::test]
    async fn test_next_sample_is_from_hardware() {
        let (client, mut board) = duplex(4096);
        let mut link = DeviceLink::from_stream("test", client, config());
        board.write_all(format!("{FRAME}\n").as_bytes()).await.unwrap();

        let sample = link.next_sample().await.unwrap();
        assert_eq!(sample.origin, DataOrigin::Mq135);
        assert_eq!(sample.ppm, 234);
    }
}
