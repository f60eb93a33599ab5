//! Polling a data source as an async stream.
//!
//! [`SampleStream`] owns a [`DataSource`] on a background task, polls it at
//! a fixed interval and forwards samples through a channel. Control commands
//! reach the source through a [`CommandSender`], so the consumer never needs
//! mutable access to it.
//!
//! The stream supports graceful shutdown via [`SampleStream::close`], which
//! uses a cancellation token to stop the background task.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use airmon_types::ControlCommand;

use crate::error::{Error, Result};
use crate::ingest::Sample;
use crate::traits::DataSource;

/// Result type for stream items.
pub type SampleResult = std::result::Result<Sample, Error>;

/// Options for sample streams.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Delay between polls. Default: 3 seconds.
    pub poll_interval: Duration,
    /// Buffer size for the sample channel. Default: 16.
    pub buffer_size: usize,
    /// Forward failed polls as `Err` items instead of only logging them.
    pub include_errors: bool,
    /// Stop after this many consecutive non-frame failures.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            buffer_size: 16,
            include_errors: false,
            max_consecutive_failures: None,
        }
    }
}

impl StreamOptions {
    /// Create options with a specific poll interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            poll_interval: interval,
            ..Default::default()
        }
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::invalid_config("buffer_size must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be > 0"));
        }
        Ok(())
    }
}

type CommandRequest = (ControlCommand, oneshot::Sender<Result<()>>);

/// Sends control commands to a source owned by a [`SampleStream`].
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandSender {
    /// Deliver `command` and wait for the source to apply it.
    pub async fn send(&self, command: ControlCommand) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::Cancelled)?
    }
}

/// A stream of samples from a data source.
pub struct SampleStream {
    receiver: mpsc::Receiver<SampleResult>,
    commands: CommandSender,
    handle: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl SampleStream {
    /// Spawn the polling task for `source`.
    pub fn spawn<S>(mut source: S, options: StreamOptions) -> Self
    where
        S: DataSource + 'static,
    {
        let (tx, rx) = mpsc::channel(options.buffer_size.max(1));
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<CommandRequest>(8);
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let max_failures = options.max_consecutive_failures;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(options.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut consecutive_failures: u32 = 0;
            info!("Sample stream started for {}", source.name());

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Stream cancelled, stopping gracefully");
                        break;
                    }
                    Some((command, reply)) = cmd_rx.recv() => {
                        let result = source.send_command(&command).await;
                        if let Err(e) = &result {
                            warn!("Command to {} failed: {}", source.name(), e);
                        }
                        let _ = reply.send(result);
                    }
                    _ = ticker.tick() => {
                        match source.next_sample().await {
                            Ok(sample) => {
                                consecutive_failures = 0;
                                if tx.send(Ok(sample)).await.is_err() {
                                    debug!("Stream receiver dropped, stopping");
                                    break;
                                }
                            }
                            Err(e) => {
                                if !e.is_frame_error() {
                                    consecutive_failures += 1;
                                }
                                warn!(
                                    "Error reading from {} (failure {}/{}): {}",
                                    source.name(),
                                    consecutive_failures,
                                    max_failures.map_or("unbounded".to_string(), |n| n.to_string()),
                                    e
                                );

                                if let Some(max) = max_failures
                                    && consecutive_failures >= max
                                {
                                    warn!("Max consecutive failures ({}) reached, closing stream", max);
                                    if options.include_errors {
                                        let _ = tx.send(Err(e)).await;
                                    }
                                    break;
                                }

                                if options.include_errors && tx.send(Err(e)).await.is_err() {
                                    debug!("Stream receiver dropped, stopping");
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            if let Err(e) = source.close().await {
                debug!("Error closing {}: {}", source.name(), e);
            }
        });

        Self {
            receiver: rx,
            commands: CommandSender { tx: cmd_tx },
            handle,
            cancel_token,
        }
    }

    /// Handle for sending control commands to the source.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Close the stream and stop the background task.
    pub fn close(self) {
        self.cancel_token.cancel();
    }

    /// Token that cancels the stream when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Check if the background task is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// True if the task finished without being cancelled.
    pub fn has_unexpectedly_stopped(&self) -> bool {
        self.handle.is_finished() && !self.cancel_token.is_cancelled()
    }
}

impl Drop for SampleStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for SampleStream {
    type Item = SampleResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
