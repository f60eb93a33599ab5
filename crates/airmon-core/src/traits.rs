//! Trait abstraction for AirMonitor data sources.
//!
//! This module provides the [`DataSource`] trait that abstracts over the
//! ESP32 link and the built-in simulator, so the collector can drive either.

use async_trait::async_trait;

use airmon_types::ControlCommand;

use crate::error::Result;
use crate::ingest::Sample;

/// Something that produces samples and accepts control commands.
///
/// # Example
///
/// ```ignore
/// use airmon_core::{DataSource, Result};
///
/// async fn print_next<S: DataSource>(source: &mut S) -> Result<()> {
///     let sample = source.next_sample().await?;
///     println!("{}: {} ppm", source.name(), sample.ppm);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DataSource: Send {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Wait for the next sample.
    ///
    /// A frame-level error (see [`crate::Error::is_frame_error`]) leaves the
    /// source usable; any other error means it should be reopened.
    async fn next_sample(&mut self) -> Result<Sample>;

    /// Send a control command to the device.
    async fn send_command(&mut self, command: &ControlCommand) -> Result<()>;

    /// Release the underlying connection.
    ///
    /// The default implementation does nothing.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn next_sample(&mut self) -> Result<Sample> {
        (**self).next_sample().await
    }

    async fn send_command(&mut self, command: &ControlCommand) -> Result<()> {
        (**self).send_command(command).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
