//! Async runtime integration for Tokio.
//!
//! Channel control calls are synchronous: attaching or detaching an output
//! waits on the device's executor. These wrappers run such calls with
//! `spawn_blocking` so they never stall the async runtime, and expose
//! readiness waits as futures.
//!
//! # Features
//!
//! - `tokio` - Enable Tokio runtime support
//!
//! # Example with Tokio
//!
//! ```no_run
//! # #[cfg(feature = "tokio")]
//! # {
//! use std::{sync::Arc, time::Duration};
//! use grafton_playout::{
//!     tokio::AsyncChannel, BufferedSource, Channel, ChannelOptions, OutputDevice, TimerOutput,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), grafton_playout::Error> {
//!     let options = ChannelOptions::builder("Channel 1").build()?;
//!     let channel = AsyncChannel::new(Channel::new(&options)?);
//!
//!     let clock: Arc<dyn OutputDevice> = Arc::new(TimerOutput::builder("clock").build()?);
//!     channel.set_frame_clock(Arc::clone(&clock)).await?;
//!     channel.add_output(clock).await?;
//!
//!     let source = Arc::new(BufferedSource::new("next", &options)?);
//!     // ... a decoder task starts pushing into `source` ...
//!     channel.preload_and_wait(source, Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! # }
//! ```

#[cfg(feature = "tokio")]
pub mod tokio {
    //! Tokio async runtime integration.
    //!
    //! Provides `AsyncChannel`, a cloneable wrapper that uses
    //! `tokio::task::spawn_blocking` for control calls that wait on devices.

    use std::{sync::Arc, time::Duration};

    use tracing::debug;

    use crate::{
        channel::{Channel, SourceState},
        device::{same_object, InputSource, OutputDevice},
        Error, Result,
    };

    /// Interval between readiness checks while waiting for a preloaded source.
    const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// Async channel wrapper for Tokio runtime.
    ///
    /// # Thread Safety
    ///
    /// The underlying `Channel` is wrapped in an `Arc` to allow sharing across
    /// async tasks and cheap cloning.
    #[derive(Debug, Clone)]
    pub struct AsyncChannel {
        inner: Arc<Channel>,
    }

    impl AsyncChannel {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: Arc::new(channel),
            }
        }

        pub fn channel(&self) -> &Arc<Channel> {
            &self.inner
        }

        async fn blocking<F, R>(&self, task: F) -> Result<R>
        where
            F: FnOnce(&Channel) -> Result<R> + Send + 'static,
            R: Send + 'static,
        {
            let channel = Arc::clone(&self.inner);
            ::tokio::task::spawn_blocking(move || task(&channel))
                .await
                .map_err(|e| Error::TaskPanicked(format!("{}: {e}", self.inner.name())))?
        }

        /// Async version of `Channel::add_output`.
        pub async fn add_output(&self, device: Arc<dyn OutputDevice>) -> Result<()> {
            self.blocking(move |channel| channel.add_output(&device)).await
        }

        /// Async version of `Channel::remove_output`.
        pub async fn remove_output(&self, device: Arc<dyn OutputDevice>) -> Result<()> {
            self.blocking(move |channel| channel.remove_output(&device)).await
        }

        /// Async version of `Channel::set_frame_clock`.
        pub async fn set_frame_clock(&self, device: Arc<dyn OutputDevice>) -> Result<()> {
            self.blocking(move |channel| channel.set_frame_clock(&device)).await
        }

        /// Async version of `Channel::load`.
        pub async fn load(&self, source: Arc<dyn InputSource>) -> Result<()> {
            self.blocking(move |channel| channel.load(source)).await
        }

        /// Async version of `Channel::sync_outputs`.
        pub async fn sync_outputs(&self) -> Result<()> {
            self.blocking(Channel::sync_outputs).await
        }

        /// Async version of `Channel::clear`.
        pub async fn clear(&self) -> Result<()> {
            self.blocking(|channel| {
                channel.clear();
                Ok(())
            })
            .await
        }

        /// Preload `source` and resolve once it has buffered enough to go on air.
        ///
        /// The channel promotes the source on its next tick after this
        /// resolves.
        ///
        /// # Returns
        ///
        /// * `Ok(())` - The source reports ready
        /// * `Err(Error::Timeout)` - Not ready within `timeout`; the source stays preloaded
        /// * `Err(_)` - The source refused to join the channel
        pub async fn preload_and_wait(
            &self,
            source: Arc<dyn InputSource>,
            timeout: Duration,
        ) -> Result<()> {
            self.inner.preload(Arc::clone(&source))?;
            let wait = async {
                while !source.is_ready() {
                    ::tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
            };
            ::tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| Error::Timeout(timeout))?;
            debug!(channel = self.inner.name(), source = source.name(), "preloaded source ready");
            Ok(())
        }

        /// Resolve once `source` is on air (promoted from preload or loaded).
        ///
        /// # Errors
        ///
        /// `Err(Error::Timeout)` if the channel doesn't switch within `timeout`.
        pub async fn wait_on_air(&self, source: Arc<dyn InputSource>, timeout: Duration) -> Result<()> {
            let channel = Arc::clone(&self.inner);
            let wait = async move {
                loop {
                    let on_air = channel
                        .active_source()
                        .is_some_and(|active| same_object(&active, &source));
                    if on_air && channel.source_state() != SourceState::Loading {
                        break;
                    }
                    ::tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
            };
            ::tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| Error::Timeout(timeout))
        }
    }

}
