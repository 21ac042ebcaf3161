//! Injected table of output device factories.
//!
//! Applications build one registry at startup, register the device kinds
//! they support and pass it to whatever constructs channels. There is no
//! process-wide device table.

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::debug;

use crate::{
    device::OutputDevice, preview::PreviewOutput, timer_output::TimerOutput, Error, Result,
};

/// Builds an output device from an instance name.
pub type OutputFactory = Box<dyn Fn(&str) -> Result<Arc<dyn OutputDevice>> + Send + Sync>;

/// Name to factory map for output devices.
#[derive(Default)]
pub struct DeviceRegistry {
    outputs: BTreeMap<String, OutputFactory>,
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `timer` and `preview` kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_output("timer", |name| {
            Ok(Arc::new(TimerOutput::builder(name).build()?) as Arc<dyn OutputDevice>)
        });
        registry.register_output("preview", |name| {
            Ok(Arc::new(PreviewOutput::new(name)?) as Arc<dyn OutputDevice>)
        });
        registry
    }

    /// Register `factory` under `kind`, replacing any previous one.
    pub fn register_output<S, F>(&mut self, kind: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&str) -> Result<Arc<dyn OutputDevice>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "output kind registered");
        self.outputs.insert(kind, Box::new(factory));
    }

    /// Create an output of `kind` named `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownDevice`] if no factory is registered for `kind`, or
    /// whatever the factory returns.
    pub fn create_output(&self, kind: &str, name: &str) -> Result<Arc<dyn OutputDevice>> {
        let factory = self
            .outputs
            .get(kind)
            .ok_or_else(|| Error::UnknownDevice(kind.to_string()))?;
        factory(name)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.outputs.contains_key(kind)
    }

    /// Registered kinds in sorted order.
    pub fn output_kinds(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}
