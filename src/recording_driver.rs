//! Driver and connector proxies, and the entry points that create them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::{
    probe, Capability, CapabilitySet, ConnectorCapability, DriverCapability,
};
use crate::config::ProxyConfig;
use crate::connection::RecordingConn;
use crate::context::Context;
use crate::database::Database;
use crate::driver::{Conn, Connector, ConnectorCloser, Driver, DriverContext};
use crate::error::{Error, Layer, Result};
use crate::hook::Operation;
use crate::instrument::Recording;
use crate::recorder::Recorder;

/// Wrap the driver registered as `driver_name` so every statement it runs is
/// recorded into `recorder`.
///
/// Register the result under a fresh name and open it like any other driver:
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use sql_recorder::{database, wrap_with_recorder, Recorder};
///
/// let recorder = Arc::new(Recorder::new());
/// database::register("sqlite3WithRecorder", wrap_with_recorder("sqlite3", recorder.clone())?)?;
/// let db = database::Database::open("sqlite3WithRecorder", "./foo.db")?;
/// ```
pub fn wrap_with_recorder(driver_name: &str, recorder: Arc<Recorder>) -> Result<Arc<dyn Driver>> {
    wrap_with_config(driver_name, recorder, ProxyConfig::default())
}

/// Like [`wrap_with_recorder`], with explicit configuration.
pub fn wrap_with_config(
    driver_name: &str,
    recorder: Arc<Recorder>,
    config: ProxyConfig,
) -> Result<Arc<dyn Driver>> {
    let driver = resolve_driver(driver_name)?;
    Ok(Arc::new(RecordingDriver::new(
        driver,
        driver_name,
        recorder,
        config,
    )))
}

// A throwaway handle resolves the name the same way a caller's open would.
// Handles connect lazily, so nothing reaches the database here.
fn resolve_driver(driver_name: &str) -> Result<Arc<dyn Driver>> {
    let db = Database::open(driver_name, "")?;
    let driver = db.driver();
    db.close()?;
    Ok(driver)
}

/// Extension trait for wrapping a driver that is already at hand.
pub trait RecordingExt {
    /// Wrap this driver, naming it `source_name` in trace events.
    fn with_recorder(self, source_name: &str, recorder: Arc<Recorder>) -> RecordingDriver;

    /// Wrap this driver with custom configuration.
    fn with_recorder_config(
        self,
        source_name: &str,
        recorder: Arc<Recorder>,
        config: ProxyConfig,
    ) -> RecordingDriver;
}

impl RecordingExt for Arc<dyn Driver> {
    fn with_recorder(self, source_name: &str, recorder: Arc<Recorder>) -> RecordingDriver {
        RecordingDriver::new(self, source_name, recorder, ProxyConfig::default())
    }

    fn with_recorder_config(
        self,
        source_name: &str,
        recorder: Arc<Recorder>,
        config: ProxyConfig,
    ) -> RecordingDriver {
        RecordingDriver::new(self, source_name, recorder, config)
    }
}

/// A recording wrapper around a driver.
///
/// Exposes [`DriverContext`] only when the wrapped driver does. Otherwise
/// callers fall back to [`Driver::open`], which is recorded just the same.
#[derive(Clone)]
pub struct RecordingDriver {
    inner: Arc<dyn Driver>,
    capabilities: CapabilitySet<DriverCapability>,
    recording: Arc<Recording>,
}

impl RecordingDriver {
    /// Wrap `driver`, exposing exactly the capabilities it implements.
    pub fn new(
        driver: Arc<dyn Driver>,
        source_name: &str,
        recorder: Arc<Recorder>,
        config: ProxyConfig,
    ) -> Self {
        let capabilities = probe::<DriverCapability>(&*driver);
        Self {
            inner: driver,
            capabilities,
            recording: Arc::new(Recording::new(recorder, config, source_name)),
        }
    }

    /// Wrap `driver`, exposing only `capabilities`. Fails if the driver does
    /// not implement all of them.
    pub fn with_capabilities(
        driver: Arc<dyn Driver>,
        capabilities: CapabilitySet<DriverCapability>,
        source_name: &str,
        recorder: Arc<Recorder>,
        config: ProxyConfig,
    ) -> Result<Self> {
        let available = probe::<DriverCapability>(&*driver);
        if let Some(missing) = capabilities.difference(&available).next() {
            return Err(Error::CapabilityMismatch {
                layer: Layer::Driver,
                capability: missing.name(),
            });
        }
        Ok(Self {
            inner: driver,
            capabilities,
            recording: Arc::new(Recording::new(recorder, config, source_name)),
        })
    }

    pub fn capabilities(&self) -> CapabilitySet<DriverCapability> {
        self.capabilities
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        self.recording.recorder()
    }

    /// Participant name of the database in trace events.
    pub fn source_name(&self) -> &str {
        self.recording.source()
    }

    /// The wrapped driver.
    pub fn inner(&self) -> &Arc<dyn Driver> {
        &self.inner
    }
}

impl fmt::Debug for RecordingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingDriver")
            .field("source_name", &self.recording.source())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Driver for RecordingDriver {
    fn open(&self, dsn: &str) -> Result<Box<dyn Conn>> {
        self.recording.intercept(Layer::Driver, Operation::Open, None);
        let conn = self
            .recording
            .settle(Layer::Driver, Operation::Open, self.inner.open(dsn))?;
        Ok(Box::new(RecordingConn::new(conn, self.recording.clone())?))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        self.capabilities
            .contains(DriverCapability::OpenConnector)
            .then_some(self as &dyn DriverContext)
    }
}

impl DriverContext for RecordingDriver {
    fn open_connector(&self, dsn: &str) -> Result<Box<dyn Connector>> {
        self.recording
            .intercept(Layer::Driver, Operation::OpenConnector, None);
        let inner = if self.capabilities.contains(DriverCapability::OpenConnector) {
            self.inner.as_driver_context()
        } else {
            None
        };
        let inner = self.recording.settle(
            Layer::Driver,
            Operation::OpenConnector,
            inner.ok_or(Error::Unsupported {
                layer: Layer::Driver,
                capability: DriverCapability::OpenConnector.name(),
            }),
        )?;
        let connector = self.recording.settle(
            Layer::Driver,
            Operation::OpenConnector,
            inner.open_connector(dsn),
        )?;
        Ok(Box::new(RecordingConnector::new(connector, self.clone())))
    }
}

/// A recording wrapper around a connector.
pub struct RecordingConnector {
    inner: Box<dyn Connector>,
    capabilities: CapabilitySet<ConnectorCapability>,
    driver: RecordingDriver,
}

impl RecordingConnector {
    fn new(connector: Box<dyn Connector>, driver: RecordingDriver) -> Self {
        let capabilities = probe::<ConnectorCapability>(&*connector);
        Self {
            inner: connector,
            capabilities,
            driver,
        }
    }

    pub fn capabilities(&self) -> CapabilitySet<ConnectorCapability> {
        self.capabilities
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>> {
        let recording = &self.driver.recording;
        recording.intercept(Layer::Connector, Operation::Connect, None);
        let conn = recording.settle(
            Layer::Connector,
            Operation::Connect,
            self.inner.connect(ctx).await,
        )?;
        Ok(Box::new(RecordingConn::new(conn, recording.clone())?))
    }

    /// The recording driver, so a handle's driver stays wrapped.
    fn driver(&self) -> Arc<dyn Driver> {
        Arc::new(self.driver.clone())
    }

    fn as_closer(&self) -> Option<&dyn ConnectorCloser> {
        self.capabilities
            .contains(ConnectorCapability::Close)
            .then_some(self as &dyn ConnectorCloser)
    }
}

impl ConnectorCloser for RecordingConnector {
    fn close(&self) -> Result<()> {
        match self.inner.as_closer() {
            Some(closer) if self.capabilities.contains(ConnectorCapability::Close) => {
                closer.close()
            }
            _ => Err(Error::Unsupported {
                layer: Layer::Connector,
                capability: ConnectorCapability::Close.name(),
            }),
        }
    }
}
