//! Test doubles for the daemon suites.

use std::ffi::OsString;
use std::fs;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bastion_config::{Config, ConfigError, RpcEndpoint};
use bastion_core::CoreError;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tempfile::TempDir;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;
use crate::process::{ShutdownError, ShutdownSignal};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServiceStarting(String),
    ServiceStarted(String),
    ServiceFailed { name: String, kind: String },
    ShutdownStarted,
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }

    /// Polls until `event` has been recorded.
    pub fn wait_for(&self, event: &HealthEvent) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self.events().contains(event) {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
        panic!("timed out waiting for {event:?}; recorded {:?}", self.events());
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn service_starting(&self, name: &str) {
        self.record(HealthEvent::ServiceStarting(name.to_owned()));
    }

    fn service_started(&self, name: &str) {
        self.record(HealthEvent::ServiceStarted(name.to_owned()));
    }

    fn service_failed(&self, name: &str, error: &CoreError) {
        self.record(HealthEvent::ServiceFailed {
            name: name.to_owned(),
            kind: error.kind().to_string(),
        });
    }

    fn shutdown_started(&self) {
        self.record(HealthEvent::ShutdownStarted);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Loader binding an ephemeral RPC port, optionally with an application
/// configuration written to a temporary file.
pub struct TestConfigLoader {
    config: Config,
    _dir: TempDir,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self::build(|_| None)
    }

    pub fn with_app_config(app_config: &Value) -> Self {
        Self::with_raw_app_config(&app_config.to_string())
    }

    pub fn with_raw_app_config(text: &str) -> Self {
        Self::build(|dir| {
            let path = dir.join("app.json");
            fs::write(&path, text).expect("write application configuration");
            Some(path)
        })
    }

    pub fn missing_app_config() -> Self {
        Self::build(|dir| Some(dir.join("absent.json")))
    }

    fn build(app_config: impl FnOnce(&Utf8Path) -> Option<Utf8PathBuf>) -> Self {
        let dir = TempDir::new().expect("temporary directory");
        let root = Utf8Path::from_path(dir.path()).expect("temporary path is UTF-8");
        let mut config = Config::default().with_rpc_endpoint(RpcEndpoint::new("127.0.0.1", 0));
        if let Some(path) = app_config(root) {
            config = config.with_app_config(path);
        }
        Self { config, _dir: dir }
    }

    pub fn strict(self) -> Self {
        Self {
            config: self.config.with_strict_lifecycle(true),
            _dir: self._dir,
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<ConfigError>> {
        Ok(self.config.clone())
    }
}

/// Loader that fails by passing an unsupported endpoint scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<ConfigError>> {
        Config::load_with_env(
            [
                OsString::from("bastiond"),
                OsString::from("--rpc-endpoint"),
                OsString::from("udp://127.0.0.1:1"),
            ],
            |_| None,
        )
        .map_err(Arc::new)
    }
}

/// Shutdown signal released by the test.
#[derive(Clone)]
pub struct TriggeredShutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TriggeredShutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("shutdown mutex poisoned") = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TriggeredShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}

/// Shutdown signal whose installation fails.
pub struct BrokenShutdown;

impl ShutdownSignal for BrokenShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Err(ShutdownError::Install {
            source: std::io::Error::other("signals unavailable"),
        })
    }
}
