//! Precedence between defaults, files, environment and flags.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use bastion_config::{
    Config, ConfigError, LogFormat, RpcEndpoint, default_log_filter, default_log_format,
    default_rpc_endpoint,
};
use once_cell::sync::Lazy;
use rstest::{fixture, rstest};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    args: Vec<OsString>,
    env: HashMap<String, String>,
}

impl Harness {
    fn write_config(&mut self, contents: &str) {
        let path = self.temp_dir.path().join("bastion.toml");
        fs::write(&path, contents).expect("write configuration");
        self.args.push(OsString::from("--config-path"));
        self.args.push(path.into_os_string());
    }

    fn set_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_owned(), value.to_owned());
    }

    fn push_args(&mut self, args: &[&str]) {
        self.args.extend(args.iter().map(OsString::from));
    }

    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_with_env(self.args.clone(), |key| self.env.get(key).cloned())
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        temp_dir: TempDir::new().expect("create temporary directory"),
        args: vec![OsString::from("bastiond")],
        env: HashMap::new(),
    }
}

fn tcp(port: u16) -> RpcEndpoint {
    RpcEndpoint::new("127.0.0.1", port)
}

#[rstest]
fn defaults_apply_without_overrides(harness: Harness) {
    let config = harness.load().expect("configuration loads");
    assert_eq!(config.rpc_endpoint(), &default_rpc_endpoint());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert!(config.app_config().is_none());
    assert!(!config.strict_lifecycle());
}

#[rstest]
fn file_overrides_defaults(mut harness: Harness) {
    harness.write_config(
        "rpc_endpoint = \"tcp://127.0.0.1:9001\"\nlog_format = \"compact\"\nstrict_lifecycle = true\n",
    );
    let config = harness.load().expect("configuration loads");
    assert_eq!(config.rpc_endpoint(), &tcp(9001));
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert!(config.strict_lifecycle());
    assert!(config.config_path().is_some());
}

#[rstest]
fn environment_overrides_file(mut harness: Harness) {
    harness.write_config("rpc_endpoint = \"tcp://127.0.0.1:9001\"\n");
    harness.set_env("BASTION_RPC_ENDPOINT", "tcp://127.0.0.1:9002");
    harness.set_env("BASTION_LOG_FILTER", "debug");
    let config = harness.load().expect("configuration loads");
    assert_eq!(config.rpc_endpoint(), &tcp(9002));
    assert_eq!(config.log_filter(), "debug");
}

#[rstest]
fn flags_override_environment(mut harness: Harness) {
    harness.set_env("BASTION_RPC_ENDPOINT", "tcp://127.0.0.1:9002");
    harness.set_env("BASTION_APP_CONFIG", "/etc/bastion/env.json");
    harness.push_args(&[
        "--rpc-endpoint",
        "tcp://127.0.0.1:9003",
        "--app-config",
        "/etc/bastion/cli.json",
    ]);
    let config = harness.load().expect("configuration loads");
    assert_eq!(config.rpc_endpoint(), &tcp(9003));
    assert_eq!(
        config.app_config().map(camino::Utf8Path::as_str),
        Some("/etc/bastion/cli.json")
    );
}

#[rstest]
fn environment_names_the_configuration_file(mut harness: Harness) {
    let path = harness.temp_dir.path().join("from-env.toml");
    fs::write(&path, "log_filter = \"trace\"\n").expect("write configuration");
    harness.set_env(
        "BASTION_CONFIG_PATH",
        path.to_str().expect("temporary path is UTF-8"),
    );
    let config = harness.load().expect("configuration loads");
    assert_eq!(config.log_filter(), "trace");
}

#[rstest]
#[case::unknown_key("daemon = true\n")]
#[case::bad_endpoint("rpc_endpoint = \"http://127.0.0.1:1\"\n")]
#[case::bad_format("log_format = \"xml\"\n")]
#[case::not_toml("rpc_endpoint = ")]
fn malformed_files_fail_fast(mut harness: Harness, #[case] contents: &str) {
    harness.write_config(contents);
    harness.load().expect_err("loading must fail");
}

#[rstest]
fn missing_files_report_their_path(mut harness: Harness) {
    harness.push_args(&["--config-path", "/nonexistent/bastion.toml"]);
    let error = harness.load().expect_err("loading must fail");
    assert!(matches!(error, ConfigError::ReadFile { .. }));
    assert!(error.to_string().contains("/nonexistent/bastion.toml"));
}

#[rstest]
fn malformed_booleans_are_rejected(mut harness: Harness) {
    harness.set_env("BASTION_STRICT_LIFECYCLE", "maybe");
    let error = harness.load().expect_err("loading must fail");
    assert!(matches!(error, ConfigError::Bool { .. }));
}

#[rstest]
fn help_is_informational(mut harness: Harness) {
    harness.push_args(&["--help"]);
    let error = harness.load().expect_err("help short-circuits");
    assert!(error.is_informational());
}

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

#[test]
fn process_environment_is_consulted() {
    let _env = EnvOverride::set_var("BASTION_LOG_FORMAT", OsStr::new("compact"));
    let config = Config::load_from_iter(["bastiond"]).expect("configuration loads");
    assert_eq!(config.log_format(), LogFormat::Compact);
}
