//! Signal-driven run of the daemon from bootstrap to shutdown.

use std::sync::Arc;
use std::thread;

use mockall::mock;
use rstest::rstest;

use super::support::{
    BrokenShutdown, FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader,
    TriggeredShutdown,
};
use crate::bootstrap::{ConfigLoader, StaticConfigLoader};
use crate::process::{LaunchError, ShutdownError, ShutdownSignal, run_daemon_with};

mock! {
    Signal {}
    impl ShutdownSignal for Signal {
        fn wait(&self) -> Result<(), ShutdownError>;
    }
}

#[rstest]
fn shutdown_signal_ends_the_run() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let shutdown = TriggeredShutdown::new();
    let runner_reporter = Arc::clone(&reporter);
    let runner_shutdown = shutdown.clone();
    let runner = thread::spawn(move || {
        run_daemon_with(&TestConfigLoader::new(), runner_reporter, &runner_shutdown)
    });

    reporter.wait_for(&HealthEvent::BootstrapSucceeded);
    assert!(!reporter.events().contains(&HealthEvent::ShutdownStarted));
    shutdown.trigger();

    runner
        .join()
        .expect("daemon thread panicked")
        .expect("daemon run succeeds");
    assert_eq!(
        reporter.events(),
        vec![
            HealthEvent::BootstrapStarting,
            HealthEvent::BootstrapSucceeded,
            HealthEvent::ShutdownStarted,
            HealthEvent::ShutdownCompleted,
        ]
    );
}

#[rstest]
fn services_shut_down_when_waiting_fails() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = run_daemon_with(
        &TestConfigLoader::new(),
        Arc::<RecordingHealthReporter>::clone(&reporter),
        &BrokenShutdown,
    )
    .expect_err("waiting fails");
    assert!(matches!(error, LaunchError::Shutdown { .. }));
    assert_eq!(
        reporter.events().last(),
        Some(&HealthEvent::ShutdownCompleted)
    );
}

#[rstest]
fn bootstrap_failures_skip_the_wait() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = run_daemon_with(&FailingConfigLoader, Arc::<RecordingHealthReporter>::clone(&reporter), &BrokenShutdown)
        .expect_err("bootstrap fails");
    assert!(matches!(error, LaunchError::Bootstrap { .. }));
    assert!(error.config_error().is_some());
    assert!(!reporter.events().contains(&HealthEvent::ShutdownStarted));
}

#[rstest]
fn the_signal_is_awaited_exactly_once() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let config = TestConfigLoader::new().load().expect("test configuration");
    let mut signal = MockSignal::new();
    signal.expect_wait().once().returning(|| Ok(()));
    run_daemon_with(&StaticConfigLoader::new(config), reporter, &signal)
        .expect("daemon run succeeds");
}
