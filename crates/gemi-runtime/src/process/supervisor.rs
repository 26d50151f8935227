//! Local [`ProcessSupervisor`]: spawns and owns at most one backend child.

use async_trait::async_trait;
use gemi_core::{
    BackendSettings, HealthClient, LaunchError, ProbeError, ProcessHandle, ProcessSupervisor,
};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::logs::{LogTail, spawn_log_readers};
use super::shutdown::{DEFAULT_GRACE_PERIOD, shutdown_child};
use crate::install::validate_binary;

/// Environment the backend reads its bind address from.
const ENV_HOST: &str = "GEMI_HOST";
const ENV_PORT: &str = "GEMI_PORT";

/// Extra environment the backend needs to run reliably on all platforms.
const CHILD_ENV: &[(&str, &str)] = &[
    ("TOKENIZERS_PARALLELISM", "false"),
    ("PYTORCH_ENABLE_MPS_FALLBACK", "1"),
];

/// The backend this supervisor is tracking.
struct TrackedBackend {
    handle: ProcessHandle,
    /// `None` for an externally managed backend.
    child: Option<Child>,
    /// A probe has succeeded since launch.
    confirmed: bool,
    tail: LogTail,
}

impl TrackedBackend {
    fn matches(&self, handle: &ProcessHandle) -> bool {
        self.handle.ownership == handle.ownership && self.handle.pid == handle.pid
    }
}

/// Spawns the backend as a child process and tracks its liveness.
///
/// All state sits behind one async mutex, so concurrent `ensure_running`
/// calls serialize and can never launch a second process.
pub struct LocalProcessSupervisor {
    host: String,
    port: u16,
    serve_args: Vec<String>,
    probe_timeout: Duration,
    grace: Duration,
    health: Arc<dyn HealthClient>,
    tracked: Mutex<Option<TrackedBackend>>,
}

impl LocalProcessSupervisor {
    /// Supervisor for the backend described by `settings`.
    ///
    /// `health` is used to detect a backend that is already running.
    pub fn new(settings: &BackendSettings, health: Arc<dyn HealthClient>) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            serve_args: settings.serve_args.clone(),
            probe_timeout: settings.probe_timeout,
            grace: DEFAULT_GRACE_PERIOD,
            health,
            tracked: Mutex::new(None),
        }
    }

    /// Override how long the child gets between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Something answers on the backend port, even if not in the expected
    /// shape. Spawning then would only collide on the port.
    async fn is_reachable(&self) -> bool {
        !matches!(
            self.health.probe(self.probe_timeout).await,
            Err(ProbeError::Unreachable(_))
        )
    }

    fn spawn(&self, binary: &Path) -> Result<TrackedBackend, LaunchError> {
        validate_binary(binary).map_err(|e| {
            debug!("Refusing to launch: {}", e);
            LaunchError::BinaryMissing(binary.to_path_buf())
        })?;

        let mut cmd = Command::new(binary);
        cmd.args(&self.serve_args)
            .env(ENV_HOST, &self.host)
            .env(ENV_PORT, self.port.to_string())
            .envs(CHILD_ENV.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = binary.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| LaunchError::SpawnFailed {
            path: binary.to_path_buf(),
            reason: e.to_string(),
            transient: is_transient_spawn_error(&e),
        })?;

        let tail = LogTail::new();
        spawn_log_readers(&mut child, &tail);

        let handle = ProcessHandle::owned(child.id());
        info!(
            pid = ?handle.pid,
            port = self.port,
            binary = %binary.display(),
            "Spawned backend process"
        );

        Ok(TrackedBackend {
            handle,
            child: Some(child),
            confirmed: false,
            tail,
        })
    }
}

#[async_trait]
impl ProcessSupervisor for LocalProcessSupervisor {
    async fn ensure_running(&self, binary: &Path) -> Result<ProcessHandle, LaunchError> {
        let mut tracked = self.tracked.lock().await;

        if let Some(current) = tracked.as_mut() {
            match current.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(None) => return Ok(current.handle.clone()),
                    Ok(Some(status)) => {
                        let confirmed = current.confirmed;
                        let detail = describe_exit(status, current.tail.last());
                        *tracked = None;
                        if !confirmed {
                            warn!("Backend exited before becoming healthy: {}", detail);
                            return Err(LaunchError::CrashedEarly { status: detail });
                        }
                        warn!("Backend exited after running healthy ({}); relaunching", detail);
                    }
                    Err(e) => {
                        warn!("Cannot query backend process state: {}", e);
                        *tracked = None;
                    }
                },
                None => {
                    if self.is_reachable().await {
                        return Ok(current.handle.clone());
                    }
                    debug!("Externally managed backend went away");
                    *tracked = None;
                }
            }
        }

        if self.is_reachable().await {
            info!(port = self.port, "Backend already running; not spawning");
            let handle = ProcessHandle::external();
            *tracked = Some(TrackedBackend {
                handle: handle.clone(),
                child: None,
                confirmed: true,
                tail: LogTail::new(),
            });
            return Ok(handle);
        }

        let backend = self.spawn(binary)?;
        let handle = backend.handle.clone();
        *tracked = Some(backend);
        Ok(handle)
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        if !handle.is_owned() {
            return true;
        }
        let mut tracked = self.tracked.lock().await;
        match tracked.as_mut() {
            Some(current) if current.matches(handle) => current
                .child
                .as_mut()
                .is_some_and(|child| matches!(child.try_wait(), Ok(None))),
            _ => false,
        }
    }

    async fn confirm_healthy(&self, handle: &ProcessHandle) {
        let mut tracked = self.tracked.lock().await;
        if let Some(current) = tracked.as_mut().filter(|c| c.matches(handle)) {
            current.confirmed = true;
        }
    }

    async fn stop(&self, handle: &ProcessHandle) {
        let mut tracked = self.tracked.lock().await;
        if !tracked.as_ref().is_some_and(|c| c.matches(handle)) {
            debug!(pid = ?handle.pid, "Stop requested for an untracked backend");
            return;
        }
        if let Some(backend) = tracked.take() {
            self.terminate(backend).await;
        }
    }

    async fn shutdown(&self) {
        let backend = self.tracked.lock().await.take();
        if let Some(backend) = backend {
            self.terminate(backend).await;
        }
    }
}

impl LocalProcessSupervisor {
    async fn terminate(&self, backend: TrackedBackend) {
        let Some(mut child) = backend.child else {
            debug!("Disowning externally managed backend");
            return;
        };
        let pid = backend.handle.pid;
        if let Ok(Some(status)) = child.try_wait() {
            warn!(
                ?pid,
                output = ?backend.tail.lines(),
                "Releasing backend that already exited: {}",
                describe_exit(status, backend.tail.last())
            );
            return;
        }
        debug!(?pid, "Stopping backend process");
        match shutdown_child(&mut child, self.grace).await {
            Ok(status) => info!(?pid, %status, "Backend process stopped"),
            Err(e) => warn!(?pid, "Failed to stop backend process: {}", e),
        }
    }
}

// Drop cannot await a graceful shutdown; kill synchronously as a best effort.
impl Drop for LocalProcessSupervisor {
    fn drop(&mut self) {
        if let Some(backend) = self.tracked.get_mut().as_mut() {
            if let Some(child) = backend.child.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}

fn describe_exit(status: ExitStatus, last_line: Option<String>) -> String {
    match last_line {
        Some(line) => format!("{status}; last output: {line}"),
        None => status.to_string(),
    }
}

fn is_transient_spawn_error(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        if e.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32) {
            return true;
        }
    }
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use gemi_core::HealthStatus;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SwitchableHealth(AtomicBool);

    #[async_trait]
    impl HealthClient for SwitchableHealth {
        async fn probe(&self, _timeout: Duration) -> Result<HealthStatus, ProbeError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(HealthStatus::ready())
            } else {
                Err(ProbeError::Unreachable("connection refused".into()))
            }
        }
    }

    fn supervisor(script: &str, reachable: bool) -> LocalProcessSupervisor {
        let settings = BackendSettings {
            serve_args: vec!["-c".to_string(), script.to_string()],
            ..BackendSettings::default()
        };
        LocalProcessSupervisor::new(&settings, Arc::new(SwitchableHealth(AtomicBool::new(reachable))))
            .with_grace_period(Duration::from_millis(500))
    }

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn second_call_reuses_running_child() {
        let sup = supervisor("sleep 30", false);
        let first = sup.ensure_running(&sh()).await.unwrap();
        let second = sup.ensure_running(&sh()).await.unwrap();

        assert!(first.is_owned());
        assert_eq!(first.pid, second.pid);
        assert!(sup.is_alive(&first).await);

        sup.stop(&first).await;
        assert!(!sup.is_alive(&first).await);
    }

    #[tokio::test]
    async fn reachable_backend_is_external_and_never_spawned() {
        let sup = supervisor("exit 1", true);
        let handle = sup
            .ensure_running(Path::new("/nonexistent/gemi-server"))
            .await
            .unwrap();
        assert!(!handle.is_owned());
        assert!(sup.is_alive(&handle).await);
        sup.stop(&handle).await;
    }

    struct MisbehavingHealth;

    #[async_trait]
    impl HealthClient for MisbehavingHealth {
        async fn probe(&self, _timeout: Duration) -> Result<HealthStatus, ProbeError> {
            Err(ProbeError::Malformed("unexpected HTTP 404".into()))
        }
    }

    #[tokio::test]
    async fn misbehaving_listener_counts_as_running() {
        let sup = LocalProcessSupervisor::new(&BackendSettings::default(), Arc::new(MisbehavingHealth));
        let handle = sup.ensure_running(&sh()).await.unwrap();

        assert!(!handle.is_owned());
        assert_eq!(handle.pid, None);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn stopping_a_crashed_child_allows_a_fresh_launch() {
        let sup = supervisor("exit 3", false);
        let first = sup.ensure_running(&sh()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!sup.is_alive(&first).await);

        sup.stop(&first).await;
        let second = sup.ensure_running(&sh()).await.unwrap();
        assert!(second.is_owned());
        assert_ne!(second.started_at, first.started_at);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn exit_before_confirmation_is_crashed_early() {
        let sup = supervisor("echo 'out of memory' >&2; exit 7", false);
        let handle = sup.ensure_running(&sh()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!sup.is_alive(&handle).await);
        let err = sup.ensure_running(&sh()).await.unwrap_err();
        assert!(matches!(err, LaunchError::CrashedEarly { .. }));

        // The crash is reported once; the next call launches again
        let relaunched = sup.ensure_running(&sh()).await.unwrap();
        assert_ne!(relaunched.started_at, handle.started_at);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn exit_after_confirmation_relaunches() {
        let sup = supervisor("exit 0", false);
        let handle = sup.ensure_running(&sh()).await.unwrap();
        sup.confirm_healthy(&handle).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(sup.ensure_running(&sh()).await.is_ok());
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let sup = supervisor("sleep 1", false);
        let err = sup
            .ensure_running(Path::new("/nonexistent/gemi-server"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LaunchError::BinaryMissing(PathBuf::from("/nonexistent/gemi-server"))
        );
    }

    #[tokio::test]
    async fn child_receives_bind_address() {
        let sup = supervisor("echo \"$GEMI_HOST:$GEMI_PORT $TOKENIZERS_PARALLELISM\"; sleep 30", false);
        let handle = sup.ensure_running(&sh()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let output = sup.tracked.lock().await.as_ref().unwrap().tail.lines();
        assert_eq!(output, vec!["127.0.0.1:11435 false".to_string()]);
        sup.stop(&handle).await;
    }
}
