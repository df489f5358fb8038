//! Proxy engine supervision
//!
//! Starts and stops the external xray process bound to one runtime config.
//! Readiness is established by polling the local listener until it accepts a
//! TCP connection, bounded by a timeout; a fixed warm-up sleep would race
//! under load.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::error::{CheckerError, Result};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READINESS_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const SPAWN_GRACE: Duration = Duration::from_millis(50);

/// A running proxy engine bound to one runtime config
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    config_path: PathBuf,
}

impl ProcessHandle {
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Supervises the external proxy engine process
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    binary: String,
    readiness_timeout: Duration,
}

impl ProcessSupervisor {
    pub fn new(binary: String, readiness_timeout: Duration) -> Self {
        Self {
            binary,
            readiness_timeout,
        }
    }

    /// Launch the engine with the given runtime config.
    ///
    /// Detects engines that exit immediately (missing binary is caught by the
    /// spawn itself, a malformed config by the early exit check).
    pub async fn start(&self, config_path: &Path) -> Result<ProcessHandle> {
        let mut child = Command::new(&self.binary)
            .arg("-c")
            .arg(config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Backstop only; the pipeline stops every handle explicitly.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CheckerError::ProcessStart(format!("cannot spawn {}: {}", self.binary, e))
            })?;

        sleep(SPAWN_GRACE).await;
        if let Some(status) = child.try_wait()? {
            return Err(CheckerError::ProcessStart(format!(
                "{} exited immediately with {}",
                self.binary, status
            )));
        }

        debug!(
            pid = child.id(),
            config = %config_path.display(),
            "proxy engine started"
        );

        Ok(ProcessHandle {
            child,
            config_path: config_path.to_path_buf(),
        })
    }

    /// Poll the engine's local listener until it accepts a connection.
    ///
    /// Distinguishes an engine that died (`ProcessStart`) from one that never
    /// bound its listener in time (`ReadinessTimeout`).
    pub async fn wait_ready(
        &self,
        handle: &mut ProcessHandle,
        listen: &str,
        port: u16,
    ) -> Result<()> {
        let addr = format!("{}:{}", listen, port);
        let deadline = Instant::now() + self.readiness_timeout;

        loop {
            if let Some(status) = handle.child.try_wait()? {
                return Err(CheckerError::ProcessStart(format!(
                    "{} exited with {} before becoming ready",
                    self.binary, status
                )));
            }

            if let Ok(Ok(_)) = timeout(READINESS_CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
                debug!(addr = %addr, "proxy engine ready");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(CheckerError::ReadinessTimeout {
                    addr,
                    timeout_secs: self.readiness_timeout.as_secs(),
                });
            }

            sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    /// Terminate the engine and reap it.
    ///
    /// Called on every pipeline exit path once a handle exists; never
    /// propagates an error so that stopping stays exempt from per-job
    /// failure isolation.
    pub async fn stop(&self, mut handle: ProcessHandle) {
        if let Err(e) = handle.child.start_kill() {
            // Already exited; wait below still reaps it.
            debug!(config = %handle.config_path.display(), "kill signal not delivered: {}", e);
        }

        match handle.child.wait().await {
            Ok(status) => {
                debug!(
                    config = %handle.config_path.display(),
                    status = %status,
                    "proxy engine stopped"
                );
            }
            Err(e) => {
                warn!(
                    config = %handle.config_path.display(),
                    "failed to reap proxy engine: {}", e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_start_missing_binary() {
        let supervisor = ProcessSupervisor::new(
            "definitely-not-a-real-binary".to_string(),
            Duration::from_secs(1),
        );
        let err = supervisor.start(Path::new("/tmp/none.json")).await.unwrap_err();
        assert!(matches!(err, CheckerError::ProcessStart(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_detects_immediate_exit() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "fail.sh", "#!/bin/sh\nexit 1\n");

        let supervisor = ProcessSupervisor::new(script, Duration::from_secs(1));
        let err = supervisor.start(Path::new("/tmp/none.json")).await.unwrap_err();
        assert!(matches!(err, CheckerError::ProcessStart(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_reaps_process() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "#!/bin/sh\nexec sleep 30\n");

        let supervisor = ProcessSupervisor::new(script, Duration::from_secs(1));
        let handle = supervisor.start(Path::new("/tmp/none.json")).await.unwrap();
        let pid = handle.id().expect("running child has a pid");

        supervisor.stop(handle).await;

        // Reaped children disappear from /proc.
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_ready_connects() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "#!/bin/sh\nexec sleep 30\n");

        // Stand in for the engine's listener.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let supervisor = ProcessSupervisor::new(script, Duration::from_secs(2));
        let mut handle = supervisor.start(Path::new("/tmp/none.json")).await.unwrap();

        supervisor
            .wait_ready(&mut handle, "127.0.0.1", port)
            .await
            .unwrap();

        supervisor.stop(handle).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_ready_times_out_on_closed_port() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "#!/bin/sh\nexec sleep 30\n");

        // Bind then drop to find a port that is closed.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let supervisor = ProcessSupervisor::new(script, Duration::from_millis(400));
        let mut handle = supervisor.start(Path::new("/tmp/none.json")).await.unwrap();

        let err = supervisor
            .wait_ready(&mut handle, "127.0.0.1", port)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckerError::ReadinessTimeout { .. }));

        supervisor.stop(handle).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_ready_detects_dead_engine() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "engine.sh", "#!/bin/sh\nsleep 0.2\n");

        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let supervisor = ProcessSupervisor::new(script, Duration::from_secs(5));
        let mut handle = supervisor.start(Path::new("/tmp/none.json")).await.unwrap();

        let err = supervisor
            .wait_ready(&mut handle, "127.0.0.1", port)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckerError::ProcessStart(_)));

        supervisor.stop(handle).await;
    }
}
