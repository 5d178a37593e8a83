//! Dependency installation into a staging directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Hard limit on a single dependency install.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Environment variable naming the Python interpreter used for installs.
pub const ENV_PYTHON: &str = "MAESTRO_PYTHON";

/// Longest stderr tail kept in an install failure.
const STDERR_TAIL: usize = 2000;

/// Why an install did not complete. Never fatal to packaging.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("dependency installation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed to start installer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("installer exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("installer I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs a requirements file into a target directory.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(
        &self,
        requirements_file: &Path,
        target: &Path,
    ) -> std::result::Result<(), InstallError>;
}

/// `python -m pip install --target` with a hard timeout.
#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: PathBuf,
    timeout: Duration,
}

impl Default for PipInstaller {
    fn default() -> Self {
        let python = std::env::var_os(ENV_PYTHON)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(if cfg!(windows) { "python" } else { "python3" }));
        Self {
            python,
            timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }
}

impl PipInstaller {
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl DependencyInstaller for PipInstaller {
    async fn install(
        &self,
        requirements_file: &Path,
        target: &Path,
    ) -> std::result::Result<(), InstallError> {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "pip", "install", "-r"])
            .arg(requirements_file)
            .arg("--target")
            .arg(target)
            .args(["--upgrade", "--no-cache-dir"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child must not outlive a timed-out wait.
            .kill_on_drop(true);

        tracing::info!(
            requirements = %requirements_file.display(),
            "Installing dependencies into bundle (this may take several minutes)"
        );
        let child = cmd.spawn().map_err(|source| InstallError::Spawn {
            program: self.python.display().to_string(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(InstallError::TimedOut(self.timeout)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(InstallError::Exited {
                status: output.status.to_string(),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "Installer reported warnings");
        }
        Ok(())
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max_chars).collect();
    format!("...{}", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_interpreter_is_spawn_error() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let req = temp.path().join("requirements.txt");
        std::fs::write(&req, "requests\n").unwrap();

        let installer = PipInstaller::default().with_python("/nonexistent/bin/python-maestro");
        let err = installer.install(&req, temp.path()).await.unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }), "got {:?}", err);
    }

    #[test]
    fn default_timeout_is_fifteen_minutes() {
        assert_eq!(PipInstaller::default().timeout(), Duration::from_secs(900));
    }

    #[test]
    fn tail_keeps_end_of_output() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("abcdef", 3), "...def");
    }

    #[test]
    fn timeout_message_names_duration() {
        let err = InstallError::TimedOut(Duration::from_secs(900));
        assert_eq!(
            err.to_string(),
            "dependency installation timed out after 900s"
        );
    }
}
