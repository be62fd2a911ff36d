//! SSH runner.
//!
//! Thin wrapper over the system ssh client. The key material arrives as
//! PEM bytes on the config; it is written to a private temp file for the
//! duration of a single command.

use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use super::{ExecResult, Runner};

#[derive(Debug, Clone)]
pub struct SshRunnerConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub key: Vec<u8>,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub struct SshRunner {
    config: SshRunnerConfig,
}

impl SshRunner {
    pub fn new(config: SshRunnerConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(Error::InvalidArguments(
                "ssh runner needs a host".to_string(),
            ));
        }
        if config.user.is_empty() {
            return Err(Error::InvalidArguments(
                "ssh runner needs a user".to_string(),
            ));
        }
        Ok(SshRunner { config })
    }

    fn write_identity(&self) -> Result<tempfile::NamedTempFile> {
        let mut identity = tempfile::NamedTempFile::new()
            .map_err(|err| Error::Internal(format!("ssh identity file: {}", err)))?;
        identity
            .write_all(&self.config.key)
            .map_err(|err| Error::Internal(format!("ssh identity file: {}", err)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                identity.path(),
                std::fs::Permissions::from_mode(0o600),
            )
            .map_err(|err| Error::Internal(format!("ssh identity perms: {}", err)))?;
        }

        Ok(identity)
    }
}

#[async_trait]
impl Runner for SshRunner {
    async fn run(&self, ctx: &CancellationToken, script: &str) -> Result<ExecResult> {
        let identity = self.write_identity()?;

        let mut child = Command::new("ssh")
            .arg("-i")
            .arg(identity.path())
            .arg("-p")
            .arg(&self.config.port)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.timeout_secs))
            .arg(format!("{}@{}", self.config.user, self.config.host))
            .arg("bash -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::Internal(format!("spawn ssh: {}", err)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("ssh stdin unavailable".to_string()))?;
        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|err| Error::Internal(format!("write ssh stdin: {}", err)))?;
        drop(stdin);

        let output_fut = child.wait_with_output();
        tokio::pin!(output_fut);

        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            output = &mut output_fut => {
                output.map_err(|err| Error::Internal(format!("wait ssh: {}", err)))?
            }
        };

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, user: &str) -> SshRunnerConfig {
        SshRunnerConfig {
            host: host.to_string(),
            port: "22".to_string(),
            user: user.to_string(),
            key: b"key-bytes".to_vec(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = SshRunner::new(config("", "root")).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn empty_user_is_rejected() {
        let err = SshRunner::new(config("10.0.0.4", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn identity_file_holds_key_bytes() {
        let runner = SshRunner::new(config("10.0.0.4", "root")).unwrap();
        let identity = runner.write_identity().unwrap();
        let data = std::fs::read(identity.path()).unwrap();
        assert_eq!(data, b"key-bytes");
    }
}
