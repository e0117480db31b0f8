use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

/// Resource and capability policy for one container invocation. Deny by
/// default: when not privileged, every capability is dropped and only the
/// listed ones are granted back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLimits {
    pub memory: String,
    pub cpu_shares: u32,
    pub pids_limit: u32,
    pub privileged: bool,
    pub capabilities: Vec<String>,
}

/// Everything needed to start one execution unit.
#[derive(Debug, Clone)]
pub struct ContainerInvocation {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    /// Host path to container path bind mounts (trace output directory).
    pub mounts: Vec<(PathBuf, String)>,
    pub limits: ContainerLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRunOutput {
    pub exit_success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ContainerRunOutput),
    TimedOut,
}

/// Seam between the orchestrator and the container engine. Production uses
/// the docker CLI; tests substitute a scripted fake.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool>;
    async fn build_image(&self, image: &str, build_context: &Path) -> Result<()>;
    async fn run(
        &self,
        invocation: &ContainerInvocation,
        timeout: Duration,
        output_cap_bytes: usize,
    ) -> Result<RunOutcome>;
    /// Reads the retained logs of a finished container (empty-output
    /// recovery path).
    async fn fetch_logs(&self, container_name: &str) -> Result<String>;
    /// Best-effort forced removal; an already-gone container is success.
    async fn force_remove(&self, container_name: &str) -> Result<()>;
}

/// Shells out to the docker CLI via `tokio::process`. Credential values are
/// passed through the spawned process environment (`-e KEY` form), never on
/// the command line, so process listings stay clean.
#[derive(Debug, Clone)]
pub struct DockerContainerRunner {
    docker_binary: String,
}

impl DockerContainerRunner {
    pub fn new(docker_binary: impl Into<String>) -> Self {
        Self {
            docker_binary: docker_binary.into(),
        }
    }

    fn base_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.docker_binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ContainerRunner for DockerContainerRunner {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self
            .base_command()
            .args(["image", "inspect", image])
            .output()
            .await
            .with_context(|| format!("failed to invoke {} image inspect", self.docker_binary))?;
        Ok(output.status.success())
    }

    async fn build_image(&self, image: &str, build_context: &Path) -> Result<()> {
        tracing::info!(%image, context = %build_context.display(), "building execution image");
        let output = self
            .base_command()
            .args(["build", "-t", image])
            .arg(build_context)
            .output()
            .await
            .with_context(|| format!("failed to invoke {} build", self.docker_binary))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "image build for '{image}' failed: {}",
                tail_lines(&stderr, 20)
            );
        }
        Ok(())
    }

    async fn run(
        &self,
        invocation: &ContainerInvocation,
        timeout: Duration,
        output_cap_bytes: usize,
    ) -> Result<RunOutcome> {
        let mut command = self.base_command();
        command.args(["run", "--name", &invocation.name]);
        if invocation.limits.privileged {
            command.arg("--privileged");
        } else {
            command.arg("--cap-drop=ALL");
            for capability in &invocation.limits.capabilities {
                command.arg(format!("--cap-add={capability}"));
            }
            command.arg("--security-opt=no-new-privileges");
            command.arg(format!("--memory={}", invocation.limits.memory));
            command.arg(format!("--cpu-shares={}", invocation.limits.cpu_shares));
            command.arg(format!("--pids-limit={}", invocation.limits.pids_limit));
        }
        for (host_path, container_path) in &invocation.mounts {
            command.arg("-v");
            command.arg(format!("{}:{container_path}", host_path.display()));
        }
        for (key, value) in &invocation.env {
            command.arg("-e").arg(key);
            command.env(key, value);
        }
        command.arg(&invocation.image);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {} run", self.docker_binary))?;
        let mut stdout = child
            .stdout
            .take()
            .context("container stdout pipe unavailable")?;
        let mut stderr = child
            .stderr
            .take()
            .context("container stderr pipe unavailable")?;

        let collected = tokio::time::timeout(timeout, async {
            let (stdout_buf, stderr_buf) =
                match read_capped_streams(&mut stdout, &mut stderr, output_cap_bytes).await {
                    Ok(buffers) => buffers,
                    Err(error) => {
                        let _ = child.start_kill();
                        return Err(error);
                    }
                };
            let status = child
                .wait()
                .await
                .context("failed to await container exit")?;
            anyhow::Ok(ContainerRunOutput {
                exit_success: status.success(),
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            })
        })
        .await;

        match collected {
            Ok(output) => Ok(RunOutcome::Completed(output?)),
            Err(_elapsed) => Ok(RunOutcome::TimedOut),
        }
    }

    async fn fetch_logs(&self, container_name: &str) -> Result<String> {
        let output = self
            .base_command()
            .args(["logs", container_name])
            .output()
            .await
            .with_context(|| format!("failed to invoke {} logs", self.docker_binary))?;
        if !output.status.success() {
            bail!(
                "log retrieval for '{container_name}' failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn force_remove(&self, container_name: &str) -> Result<()> {
        let output = self
            .base_command()
            .args(["rm", "-f", container_name])
            .output()
            .await
            .with_context(|| format!("failed to invoke {} rm", self.docker_binary))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // An already-removed container is the desired end state.
            if !stderr.contains("No such container") {
                tracing::warn!(container = %container_name, stderr = %stderr.trim(), "container removal reported an error");
            }
        }
        Ok(())
    }
}

/// Drains both streams concurrently, failing as soon as either passes the
/// cap. A container that overflows the cap and keeps writing would otherwise
/// block on a full pipe with stderr never reaching EOF, and the run would sit
/// out the whole wall-clock timeout.
async fn read_capped_streams<R1, R2>(
    stdout: &mut R1,
    stderr: &mut R2,
    cap: usize,
) -> Result<(Vec<u8>, Vec<u8>)>
where
    R1: tokio::io::AsyncRead + Unpin,
    R2: tokio::io::AsyncRead + Unpin,
{
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut stdout_chunk = [0u8; 8192];
    let mut stderr_chunk = [0u8; 8192];
    let mut stdout_open = true;
    let mut stderr_open = true;
    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read(&mut stdout_chunk), if stdout_open => {
                let count = read.context("failed to read container stdout")?;
                if count == 0 {
                    stdout_open = false;
                } else {
                    stdout_buf.extend_from_slice(&stdout_chunk[..count]);
                    if stdout_buf.len() > cap {
                        bail!("container stdout exceeded the {cap}-byte output buffer limit");
                    }
                }
            }
            read = stderr.read(&mut stderr_chunk), if stderr_open => {
                let count = read.context("failed to read container stderr")?;
                if count == 0 {
                    stderr_open = false;
                } else {
                    stderr_buf.extend_from_slice(&stderr_chunk[..count]);
                    if stderr_buf.len() > cap {
                        bail!("container stderr exceeded the {cap}-byte output buffer limit");
                    }
                }
            }
        }
    }
    Ok((stdout_buf, stderr_buf))
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn tail_lines_keeps_the_last_lines_only() {
        let text = (1..=30).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 5);
        assert_eq!(tail, "26\n27\n28\n29\n30");
        assert_eq!(tail_lines("one\ntwo", 5), "one\ntwo");
    }

    #[tokio::test]
    async fn capped_read_collects_both_streams_under_the_limit() {
        let (mut stdout_writer, mut stdout_reader) = tokio::io::duplex(1024);
        let (mut stderr_writer, mut stderr_reader) = tokio::io::duplex(1024);
        stdout_writer.write_all(b"hello").await.expect("write stdout");
        stderr_writer.write_all(b"warn").await.expect("write stderr");
        drop(stdout_writer);
        drop(stderr_writer);

        let (stdout_buf, stderr_buf) =
            read_capped_streams(&mut stdout_reader, &mut stderr_reader, 1024)
                .await
                .expect("reads under the cap succeed");
        assert_eq!(stdout_buf, b"hello");
        assert_eq!(stderr_buf, b"warn");
    }

    #[tokio::test]
    async fn overflow_on_one_stream_fails_without_waiting_for_the_other() {
        let (mut stdout_writer, mut stdout_reader) = tokio::io::duplex(64 * 1024);
        // The stderr writer stays open, so that stream never reaches EOF.
        let (_stderr_writer, mut stderr_reader) = tokio::io::duplex(64);
        stdout_writer
            .write_all(&[b'x'; 2048])
            .await
            .expect("write stdout");

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            read_capped_streams(&mut stdout_reader, &mut stderr_reader, 1024),
        )
        .await
        .expect("overflow must surface before the deadline");
        let error = result.expect_err("overflow should fail the read");
        assert!(error.to_string().contains("output buffer limit"));
    }
}
