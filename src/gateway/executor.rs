//! Process execution gateway.
//!
//! Launches one worker subprocess per call with:
//! - Per-worker concurrency cap
//! - Deadline enforcement (process killed on expiry)
//! - Cancellation through a `CancellationToken`
//! - Byte-exact stdout/stderr capture
//!
//! Each worker leads its own process group. Every way out of a call, including
//! the call future being dropped, kills that group, so helpers a worker starts
//! (`npx` spawning `node`, say) do not outlive it.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::types::InvocationResult;
use crate::registry::{WorkerDescriptor, WorkerRegistry};

/// Read buffer size for worker output streams.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default invocation deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Spawns worker processes described by the registry.
#[derive(Debug)]
pub struct ProcessGateway {
    registry: Arc<WorkerRegistry>,
    /// One semaphore per registered worker, fixed at construction.
    limits: HashMap<String, Arc<Semaphore>>,
    timeout: Duration,
    spawned: AtomicU64,
}

enum Completion {
    Exited(std::io::Result<(Vec<u8>, Vec<u8>, ExitStatus)>),
    TimedOut,
    Cancelled,
}

impl ProcessGateway {
    /// Create a gateway with the given default concurrency cap per worker.
    pub fn new(registry: Arc<WorkerRegistry>, max_concurrency_per_worker: usize) -> Self {
        let limits = registry
            .ids()
            .into_iter()
            .filter_map(|id| registry.get(id))
            .map(|desc| {
                let permits = desc
                    .max_concurrency
                    .unwrap_or(max_concurrency_per_worker)
                    .max(1);
                (desc.id.clone(), Arc::new(Semaphore::new(permits)))
            })
            .collect();

        Self {
            registry,
            limits,
            timeout: DEFAULT_TIMEOUT,
            spawned: AtomicU64::new(0),
        }
    }

    /// Create a gateway from the service configuration.
    pub fn from_config(registry: Arc<WorkerRegistry>, config: &GatewayConfig) -> Self {
        Self::new(registry, config.max_concurrency_per_worker)
            .with_timeout(config.invocation_timeout)
    }

    /// Set the per-invocation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Number of processes this gateway has attempted to start.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Run a worker to completion.
    pub async fn execute(
        &self,
        worker_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<InvocationResult, GatewayError> {
        self.execute_with_cancel(worker_id, payload, &CancellationToken::new())
            .await
    }

    /// Run a worker to completion, killing it if `cancel` fires first.
    ///
    /// Time spent waiting for a concurrency permit counts against the deadline.
    pub async fn execute_with_cancel(
        &self,
        worker_id: &str,
        payload: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, GatewayError> {
        let descriptor = self
            .registry
            .get(worker_id)
            .ok_or_else(|| GatewayError::ConfigNotFound {
                worker: worker_id.to_string(),
            })?;
        let limit = self
            .limits
            .get(worker_id)
            .ok_or_else(|| GatewayError::Internal(format!("no concurrency limit for {worker_id}")))?;

        let argv = build_argv(descriptor, payload)?;
        let start = Instant::now();
        let deadline = start + self.timeout;

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GatewayError::Cancelled { worker: worker_id.to_string() });
            }
            permit = tokio::time::timeout_at(deadline, limit.acquire()) => match permit {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    return Err(GatewayError::Internal(format!(
                        "concurrency limit for {worker_id} closed"
                    )));
                }
                Err(_) => {
                    warn!(worker = %worker_id, "Timed out waiting for a free worker slot");
                    return Err(self.timeout_error(worker_id));
                }
            },
        };

        let mut child = self.spawn(descriptor, &argv)?;
        let mut group = ProcessGroup::new(worker_id, child.id());
        info!(worker = %worker_id, pid = ?child.id(), "Spawned worker process");

        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => Completion::Cancelled,
            _ = tokio::time::sleep_until(deadline) => Completion::TimedOut,
            result = collect_output(&mut child, worker_id) => Completion::Exited(result),
        };

        let duration = start.elapsed();
        // Stragglers still holding the group are killed even after a clean exit.
        group.kill();
        match completion {
            Completion::Exited(Ok((stdout, stderr, status))) => {
                let output = String::from_utf8_lossy(&stdout).into_owned();
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                // Killed by a signal has no exit code.
                let code = status.code().unwrap_or(-1);

                if status.success() {
                    info!(
                        worker = %worker_id,
                        duration_ms = duration.as_millis() as u64,
                        output_bytes = output.len(),
                        "Worker completed"
                    );
                    Ok(InvocationResult {
                        success: true,
                        output,
                        stderr,
                        exit_code: code,
                        duration,
                    })
                } else {
                    warn!(worker = %worker_id, exit_code = code, "Worker exited with failure");
                    Err(GatewayError::Process {
                        worker: worker_id.to_string(),
                        code,
                        stderr,
                    })
                }
            }
            Completion::Exited(Err(e)) => {
                terminate(&mut child, worker_id).await;
                Err(GatewayError::Internal(format!(
                    "failed to collect output from {worker_id}: {e}"
                )))
            }
            Completion::TimedOut => {
                warn!(worker = %worker_id, timeout = ?self.timeout, "Worker timed out, killing");
                terminate(&mut child, worker_id).await;
                Err(self.timeout_error(worker_id))
            }
            Completion::Cancelled => {
                info!(worker = %worker_id, "Invocation cancelled, killing worker");
                terminate(&mut child, worker_id).await;
                Err(GatewayError::Cancelled {
                    worker: worker_id.to_string(),
                })
            }
        }
    }

    fn spawn(&self, descriptor: &WorkerDescriptor, argv: &[String]) -> Result<Child, GatewayError> {
        let mut command = Command::new(&descriptor.command);
        command
            .args(argv)
            .envs(&descriptor.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping an in-flight call (caller disconnect) must not leak the process.
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        self.spawned.fetch_add(1, Ordering::Relaxed);
        command.spawn().map_err(|e| GatewayError::Spawn {
            worker: descriptor.id.clone(),
            reason: e.to_string(),
        })
    }

    fn timeout_error(&self, worker_id: &str) -> GatewayError {
        GatewayError::Timeout {
            worker: worker_id.to_string(),
            timeout: self.timeout,
        }
    }
}

/// Base arguments plus `<payload_flag> <json>` when the payload is non-empty.
pub fn build_argv(
    descriptor: &WorkerDescriptor,
    payload: &Map<String, Value>,
) -> Result<Vec<String>, GatewayError> {
    let mut argv = descriptor.args.clone();
    if !payload.is_empty() {
        let encoded = serde_json::to_string(payload)
            .map_err(|e| GatewayError::Internal(format!("failed to encode payload: {e}")))?;
        argv.push(descriptor.payload_flag.clone());
        argv.push(encoded);
    }
    Ok(argv)
}

/// Drain stdout and stderr concurrently, then reap the process.
async fn collect_output(
    child: &mut Child,
    worker_id: &str,
) -> std::io::Result<(Vec<u8>, Vec<u8>, ExitStatus)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr) = tokio::try_join!(
        read_chunks(stdout, worker_id, "stdout"),
        read_chunks(stderr, worker_id, "stderr"),
    )?;
    let status = child.wait().await?;
    Ok((stdout, stderr, status))
}

async fn read_chunks<R>(reader: Option<R>, worker_id: &str, stream: &str) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(collected);
    };

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        trace!(worker = %worker_id, stream, bytes = n, "Worker output chunk");
        collected.extend_from_slice(&buf[..n]);
    }
    Ok(collected)
}

/// The process group a worker leads. Killed at most once, at the latest on drop.
struct ProcessGroup<'a> {
    worker_id: &'a str,
    pgid: Option<u32>,
}

impl<'a> ProcessGroup<'a> {
    fn new(worker_id: &'a str, pgid: Option<u32>) -> Self {
        Self { worker_id, pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid, self.worker_id);
        }
    }
}

impl Drop for ProcessGroup<'_> {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32, worker_id: &str) {
    // SAFETY: killpg only sends a signal; the group was created by our spawn.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        trace!(worker = %worker_id, pgid, error = %e, "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32, _worker_id: &str) {}

/// Kill and reap the direct child.
async fn terminate(child: &mut Child, worker_id: &str) {
    if let Err(e) = child.kill().await {
        debug!(worker = %worker_id, error = %e, "Kill failed (process likely already exited)");
    }
}
