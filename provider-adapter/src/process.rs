use crate::error::ProviderError;
use crate::types::{CommandConfig, RunResult};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

const CHANNEL_CAPACITY: usize = 100;
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024; // 10 MB
#[cfg(unix)]
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Runs the model binary, feeding `input` on stdin and collecting its output.
///
/// Output is accumulated with a hard byte limit. On timeout the child is sent
/// SIGTERM, then SIGKILL once the grace period expires.
pub async fn run_model_command(
    path: &std::path::Path,
    args: Vec<OsString>,
    input: &str,
    config: &CommandConfig,
) -> Result<RunResult, ProviderError> {
    let start_time = Instant::now();

    let mut cmd = Command::new(path);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &config.env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().map_err(|e| ProviderError::SpawnFailed {
        stage: "spawn subprocess".to_string(),
        source: e,
    })?;

    let mut stdin = child.stdin.take().ok_or(ProviderError::NoStdin)?;
    let stdout = child.stdout.take().ok_or(ProviderError::NoStdout)?;
    let stderr = child.stderr.take().ok_or(ProviderError::NoStderr)?;
    let pid = child.id().ok_or(ProviderError::NoPid)?;

    let (stdout_tx, mut stdout_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (stderr_tx, mut stderr_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let mut join_set = JoinSet::new();

    // Written from a task so a child that streams output before draining
    // stdin cannot deadlock against us.
    let input = input.to_owned();
    join_set.spawn(async move {
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            tracing::debug!(event = "stdin_write_failed", error = %e, "stdin_write_failed");
        }
        let _ = stdin.shutdown().await;
    });

    join_set.spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if stdout_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    join_set.spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if stderr_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();
    let mut stdout_bytes = 0;
    let mut stderr_bytes = 0;

    let execution_result = timeout(config.timeout, async {
        loop {
            tokio::select! {
                Some(line) = stdout_rx.recv() => {
                    push_bounded(line, &mut stdout_lines, &mut stdout_bytes)?;
                }
                Some(line) = stderr_rx.recv() => {
                    push_bounded(line, &mut stderr_lines, &mut stderr_bytes)?;
                }
                status = child.wait() => {
                    let status = status.map_err(|e| ProviderError::SpawnFailed {
                        stage: "wait for child".to_string(),
                        source: e,
                    })?;

                    // Readers finish once the pipes close; collect what is left.
                    drain_until_closed(&mut stdout_rx, &mut stdout_lines, &mut stdout_bytes).await?;
                    drain_until_closed(&mut stderr_rx, &mut stderr_lines, &mut stderr_bytes).await?;
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}

                    let duration = start_time.elapsed();
                    let exit_code = status.code().unwrap_or(-1);
                    let stdout = stdout_lines.join("\n");
                    let stderr = stderr_lines.join("\n");

                    if exit_code != 0 {
                        return Err(ProviderError::NonZeroExit {
                            exit_code,
                            pid,
                            elapsed: duration,
                            stdout,
                            stderr,
                        });
                    }

                    return Ok(RunResult {
                        stdout,
                        stderr,
                        exit_code,
                        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }
        }
    })
    .await;

    match execution_result {
        Ok(result) => result,
        Err(_timeout_elapsed) => {
            let elapsed = start_time.elapsed();
            if let Err(e) = shutdown(&mut child, pid).await {
                tracing::warn!(event = "shutdown_failed", pid, error = %e, "shutdown_failed");
            }

            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
            drain_stream_bounded(&mut stdout_rx, &mut stdout_lines, &mut stdout_bytes)?;
            drain_stream_bounded(&mut stderr_rx, &mut stderr_lines, &mut stderr_bytes)?;

            Err(ProviderError::Timeout {
                elapsed,
                pid,
                partial_stdout: stdout_lines.join("\n"),
                partial_stderr: stderr_lines.join("\n"),
            })
        }
    }
}

/// Receive until the reader task hangs up, enforcing the byte limit.
async fn drain_until_closed(
    rx: &mut mpsc::Receiver<String>,
    lines: &mut Vec<String>,
    bytes: &mut usize,
) -> Result<(), ProviderError> {
    while let Some(line) = rx.recv().await {
        push_bounded(line, lines, bytes)?;
    }
    Ok(())
}

/// Drain remaining lines from channel with bounded memory enforcement
fn drain_stream_bounded(
    rx: &mut mpsc::Receiver<String>,
    lines: &mut Vec<String>,
    bytes: &mut usize,
) -> Result<(), ProviderError> {
    while let Ok(line) = rx.try_recv() {
        push_bounded(line, lines, bytes)?;
    }
    Ok(())
}

fn push_bounded(line: String, lines: &mut Vec<String>, bytes: &mut usize) -> Result<(), ProviderError> {
    *bytes += line.len();
    if *bytes > MAX_OUTPUT_BYTES {
        return Err(ProviderError::OutputTruncated {
            captured_bytes: *bytes,
            limit_bytes: MAX_OUTPUT_BYTES,
        });
    }
    lines.push(line);
    Ok(())
}

/// Graceful shutdown: SIGTERM, wait grace period, then SIGKILL
#[cfg(unix)]
async fn shutdown(child: &mut tokio::process::Child, pid: u32) -> Result<(), ProviderError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));

    signal::kill(nix_pid, Signal::SIGTERM).map_err(|e| ProviderError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        source: e,
    })?;

    match timeout(GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_status)) => Ok(()),
        Ok(Err(e)) => Err(ProviderError::SpawnFailed {
            stage: "graceful shutdown wait".to_string(),
            source: e,
        }),
        Err(_) => {
            child.kill().await.map_err(|e| ProviderError::SpawnFailed {
                stage: "SIGKILL".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn shutdown(child: &mut tokio::process::Child, _pid: u32) -> Result<(), ProviderError> {
    child.kill().await.map_err(|e| ProviderError::SpawnFailed {
        stage: "kill".to_string(),
        source: e,
    })
}
