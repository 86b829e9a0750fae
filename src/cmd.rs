use crate::errors::DiscoveryError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Grace period between graceful termination and hard kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Output of a deadline-bounded subprocess run. On timeout, `stdout` holds
/// whatever the child wrote before termination; parsers whose grammar
/// tolerates truncation may still consume it.
#[derive(Debug)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub success: bool,
}

/// Run a command with a hard deadline. On deadline: SIGTERM, then SIGKILL
/// after the grace period.
pub async fn run_with_deadline(
    program: &str,
    args: &[&str],
    deadline: Duration,
) -> Result<CmdOutput, DiscoveryError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DiscoveryError::CommandError(format!("{}: {}", program, e)))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    // Drain both pipes concurrently so a chatty child can't deadlock on a
    // full pipe buffer, and so partial stdout survives a timeout kill.
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let (timed_out, success) = match timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => (false, status.success()),
        Ok(Err(e)) => {
            return Err(DiscoveryError::CommandError(format!("{}: {}", program, e)));
        }
        Err(_) => {
            terminate(&mut child, KILL_GRACE).await;
            (true, false)
        }
    };

    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

    Ok(CmdOutput {
        stdout,
        stderr,
        timed_out,
        success,
    })
}

/// Convenience wrapper: run and return stdout, treating timeout or non-zero
/// exit as an error. For parsers that need complete output or nothing.
pub async fn run_complete(
    program: &str,
    args: &[&str],
    deadline: Duration,
) -> Result<String, DiscoveryError> {
    let out = run_with_deadline(program, args, deadline).await?;
    if out.timed_out {
        return Err(DiscoveryError::CommandError(format!(
            "{}: killed after {:?}",
            program, deadline
        )));
    }
    if !out.success {
        let reason = out.stderr.lines().next().unwrap_or("non-zero exit");
        return Err(DiscoveryError::CommandError(format!(
            "{}: {}",
            program, reason
        )));
    }
    Ok(out.stdout)
}

/// SIGTERM first; escalate to SIGKILL when the child has not exited within
/// `grace`. tokio only exposes SIGKILL, the graceful half goes through libc.
pub async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
