use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

pub async fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Option<Vec<u8>> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(err) => {
            debug!(tool = %program, error = %err, "tool unavailable");
            return None;
        }
    };

    match time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => Some(output.stdout),
        Ok(Ok(output)) => {
            debug!(tool = %program, status = %output.status, "tool exited with failure");
            None
        }
        Ok(Err(err)) => {
            debug!(tool = %program, error = %err, "failed to collect tool output");
            None
        }
        Err(_elapsed) => {
            warn!(tool = %program, timeout_ms = timeout.as_millis() as u64, "tool timeout");
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = run_tool("echo", &["hello"], TIMEOUT).await;
        assert_eq!(out.as_deref(), Some(&b"hello\n"[..]));
    }

    #[tokio::test]
    async fn missing_tool_is_absent() {
        assert!(run_tool("/nonexistent/hwprobe-tool", &[], TIMEOUT).await.is_none());
    }

    #[tokio::test]
    async fn non_zero_exit_is_absent() {
        assert!(run_tool("false", &[], TIMEOUT).await.is_none());
    }

    #[tokio::test]
    async fn hung_tool_is_absent_after_timeout() {
        let started = std::time::Instant::now();
        let out = run_tool("sleep", &["10"], Duration::from_millis(200)).await;
        assert!(out.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
