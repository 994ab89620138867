//! Spawning the external interpreter.
//!
//! The substituted script text is passed as the last command-line argument.
//! Output is captured in full, and the child is killed if it outlives the
//! timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// The external program that runs script text, e.g. `osascript -e <text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
}

impl Interpreter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new("osascript", vec!["-e".to_string()])
    }
}

/// What the interpreter left behind when it finished.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Why the interpreter did not finish normally.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Script timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Run `text` through `interpreter`, waiting at most `timeout`.
pub async fn run(
    interpreter: &Interpreter,
    text: &str,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(&interpreter.program);
    cmd.args(&interpreter.args)
        .arg(text)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the output future on timeout kills the child.
        .kill_on_drop(true);

    let spawn_error = |source| ProcessError::Spawn {
        program: interpreter.program.clone(),
        source,
    };

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }),
        Ok(Err(e)) => Err(spawn_error(e)),
        Err(_elapsed) => Err(ProcessError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> Interpreter {
        Interpreter::new("sh", vec!["-c".to_string()])
    }

    #[test]
    fn test_default_interpreter_is_osascript() {
        let interp = Interpreter::default();
        assert_eq!(interp.program, "osascript");
        assert_eq!(interp.args, vec!["-e"]);
    }

    #[tokio::test]
    async fn test_run_captures_streams() {
        let out = run(&sh(), "echo out; echo err >&2", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let out = run(&sh(), "exit 3", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let interp = Interpreter::new("scriptbook-no-such-interpreter", Vec::new());
        let err = run(&interp, "x", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err
            .to_string()
            .starts_with("Failed to start 'scriptbook-no-such-interpreter'"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let err = run(&sh(), "sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Script timed out after 100ms");
    }
}
