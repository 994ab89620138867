//! Script executor — validates arguments, fills placeholders and runs the
//! result through the external interpreter.
//!
//! Execution never returns an error: spawn failures, timeouts and stderr
//! output all end up in [`ExecutionResult`], so one failing script does not
//! stop a caller running several. Argument validation is the exception; it
//! happens before anything runs and is reported as [`ValidationError`].

mod process;
mod template;
mod validate;

pub use process::Interpreter;
pub use template::substitute;
pub use validate::{validate_args, ValidationError};

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::registry::{ArgMap, ScriptDefinition};

/// Default execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Outcome of one script execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock milliseconds from spawn to completion.
    pub execution_time: u64,
}

impl ExecutionResult {
    fn ok(output: String, execution_time: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time,
        }
    }

    fn failed(error: String, execution_time: u64) -> Self {
        let error = if error.trim().is_empty() {
            "Unknown execution error".to_string()
        } else {
            error
        };
        Self {
            success: false,
            output: None,
            error: Some(error),
            execution_time,
        }
    }
}

/// Runs script text through an external interpreter.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    interpreter: Interpreter,
    timeout: Duration,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new(Interpreter::default(), DEFAULT_TIMEOUT)
    }
}

impl ScriptExecutor {
    pub fn new(interpreter: Interpreter, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }

    /// Validate `args` against `script`'s parameters, then execute it.
    ///
    /// Defaults for missing optional parameters are filled in before
    /// substitution.
    pub async fn run(
        &self,
        script: &ScriptDefinition,
        mut args: ArgMap,
    ) -> Result<ExecutionResult, ValidationError> {
        validate_args(&mut args, &script.args).into_result()?;
        let result = self.execute(&script.script, &args).await;
        debug!(
            script = %script.name,
            success = result.success,
            elapsed_ms = result.execution_time,
            "ran registered script"
        );
        Ok(result)
    }

    /// Substitute `args` into `text` and run it. Never fails; problems are
    /// reported through the result.
    pub async fn execute(&self, text: &str, args: &ArgMap) -> ExecutionResult {
        let start = Instant::now();
        let processed = substitute(text, args);

        let outcome = process::run(&self.interpreter, &processed, self.timeout).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(out) => {
                let stderr = out.stderr.trim();
                if !stderr.is_empty() {
                    ExecutionResult::failed(stderr.to_string(), elapsed)
                } else if out.exit_code != Some(0) {
                    let status = out
                        .exit_code
                        .map_or_else(|| "signal".to_string(), |c| c.to_string());
                    ExecutionResult::failed(
                        format!("Interpreter exited with status {status}"),
                        elapsed,
                    )
                } else {
                    ExecutionResult::ok(out.stdout.trim().to_string(), elapsed)
                }
            }
            Err(e) => ExecutionResult::failed(e.to_string(), elapsed),
        };

        if let Some(error) = &result.error {
            warn!(
                interpreter = %self.interpreter.program,
                elapsed_ms = elapsed,
                error = %error,
                "script execution failed"
            );
        } else {
            debug!(interpreter = %self.interpreter.program, elapsed_ms = elapsed, "script executed");
        }

        result
    }
}
