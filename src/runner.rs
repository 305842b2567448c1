//! External process execution.
//!
//! A [`ProcessRunner`] launches one computation, drains stdout and stderr
//! concurrently, and resolves the exit code plus both buffers into an [`Outcome`].
//! It never returns anything but an `Outcome`: launch failures, bad output and
//! non-zero exits are all folded into [`ComputationError`].

use crate::error::ComputationError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// How a successful process's stdout is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Stdout must be a JSON document.
    Json,
    /// Stdout is kept verbatim.
    Text,
    /// Stdout must be a single number, either bare or as a JSON string.
    Numeric,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

pub type Outcome = Result<Payload, ComputationError>;

/// Fully resolved command line for one computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub decode: DecodeMode,
    pub timeout: Option<Duration>,
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RawExit {
    #[cfg(test)]
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Outcome;
}

/// Runs computations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    async fn capture(invocation: &Invocation) -> Result<RawExit, ComputationError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ComputationError::Launch(format!("{}: {e}", invocation.program)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ComputationError::Launch("stdout was not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ComputationError::Launch("stderr was not captured".into()))?;

        let finished = {
            // Both pipes are read while waiting so a chatty child can never block on a full pipe.
            let drain = async {
                let mut out = Vec::new();
                let mut err = Vec::new();
                let (out_res, err_res, status) = tokio::join!(
                    stdout.read_to_end(&mut out),
                    stderr.read_to_end(&mut err),
                    child.wait()
                );
                out_res?;
                err_res?;
                let status = status?;
                Ok::<_, std::io::Error>(RawExit {
                    code: status.code(),
                    stdout: out,
                    stderr: err,
                })
            };
            match invocation.timeout {
                Some(limit) => tokio::time::timeout(limit, drain).await.ok(),
                None => Some(drain.await),
            }
        };

        match finished {
            Some(Ok(exit)) => Ok(exit),
            Some(Err(e)) => Err(ComputationError::Launch(format!(
                "lost contact with {}: {e}",
                invocation.program
            ))),
            None => {
                let limit = invocation.timeout.unwrap_or_default();
                warn!(program = %invocation.program, ?limit, "computation timed out, killing");
                let _ = child.kill().await;
                Err(ComputationError::Timeout(limit))
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(&self, invocation: &Invocation) -> Outcome {
        let exit = Self::capture(invocation).await?;
        debug!(
            program = %invocation.program,
            code = ?exit.code,
            stdout_bytes = exit.stdout.len(),
            stderr_bytes = exit.stderr.len(),
            "process exited"
        );
        resolve(exit, invocation.decode)
    }
}

/// Error envelope printed on stdout by failing scripts.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<String>,
}

/// Turn an exit status and captured streams into an outcome.
pub fn resolve(exit: RawExit, mode: DecodeMode) -> Outcome {
    let stdout = String::from_utf8_lossy(&exit.stdout);
    if exit.code == Some(0) {
        return decode(&stdout, mode);
    }
    Err(ComputationError::Remote(remote_message(&stdout, &exit.stderr)))
}

fn decode(stdout: &str, mode: DecodeMode) -> Outcome {
    let trimmed = stdout.trim();
    match mode {
        DecodeMode::Text => Ok(Payload::Text(stdout.to_string())),
        DecodeMode::Json => serde_json::from_str(trimmed)
            .map(Payload::Json)
            .map_err(|_| ComputationError::Parse(trimmed.to_string())),
        DecodeMode::Numeric => numeric(trimmed)
            .map(|n| Payload::Json(Value::Number(n)))
            .ok_or_else(|| ComputationError::Parse(trimmed.to_string())),
    }
}

fn numeric(text: &str) -> Option<serde_json::Number> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Number(n)) => Some(n),
        Ok(Value::String(s)) => s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64),
        _ => text.parse::<f64>().ok().and_then(serde_json::Number::from_f64),
    }
}

fn remote_message(stdout: &str, stderr: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(stdout.trim()) {
        if let Some(message) = envelope.message.or(envelope.error) {
            return message;
        }
    }
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        "unknown failure".to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner used by gateway, wizard and controller tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::sync::Mutex;

    enum Scripted {
        Exit(RawExit),
        Fail(ComputationError),
    }

    /// Replays canned exits keyed by script file name, in FIFO order per script.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn exit(&self, script: &str, code: i32, stdout: &str, stderr: &str) -> &Self {
            self.push(script, Scripted::Exit(RawExit::new(code, stdout, stderr)))
        }

        pub(crate) fn json(&self, script: &str, body: serde_json::Value) -> &Self {
            self.exit(script, 0, &body.to_string(), "")
        }

        pub(crate) fn launch_error(&self, script: &str, message: &str) -> &Self {
            self.push(script, Scripted::Fail(ComputationError::Launch(message.into())))
        }

        fn push(&self, script: &str, response: Scripted) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .entry(script.to_string())
                .or_default()
                .push_back(response);
            self
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Script file names in call order.
        pub(crate) fn scripts_called(&self) -> Vec<String> {
            self.calls().iter().map(script_name).collect()
        }
    }

    fn script_name(invocation: &Invocation) -> String {
        invocation
            .args
            .first()
            .and_then(|a| Path::new(a).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> Outcome {
            self.calls.lock().unwrap().push(invocation.clone());
            let script = script_name(invocation);
            let next = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&script)
                .and_then(|q| q.pop_front());
            match next {
                Some(Scripted::Exit(exit)) => resolve(exit, invocation.decode),
                Some(Scripted::Fail(err)) => Err(err),
                None => Err(ComputationError::Launch(format!(
                    "no scripted response for {script}"
                ))),
            }
        }
    }
}
