//! Bridge to engines that run outside this process
//!
//! External engines (spaCy, Stanza, SoMaJo) are reached through a small
//! JSON-lines protocol over a child process's stdin/stdout:
//!
//! ```text
//! -> {"id":1,"method":"inspect","params":{"engine":"spacy","model":"en_core_web_md"}}
//! <- {"id":1,"result":{"components":["tok2vec","tagger","parser","ner"]}}
//! ```
//!
//! Methods: `inspect` (list model components), `load` (load the model with
//! options), `annotate` (run on units, returning engine-native documents).
//!
//! Two transports:
//! - `SubprocessBridge`: spawns the configured bridge program (production)
//! - `ScriptedBridge`: returns preconfigured responses (testing)

use super::types::ResolvedStep;
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

/// Errors from bridge operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge not available: {0}")]
    Unavailable(String),
    #[error("engine reported: {0}")]
    Remote(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Transport for one bridge session.
///
/// Abstracts over how the engine is reached so adapters don't depend on
/// subprocess details.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

/// Starts bridge sessions for a given engine
#[async_trait]
pub trait BridgeLauncher: Send + Sync {
    async fn launch(&self, engine: &str) -> Result<Box<dyn BridgeTransport>, BridgeError>;
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    result: Option<Value>,
    error: Option<BridgeFault>,
}

#[derive(Debug, Deserialize)]
struct BridgeFault {
    message: String,
}

/// Launches `program args... <engine>` as a bridge process
#[derive(Debug, Clone)]
pub struct BridgeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BridgeCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for BridgeCommand {
    fn default() -> Self {
        Self::new("python3", vec!["-m".into(), "annotator_bridge".into()])
    }
}

#[async_trait]
impl BridgeLauncher for BridgeCommand {
    async fn launch(&self, engine: &str) -> Result<Box<dyn BridgeTransport>, BridgeError> {
        Ok(Box::new(SubprocessBridge::spawn(self, engine)?))
    }
}

/// Bridge session backed by a child process
pub struct SubprocessBridge {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    request_id: u64,
}

impl SubprocessBridge {
    fn spawn(command: &BridgeCommand, engine: &str) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .arg(engine)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Unavailable(format!("failed to start '{}': {}", command.program, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Unavailable("no stdin available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Unavailable("no stdout available".to_string()))?;

        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
            request_id: 0,
        })
    }
}

#[async_trait]
impl BridgeTransport for SubprocessBridge {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, BridgeError> {
        self.request_id += 1;
        let request = BridgeRequest {
            id: self.request_id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| BridgeError::Protocol(format!("failed to serialize request: {}", e)))?;
        line.push('\n');

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::Unavailable(format!("failed to write request: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BridgeError::Unavailable(format!("failed to flush stdin: {}", e)))?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .await
            .map_err(|e| BridgeError::Unavailable(format!("failed to read response: {}", e)))?;
        if read == 0 {
            return Err(BridgeError::Unavailable("bridge closed its output".to_string()));
        }

        let response: BridgeResponse = serde_json::from_str(&reply)
            .map_err(|e| BridgeError::Protocol(format!("failed to parse response: {}", e)))?;
        if response.id != self.request_id {
            return Err(BridgeError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, self.request_id
            )));
        }
        if let Some(fault) = response.error {
            return Err(BridgeError::Remote(fault.message));
        }
        response
            .result
            .ok_or_else(|| BridgeError::Protocol("empty response".to_string()))
    }
}

/// Record of one call made through a scripted bridge
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub engine: String,
    pub method: String,
    pub params: Value,
}

/// Scripted launcher for testing: responds per method from a fixed table
/// and records every call.
#[derive(Clone, Default)]
pub struct ScriptedBridge {
    responses: HashMap<String, Result<Value, BridgeError>>,
    launch_error: Option<BridgeError>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for a method
    pub fn with_response(mut self, method: impl Into<String>, response: Value) -> Self {
        self.responses.insert(method.into(), Ok(response));
        self
    }

    /// Register a failure for a method
    pub fn with_failure(mut self, method: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .insert(method.into(), Err(BridgeError::Remote(message.into())));
        self
    }

    /// Make every launch fail
    pub fn unavailable(mut self) -> Self {
        self.launch_error = Some(BridgeError::Unavailable(
            "scripted bridge configured as unavailable".to_string(),
        ));
        self
    }

    /// Calls recorded so far, across all sessions
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recorded calls for one method
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

struct ScriptedSession {
    engine: String,
    script: ScriptedBridge,
}

#[async_trait]
impl BridgeLauncher for ScriptedBridge {
    async fn launch(&self, engine: &str) -> Result<Box<dyn BridgeTransport>, BridgeError> {
        if let Some(err) = &self.launch_error {
            return Err(err.clone());
        }
        Ok(Box::new(ScriptedSession {
            engine: engine.to_string(),
            script: self.clone(),
        }))
    }
}

#[async_trait]
impl BridgeTransport for ScriptedSession {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, BridgeError> {
        if let Ok(mut calls) = self.script.calls.lock() {
            calls.push(RecordedCall {
                engine: self.engine.clone(),
                method: method.to_string(),
                params,
            });
        }
        match self.script.responses.get(method) {
            Some(response) => response.clone(),
            None => Err(BridgeError::Protocol(format!(
                "no scripted response for method '{}'",
                method
            ))),
        }
    }
}

/// An open bridge session, stored as engine handle state
pub(crate) struct BridgeSession {
    transport: Box<dyn BridgeTransport>,
    engine: String,
}

impl BridgeSession {
    /// Launch a session and list the components the model provides
    pub(crate) async fn open(
        launcher: &dyn BridgeLauncher,
        engine: &str,
        model: &str,
        language: &str,
    ) -> AnnotatorResult<(Self, Vec<String>)> {
        let load_err = |e: BridgeError| AnnotatorError::EngineLoad {
            engine: engine.to_string(),
            model: model.to_string(),
            reason: e.to_string(),
        };

        let mut transport = launcher.launch(engine).await.map_err(load_err)?;
        let inspected = transport
            .call(
                "inspect",
                json!({ "engine": engine, "model": model, "language": language }),
            )
            .await
            .map_err(load_err)?;
        let components: Vec<String> = inspected
            .get("components")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| load_err(BridgeError::Protocol(format!("bad component list: {}", e))))?
            .unwrap_or_default();
        debug!(engine, model, ?components, "inspected model");

        Ok((
            Self {
                transport,
                engine: engine.to_string(),
            },
            components,
        ))
    }

    /// Load the model with engine-specific parameters
    pub(crate) async fn load(&mut self, model: &str, params: Value) -> AnnotatorResult<()> {
        self.transport
            .call("load", params)
            .await
            .map(|_| ())
            .map_err(|e| AnnotatorError::EngineLoad {
                engine: self.engine.clone(),
                model: model.to_string(),
                reason: e.to_string(),
            })
    }

    /// Annotate units, returning the engine-native `docs` payload
    pub(crate) async fn annotate(&mut self, units: &[String], no_ssplit: bool) -> AnnotatorResult<Value> {
        let engine = self.engine.clone();
        let invocation_err = |reason: String| AnnotatorError::EngineInvocation {
            engine: engine.clone(),
            reason,
        };
        let result = self
            .transport
            .call("annotate", json!({ "units": units, "no_ssplit": no_ssplit }))
            .await
            .map_err(|e| invocation_err(e.to_string()))?;
        result
            .get("docs")
            .cloned()
            .ok_or_else(|| invocation_err("response has no 'docs' field".to_string()))
    }
}

/// Check every resolved step against the components the loaded model has.
///
/// Steps listed in `implicit` are always available (e.g. tokenization).
pub(crate) fn ensure_components(
    engine: &str,
    model: &str,
    steps: &[ResolvedStep],
    components: &[String],
    implicit: &[&str],
    hint: Option<String>,
) -> AnnotatorResult<()> {
    for step in steps {
        if implicit.contains(&step.native) || components.iter().any(|c| c == step.native) {
            continue;
        }
        return Err(AnnotatorError::UnsupportedStep {
            engine: engine.to_string(),
            model: model.to_string(),
            step: step.column.clone(),
            hint,
        });
    }
    Ok(())
}

/// Decode an engine-native payload into the adapter's native type
pub(crate) fn decode_docs<T: serde::de::DeserializeOwned>(engine: &str, docs: Value) -> AnnotatorResult<T> {
    serde_json::from_value(docs).map_err(|e| AnnotatorError::EngineInvocation {
        engine: engine.to_string(),
        reason: format!("unexpected output shape: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_bridge_returns_response_and_records_call() {
        let script = ScriptedBridge::new()
            .with_response("inspect", json!({ "components": ["tagger", "ner"] }));
        let (_session, components) = BridgeSession::open(&script, "spacy", "en_core_web_md", "en")
            .await
            .unwrap();

        assert_eq!(components, vec!["tagger", "ner"]);
        let calls = script.calls_to("inspect");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].engine, "spacy");
        assert_eq!(calls[0].params["model"], "en_core_web_md");
    }

    #[tokio::test]
    async fn unavailable_bridge_is_a_load_error() {
        let script = ScriptedBridge::new().unavailable();
        let err = BridgeSession::open(&script, "stanza", "en", "en")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AnnotatorError::EngineLoad { ref engine, .. } if engine == "stanza"));
    }

    #[tokio::test]
    async fn annotate_failure_is_an_invocation_error() {
        let script = ScriptedBridge::new()
            .with_response("inspect", json!({ "components": [] }))
            .with_failure("annotate", "CUDA out of memory");
        let (mut session, _) = BridgeSession::open(&script, "spacy", "m", "en").await.unwrap();
        let err = session.annotate(&["Hi.".to_string()], false).await.unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let command = BridgeCommand::new("definitely-not-an-annotator-bridge", vec![]);
        let err = command.launch("spacy").await.err().unwrap();
        assert!(matches!(err, BridgeError::Unavailable(_)));
    }
}
