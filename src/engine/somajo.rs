//! SoMaJo engine adapter
//!
//! SoMaJo only splits sentences and tokenizes; it produces no annotation
//! columns and is normally used as the segmenting engine.

use super::bridge::{decode_docs, ensure_components, BridgeLauncher, BridgeSession};
use super::traits::Engine;
use super::types::{Capability, EngineHandle, EngineInput, JobRequest, RawResult};
use crate::document::Document;
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const CAPABILITIES: &[Capability] = &[
    Capability::structural("sentencize", &["split_sentences", "senter"]),
    Capability::structural("tokenize", &[]),
];

/// Tokenizer model for a language
fn default_model(language: &str) -> Option<&'static str> {
    match language {
        "de" => Some("de_CMC"),
        "en" => Some("en_PTB"),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SomajoToken {
    text: String,
    #[serde(default)]
    space_after: bool,
}

/// Engine adapter for the SoMaJo tokenizer
pub struct SomajoEngine {
    launcher: Arc<dyn BridgeLauncher>,
}

impl SomajoEngine {
    pub fn new(launcher: Arc<dyn BridgeLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Engine for SomajoEngine {
    fn id(&self) -> &str {
        "somajo"
    }

    fn name(&self) -> &str {
        "SoMaJo"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
        let model = match &job.model {
            Some(model) => model.clone(),
            None => default_model(&job.language)
                .map(str::to_string)
                .ok_or_else(|| {
                    AnnotatorError::Configuration(format!(
                        "SoMaJo has no tokenizer for language '{}'",
                        job.language
                    ))
                })?,
        };
        let steps = self.resolve_steps(job, &model)?;

        let (mut session, components) =
            BridgeSession::open(self.launcher.as_ref(), self.id(), &model, &job.language).await?;
        ensure_components(self.id(), &model, &steps, &components, &["tokenize"], None)?;

        let split_camel_case = job
            .options
            .get("split_camel_case")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        session
            .load(
                &model,
                json!({
                    "language": model,
                    "split_camel_case": split_camel_case,
                    "split_sentences": !job.pretokenized,
                }),
            )
            .await?;

        Ok(EngineHandle::new(job.clone(), model, steps, session))
    }

    async fn apply(&self, handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult> {
        let session = handle
            .state_mut::<BridgeSession>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "handle was not built by this engine".to_string(),
            })?;
        let docs = match &input {
            EngineInput::Text(text) => session.annotate(std::slice::from_ref(text), false).await?,
            EngineInput::Sentences(sentences) => session.annotate(sentences, true).await?,
        };
        let sentences: Vec<Vec<SomajoToken>> = decode_docs(self.id(), docs)?;
        Ok(RawResult::new(&input, sentences))
    }

    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document> {
        let sentences = raw
            .data::<Vec<Vec<SomajoToken>>>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "raw result was not produced by this engine".to_string(),
            })?;
        let mut builder = Document::builder(self.id(), &handle.job.job_id);
        for sentence in sentences {
            let mut text = String::new();
            for token in sentence {
                text.push_str(&token.text);
                if token.space_after {
                    text.push(' ');
                }
            }
            builder.begin_sentence(Some(text.trim_end().to_string()));
            for token in sentence {
                builder.token(token.text.as_str());
            }
        }
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bridge::ScriptedBridge;

    #[tokio::test]
    async fn sentences_keep_original_spacing() {
        let script = ScriptedBridge::new()
            .with_response("inspect", json!({ "components": ["sentencize"] }))
            .with_response("load", json!({}))
            .with_response(
                "annotate",
                json!({ "docs": [
                    [{ "text": "Hallo", "space_after": false }, { "text": "!", "space_after": true }],
                    [{ "text": "Wie", "space_after": true }, { "text": "geht's", "space_after": false }, { "text": "?" }]
                ]}),
            );
        let engine = SomajoEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("somajo", "job", vec!["sentencize".into(), "tokenize".into()])
            .with_language("de");
        let mut handle = engine.build(&job).await.unwrap();
        let raw = engine
            .apply(&mut handle, EngineInput::Text("Hallo! Wie geht's?".into()))
            .await
            .unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();

        assert_eq!(handle.model, "de_CMC");
        assert_eq!(doc.sentence_texts(), vec!["Hallo!", "Wie geht's?"]);
        assert!(doc.columns().is_empty());
        assert_eq!(script.calls_to("load")[0].params["split_sentences"], true);
    }

    #[tokio::test]
    async fn unsupported_language_fails_before_launch() {
        let script = ScriptedBridge::new();
        let engine = SomajoEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("somajo", "job", vec![]).with_language("fr");
        assert!(engine.build(&job).await.unwrap_err().is_configuration());
        assert!(script.calls().is_empty());
    }
}
