//! Mock engine for orchestration tests
//!
//! Segments with the rule-based splitter and tokenizer, and annotates
//! deterministically: `lemma` is the lowercased token and `pos` is `X`.

use annotator::engine::rule::{split_sentences, tokenize};
use annotator::engine::{Capability, EngineHandle, Layer, RawResult};
use annotator::{AnnotatorError, AnnotatorResult, Document, Engine, EngineInput, JobRequest};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CAPABILITIES: &[Capability] = &[
    Capability::structural("sentencize", &["senter"]),
    Capability::structural("tokenize", &[]),
    Capability::layer("lemma", &["lemmatizer"], Layer::Lemma),
    Capability::layer("pos", &["tagger"], Layer::Pos),
];

/// Shared invocation counters, readable after the engine moved into a registry
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    builds: Arc<AtomicUsize>,
    applies: Arc<AtomicUsize>,
}

impl CallCounts {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

pub struct MockEngine {
    id: &'static str,
    counts: CallCounts,
    can_segment: bool,
    /// In pretokenized mode, split the first token of this sentence in two
    split_sentence: Option<usize>,
    /// In pretokenized mode, drop the last sentence
    drop_last_sentence: bool,
    apply_delay: Option<Duration>,
    fail_load: bool,
}

impl MockEngine {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            counts: CallCounts::default(),
            can_segment: true,
            split_sentence: None,
            drop_last_sentence: false,
            apply_delay: None,
            fail_load: false,
        }
    }

    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }

    pub fn without_segmentation(mut self) -> Self {
        self.can_segment = false;
        self
    }

    pub fn splitting_sentence(mut self, sentence: usize) -> Self {
        self.split_sentence = Some(sentence);
        self
    }

    pub fn dropping_last_sentence(mut self) -> Self {
        self.drop_last_sentence = true;
        self
    }

    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = Some(delay);
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        "Mock engine"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn can_segment(&self) -> bool {
        self.can_segment
    }

    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
        self.counts.builds.fetch_add(1, Ordering::SeqCst);
        let steps = self.resolve_steps(job, "mock-model")?;
        if self.fail_load {
            return Err(AnnotatorError::EngineLoad {
                engine: self.id.to_string(),
                model: "mock-model".to_string(),
                reason: "model files missing".to_string(),
            });
        }
        Ok(EngineHandle::new(job.clone(), "mock-model", steps, ()))
    }

    async fn apply(&self, _handle: &mut EngineHandle, input: EngineInput) -> AnnotatorResult<RawResult> {
        self.counts.applies.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }

        let mut sentences: Vec<Vec<String>> = match &input {
            EngineInput::Text(text) => split_sentences(text).iter().map(|s| tokenize(s)).collect(),
            EngineInput::Sentences(units) => units.iter().map(|u| tokenize(u)).collect(),
        };
        if input.is_pretokenized() {
            let target = self.split_sentence.filter(|i| *i < sentences.len());
            if let Some(i) = target {
                let tokens = &mut sentences[i];
                if !tokens.is_empty() {
                    let first = tokens.remove(0);
                    let (head, tail) = first.split_at(first.len() / 2);
                    tokens.insert(0, tail.to_string());
                    tokens.insert(0, head.to_string());
                }
            }
            if self.drop_last_sentence {
                sentences.pop();
            }
        }
        Ok(RawResult::new(&input, sentences))
    }

    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document> {
        let sentences = raw
            .data::<Vec<Vec<String>>>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id.to_string(),
                reason: "unexpected raw result".to_string(),
            })?;
        let layers: Vec<(String, Layer)> = handle
            .layers()
            .map(|(column, layer)| (column.to_string(), layer))
            .collect();
        let mut builder = Document::builder(self.id, &handle.job.job_id).columns(handle.columns());
        for tokens in sentences {
            builder.begin_sentence(None);
            for text in tokens {
                let token = builder.token(text.as_str());
                for (column, layer) in &layers {
                    let value = match layer {
                        Layer::Lemma => text.to_lowercase(),
                        _ => "X".to_string(),
                    };
                    token.set(column.as_str(), value);
                }
            }
        }
        Ok(builder.finish())
    }
}
