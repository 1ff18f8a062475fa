//! Stanza engine adapter
//!
//! Stanza needs its tokenizer even on pre-segmented input, so in
//! pretokenized mode the adapter keeps `tokenize` in the processor list,
//! switches off sentence splitting, and terminates every sentence with a
//! blank line. Each unit then comes back as exactly one sentence.

use super::bridge::{decode_docs, ensure_components, BridgeLauncher, BridgeSession};
use super::traits::Engine;
use super::types::{Capability, Device, EngineHandle, EngineInput, JobRequest, Layer, RawResult};
use crate::document::{AttrValue, Document};
use crate::error::{AnnotatorError, AnnotatorResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

const CAPABILITIES: &[Capability] = &[
    Capability::structural("tokenize", &["sentencize"]),
    Capability::structural("mwt", &[]),
    Capability::layer("pos", &["upos", "tagger"], Layer::Pos),
    Capability::layer("lemma", &["lemmatizer"], Layer::Lemma),
    Capability::layer("depparse", &["dep", "parse", "parser"], Layer::Dep),
    Capability::layer("ner", &[], Layer::Ner),
];

/// Sentence terminator that stops Stanza from re-splitting a unit
const UNIT_TERMINATOR: &str = "\n\n";

/// Word id: a single position, or a range for a multi-word token
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WordId {
    Single(usize),
    Range(Vec<usize>),
}

/// One entry of Stanza's `Document.to_dict()` output
#[derive(Debug, Clone, Deserialize)]
struct StanzaEntry {
    id: WordId,
    text: String,
    #[serde(default)]
    lemma: Option<String>,
    #[serde(default)]
    upos: Option<String>,
    #[serde(default)]
    deprel: Option<String>,
    #[serde(default)]
    ner: Option<String>,
}

type StanzaSentence = Vec<StanzaEntry>;

/// A surface token and the syntactic words it covers
struct StanzaToken<'a> {
    entry: &'a StanzaEntry,
    words: Vec<&'a StanzaEntry>,
}

impl StanzaToken<'_> {
    fn joined(&self, field: impl Fn(&StanzaEntry) -> Option<&String>) -> AttrValue {
        let parts: Vec<&str> = self
            .words
            .iter()
            .filter_map(|w| field(*w).map(String::as_str))
            .filter(|v| !v.is_empty())
            .collect();
        AttrValue::Single(parts.join("+"))
    }

    fn value(&self, layer: Layer) -> AttrValue {
        match layer {
            Layer::Pos | Layer::Tag => self.joined(|w| w.upos.as_ref()),
            Layer::Lemma => self.joined(|w| w.lemma.as_ref()),
            Layer::Dep => self.joined(|w| w.deprel.as_ref()),
            Layer::Ner => match self.entry.ner.as_deref() {
                None | Some("O") | Some("") => AttrValue::Multi(Vec::new()),
                Some(label) => AttrValue::Multi(vec![label.to_string()]),
            },
            Layer::Morph | Layer::Ruler | Layer::Linker => AttrValue::Single(String::new()),
        }
    }
}

/// Group entries into surface tokens, folding multi-word tokens
fn group_tokens(entries: &[StanzaEntry]) -> Vec<StanzaToken<'_>> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let entry = &entries[i];
        match &entry.id {
            WordId::Range(range) if range.len() == 2 => {
                let (lo, hi) = (range[0], range[1]);
                let mut words = Vec::new();
                let mut j = i + 1;
                while let Some(next) = entries.get(j) {
                    match next.id {
                        WordId::Single(n) if n >= lo && n <= hi => {
                            words.push(next);
                            j += 1;
                        }
                        _ => break,
                    }
                }
                tokens.push(StanzaToken { entry, words });
                i = j;
            }
            _ => {
                tokens.push(StanzaToken {
                    entry,
                    words: vec![entry],
                });
                i += 1;
            }
        }
    }
    tokens
}

/// A unit on one line, so only the terminator can end its sentence
fn single_line(unit: &str) -> String {
    unit.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Engine adapter for Stanza pipelines
pub struct StanzaEngine {
    launcher: Arc<dyn BridgeLauncher>,
}

impl StanzaEngine {
    pub fn new(launcher: Arc<dyn BridgeLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Engine for StanzaEngine {
    fn id(&self) -> &str {
        "stanza"
    }

    fn name(&self) -> &str {
        "Stanza"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn build(&self, job: &JobRequest) -> AnnotatorResult<EngineHandle> {
        let model = job.model.clone().unwrap_or_else(|| job.language.clone());
        let steps = self.resolve_steps(job, &model)?;

        let (mut session, components) =
            BridgeSession::open(self.launcher.as_ref(), self.id(), &model, &job.language).await?;
        ensure_components(self.id(), &model, &steps, &components, &[], None)?;

        let mut processors: Vec<&str> = Vec::new();
        if job.pretokenized {
            processors.push("tokenize");
        }
        for step in &steps {
            if !processors.contains(&step.native) {
                processors.push(step.native);
            }
        }
        let processors = processors.join(",");
        info!(model = %model, processors = %processors, "loading Stanza pipeline");

        // pass-through options first; the keys that carry validated steps and
        // the segmentation mode always win
        let mut params = json!({ "use_gpu": !matches!(job.device, Device::RequireCpu) });
        if let Some(options) = job.options.as_object() {
            for (key, value) in options {
                params[key.as_str()] = value.clone();
            }
        }
        params["lang"] = json!(job.language);
        params["processors"] = json!(processors);
        params["tokenize_no_ssplit"] = json!(job.pretokenized);
        match &job.model {
            Some(dir) => params["dir"] = json!(dir),
            None => {
                if let Some(map) = params.as_object_mut() {
                    map.remove("dir");
                }
            }
        }
        session.load(&model, params).await?;

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
            EngineInput::Sentences(sentences) => {
                let text: String = sentences
                    .iter()
                    .map(|s| format!("{}{}", single_line(s), UNIT_TERMINATOR))
                    .collect();
                session.annotate(&[text], true).await?
            }
        };
        let docs: Vec<Vec<StanzaSentence>> = decode_docs(self.id(), docs)?;
        debug!(docs = docs.len(), "Stanza returned");
        Ok(RawResult::new(&input, docs))
    }

    fn normalize(&self, handle: &EngineHandle, raw: RawResult) -> AnnotatorResult<Document> {
        let docs = raw
            .data::<Vec<Vec<StanzaSentence>>>()
            .ok_or_else(|| AnnotatorError::EngineInvocation {
                engine: self.id().to_string(),
                reason: "raw result was not produced by this engine".to_string(),
            })?;
        let sentences: Vec<&StanzaSentence> = docs.iter().flatten().collect();
        let layers: Vec<(&str, Layer)> = handle.layers().collect();
        let mut builder = Document::builder(self.id(), &handle.job.job_id).columns(handle.columns());

        // unit texts only when the counts agree; the assembler reports any divergence
        let unit_texts = raw.pretokenized && sentences.len() == raw.units.len();
        for (i, sentence) in sentences.iter().enumerate() {
            let text = unit_texts.then(|| raw.units[i].trim().to_string());
            builder.begin_sentence(text).sentence_attr("sent_id", i.to_string());
            for token in group_tokens(sentence) {
                let record = builder.token(token.entry.text.as_str());
                for (column, layer) in &layers {
                    record.set(*column, token.value(*layer));
                }
            }
        }
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bridge::ScriptedBridge;

    fn script(docs: serde_json::Value) -> ScriptedBridge {
        ScriptedBridge::new()
            .with_response(
                "inspect",
                json!({ "components": ["tokenize", "mwt", "pos", "lemma", "depparse", "ner"] }),
            )
            .with_response("load", json!({}))
            .with_response("annotate", json!({ "docs": docs }))
    }

    #[tokio::test]
    async fn pretokenized_build_forces_tokenizer_without_splitting() {
        let script = script(json!([]));
        let engine = StanzaEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("stanza", "job", vec!["pos".into(), "lemma".into()]).pretokenized(true);
        engine.build(&job).await.unwrap();

        let load = &script.calls_to("load")[0];
        assert_eq!(load.params["processors"], "tokenize,pos,lemma");
        assert_eq!(load.params["tokenize_no_ssplit"], true);
    }

    #[tokio::test]
    async fn sentences_are_terminated_by_blank_lines() {
        let script = script(json!([[
            [{ "id": 1, "text": "Dogs", "lemma": "dog" }, { "id": 2, "text": "bark", "lemma": "bark" }],
            [{ "id": 1, "text": "Cats", "lemma": "cat" }]
        ]]));
        let engine = StanzaEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("stanza", "job", vec!["lemma".into()]).pretokenized(true);
        let mut handle = engine.build(&job).await.unwrap();
        let input = EngineInput::Sentences(vec!["Dogs bark".into(), "Cats".into()]);
        let raw = engine.apply(&mut handle, input).await.unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();

        let annotate = &script.calls_to("annotate")[0];
        assert_eq!(annotate.params["units"][0], "Dogs bark\n\nCats\n\n");
        assert_eq!(annotate.params["no_ssplit"], true);
        assert_eq!(doc.sentence_texts(), vec!["Dogs bark", "Cats"]);
        assert_eq!(doc.sentences()[1].tokens()[0].index, 2);
        assert_eq!(doc.sentences()[1].attribute("sent_id"), Some("1"));
    }

    #[tokio::test]
    async fn options_cannot_override_processors_or_segmentation() {
        let script = script(json!([]));
        let engine = StanzaEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("stanza", "job", vec!["lemma".into()])
            .with_options(json!({
                "tokenize_no_ssplit": false,
                "processors": "tokenize,ner",
                "dir": "/elsewhere",
                "tokenize_batch_size": 64,
            }))
            .pretokenized(true);
        let handle = engine.build(&job).await.unwrap();

        let load = &script.calls_to("load")[0];
        assert_eq!(load.params["processors"], "tokenize,lemma");
        assert_eq!(load.params["tokenize_no_ssplit"], true);
        assert_eq!(load.params["lang"], "en");
        assert!(load.params.get("dir").is_none());
        assert_eq!(load.params["tokenize_batch_size"], 64);
        assert_eq!(handle.columns(), vec!["lemma"]);
    }

    #[tokio::test]
    async fn blank_lines_inside_a_unit_do_not_split_it() {
        let script = script(json!([[
            [{ "id": 1, "text": "Title", "lemma": "title" }, { "id": 2, "text": "Body", "lemma": "body" }]
        ]]));
        let engine = StanzaEngine::new(Arc::new(script.clone()));
        let job = JobRequest::new("stanza", "job", vec!["lemma".into()]).pretokenized(true);
        let mut handle = engine.build(&job).await.unwrap();
        let input = EngineInput::Sentences(vec!["Title\n\n  Body\n".into()]);
        engine.apply(&mut handle, input).await.unwrap();

        let annotate = &script.calls_to("annotate")[0];
        assert_eq!(annotate.params["units"][0], "Title Body\n\n");
    }

    #[tokio::test]
    async fn multi_word_tokens_stay_one_token() {
        let script = script(json!([[[
            { "id": [1, 2], "text": "zum", "ner": "O" },
            { "id": 1, "text": "zu", "lemma": "zu", "upos": "ADP" },
            { "id": 2, "text": "dem", "lemma": "der", "upos": "DET" },
            { "id": 3, "text": "Haus", "lemma": "Haus", "upos": "NOUN", "ner": "S-LOC" }
        ]]]));
        let engine = StanzaEngine::new(Arc::new(script));
        let job = JobRequest::new("stanza", "job", vec!["pos".into(), "lemma".into(), "ner".into()])
            .with_language("de");
        let mut handle = engine.build(&job).await.unwrap();
        let raw = engine
            .apply(&mut handle, EngineInput::Text("zum Haus".into()))
            .await
            .unwrap();
        let doc = engine.normalize(&handle, raw).unwrap();

        let tokens = doc.sentences()[0].tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "zum");
        assert_eq!(tokens[0].attribute("pos").unwrap().render(), "ADP+DET");
        assert_eq!(tokens[0].attribute("lemma").unwrap().render(), "zu+der");
        assert_eq!(tokens[0].attribute("ner").unwrap().render(), "_");
        assert_eq!(tokens[1].attribute("ner").unwrap().render(), "S-LOC");
    }

    #[tokio::test]
    async fn step_missing_from_language_is_rejected() {
        let script = ScriptedBridge::new()
            .with_response("inspect", json!({ "components": ["tokenize", "pos"] }))
            .with_response("load", json!({}));
        let engine = StanzaEngine::new(Arc::new(script));
        let job = JobRequest::new("stanza", "job", vec!["ner".into()]).with_language("la");
        let err = engine.build(&job).await.unwrap_err();
        assert!(matches!(err, AnnotatorError::UnsupportedStep { ref model, .. } if model == "la"));
    }
}
