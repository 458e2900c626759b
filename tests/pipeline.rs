//! End-to-end pipeline tests: files on disk → index → answers.
//!
//! The hosted models are replaced by the offline `HashingEmbedder` and a
//! scripted generator that records the prompts it receives.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use lorekeeper::chat::run_chat;
use lorekeeper::config::{parse_config, Config};
use lorekeeper::embedding::{Embedder, HashingEmbedder};
use lorekeeper::error::{RagError, Result};
use lorekeeper::generation::Generator;
use lorekeeper::index::VectorIndex;
use lorekeeper::ingest::build_index;
use lorekeeper::prompt::{PromptTemplate, NO_ANSWER_PHRASE};
use lorekeeper::qa::QaEngine;

struct ScriptedGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("pharmacy.txt"),
        "Inside the pharmacy back room you will find the safe code 2591 scrawled on a note.",
    )
    .unwrap();
    fs::write(
        dir.join("weapons.md"),
        "The crossbow is picked up in the theater basement during Seattle Day 2.",
    )
    .unwrap();
    fs::write(
        dir.join("story.txt"),
        "Ellie and Dina ride horseback through Jackson before heading west.",
    )
    .unwrap();
}

fn test_config(root: &Path) -> Config {
    let text = format!(
        r#"
[documents]
root = "{root}/guides"
include_globs = ["**/*.txt", "**/*.md"]

[index]
path = "{root}/data/index.json"

[chunking]
chunk_size = 120
overlap = 20

[retrieval]
k = 2

[embedding]
provider = "hashing"
model = "hashing-256"
dims = 256
"#,
        root = root.display()
    );
    parse_config(&text, |_| None).unwrap()
}

async fn built_engine(tmp: &TempDir, generator: Arc<ScriptedGenerator>) -> (Config, QaEngine) {
    write_corpus(&tmp.path().join("guides"));
    let config = test_config(tmp.path());
    let embedder = Arc::new(HashingEmbedder::new(256));

    let (index, summary) = build_index(&config, embedder.as_ref()).await.unwrap();
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.dims, 256);
    index.persist(&config.index.path).unwrap();

    let loaded = VectorIndex::load(&config.index.path).unwrap();
    let engine = QaEngine::from_parts(
        Arc::new(loaded),
        embedder,
        generator,
        PromptTemplate::default(),
        config.retrieval.k,
    );
    (config, engine)
}

#[tokio::test]
async fn safe_code_question_retrieves_the_right_document() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new("The safe code is 2591.");
    let (_, engine) = built_engine(&tmp, generator.clone()).await;

    let answer = engine.answer("What is the safe code?", true).await.unwrap();
    assert_eq!(answer.text, "The safe code is 2591.");

    let sources = answer.sources.unwrap();
    assert!(sources.len() <= 2);
    assert!(sources.iter().any(|s| s.source_path == "pharmacy.txt"));

    let prompt = generator.last_prompt();
    assert!(prompt.contains("2591"));
    assert!(prompt.contains("Question: What is the safe code?"));
}

#[tokio::test]
async fn missing_answer_prompt_tells_model_to_say_so() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new(NO_ANSWER_PHRASE);
    let (_, engine) = built_engine(&tmp, generator.clone()).await;

    engine
        .answer("Who composed the soundtrack?", false)
        .await
        .unwrap();
    assert!(generator.last_prompt().contains(NO_ANSWER_PHRASE));
}

#[tokio::test]
async fn persisted_index_searches_like_the_built_one() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("guides"));
    let config = test_config(tmp.path());
    let embedder = HashingEmbedder::new(256);

    let (built, _) = build_index(&config, &embedder).await.unwrap();
    built.persist(&config.index.path).unwrap();
    let loaded = VectorIndex::load(&config.index.path).unwrap();

    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.embedding_model(), "hashing-256");
    for q in ["crossbow theater", "Ellie Jackson", "pharmacy note", "nothing relevant"] {
        let v = embedder.embed_query(q).await.unwrap();
        let a = built.search(&v, 5).unwrap();
        let b = loaded.search(&v, 5).unwrap();
        let ids_a: Vec<&str> = a.iter().map(|r| r.chunk.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids_a, ids_b, "query {:?}", q);
    }
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new("ok");
    let (config, _) = built_engine(&tmp, generator).await;
    let before = fs::read(&config.index.path).unwrap();

    // Remove every document: the rebuild must fail before anything is written.
    fs::remove_dir_all(tmp.path().join("guides")).unwrap();
    fs::create_dir_all(tmp.path().join("guides")).unwrap();
    let embedder = HashingEmbedder::new(256);
    assert!(build_index(&config, &embedder).await.is_err());

    assert_eq!(fs::read(&config.index.path).unwrap(), before);
}

#[tokio::test]
async fn missing_index_is_fatal_at_startup() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    match QaEngine::from_config(&config) {
        Err(RagError::IndexLoad { path, .. }) => assert_eq!(path, config.index.path),
        Err(other) => panic!("expected IndexLoad, got {}", other),
        Ok(_) => panic!("engine started without an index"),
    }
}

#[tokio::test]
async fn invalid_template_is_fatal_at_startup() {
    let tmp = TempDir::new().unwrap();
    let (mut config, _) = built_engine(&tmp, ScriptedGenerator::new("ok")).await;
    config.prompt.template = Some("Context only: {context}".to_string());
    assert!(matches!(
        QaEngine::from_config(&config),
        Err(RagError::InvalidTemplate(_))
    ));
}

#[tokio::test]
async fn chat_loop_answers_until_exit() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new("It is 2591.");
    let (_, engine) = built_engine(&tmp, generator.clone()).await;

    let input = b"What is the safe code?\n\nEXIT\nnever asked\n" as &[u8];
    let mut out = Vec::new();
    run_chat(&engine, input, &mut out).await.unwrap();

    let out = String::from_utf8(out).unwrap();
    assert_eq!(out.matches("Result: It is 2591.").count(), 1);
    assert!(out.contains("Source Documents:"));
    assert!(out.contains("pharmacy.txt"));
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);
}
