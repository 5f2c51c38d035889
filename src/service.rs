//! The answer pipeline.
//!
//! [`RagService`] is constructed once at process start and shared (behind
//! `Arc`) with every request handler. It owns the read-only vector index,
//! through its [`Retriever`], and the single-writer [`HistoryStore`].
//!
//! # Request flow
//!
//! ```text
//! query ─▶ embed + top-k ─▶ recent turns ─▶ assemble prompt ─▶ generate ─▶ text
//!                                                                   │
//!                              append (user, assistant) + persist ◀─┘
//! ```
//!
//! Any failure before the append step yields the configured fallback text
//! and leaves history untouched. The history lock is held only to read the
//! recent window and to append and persist, never across a remote call, so
//! concurrent requests interleave their remote calls but their appends are
//! serialized. Two concurrent answers may therefore both see the same
//! recent window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{Config, PromptConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::generation::{create_generator, Generator};
use crate::history::HistoryStore;
use crate::ingest::open_or_build_index;
use crate::models::{Role, Turn};
use crate::prompt::assemble;
use crate::retriever::Retriever;

pub struct RagService {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    history: Mutex<HistoryStore>,
    prompt: PromptConfig,
    window: usize,
    embed_timeout: Duration,
    generation_timeout: Duration,
}

impl RagService {
    /// Build providers, open (or build) the index, and load history.
    ///
    /// # Errors
    ///
    /// Only startup-fatal conditions: bad provider configuration, or a
    /// missing index that cannot be rebuilt.
    pub async fn start(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::start_with(config, embedder, generator).await
    }

    /// Like [`start`](Self::start), with caller-supplied providers.
    pub async fn start_with(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let index = open_or_build_index(config, embedder.as_ref()).await?;
        let history = HistoryStore::load(&config.history.path);

        info!(
            chunks = index.len(),
            history_turns = history.len(),
            embedding_model = embedder.model_name(),
            generation_model = generator.model_name(),
            "rag service ready"
        );

        let retriever = Retriever::new(Arc::new(index), embedder, config.retrieval.top_k);
        Ok(Self::from_parts(config, retriever, generator, history))
    }

    /// Assemble a service from already-constructed components.
    pub fn from_parts(
        config: &Config,
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        history: HistoryStore,
    ) -> Self {
        Self {
            retriever,
            generator,
            history: Mutex::new(history),
            prompt: config.prompt.clone(),
            window: config.history.window,
            embed_timeout: config.embedding.timeout(),
            generation_timeout: config.generation.timeout(),
        }
    }

    /// Answer `query`. Always returns text: either the model's answer or
    /// the fallback message.
    pub async fn answer(&self, query: &str) -> String {
        let text = match self.try_answer(query).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "answer failed; returning fallback");
                return self.prompt.fallback.clone();
            }
        };

        let mut history = self.history.lock().await;
        history.append(Role::User, query);
        history.append(Role::Assistant, text.as_str());
        if let Err(e) = history.persist() {
            warn!(error = %e, "failed to persist history; turns kept in memory");
        }
        text
    }

    async fn try_answer(&self, query: &str) -> Result<String> {
        let context = with_timeout(
            "retrieval",
            self.embed_timeout,
            self.retriever.retrieve(query),
        )
        .await?;

        let recent: Vec<Turn> = self.history.lock().await.recent(self.window).to_vec();
        let prompt = assemble(&self.prompt, &context, &recent, query);

        let generation = with_timeout(
            "generation",
            self.generation_timeout,
            self.generator.generate(&prompt),
        )
        .await?;
        generation.into_text()
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| RagError::Timeout { operation, after })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generation;
    use crate::index::{BuildParams, VectorIndex};
    use crate::models::Chunk;
    use crate::prompt::Prompt;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Records every prompt and answers with a fixed reply.
    struct RecordingGenerator {
        prompts: StdMutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
            self.prompts.lock().unwrap().push(prompt.clone());
            Ok(Generation::Structured {
                content: "Here is what I found.".into(),
                finish_reason: Some("STOP".into()),
                model: None,
            })
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _prompt: &Prompt) -> Result<Generation> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Generation::PlainText("late".into()))
        }
    }

    fn test_config(tmp: &TempDir, extra: &str) -> Config {
        let toml = format!(
            "[corpus]\ndir = {:?}\n[index]\ndir = {:?}\n[history]\npath = {:?}\n{}",
            tmp.path().join("corpus"),
            tmp.path().join("index"),
            tmp.path().join("history.json"),
            extra
        );
        crate::config::parse_config(&toml).unwrap()
    }

    async fn service_with(config: &Config, generator: Arc<dyn Generator>) -> RagService {
        let chunk = Chunk {
            id: "doc:0-16".into(),
            source_id: "doc".into(),
            chunk_index: 0,
            start: 0,
            end: 16,
            text: "Fees are listed.".into(),
            hash: String::new(),
        };
        let index = VectorIndex::build(
            &config.index.dir,
            vec![chunk],
            &UnitEmbedder,
            &BuildParams {
                batch_size: 8,
                chunk_size: 1000,
                overlap: 200,
                corpus_fingerprint: String::new(),
            },
        )
        .await
        .unwrap();
        let retriever = Retriever::new(Arc::new(index), Arc::new(UnitEmbedder), 5);
        let history = HistoryStore::load(&config.history.path);
        RagService::from_parts(config, retriever, generator, history)
    }

    #[tokio::test]
    async fn test_answer_passes_context_and_window() {
        let tmp = TempDir::new().unwrap();
        let generator = Arc::new(RecordingGenerator {
            prompts: StdMutex::new(Vec::new()),
        });
        let config = test_config(&tmp, "window = 2\n");
        let service = service_with(&config, generator.clone()).await;

        for q in ["one", "two", "three"] {
            assert_eq!(service.answer(q).await, "Here is what I found.");
        }
        assert_eq!(service.history_len().await, 6);

        let prompts = generator.prompts.lock().unwrap();
        let last = prompts.last().unwrap();
        // window of 2 prior turns + the rendered question
        assert_eq!(last.messages.len(), 3);
        assert_eq!(last.messages[0].content, "two");
        assert!(last.messages[2].content.contains("Fees are listed."));
        assert!(last.messages[2].content.contains("three"));
    }

    #[tokio::test]
    async fn test_generation_timeout_returns_fallback() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp, "[generation]\ntimeout_secs = 1\n");
        let service = service_with(&config, Arc::new(SlowGenerator)).await;

        assert_eq!(service.answer("hello").await, config.prompt.fallback);
        assert_eq!(service.history_len().await, 0);
        assert!(!config.history.path.exists());
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let err = with_timeout("generation", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RagError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RagError::Timeout {
                operation: "generation",
                ..
            }
        ));
    }
}
