use crate::composer::{AnswerComposer, GenerativeModel};
use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::models::{QueryResponse, SearchOptions, SourceRef};
use crate::orchestrator::SearchOrchestrator;
use std::time::Instant;

/// Query entrypoint. Ties retrieval and answer composition together and
/// translates every internal error into the response envelope; callers never
/// see a raw error from the layers below.
pub struct QueryService<E: Embedder, G: GenerativeModel> {
    orchestrator: SearchOrchestrator<E>,
    composer: AnswerComposer<G>,
    options: SearchOptions,
}

impl<E: Embedder, G: GenerativeModel> QueryService<E, G> {
    pub fn new(
        orchestrator: SearchOrchestrator<E>,
        composer: AnswerComposer<G>,
        options: SearchOptions,
    ) -> Self {
        Self {
            orchestrator,
            composer,
            options,
        }
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator<E> {
        &self.orchestrator
    }

    pub async fn ask(&self, question: &str) -> QueryResponse {
        let started = Instant::now();

        match self.answer(question).await {
            Ok((answer, sources)) => QueryResponse {
                success: true,
                answer: Some(answer),
                sources,
                processing_time: started.elapsed().as_secs_f64(),
                error: None,
                error_kind: None,
            },
            Err(error) => QueryResponse {
                success: false,
                answer: None,
                sources: Vec::new(),
                processing_time: started.elapsed().as_secs_f64(),
                error: Some(error.user_message()),
                error_kind: Some(error.category().to_string()),
            },
        }
    }

    async fn answer(&self, question: &str) -> Result<(String, Vec<SourceRef>), QueryError> {
        let retrieved = self.orchestrator.retrieve(question, self.options)?;
        let answer = self
            .composer
            .compose(question, &retrieved.context_block)
            .await?;
        Ok((answer, retrieved.sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{chunk_pages, ChunkingConfig};
    use crate::contributions::ContributionStore;
    use crate::embeddings::{Embedder, HashedTokenEmbedder};
    use crate::extractor::PageText;
    use crate::index::SearchIndex;
    use crate::models::RankingConfig;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CannedModel;

    #[async_trait]
    impl GenerativeModel for CannedModel {
        async fn generate(&self, prompt: &str) -> Result<String, QueryError> {
            // Echo the menu fact so the answer reflects the retrieved context.
            if prompt.contains("Latte") {
                Ok("The menu offers **Latte** and **Cappuccino**.".to_string())
            } else {
                Ok("I do not have enough information.".to_string())
            }
        }
    }

    fn service(dir: &tempfile::TempDir) -> QueryService<HashedTokenEmbedder, CannedModel> {
        let store = Arc::new(
            ContributionStore::open(dir.path().join("contributions.json")).expect("store"),
        );
        let orchestrator = SearchOrchestrator::new(
            HashedTokenEmbedder::default(),
            store,
            RankingConfig::default(),
        );
        let composer = AnswerComposer::new(CannedModel).expect("composer");
        QueryService::new(orchestrator, composer, SearchOptions::default())
    }

    fn menu_index() -> SearchIndex {
        let embedder = HashedTokenEmbedder::default();
        let pages = vec![PageText {
            number: 1,
            text: "The coffee menu includes Latte and Cappuccino.".to_string(),
        }];
        let config = ChunkingConfig {
            chunk_size: 1_000,
            overlap: 200,
        };
        let (mut chunks, _) = chunk_pages(&pages, "menu.pdf", config, 0).expect("chunk");
        for chunk in &mut chunks {
            chunk.embedding = embedder.embed(&chunk.text).expect("embed");
        }
        SearchIndex::build(&chunks).expect("build")
    }

    #[tokio::test]
    async fn question_without_an_index_reports_not_initialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir);

        let response = service.ask("What coffee is available?").await;

        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("index_not_found"));
        assert!(response.answer.is_none());
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn menu_question_is_answered_with_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir);
        service.orchestrator().install_index(menu_index());

        let response = service.ask("What coffee is available?").await;

        assert!(response.success);
        let answer = response.answer.expect("answer");
        assert!(answer.contains("Latte") && answer.contains("Cappuccino"));
        // Emphasis markers from the raw model output were reformatted.
        assert!(answer.contains("<strong>Latte</strong>"));
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].name, "menu.pdf");
        assert!(response.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn empty_question_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir);
        service.orchestrator().install_index(menu_index());

        let response = service.ask("   ").await;
        assert!(!response.success);
        assert_eq!(response.error_kind.as_deref(), Some("bad_request"));
    }

    #[tokio::test]
    async fn failure_envelope_serializes_without_an_answer_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir);

        let response = service.ask("anything").await;
        let value = serde_json::to_value(&response).expect("serialize");

        assert_eq!(value["success"], serde_json::Value::Bool(false));
        assert!(value.get("answer").is_none());
        assert!(value["error"].is_string());
    }
}
