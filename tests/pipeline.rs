//! End-to-end pipeline tests over the in-memory vector store, with stub
//! embedding and generation providers. Covers the index → query flow,
//! re-index replacement, per-item failure isolation in batch indexing,
//! and the confidence gating of the query path.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use studyrag::embedding::{EmbeddingProvider, EmbeddingService};
use studyrag::generation::GenerationProvider;
use studyrag::indexer::ContentIndexer;
use studyrag::models::{ChunkMetadata, ContentItem, ContentType, RagQuery};
use studyrag::rag::RagService;
use studyrag::store::memory::MemoryVectorStore;
use studyrag::store::{VectorRecord, VectorStore};
use studyrag::{RagError, Result};

const STUB_ANSWER: &str =
    "A solenoid produces a nearly uniform magnetic field inside its core.";

/// Embedder with a fixed lookup table; texts not in the table embed to a
/// constant unit vector, and texts containing the failure marker error out.
struct StubEmbedder {
    dims: usize,
    table: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn new(dims: usize) -> Self {
        Self {
            dims,
            table: HashMap::new(),
        }
    }

    fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    fn constant(&self) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        v[0] = 1.0;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if text.contains("EMBED_FAILURE") {
                return Err(RagError::embedding("embedding backend rejected input", true));
            }
            out.push(
                self.table
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.constant()),
            );
        }
        Ok(out)
    }
}

struct StubGenerator {
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl StubGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    fn model_name(&self) -> &str {
        "stub-gen"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = prompt.to_string();
        Ok(STUB_ANSWER.to_string())
    }
}

fn item(id: &str, subject: &str, body: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        content_type: ContentType::Textbook,
        subject: subject.to_string(),
        chapter: Some("Moving Charges and Magnetism".to_string()),
        topic_id: None,
        difficulty: None,
        title: None,
        body: body.to_string(),
        metadata: BTreeMap::new(),
    }
}

fn seed_record(id: &str, content_id: &str, vector: Vec<f32>, text: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector,
        text: text.to_string(),
        metadata: ChunkMetadata {
            content_id: content_id.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            subject: "physics".to_string(),
            source_type: ContentType::Textbook,
            chapter: "Optics".to_string(),
            topic_id: String::new(),
            difficulty: String::new(),
            extra: BTreeMap::new(),
        },
    }
}

fn service_over(
    dims: usize,
    embedder: StubEmbedder,
    store: Arc<MemoryVectorStore>,
) -> (RagService, Arc<StubGenerator>) {
    assert_eq!(embedder.dims, dims);
    let generator = Arc::new(StubGenerator::new());
    let service = RagService::new(
        Arc::new(EmbeddingService::new(Arc::new(embedder), 10)),
        store,
        generator.clone(),
        "class12",
    );
    (service, generator)
}

const LONG_BODY: &str = "A solenoid is a long coil of wire wound in the form of \
a helix. When current flows through it, the field inside is nearly uniform. \
The field outside is weak and divergent. A solenoid with an iron core acts as \
an electromagnet. The strength grows with the number of turns per unit length.";

#[tokio::test]
async fn test_index_then_query_returns_grounded_answer() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder.clone(), store.clone(), "class12");

    let report = indexer
        .index(&item("phys_ch4_001", "physics", LONG_BODY), 120, 20)
        .await
        .unwrap();
    assert!(report.success);
    assert!(report.chunks_created > 1);
    assert_eq!(report.embeddings_generated, report.chunks_created);

    let generator = Arc::new(StubGenerator::new());
    let service = RagService::new(embedder, store, generator.clone(), "class12");
    let response = service
        .query(&RagQuery::new("what is a solenoid?"))
        .await
        .unwrap();

    assert_eq!(response.generated_text, STUB_ANSWER);
    assert!(response.confidence > 0.99);
    assert!(!response.contexts.is_empty());
    assert_eq!(response.sources[0].id, "phys_ch4_001");
    assert_eq!(response.metadata.model.as_deref(), Some("stub-gen"));
    assert_eq!(response.metadata.chunks_retrieved, Some(response.contexts.len()));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let prompt = generator.last_prompt.lock().unwrap().clone();
    assert!(prompt.contains("[Source 1]"));
    assert!(prompt.contains("what is a solenoid?"));
}

#[tokio::test]
async fn test_reindex_replaces_all_previous_vectors() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder, store.clone(), "class12");

    let first = indexer
        .index(&item("phys_ch4_001", "physics", LONG_BODY), 60, 10)
        .await
        .unwrap();
    assert!(first.chunks_created > 2);

    // Shorter replacement body produces fewer chunks, so any stale vector
    // from the first pass would be observable afterwards.
    let updated = item("phys_ch4_001", "physics", "A solenoid is a helical coil.");
    let second = indexer
        .reindex("phys_ch4_001", &updated)
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.reindexed);
    assert_eq!(second.chunks_created, 1);

    let stats = store.stats(Some("class12")).await.unwrap();
    assert_eq!(stats.total_vectors, 1);

    let query_vec = vec![1.0, 0.0, 0.0, 0.0];
    let filter = BTreeMap::from([("content_id".to_string(), "phys_ch4_001".to_string())]);
    let results = store
        .query(&query_vec, 50, Some(&filter), "class12")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, "phys_ch4_001_chunk_0");
    assert_eq!(results[0].text, "A solenoid is a helical coil.");
}

#[tokio::test]
async fn test_batch_indexing_isolates_item_failures() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder, store.clone(), "class12");

    let items = vec![
        item("good_1", "physics", "Lenses refract light toward a focal point."),
        item("bad_item", "physics", "EMBED_FAILURE this body cannot be embedded"),
        item("good_2", "physics", "Mirrors reflect light at equal angles."),
    ];

    let report = indexer.index_batch(&items, 120, 20).await;

    assert_eq!(report.total_items, 3);
    assert_eq!(report.successful_items, 2);
    assert_eq!(report.failed_items, 1);
    assert!(!report.success);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].content_id, "bad_item");

    // The failed item never reaches the store; the good ones do.
    let stats = store.stats(Some("class12")).await.unwrap();
    assert_eq!(stats.total_vectors, report.total_chunks);
    let query_vec = vec![1.0, 0.0, 0.0, 0.0];
    let filter = BTreeMap::from([("content_id".to_string(), "bad_item".to_string())]);
    let results = store
        .query(&query_vec, 10, Some(&filter), "class12")
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_query_with_no_results_short_circuits() {
    let store = Arc::new(MemoryVectorStore::new(2));
    let (service, generator) = service_over(2, StubEmbedder::new(2), store);

    let response = service
        .query(&RagQuery::new("what is entropy?"))
        .await
        .unwrap();

    assert_eq!(response.confidence, 0.0);
    assert!(response.contexts.is_empty());
    assert!(response.sources.is_empty());
    assert_eq!(response.metadata.reason.as_deref(), Some("no_results"));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_below_threshold_skips_generation() {
    let store = Arc::new(MemoryVectorStore::new(2));
    // Cosine against the query vector [1, 0]: 0.6 and 0.4, mean 0.5.
    store
        .upsert(
            seed_record("a_chunk_0", "a", vec![0.6, 0.8], "passage a"),
            "class12",
        )
        .await
        .unwrap();
    store
        .upsert(
            seed_record("b_chunk_0", "b", vec![0.4, 0.916_515_1], "passage b"),
            "class12",
        )
        .await
        .unwrap();

    let embedder =
        StubEmbedder::new(2).with_vector("what is entropy?", vec![1.0, 0.0]);
    let (service, generator) = service_over(2, embedder, store);

    let response = service
        .query(&RagQuery::new("what is entropy?"))
        .await
        .unwrap();

    assert!((response.confidence - 0.5).abs() < 1e-3);
    assert!(response.contexts.is_empty());
    assert_eq!(response.metadata.reason.as_deref(), Some("low_confidence"));
    assert_eq!(response.metadata.threshold, Some(0.7));
    assert!(response.generated_text.contains("not confident"));
    assert!(response.generated_text.contains("50%"));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subject_filter_restricts_retrieval() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder.clone(), store.clone(), "class12");

    indexer
        .index(&item("phys_1", "physics", "Current in a wire creates a field."), 120, 20)
        .await
        .unwrap();
    indexer
        .index(
            &item("chem_1", "chemistry", "Electrolysis splits water into gases."),
            120,
            20,
        )
        .await
        .unwrap();

    let generator = Arc::new(StubGenerator::new());
    let service = RagService::new(embedder, store, generator, "class12");

    let mut request = RagQuery::new("how do fields arise?");
    request.subject = Some("physics".to_string());
    let response = service.query(&request).await.unwrap();

    assert!(!response.contexts.is_empty());
    assert!(response.contexts.iter().all(|c| c.content_id == "phys_1"));
    assert!(response.sources.iter().all(|s| s.subject == "physics"));
}

#[tokio::test]
async fn test_find_similar_does_not_generate() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder.clone(), store.clone(), "class12");
    indexer
        .index(&item("phys_1", "physics", "Current in a wire creates a field."), 120, 20)
        .await
        .unwrap();

    let generator = Arc::new(StubGenerator::new());
    let service = RagService::new(embedder, store, generator.clone(), "class12");

    let results = service
        .find_similar("fields around wires", 5, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content_id, "phys_1");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_body_reports_failure_without_error() {
    let store = Arc::new(MemoryVectorStore::new(4));
    let embedder = Arc::new(EmbeddingService::new(Arc::new(StubEmbedder::new(4)), 10));
    let indexer = ContentIndexer::new(embedder, store.clone(), "class12");

    let report = indexer
        .index(&item("empty_1", "physics", ""), 120, 20)
        .await
        .unwrap();
    assert!(!report.success);
    assert_eq!(report.chunks_created, 0);
    assert_eq!(report.message, "No chunks created from content");

    let stats = store.stats(None).await.unwrap();
    assert_eq!(stats.total_vectors, 0);
}
