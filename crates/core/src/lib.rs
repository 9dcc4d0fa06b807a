pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod profile;
pub mod quality;
pub mod retry;
pub mod sections;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{ChunkingConfig, TextWindow, TokenWindowChunker};
pub use embeddings::{BatchEmbedder, CharacterNgramEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbedError, IndexError, IngestError, StoreError, ValidationError};
pub use identity::{point_id, ChunkStats, MetadataBuilder};
pub use ingest::{
    discover_after_examples, discover_before_examples, discover_code_files, discover_contract_pairs,
    discover_guides, CodeDiscovery, DiscoveredSource, DiscoveryRules, GuideLayout, PairLayout,
    SkippedSource,
};
pub use models::{
    Chunk, ContractInfo, Difficulty, Distance, ExampleType, IndexedPoint, IngestionOptions, LanguageTag,
    PointId, Provenance, RagSearchRequest, ScoredPoint, SearchHit, SectionKind,
};
pub use orchestrator::{GuideSources, Indexer, IndexingReport};
pub use profile::{ContractNotes, DomainProfile};
pub use quality::{QualityReport, QualityValidator, TrainingDataGenerator, ValidationRules};
pub use retry::RetryPolicy;
pub use sections::{parse_sections, Section, SectionParser};
pub use store::{UpsertSummary, VectorGateway};
pub use stores::{MemoryStore, QdrantStore};
pub use traits::{EmbeddingModel, VectorBackend};
