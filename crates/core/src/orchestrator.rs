use crate::chunking::{ChunkingConfig, TokenWindowChunker};
use crate::embeddings::BatchEmbedder;
use crate::error::{IndexError, IngestError};
use crate::identity::{ChunkContext, ChunkStats, LanguageRule, MetadataBuilder};
use crate::ingest::{
    discover_after_examples, discover_before_examples, discover_code_files, discover_contract_pairs,
    discover_guides, read_source, ContractPairSource, DiscoveredSource, DiscoveryRules, GuideLayout,
    PairLayout, SkippedSource,
};
use crate::models::{
    Chunk, ContractInfo, Distance, IngestionOptions, LanguageTag, Provenance, RagSearchRequest, SearchHit,
    SectionKind,
};
use crate::profile::{ContractNotes, DomainProfile};
use crate::sections::SectionParser;
use crate::store::VectorGateway;
use crate::traits::{EmbeddingModel, VectorBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const BEFORE_LABEL: &str = "Solidity";
const AFTER_LABEL: &str = "ink!";

/// Inputs of a guide indexing run.
#[derive(Debug, Clone, Default)]
pub struct GuideSources {
    pub guides_dir: PathBuf,
    pub before_examples: Option<PathBuf>,
    pub after_examples: Option<PathBuf>,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexingReport {
    pub provenance: Provenance,
    pub sources_processed: usize,
    pub chunks: usize,
    pub points_upserted: usize,
    pub batches: usize,
    pub skipped: Vec<SkippedSource>,
    pub stats: ChunkStats,
}

/// One discovered source waiting to be read and chunked.
enum SourceJob {
    Code(DiscoveredSource),
    Guide(DiscoveredSource),
    BeforeExample(DiscoveredSource),
    AfterExample(DiscoveredSource),
    Pair(ContractPairSource),
}

impl SourceJob {
    fn path(&self) -> PathBuf {
        match self {
            SourceJob::Code(source)
            | SourceJob::Guide(source)
            | SourceJob::BeforeExample(source)
            | SourceJob::AfterExample(source) => source.path.clone(),
            SourceJob::Pair(pair) => pair.before.parent().unwrap_or(&pair.before).to_path_buf(),
        }
    }

    fn chunk(
        self,
        builder: &MetadataBuilder,
        parser: &SectionParser,
        chunker: &TokenWindowChunker,
    ) -> Result<Vec<Chunk>, IngestError> {
        match self {
            SourceJob::Code(source) => {
                let text = read_source(&source.path)?;
                let context = ChunkContext {
                    language: LanguageRule::Fixed(file_language_tag(
                        builder.profile(),
                        source.file_language.as_deref(),
                    )),
                    source_path: source.source_id,
                    metadata_key: None,
                    section: None,
                    classification: SectionKind::General,
                    file_language: source.file_language,
                    provenance: Provenance::Codebase,
                    contract: None,
                };
                Ok(builder.build_chunks(&context, chunker.split(&text), 0, 0))
            }
            SourceJob::Guide(source) => {
                let text = read_source(&source.path)?;
                let mut chunks = Vec::new();
                let mut position = 0u32;

                for section in parser.parse(&text, builder.profile()) {
                    let context = ChunkContext {
                        source_path: source.source_id.clone(),
                        metadata_key: Some(source.name.clone()),
                        section: Some(section.title).filter(|title| !title.is_empty()),
                        classification: section.classification,
                        language: LanguageRule::Detect,
                        file_language: source.file_language.clone(),
                        provenance: Provenance::MigrationGuide,
                        contract: None,
                    };
                    let windows = chunker.split(&section.body);
                    let section_chunks =
                        builder.build_chunks(&context, windows, position, section.start_line - 1);
                    position += section_chunks.len() as u32;
                    chunks.extend(section_chunks);
                }
                Ok(chunks)
            }
            SourceJob::BeforeExample(source) => {
                let fence = builder.profile().before.name.clone();
                example_chunks(builder, chunker, source, BEFORE_LABEL, &fence, LanguageTag::Before)
            }
            SourceJob::AfterExample(source) => {
                let fence = builder.profile().after.name.clone();
                example_chunks(builder, chunker, source, AFTER_LABEL, &fence, LanguageTag::After)
            }
            SourceJob::Pair(pair) => {
                let before = read_source(&pair.before)?;
                let after = read_source(&pair.after)?;
                let profile = builder.profile();
                let notes = profile.contract_notes(&pair.name);
                let document = pair_document(profile, &notes, &before, &after);
                let context = ChunkContext {
                    section: Some(format!("{} Implementation", notes.contract_type)),
                    metadata_key: Some(pair.name),
                    source_path: pair.source_id,
                    classification: SectionKind::Comparison,
                    language: LanguageRule::Fixed(LanguageTag::Mixed),
                    file_language: None,
                    provenance: Provenance::PairedExample,
                    contract: Some(ContractInfo {
                        contract_type: notes.contract_type,
                        description: notes.description,
                    }),
                };
                Ok(builder.build_chunks(&context, chunker.split(&document), 0, 0))
            }
        }
    }
}

/// Side-by-side document for one contract pair: overview, both
/// implementations, migration notes, usage and common questions.
fn pair_document(profile: &DomainProfile, notes: &ContractNotes, before: &str, after: &str) -> String {
    let name = &notes.contract_type;
    let mut document = format!(
        "# {name} Implementation: {BEFORE_LABEL} vs {AFTER_LABEL}\n\n\
         ## Overview\n{description}\n\n\
         ## {BEFORE_LABEL} Implementation\n\n```{before_fence}\n{before}\n```\n\n\
         ## {AFTER_LABEL} Implementation\n\n```{after_fence}\n{after}\n```\n\n",
        description = notes.description,
        before_fence = profile.before.name,
        after_fence = profile.after.name,
    );
    document.push_str(&notes.render(BEFORE_LABEL, AFTER_LABEL));
    document.push_str(&format!(
        "\n## Usage Examples\n\n\
         ### {BEFORE_LABEL} Usage\n```{before_fence}\n{name} instance = new {name}();\n```\n\n\
         ### {AFTER_LABEL} Usage\n```{after_fence}\n#[ink::test]\nfn deploys() {{\n    let contract = {name}::new();\n}}\n```\n\n",
        before_fence = profile.before.name,
        after_fence = profile.after.name,
    ));
    document.push_str(&format!(
        "## Common Questions\n\n\
         **Q: How do I migrate {name} from {BEFORE_LABEL} to {AFTER_LABEL}?**\n\
         A: Follow the migration steps above, starting with the storage layout, then error handling and function annotations.\n\n\
         **Q: Can I reuse {BEFORE_LABEL} libraries in {AFTER_LABEL}?**\n\
         A: No. Use {AFTER_LABEL} crates or implement the equivalent functionality in Rust.\n"
    ));
    document
}

fn example_chunks(
    builder: &MetadataBuilder,
    chunker: &TokenWindowChunker,
    source: DiscoveredSource,
    label: &str,
    fence: &str,
    tag: LanguageTag,
) -> Result<Vec<Chunk>, IngestError> {
    let code = read_source(&source.path)?;
    let document = format!(
        "{label} Implementation of {name}:\n\n```{fence}\n{code}\n```",
        name = source.name
    );
    let context = ChunkContext {
        source_path: source.source_id,
        metadata_key: Some(source.name),
        section: Some(format!("{label} Implementation")),
        classification: SectionKind::CodeExample,
        language: LanguageRule::Fixed(tag),
        file_language: source.file_language,
        provenance: Provenance::ExampleContract,
        contract: None,
    };
    Ok(builder.build_chunks(&context, chunker.split(&document), 0, 0))
}

fn file_language_tag(profile: &DomainProfile, language: Option<&str>) -> LanguageTag {
    match language {
        Some(language) if language == profile.before.name => LanguageTag::Before,
        Some(language) if language == profile.after.name => LanguageTag::After,
        _ => LanguageTag::Unknown,
    }
}

struct ChunkedSources {
    chunks: Vec<Chunk>,
    processed: usize,
    skipped: Vec<SkippedSource>,
}

/// Runs `Discover → Parse → Chunk → Embed → Upsert → Report` against one
/// collection.
pub struct Indexer<M, B> {
    builder: MetadataBuilder,
    parser: SectionParser,
    embedder: BatchEmbedder<M>,
    gateway: VectorGateway<B>,
    codebase_options: IngestionOptions,
    guide_options: IngestionOptions,
    discovery: DiscoveryRules,
    guide_layout: GuideLayout,
    pair_layout: PairLayout,
    distance: Distance,
}

impl<M, B> Indexer<M, B>
where
    M: EmbeddingModel,
    B: VectorBackend,
{
    pub fn new(
        profile: Arc<DomainProfile>,
        embedder: BatchEmbedder<M>,
        gateway: VectorGateway<B>,
    ) -> Result<Self, IndexError> {
        let guide_layout = GuideLayout {
            tutorial_name: profile.tutorial_name.clone(),
            ..GuideLayout::default()
        };
        Ok(Self {
            builder: MetadataBuilder::new(profile),
            parser: SectionParser::new()?,
            embedder,
            gateway,
            codebase_options: IngestionOptions::for_codebase(),
            guide_options: IngestionOptions::for_guides(),
            discovery: DiscoveryRules::default(),
            guide_layout,
            pair_layout: PairLayout::default(),
            distance: Distance::Cosine,
        })
    }

    pub fn with_codebase_options(mut self, options: IngestionOptions) -> Self {
        self.codebase_options = options;
        self
    }

    pub fn with_guide_options(mut self, options: IngestionOptions) -> Self {
        self.guide_options = options;
        self
    }

    pub fn with_discovery_rules(mut self, rules: DiscoveryRules) -> Self {
        self.discovery = rules;
        self
    }

    pub fn with_pair_layout(mut self, layout: PairLayout) -> Self {
        self.pair_layout = layout;
        self
    }

    pub fn gateway(&self) -> &VectorGateway<B> {
        &self.gateway
    }

    /// Makes sure the collection exists with the model's dimension. Any
    /// failure here means the store cannot be used for this run.
    pub async fn prepare(&self) -> Result<usize, IndexError> {
        let dimension = self
            .embedder
            .dimensions()
            .await
            .map_err(|error| IndexError::Unavailable(format!("embedding model: {error}")))?;

        self.gateway
            .ensure_collection(dimension, self.distance)
            .await
            .map_err(|error| match error {
                mismatch @ crate::StoreError::DimensionMismatch { .. } => IndexError::Store(mismatch),
                other => IndexError::Unavailable(other.to_string()),
            })?;
        Ok(dimension)
    }

    /// Indexes every matching file under `root`.
    pub async fn index_codebase(&self, root: &Path) -> Result<IndexingReport, IndexError> {
        let chunker = TokenWindowChunker::new(ChunkingConfig::from(&self.codebase_options))?;
        self.prepare().await?;

        let discovery = discover_code_files(root, &self.discovery)?;
        info!(
            root = %root.display(),
            sources = discovery.sources.len(),
            filtered = discovery.skipped.len(),
            "discovered code files"
        );

        let jobs = discovery.sources.into_iter().map(SourceJob::Code).collect();
        self.run(Provenance::Codebase, jobs, discovery.skipped, &chunker, &self.codebase_options)
            .await
    }

    /// Indexes migration guides plus the optional example contract trees.
    pub async fn index_guides(&self, sources: &GuideSources) -> Result<IndexingReport, IndexError> {
        let chunker = TokenWindowChunker::new(ChunkingConfig::from(&self.guide_options))?;
        self.prepare().await?;

        let guides = discover_guides(&sources.guides_dir, &self.guide_layout)?;
        info!(dir = %sources.guides_dir.display(), guides = guides.len(), "discovered migration guides");

        let mut jobs: Vec<SourceJob> = guides.into_iter().map(SourceJob::Guide).collect();
        if let Some(dir) = &sources.before_examples {
            jobs.extend(discover_before_examples(dir)?.into_iter().map(SourceJob::BeforeExample));
        }
        if let Some(dir) = &sources.after_examples {
            jobs.extend(discover_after_examples(dir)?.into_iter().map(SourceJob::AfterExample));
        }

        self.run(Provenance::MigrationGuide, jobs, Vec::new(), &chunker, &self.guide_options)
            .await
    }

    /// Indexes paired before/after example directories under `dir`.
    pub async fn embed_contract_pairs(&self, dir: &Path) -> Result<IndexingReport, IndexError> {
        let chunker = TokenWindowChunker::new(ChunkingConfig::from(&self.guide_options))?;
        self.prepare().await?;

        let pairs = discover_contract_pairs(dir, &self.pair_layout)?;
        info!(dir = %dir.display(), pairs = pairs.len(), "discovered contract pairs");

        let jobs = pairs.into_iter().map(SourceJob::Pair).collect();
        self.run(Provenance::PairedExample, jobs, Vec::new(), &chunker, &self.guide_options)
            .await
    }

    pub async fn search(&self, request: &RagSearchRequest) -> Result<Vec<SearchHit>, IndexError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(IndexError::EmptyQuery);
        }

        let vectors = self.embedder.embed_all(&[query.to_string()]).await?;
        let Some(vector) = vectors.first() else {
            return Ok(Vec::new());
        };

        let hits = self
            .gateway
            .search(vector, request.limit, request.score_threshold)
            .await?;
        Ok(hits.into_iter().map(SearchHit::from).collect())
    }

    pub async fn collection_points(&self) -> Result<u64, IndexError> {
        Ok(self.gateway.count().await?)
    }

    async fn run(
        &self,
        provenance: Provenance,
        jobs: Vec<SourceJob>,
        mut skipped: Vec<SkippedSource>,
        chunker: &TokenWindowChunker,
        options: &IngestionOptions,
    ) -> Result<IndexingReport, IndexError> {
        let ChunkedSources {
            chunks,
            processed,
            skipped: unreadable,
        } = self.chunk_sources(jobs, chunker).await?;
        skipped.extend(unreadable);

        let stats = ChunkStats::from_chunks(&chunks);
        if chunks.is_empty() {
            info!(provenance = provenance.as_str(), skipped = skipped.len(), "nothing to index");
            return Ok(IndexingReport {
                provenance,
                sources_processed: processed,
                chunks: 0,
                points_upserted: 0,
                batches: 0,
                skipped,
                stats,
            });
        }

        let texts: Vec<String> = chunks
            .iter()
            .map(|chunk| self.builder.embedding_text(chunk, options.enrich_embedding_text))
            .collect();
        let vectors = self.embedder.embed_all(&texts).await?;
        info!(vectors = vectors.len(), "embedded chunks");

        let points: Vec<_> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| self.builder.point(chunk, vector))
            .collect();
        let summary = self.gateway.upsert(&points).await?;

        info!(
            provenance = provenance.as_str(),
            sources = processed,
            chunks = chunks.len(),
            points = summary.points,
            batches = summary.batches,
            skipped = skipped.len(),
            "indexing finished"
        );

        Ok(IndexingReport {
            provenance,
            sources_processed: processed,
            chunks: chunks.len(),
            points_upserted: summary.points,
            batches: summary.batches,
            skipped,
            stats,
        })
    }

    /// Reads and chunks every source on the blocking pool. Results are
    /// collected in discovery order.
    async fn chunk_sources(
        &self,
        jobs: Vec<SourceJob>,
        chunker: &TokenWindowChunker,
    ) -> Result<ChunkedSources, IndexError> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let builder = self.builder.clone();
                let parser = self.parser.clone();
                let chunker = chunker.clone();
                let path = job.path();
                let handle =
                    tokio::task::spawn_blocking(move || job.chunk(&builder, &parser, &chunker));
                (path, handle)
            })
            .collect();

        let mut outcome = ChunkedSources {
            chunks: Vec::new(),
            processed: 0,
            skipped: Vec::new(),
        };
        for (path, handle) in handles {
            match handle.await.map_err(|error| IndexError::Task(error.to_string()))? {
                Ok(chunks) => {
                    outcome.processed += 1;
                    outcome.chunks.extend(chunks);
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping source");
                    outcome.skipped.push(SkippedSource {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::identity::point_id;
    use crate::models::{Difficulty, IndexedPoint, ScoredPoint};
    use crate::retry::RetryPolicy;
    use crate::stores::MemoryStore;
    use crate::traits::{CollectionInfo, CollectionConfig, CreateOutcome};
    use crate::StoreError;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;

    fn indexer_with<B: VectorBackend>(backend: B) -> Indexer<CharacterNgramEmbedder, B> {
        let embedder = BatchEmbedder::new(CharacterNgramEmbedder { dimensions: 64 }, 32, RetryPolicy::none());
        let gateway = VectorGateway::new(backend, "migration_test", 100, RetryPolicy::none());
        Indexer::new(Arc::new(DomainProfile::solidity_to_ink()), embedder, gateway).unwrap()
    }

    fn indexer() -> Indexer<CharacterNgramEmbedder, MemoryStore> {
        indexer_with(MemoryStore::default())
    }

    const SMALL_FILE: &str = "pub fn transfer(from: AccountId, to: AccountId, value: Balance) -> Result<(), Error> {\n    self.balances.insert(to, &value);\n    Ok(())\n}\n";

    #[tokio::test]
    async fn small_file_becomes_one_searchable_point() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("src"))?;
        fs::write(dir.path().join("src/token.rs"), SMALL_FILE)?;

        let indexer = indexer();
        let report = indexer.index_codebase(dir.path()).await?;
        assert_eq!(report.sources_processed, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.points_upserted, 1);
        assert_eq!(indexer.collection_points().await?, 1);

        let hits = indexer
            .search(&RagSearchRequest {
                query: SMALL_FILE.to_string(),
                limit: 5,
                score_threshold: None,
            })
            .await?;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].source_path, "src/token.rs");
        assert_eq!(hits[0].id, point_id("src/token.rs", 0).to_string());
        assert_eq!(hits[0].payload["language_tag"], "after");
        assert_eq!(hits[0].payload["source"], "codebase");
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_does_not_duplicate_points() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.rs"), SMALL_FILE)?;
        fs::write(dir.path().join("b.md"), "# notes\n\nsome text about storage")?;

        let indexer = indexer();
        indexer.index_codebase(dir.path()).await?;
        let first = indexer.collection_points().await?;
        indexer.index_codebase(dir.path()).await?;
        assert_eq!(indexer.collection_points().await?, first);
        assert_eq!(first, 2);
        Ok(())
    }

    #[tokio::test]
    async fn guide_sections_keep_their_classification() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("migration_guide_flipper.md"),
            "## Overview\nA boolean toggle stored on chain.\n\n## Solidity Implementation\n```solidity\ncontract Flipper { bool value; function flip() public { value = !value; } }\n```\n",
        )?;

        let indexer = indexer();
        let report = indexer
            .index_guides(&GuideSources {
                guides_dir: dir.path().to_path_buf(),
                ..GuideSources::default()
            })
            .await?;
        assert_eq!(report.sources_processed, 1);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.stats.per_classification.get("overview"), Some(&1));
        assert_eq!(report.stats.per_classification.get("before_language"), Some(&1));
        assert_eq!(report.stats.per_difficulty.get(Difficulty::Beginner.as_str()), Some(&2));
        assert_eq!(indexer.collection_points().await?, 2);

        let hits = indexer
            .search(&RagSearchRequest {
                query: "contract Flipper".to_string(),
                limit: 10,
                score_threshold: None,
            })
            .await?;
        let mut positions: Vec<_> = hits
            .iter()
            .filter_map(|hit| hit.payload["position"].as_u64())
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1]);
        let solidity = hits
            .iter()
            .find(|hit| hit.payload["classification"] == "before_language")
            .ok_or("missing solidity section")?;
        assert_eq!(solidity.payload["section"], "Solidity Implementation");
        assert_eq!(solidity.payload["start_line"], 5);
        Ok(())
    }

    #[tokio::test]
    async fn mixed_section_takes_the_dominant_language() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("migration_guide_counter.md"),
            "## Overview\nCounter basics.\n\n## Storage Pattern\n```solidity\ncontract Counter { uint count; function inc() public { require(msg.sender != address(0)); count += 1; } }\n```\n\n```rust\n#[ink(storage)]\npub struct Counter { count: u32 }\n```\n",
        )?;

        let indexer = indexer();
        indexer
            .index_guides(&GuideSources {
                guides_dir: dir.path().to_path_buf(),
                ..GuideSources::default()
            })
            .await?;

        let hits = indexer
            .search(&RagSearchRequest {
                query: "counter storage".to_string(),
                limit: 10,
                score_threshold: None,
            })
            .await?;
        let pattern = hits
            .iter()
            .find(|hit| hit.payload["classification"] == "pattern")
            .ok_or("missing pattern section")?;
        assert_eq!(pattern.payload["language_tag"], "before");
        assert_eq!(pattern.payload["difficulty"], "beginner");
        Ok(())
    }

    #[tokio::test]
    async fn examples_and_pairs_are_tagged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let guides = dir.path().join("guides");
        fs::create_dir_all(&guides)?;
        fs::create_dir_all(dir.path().join("sol/src"))?;
        fs::write(dir.path().join("sol/src/Counter.sol"), "contract Counter { uint count; }")?;
        fs::create_dir_all(dir.path().join("ink/counter"))?;
        fs::write(dir.path().join("ink/counter/lib.rs"), "#[ink::contract] mod counter {}")?;

        let indexer = indexer();
        let report = indexer
            .index_guides(&GuideSources {
                guides_dir: guides,
                before_examples: Some(dir.path().join("sol")),
                after_examples: Some(dir.path().join("ink")),
            })
            .await?;
        assert_eq!(report.sources_processed, 2);
        assert_eq!(report.stats.per_classification.get("code_example"), Some(&2));
        assert_eq!(report.stats.per_language.get("before"), Some(&1));
        assert_eq!(report.stats.per_language.get("after"), Some(&1));

        let pairs = dir.path().join("pairs/counter");
        fs::create_dir_all(&pairs)?;
        fs::write(pairs.join("contract.sol"), "contract Counter { uint count; }")?;
        fs::write(pairs.join("lib.rs"), "#[ink::contract] mod counter {}")?;

        let report = indexer.embed_contract_pairs(&dir.path().join("pairs")).await?;
        assert_eq!(report.provenance, Provenance::PairedExample);
        assert_eq!(report.points_upserted, 1);
        assert_eq!(report.stats.per_classification.get("comparison"), Some(&1));
        assert_eq!(indexer.collection_points().await?, 3);

        let hits = indexer
            .search(&RagSearchRequest {
                query: "Counter migration notes".to_string(),
                limit: 10,
                score_threshold: None,
            })
            .await?;
        let pair = hits
            .iter()
            .find(|hit| hit.source_path == "pairs/counter")
            .ok_or("missing pair point")?;
        assert_eq!(pair.payload["contract_type"], "Counter");
        assert_eq!(
            pair.payload["description"],
            "Basic counter contract with increment and decrement functionality"
        );
        assert_eq!(pair.payload["section"], "Counter Implementation");
        assert!(pair.content.contains("## Overview\nBasic counter contract"));
        assert!(pair.content.contains("## Migration Notes: Solidity Counter to ink! Counter"));
        assert!(pair.content.contains("saturating_add"));
        assert!(pair.content.contains("## Common Questions"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_pairs_fall_back_to_general_notes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pair = dir.path().join("token-vault");
        fs::create_dir_all(&pair)?;
        fs::write(pair.join("contract.sol"), "contract Vault { mapping(address => uint) deposits; }")?;
        fs::write(pair.join("lib.rs"), "#[ink::contract] mod vault {}")?;

        let indexer = indexer();
        indexer.embed_contract_pairs(dir.path()).await?;
        let hits = indexer
            .search(&RagSearchRequest {
                query: "vault".to_string(),
                limit: 5,
                score_threshold: None,
            })
            .await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, "pairs/token_vault");
        assert_eq!(hits[0].payload["contract_type"], "token_vault");
        assert_eq!(
            hits[0].payload["description"],
            "Smart contract implementation: token_vault"
        );
        assert!(hits[0].content.contains("self.env().caller()"));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_sources_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.rs"), SMALL_FILE)?;
        fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd])?;

        let report = indexer().index_codebase(dir.path()).await?;
        assert_eq!(report.sources_processed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("bad.txt"));
        assert_eq!(report.points_upserted, 1);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_files_are_reported_as_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("small.rs"), SMALL_FILE)?;
        fs::write(dir.path().join("huge.rs"), SMALL_FILE.repeat(4))?;

        let indexer = indexer().with_discovery_rules(DiscoveryRules {
            max_file_bytes: SMALL_FILE.len() as u64,
            ..DiscoveryRules::default()
        });
        let report = indexer.index_codebase(dir.path()).await?;
        assert_eq!(report.sources_processed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("huge.rs"));
        assert!(report.skipped[0].reason.starts_with("too large"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let result = indexer()
            .search(&RagSearchRequest {
                query: "   ".to_string(),
                limit: 5,
                score_threshold: None,
            })
            .await;
        assert!(matches!(result, Err(IndexError::EmptyQuery)));
    }

    #[tokio::test]
    async fn invalid_chunking_fails_before_any_work() {
        let dir = tempdir().unwrap();
        let indexer = indexer().with_codebase_options(IngestionOptions {
            chunk_max_tokens: 10,
            chunk_overlap_tokens: 10,
            ..IngestionOptions::default()
        });
        let result = indexer.index_codebase(dir.path()).await;
        assert!(matches!(
            result,
            Err(IndexError::Ingest(IngestError::InvalidChunkConfig(_)))
        ));
        assert_eq!(indexer.gateway().backend().creations(), 0);
    }

    struct UnreachableBackend;

    #[async_trait]
    impl VectorBackend for UnreachableBackend {
        async fn collection_info(&self, _collection: &str) -> Result<Option<CollectionInfo>, StoreError> {
            Err(StoreError::Request("connection refused".to_string()))
        }

        async fn create_collection(
            &self,
            _collection: &str,
            _config: CollectionConfig,
        ) -> Result<CreateOutcome, StoreError> {
            Err(StoreError::Request("connection refused".to_string()))
        }

        async fn upsert_points(&self, _collection: &str, _points: &[IndexedPoint]) -> Result<(), StoreError> {
            Err(StoreError::Request("connection refused".to_string()))
        }

        async fn search_points(
            &self,
            _collection: &str,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
        ) -> Result<Vec<ScoredPoint>, StoreError> {
            Err(StoreError::Request("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), SMALL_FILE).unwrap();

        let result = indexer_with(UnreachableBackend).index_codebase(dir.path()).await;
        assert!(matches!(result, Err(IndexError::Unavailable(_))));
    }
}
