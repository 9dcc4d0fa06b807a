use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use migration_rag_core::quality::{into_examples, load_dataset, to_document, to_jsonl, write_corpus};
use migration_rag_core::{
    BatchEmbedder, CharacterNgramEmbedder, DomainProfile, EmbeddingModel, GuideLayout, GuideSources,
    HttpEmbedder, Indexer, IndexingReport, IngestionOptions, QdrantStore, QualityValidator,
    RagSearchRequest, RetryPolicy, TrainingDataGenerator, ValidationRules, VectorGateway,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CODEBASE_COLLECTION: &str = "code_knowledge";
const MIGRATION_COLLECTION: &str = "sol2ink_migration";

#[derive(Parser)]
#[command(name = "migration-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    /// OpenAI-compatible embeddings base URL. The local trigram model is used when unset.
    #[arg(long, env = "EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embeddings API key
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Timeout in seconds for store and embedding requests.
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and upsert every source file under a directory.
    IndexCodebase {
        /// Root of the codebase.
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = CODEBASE_COLLECTION)]
        collection: String,
        /// Tokens per chunk.
        #[arg(long, default_value = "1000")]
        chunk_tokens: usize,
        /// Tokens shared by neighbouring chunks.
        #[arg(long, default_value = "200")]
        overlap_tokens: usize,
    },
    /// Index migration guides and, optionally, example contracts.
    IndexGuides {
        /// Directory holding migration_guide_*.md files.
        #[arg(long)]
        guides_dir: PathBuf,
        /// Solidity examples directory (contracts under src/).
        #[arg(long)]
        solidity_examples: Option<PathBuf>,
        /// ink! examples directory (one crate per contract).
        #[arg(long)]
        ink_examples: Option<PathBuf>,
        #[arg(long, default_value = MIGRATION_COLLECTION)]
        collection: String,
        /// Embed chunk text without the metadata header.
        #[arg(long, default_value_t = false)]
        raw_text: bool,
    },
    /// Index paired before/after contract directories.
    EmbedContracts {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = MIGRATION_COLLECTION)]
        collection: String,
    },
    /// Semantic search over an indexed collection.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        limit: usize,
        /// Drop hits scoring below this value.
        #[arg(long)]
        score_threshold: Option<f32>,
        #[arg(long, default_value = MIGRATION_COLLECTION)]
        collection: String,
        /// Print the full text of every hit.
        #[arg(long, default_value_t = false)]
        show_content: bool,
    },
    /// Print the number of points in a collection.
    Stats {
        #[arg(long, default_value = MIGRATION_COLLECTION)]
        collection: String,
    },
    /// Generate question/answer training data from migration guides.
    Generate {
        /// Directory holding migration_guide_*.md files.
        #[arg(long)]
        guides_dir: PathBuf,
        #[arg(long, default_value = "training_data")]
        output_dir: PathBuf,
    },
    /// Score a training data file and write the JSON results and a text report.
    Validate {
        /// Training data (.json document or .jsonl chat records).
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "validation_results.json")]
        output: PathBuf,
        #[arg(long, default_value = "validation_report.txt")]
        report: PathBuf,
    },
    /// Convert training data between the JSON document and JSONL formats.
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Target format. Defaults to the output file extension.
        #[arg(long, value_enum)]
        to: Option<DataFormat>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DataFormat {
    Json,
    Jsonl,
}

impl DataFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("jsonl") => DataFormat::Jsonl,
            _ => DataFormat::Json,
        }
    }
}

type CliIndexer = Indexer<Box<dyn EmbeddingModel>, QdrantStore>;

fn build_indexer(cli: &Cli, collection: &str) -> anyhow::Result<CliIndexer> {
    let timeout = Duration::from_secs(cli.timeout_secs);
    let model: Box<dyn EmbeddingModel> = match &cli.embedding_url {
        Some(url) => Box::new(HttpEmbedder::new(
            url,
            cli.embedding_model.clone(),
            cli.embedding_api_key.as_deref(),
            timeout,
        )?),
        None => {
            info!("no embedding endpoint configured, using local trigram embeddings");
            Box::new(CharacterNgramEmbedder::default())
        }
    };

    let options = IngestionOptions::default();
    let store = QdrantStore::new(&cli.qdrant_url, cli.qdrant_api_key.clone(), timeout)?;
    let embedder = BatchEmbedder::new(model, options.embedding_batch_size, RetryPolicy::default());
    let gateway = VectorGateway::new(store, collection, options.upsert_batch_size, RetryPolicy::default());

    Ok(Indexer::new(Arc::new(DomainProfile::default()), embedder, gateway)?)
}

fn print_report(report: &IndexingReport, collection: &str) {
    for skipped in &report.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped source");
    }

    println!(
        "{} chunks from {} sources upserted into {collection} ({} points, {} batches) at {}",
        report.chunks,
        report.sources_processed,
        report.points_upserted,
        report.batches,
        Utc::now().to_rfc3339()
    );
    if !report.skipped.is_empty() {
        println!("skipped: {}", report.skipped.len());
    }
    for (label, counts) in [
        ("difficulty", &report.stats.per_difficulty),
        ("language", &report.stats.per_language),
        ("classification", &report.stats.per_classification),
    ] {
        let rendered: Vec<_> = counts.iter().map(|(key, count)| format!("{key}={count}")).collect();
        println!("{label}: {}", rendered.join(" "));
    }
    if !report.stats.top_concepts.is_empty() {
        let rendered: Vec<_> = report
            .stats
            .top_concepts
            .iter()
            .map(|(concept, count)| format!("{concept}={count}"))
            .collect();
        println!("top concepts: {}", rendered.join(" "));
    }
}

fn generate(guides_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let generator = TrainingDataGenerator::new(Arc::new(DomainProfile::default()))?;
    let corpus = generator
        .generate_dir(guides_dir, &GuideLayout::default())
        .with_context(|| format!("failed to read guides from {}", guides_dir.display()))?;
    for skipped in &corpus.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped guide");
    }

    let files = write_corpus(output_dir, &corpus.examples, Utc::now())
        .with_context(|| format!("failed to write {}", output_dir.display()))?;
    println!(
        "{} examples from {} guides written to {}, {} and {}",
        corpus.examples.len(),
        corpus.guides_processed,
        files.jsonl.display(),
        files.json.display(),
        files.stats.display()
    );
    Ok(())
}

fn validate(input: &Path, output: &Path, report_path: &Path) -> anyhow::Result<ExitCode> {
    let dataset = load_dataset(input).with_context(|| format!("failed to load {}", input.display()))?;
    let validator = QualityValidator::new(ValidationRules::default())?;
    let report = validator.validate(&dataset);
    let summary = report.render_summary();

    fs::write(output, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("failed to write {}", output.display()))?;
    fs::write(report_path, &summary).with_context(|| format!("failed to write {}", report_path.display()))?;

    println!("{summary}");
    info!(
        score = report.overall_quality_score,
        results = %output.display(),
        report = %report_path.display(),
        "validation finished"
    );

    Ok(if report.passes() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn convert(input: &Path, output: &Path, to: Option<DataFormat>) -> anyhow::Result<()> {
    let dataset = load_dataset(input).with_context(|| format!("failed to load {}", input.display()))?;
    let examples = into_examples(&dataset)?;
    let text = match to.unwrap_or_else(|| DataFormat::for_path(output)) {
        DataFormat::Jsonl => to_jsonl(&examples)?,
        DataFormat::Json => serde_json::to_string_pretty(&to_document(&examples, Utc::now()))?,
    };
    fs::write(output, text).with_context(|| format!("failed to write {}", output.display()))?;
    println!("{} examples written to {}", examples.len(), output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "migration-rag boot"
    );

    match &cli.command {
        Command::IndexCodebase {
            root,
            collection,
            chunk_tokens,
            overlap_tokens,
        } => {
            let options = IngestionOptions {
                chunk_max_tokens: *chunk_tokens,
                chunk_overlap_tokens: *overlap_tokens,
                ..IngestionOptions::for_codebase()
            };
            let indexer = build_indexer(&cli, collection)?.with_codebase_options(options);
            let report = indexer.index_codebase(root).await?;
            print_report(&report, collection);
        }
        Command::IndexGuides {
            guides_dir,
            solidity_examples,
            ink_examples,
            collection,
            raw_text,
        } => {
            let options = IngestionOptions {
                enrich_embedding_text: !raw_text,
                ..IngestionOptions::for_guides()
            };
            let indexer = build_indexer(&cli, collection)?.with_guide_options(options);
            let sources = GuideSources {
                guides_dir: guides_dir.clone(),
                before_examples: solidity_examples.clone(),
                after_examples: ink_examples.clone(),
            };
            let report = indexer.index_guides(&sources).await?;
            print_report(&report, collection);
        }
        Command::EmbedContracts { dir, collection } => {
            let indexer = build_indexer(&cli, collection)?;
            let report = indexer.embed_contract_pairs(dir).await?;
            print_report(&report, collection);
        }
        Command::Search {
            query,
            limit,
            score_threshold,
            collection,
            show_content,
        } => {
            let indexer = build_indexer(&cli, collection)?;
            let request = RagSearchRequest {
                query: query.clone(),
                limit: *limit,
                score_threshold: *score_threshold,
            };
            let hits = indexer.search(&request).await?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no results");
            }
            for hit in hits {
                println!("score={:.4} id={} source={}", hit.score, hit.id, hit.source_path);
                if *show_content {
                    println!("{}\n", hit.content);
                }
            }
        }
        Command::Stats { collection } => {
            let indexer = build_indexer(&cli, collection)?;
            let points = indexer.collection_points().await?;
            println!("collection={collection} points={points}");
        }
        Command::Generate {
            guides_dir,
            output_dir,
        } => generate(guides_dir, output_dir)?,
        Command::Validate {
            input,
            output,
            report,
        } => return validate(input, output, report),
        Command::Convert { input, output, to } => convert(input, output, *to)?,
    }

    Ok(ExitCode::SUCCESS)
}
