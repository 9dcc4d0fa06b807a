use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Structural kind of a chunk, derived from the section or source it came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Overview,
    BeforeLanguage,
    AfterLanguage,
    MigrationStep,
    Pattern,
    Comparison,
    BestPractices,
    CodeExample,
    /// No classification rule matched.
    General,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Overview => "overview",
            SectionKind::BeforeLanguage => "before_language",
            SectionKind::AfterLanguage => "after_language",
            SectionKind::MigrationStep => "migration_step",
            SectionKind::Pattern => "pattern",
            SectionKind::Comparison => "comparison",
            SectionKind::BestPractices => "best_practices",
            SectionKind::CodeExample => "code_example",
            SectionKind::General => "general",
        }
    }
}

/// Dominant language of a chunk relative to the migration direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LanguageTag {
    Before,
    After,
    Mixed,
    Unknown,
}

impl LanguageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageTag::Before => "before",
            LanguageTag::After => "after",
            LanguageTag::Mixed => "mixed",
            LanguageTag::Unknown => "unknown",
        }
    }
}

/// Ingestion pipeline that produced a point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Codebase,
    MigrationGuide,
    ExampleContract,
    PairedExample,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Codebase => "codebase",
            Provenance::MigrationGuide => "migration_guide",
            Provenance::ExampleContract => "example_contract",
            Provenance::PairedExample => "paired_example",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .into_iter()
            .find(|difficulty| difficulty.as_str() == value)
            .ok_or_else(|| format!("invalid difficulty: {value}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExampleType {
    Comparison,
    Explanation,
    CodeExample,
    MigrationStep,
    Pattern,
    BestPractices,
}

impl ExampleType {
    pub const ALL: [ExampleType; 6] = [
        ExampleType::Comparison,
        ExampleType::Explanation,
        ExampleType::CodeExample,
        ExampleType::MigrationStep,
        ExampleType::Pattern,
        ExampleType::BestPractices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleType::Comparison => "comparison",
            ExampleType::Explanation => "explanation",
            ExampleType::CodeExample => "code_example",
            ExampleType::MigrationStep => "migration_step",
            ExampleType::Pattern => "pattern",
            ExampleType::BestPractices => "best_practices",
        }
    }
}

impl fmt::Display for ExampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExampleType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ExampleType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("invalid example type: {value}"))
    }
}

/// Estimated 1-based line range of a chunk inside its source.
///
/// Derived by linear interpolation over character offsets, so it is only an
/// approximation of where the chunk sits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn offset(self, lines: usize) -> Self {
        Self {
            start: self.start + lines,
            end: self.end + lines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub source_path: String,
    pub position: u32,
    pub span: LineSpan,
    pub section: Option<String>,
    pub classification: SectionKind,
    pub language_tag: LanguageTag,
    pub file_language: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub concepts: BTreeSet<String>,
    pub detected_patterns: BTreeSet<String>,
    pub provenance: Provenance,
    /// Set on chunks of paired before/after examples.
    pub contract: Option<ContractInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractInfo {
    pub contract_type: String,
    pub description: String,
}

/// Deterministic point identifier; see [`crate::identity::point_id`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PointId(pub Uuid);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub embedding_batch_size: usize,
    pub upsert_batch_size: usize,
    /// Prefix guide and example chunks with their metadata before embedding.
    pub enrich_embedding_text: bool,
}

impl IngestionOptions {
    pub fn for_codebase() -> Self {
        Self::default()
    }

    pub fn for_guides() -> Self {
        Self {
            chunk_max_tokens: 800,
            chunk_overlap_tokens: 100,
            ..Self::default()
        }
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 1_000,
            chunk_overlap_tokens: 200,
            embedding_batch_size: 32,
            upsert_batch_size: 100,
            enrich_embedding_text: true,
        }
    }
}

/// Body of a `/rag/search` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagSearchRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

fn default_search_limit() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub source_path: String,
    pub payload: serde_json::Value,
}

impl From<ScoredPoint> for SearchHit {
    fn from(point: ScoredPoint) -> Self {
        let text = |key: &str| {
            point
                .payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            content: text("content"),
            source_path: text("source_path"),
            id: point.id,
            score: point.score,
            payload: point.payload,
        }
    }
}
