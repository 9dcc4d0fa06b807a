use crate::chunking::TextWindow;
use crate::models::{
    Chunk, ContractInfo, Difficulty, IndexedPoint, LanguageTag, PointId, Provenance, SectionKind,
};
use crate::profile::{DomainProfile, GuideMetadata};
use crate::sections::{detect_language, detect_patterns};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Stable identifier for the chunk at `position` of `source`.
///
/// The source is length-prefixed before hashing so that no two
/// `(source, position)` pairs share an input byte string.
pub fn point_id(source: &str, position: u32) -> PointId {
    let mut hasher = Sha256::new();
    hasher.update((source.len() as u64).to_le_bytes());
    hasher.update(source.as_bytes());
    hasher.update(position.to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    PointId(Uuid::from_bytes(bytes))
}

/// Source-level metadata lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMetadata<'a> {
    Known(&'a GuideMetadata),
    /// The source is not in the guide table; the profile fallback applies.
    Fallback(&'a GuideMetadata),
}

impl<'a> SourceMetadata<'a> {
    pub fn metadata(&self) -> &'a GuideMetadata {
        match self {
            SourceMetadata::Known(metadata) | SourceMetadata::Fallback(metadata) => metadata,
        }
    }
}

/// How a chunk's language tag is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageRule {
    /// Count profile keywords in the chunk text.
    Detect,
    Fixed(LanguageTag),
}

/// Source-wide attributes shared by every chunk of one source.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub source_path: String,
    /// Guide or contract name used for the metadata lookup; `None` skips it.
    pub metadata_key: Option<String>,
    pub section: Option<String>,
    pub classification: SectionKind,
    pub language: LanguageRule,
    pub file_language: Option<String>,
    pub provenance: Provenance,
    pub contract: Option<ContractInfo>,
}

#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    profile: Arc<DomainProfile>,
}

impl MetadataBuilder {
    pub fn new(profile: Arc<DomainProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    pub fn lookup(&self, name: &str) -> SourceMetadata<'_> {
        match self.profile.guides.get(name) {
            Some(metadata) => SourceMetadata::Known(metadata),
            None => SourceMetadata::Fallback(&self.profile.fallback),
        }
    }

    /// Turns token windows into chunks. `first_position` and `line_offset`
    /// place windows of one section inside the whole source.
    pub fn build_chunks(
        &self,
        context: &ChunkContext,
        windows: Vec<TextWindow>,
        first_position: u32,
        line_offset: usize,
    ) -> Vec<Chunk> {
        let source_metadata = context
            .metadata_key
            .as_deref()
            .map(|key| self.lookup(key).metadata());

        windows
            .into_iter()
            .map(|window| Chunk {
                language_tag: match context.language {
                    LanguageRule::Detect => detect_language(&window.content, &self.profile),
                    LanguageRule::Fixed(tag) => tag,
                },
                detected_patterns: detect_patterns(&window.content, &self.profile),
                source_path: context.source_path.clone(),
                position: first_position + window.position,
                span: window.span.offset(line_offset),
                section: context.section.clone(),
                classification: context.classification,
                file_language: context.file_language.clone(),
                difficulty: source_metadata.map(|metadata| metadata.difficulty),
                concepts: source_metadata
                    .map(|metadata| metadata.concepts.iter().cloned().collect())
                    .unwrap_or_default(),
                provenance: context.provenance,
                contract: context.contract.clone(),
                content: window.content,
            })
            .collect()
    }

    pub fn language_name(&self, tag: LanguageTag) -> &str {
        match tag {
            LanguageTag::Before => &self.profile.before.name,
            LanguageTag::After => &self.profile.after.name,
            LanguageTag::Mixed => "mixed",
            LanguageTag::Unknown => "unknown",
        }
    }

    /// Text sent to the embedding model for `chunk`.
    pub fn embedding_text(&self, chunk: &Chunk, enrich: bool) -> String {
        if !enrich || chunk.provenance == Provenance::Codebase {
            return chunk.content.clone();
        }

        let join = |items: &BTreeSet<String>| items.iter().cloned().collect::<Vec<_>>().join(", ");
        let mut header = vec![format!("Migration Guide: {}", source_name(&chunk.source_path))];
        if let Some(section) = chunk.section.as_deref().filter(|section| !section.is_empty()) {
            header.push(format!("Section: {section}"));
        }
        if let Some(difficulty) = chunk.difficulty {
            header.push(format!("Difficulty: {difficulty}"));
        }
        if !chunk.concepts.is_empty() {
            header.push(format!("Concepts: {}", join(&chunk.concepts)));
        }
        header.push(format!("Language: {}", self.language_name(chunk.language_tag)));
        header.push(format!("Type: {}", chunk.classification.as_str()));
        if !chunk.detected_patterns.is_empty() {
            header.push(format!("Patterns: {}", join(&chunk.detected_patterns)));
        }

        format!("{}\n\n{}", header.join(" | "), chunk.content)
    }

    pub fn payload(&self, chunk: &Chunk) -> serde_json::Value {
        let mut payload = json!({
            "content": chunk.content,
            "source_path": chunk.source_path,
            "position": chunk.position,
            "start_line": chunk.span.start,
            "end_line": chunk.span.end,
            "section": chunk.section,
            "classification": chunk.classification,
            "language_tag": chunk.language_tag,
            "language": self.language_name(chunk.language_tag),
            "file_language": chunk.file_language,
            "difficulty": chunk.difficulty,
            "concepts": chunk.concepts,
            "patterns": chunk.detected_patterns,
            "source": chunk.provenance,
            "indexed_at": Utc::now().to_rfc3339(),
        });
        if let (Some(contract), Some(fields)) = (&chunk.contract, payload.as_object_mut()) {
            fields.insert("contract_type".to_string(), json!(contract.contract_type));
            fields.insert("description".to_string(), json!(contract.description));
        }
        payload
    }

    pub fn point(&self, chunk: &Chunk, vector: Vec<f32>) -> IndexedPoint {
        IndexedPoint {
            id: point_id(&chunk.source_path, chunk.position),
            vector,
            payload: self.payload(chunk),
        }
    }
}

/// Guide or contract name encoded in a logical source path such as
/// `guides/migration_guide_flipper.md` or `pairs/flipper`.
fn source_name(source_path: &str) -> &str {
    let file = source_path.rsplit('/').next().unwrap_or(source_path);
    let stem = file.split('.').next().unwrap_or(file);
    stem.strip_prefix("migration_guide_").unwrap_or(stem)
}

/// Distribution summary printed after an ingestion run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ChunkStats {
    pub per_source: BTreeMap<String, usize>,
    pub per_difficulty: BTreeMap<String, usize>,
    pub per_language: BTreeMap<String, usize>,
    pub per_classification: BTreeMap<String, usize>,
    /// Most frequent concepts, highest count first.
    pub top_concepts: Vec<(String, usize)>,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut stats = ChunkStats::default();
        let mut concepts = BTreeMap::<String, usize>::new();

        for chunk in chunks {
            *stats.per_source.entry(chunk.source_path.clone()).or_default() += 1;
            let difficulty = chunk.difficulty.as_ref().map(Difficulty::as_str).unwrap_or("unrated");
            *stats.per_difficulty.entry(difficulty.to_string()).or_default() += 1;
            *stats
                .per_language
                .entry(chunk.language_tag.as_str().to_string())
                .or_default() += 1;
            *stats
                .per_classification
                .entry(chunk.classification.as_str().to_string())
                .or_default() += 1;
            for concept in &chunk.concepts {
                *concepts.entry(concept.clone()).or_default() += 1;
            }
        }

        let mut ranked: Vec<_> = concepts.into_iter().collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        ranked.truncate(10);
        stats.top_concepts = ranked;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineSpan;

    fn builder() -> MetadataBuilder {
        MetadataBuilder::new(Arc::new(DomainProfile::solidity_to_ink()))
    }

    fn window(content: &str, position: u32) -> TextWindow {
        TextWindow {
            content: content.to_string(),
            position,
            span: LineSpan { start: 1, end: 2 },
            token_count: 4,
        }
    }

    fn guide_context(name: &str) -> ChunkContext {
        ChunkContext {
            source_path: format!("guides/migration_guide_{name}.md"),
            metadata_key: Some(name.to_string()),
            section: Some("Solidity Implementation".to_string()),
            classification: SectionKind::BeforeLanguage,
            language: LanguageRule::Detect,
            file_language: None,
            provenance: Provenance::MigrationGuide,
            contract: None,
        }
    }

    #[test]
    fn point_id_is_deterministic() {
        assert_eq!(point_id("src/lib.rs", 3), point_id("src/lib.rs", 3));
        assert_ne!(point_id("src/lib.rs", 3), point_id("src/lib.rs", 4));
        assert_ne!(point_id("src/lib.rs", 3), point_id("src/main.rs", 3));
    }

    #[test]
    fn point_id_has_no_separator_ambiguity() {
        assert_ne!(point_id("a_1", 0), point_id("a", 0));
        assert_ne!(point_id("a1_", 1), point_id("a_1", 1));
    }

    #[test]
    fn point_id_is_stable_across_runs() {
        let id = point_id("guides/migration_guide_flipper.md", 0).to_string();
        assert_eq!(id.len(), 36);
        assert_eq!(id, point_id("guides/migration_guide_flipper.md", 0).to_string());
    }

    #[test]
    fn lookup_falls_back_for_unknown_sources() {
        let builder = builder();
        assert!(matches!(builder.lookup("flipper"), SourceMetadata::Known(_)));

        let fallback = builder.lookup("uniswap");
        assert!(matches!(fallback, SourceMetadata::Fallback(_)));
        assert_eq!(fallback.metadata().difficulty, Difficulty::Intermediate);
        assert_eq!(fallback.metadata().concepts, vec!["general".to_string()]);
    }

    #[test]
    fn chunks_inherit_source_metadata() {
        let builder = builder();
        let windows = vec![
            window("contract Flipper { function flip() public {} }", 0),
            window("emit Flipped(value);", 1),
        ];
        let chunks = builder.build_chunks(&guide_context("flipper"), windows, 4, 10);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].position, 4);
        assert_eq!(chunks[1].position, 5);
        assert_eq!(chunks[0].span, LineSpan { start: 11, end: 12 });
        assert_eq!(chunks[0].difficulty, Some(Difficulty::Beginner));
        assert!(chunks[0].concepts.contains("toggle"));
        assert_eq!(chunks[0].language_tag, LanguageTag::Before);
        assert!(chunks[1].detected_patterns.contains("event_handling"));
    }

    #[test]
    fn enriched_text_carries_metadata_header() {
        let builder = builder();
        let chunks = builder.build_chunks(
            &guide_context("erc20"),
            vec![window("function transfer(address to) public", 0)],
            0,
            0,
        );
        let text = builder.embedding_text(&chunks[0], true);
        let header = text.lines().next().unwrap();

        assert!(header.starts_with("Migration Guide: erc20 | Section: Solidity Implementation"));
        assert!(header.contains("Difficulty: intermediate"));
        assert!(header.contains("Language: solidity"));
        assert!(header.contains("Patterns: token_standard"));
        assert!(text.ends_with("function transfer(address to) public"));
        assert_eq!(builder.embedding_text(&chunks[0], false), chunks[0].content);
    }

    #[test]
    fn payload_flattens_chunk_fields() {
        let builder = builder();
        let chunks = builder.build_chunks(&guide_context("flipper"), vec![window("flip", 0)], 0, 0);
        let point = builder.point(&chunks[0], vec![0.0; 4]);

        assert_eq!(point.id, point_id("guides/migration_guide_flipper.md", 0));
        assert_eq!(point.payload["source"], "migration_guide");
        assert_eq!(point.payload["classification"], "before_language");
        assert_eq!(point.payload["difficulty"], "beginner");
        assert_eq!(point.payload["start_line"], 1);
        assert!(point.payload.get("contract_type").is_none());
    }

    #[test]
    fn pair_payload_carries_contract_fields() {
        let builder = builder();
        let context = ChunkContext {
            source_path: "pairs/flipper".to_string(),
            metadata_key: Some("flipper".to_string()),
            section: Some("Flipper Implementation".to_string()),
            classification: SectionKind::Comparison,
            language: LanguageRule::Fixed(LanguageTag::Mixed),
            file_language: None,
            provenance: Provenance::PairedExample,
            contract: Some(ContractInfo {
                contract_type: "Flipper".to_string(),
                description: "Boolean toggle".to_string(),
            }),
        };
        let chunks = builder.build_chunks(&context, vec![window("flip", 0)], 0, 0);
        let payload = builder.payload(&chunks[0]);
        assert_eq!(payload["contract_type"], "Flipper");
        assert_eq!(payload["description"], "Boolean toggle");
        assert_eq!(payload["language_tag"], "mixed");
    }

    #[test]
    fn stats_rank_concepts() {
        let builder = builder();
        let mut chunks = builder.build_chunks(&guide_context("erc20"), vec![window("a", 0)], 0, 0);
        chunks.extend(builder.build_chunks(&guide_context("erc721_nft"), vec![window("b", 0)], 0, 0));

        let stats = ChunkStats::from_chunks(&chunks);
        assert_eq!(stats.per_source.len(), 2);
        assert_eq!(stats.top_concepts[0], ("standards".to_string(), 2));
        assert_eq!(stats.per_difficulty.get("advanced"), Some(&1));
    }
}
