//! Question/answer generation from parsed migration guides.
//!
//! Every guide yields up to `per_type_limit` examples of each
//! [`ExampleType`], one per concept from the guide metadata table (or per
//! detected pattern for [`ExampleType::Pattern`]). Questions and answers are
//! unique across the whole corpus.

use crate::error::{IngestError, ValidationError};
use crate::identity::MetadataBuilder;
use crate::ingest::{discover_guides, read_source, GuideLayout, SkippedSource};
use crate::models::{ExampleType, SectionKind};
use crate::profile::{DomainProfile, GuideMetadata};
use crate::quality::dataset::{to_document, to_jsonl, TrainingExample};
use crate::sections::{detect_patterns, CodeBlock, Section, SectionParser};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const JSONL_FILE: &str = "migration_training_data.jsonl";
pub const JSON_FILE: &str = "migration_training_data.json";
pub const STATS_FILE: &str = "training_data_stats.json";

const COMPARISON: [&str; 4] = [
    "What are the differences between Solidity and ink! for {subject}?",
    "How does {subject} implementation differ between Solidity and ink!?",
    "Can you compare {subject} in Solidity and ink!?",
    "What changes when I migrate {subject} from Solidity to ink!?",
];
const EXPLANATION: [&str; 4] = [
    "How does {subject} work in ink!?",
    "What is the ink! approach to {subject}?",
    "Can you explain {subject} in ink! smart contracts?",
    "What are the ink! building blocks for {subject}?",
];
const CODE_EXAMPLE: [&str; 4] = [
    "Can you show me how to implement {subject} in ink!?",
    "What is a code example of {subject} in ink!?",
    "Could you show me an ink! code example for {subject}?",
    "What is the ink! code for {subject}?",
];
const MIGRATION_STEP: [&str; 4] = [
    "How do I migrate {subject} from Solidity to ink!?",
    "What are the steps to convert {subject} from Solidity to ink!?",
    "How do I convert {subject} code to ink!?",
    "What is the migration process for {subject}?",
];
// Pattern labels repeat across guides, so these name the guide too.
const PATTERN: [&str; 4] = [
    "What is the {subject} pattern in the {guide} guide for ink!?",
    "How does the {subject} pattern work in the {guide} guide for ink!?",
    "Can you show me the {subject} pattern from the {guide} guide for ink!?",
    "Can you explain the {subject} pattern in the {guide} guide for ink!?",
];
const BEST_PRACTICES: [&str; 4] = [
    "What are the best practices for {subject} in ink!?",
    "How do I handle {subject} safely in ink! contracts?",
    "What are common pitfalls with {subject} in ink!?",
    "What are the recommendations for {subject} in ink!?",
];

fn templates(kind: ExampleType) -> &'static [&'static str] {
    match kind {
        ExampleType::Comparison => &COMPARISON,
        ExampleType::Explanation => &EXPLANATION,
        ExampleType::CodeExample => &CODE_EXAMPLE,
        ExampleType::MigrationStep => &MIGRATION_STEP,
        ExampleType::Pattern => &PATTERN,
        ExampleType::BestPractices => &BEST_PRACTICES,
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub per_type_limit: usize,
    /// Characters of section prose quoted in an answer.
    pub excerpt_chars: usize,
    /// Characters of code quoted in a code example answer.
    pub code_chars: usize,
    /// Characters of each side's code quoted in a comparison answer.
    pub comparison_code_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            per_type_limit: 2,
            excerpt_chars: 800,
            code_chars: 1000,
            comparison_code_chars: 500,
        }
    }
}

/// First `limit` characters of `text`, marked with `...` when cut. A code
/// fence left open by the cut is closed.
fn excerpt(text: &str, limit: usize) -> String {
    let mut out: String = text.chars().take(limit).collect();
    if out.len() < text.len() {
        out.push_str("...");
        if out.matches("```").count() % 2 == 1 {
            out.push_str("\n```");
        }
    }
    out
}

/// Accumulates examples and rejects repeated questions and answers.
#[derive(Default)]
struct Collector {
    examples: Vec<TrainingExample>,
    questions: HashSet<String>,
    answers: HashSet<String>,
}

impl Collector {
    /// Keeps `example` under the first candidate question not used yet.
    fn offer(&mut self, candidates: Vec<String>, example: TrainingExample) -> bool {
        if self.answers.contains(&example.answer) {
            return false;
        }
        let Some(question) = candidates.into_iter().find(|question| !self.questions.contains(question)) else {
            return false;
        };

        self.questions.insert(question.clone());
        self.answers.insert(example.answer.clone());
        self.examples.push(TrainingExample { question, ..example });
        true
    }
}

/// Per-guide inputs shared by the six example builders.
struct GuideInput<'a> {
    name: &'a str,
    metadata: &'a GuideMetadata,
    sections: &'a [Section],
}

impl GuideInput<'_> {
    fn first(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|section| section.classification == kind)
    }

    fn draft(&self, section: &Section, kind: ExampleType, answer: String) -> TrainingExample {
        TrainingExample {
            question: String::new(),
            answer,
            context: section.body.clone(),
            guide_name: self.name.to_string(),
            section: section.title.clone(),
            difficulty: self.metadata.difficulty,
            example_type: kind,
            concepts: self.metadata.concepts.clone(),
            patterns: Vec::new(),
        }
    }

    /// Candidate questions for `subject`, starting at template `rotation`.
    fn questions(&self, kind: ExampleType, subject: &str, rotation: usize) -> Vec<String> {
        let templates = templates(kind);
        let guide = self.name.replace('_', " ");
        (0..templates.len())
            .map(|offset| {
                templates[(rotation + offset) % templates.len()]
                    .replace("{subject}", subject)
                    .replace("{guide}", &guide)
            })
            .collect()
    }
}

/// Builds training examples from migration guides.
#[derive(Debug, Clone)]
pub struct TrainingDataGenerator {
    builder: MetadataBuilder,
    parser: SectionParser,
    config: GeneratorConfig,
}

/// Examples produced from a guides directory plus the guides that could not
/// be read.
#[derive(Debug, Clone, Default)]
pub struct GeneratedCorpus {
    pub examples: Vec<TrainingExample>,
    pub guides_processed: usize,
    pub skipped: Vec<SkippedSource>,
}

impl TrainingDataGenerator {
    pub fn new(profile: Arc<DomainProfile>) -> Result<Self, IngestError> {
        Ok(Self {
            builder: MetadataBuilder::new(profile),
            parser: SectionParser::new()?,
            config: GeneratorConfig::default(),
        })
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Generates examples for `(guide name, markdown)` pairs, in order.
    pub fn generate<'a>(&self, guides: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<TrainingExample> {
        let mut collector = Collector::default();
        for (name, document) in guides {
            let before = collector.examples.len();
            self.generate_guide(name, document, &mut collector);
            info!(guide = name, examples = collector.examples.len() - before, "generated training examples");
        }
        collector.examples
    }

    /// Reads every guide under `dir` and generates examples from it.
    /// Unreadable guides are skipped.
    pub fn generate_dir(&self, dir: &Path, layout: &GuideLayout) -> Result<GeneratedCorpus, IngestError> {
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();
        for guide in discover_guides(dir, layout)? {
            match read_source(&guide.path) {
                Ok(text) => loaded.push((guide.name, text)),
                Err(error) => {
                    warn!(path = %guide.path.display(), %error, "skipping guide");
                    skipped.push(SkippedSource {
                        path: guide.path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        let examples = self.generate(loaded.iter().map(|(name, text)| (name.as_str(), text.as_str())));
        Ok(GeneratedCorpus {
            examples,
            guides_processed: loaded.len(),
            skipped,
        })
    }

    fn generate_guide(&self, name: &str, document: &str, collector: &mut Collector) {
        let profile = self.builder.profile();
        let sections = self.parser.parse(document, profile);
        let input = GuideInput {
            name,
            metadata: self.builder.lookup(name).metadata(),
            sections: &sections,
        };

        self.comparisons(&input, collector);
        self.per_concept(&input, SectionKind::Overview, ExampleType::Explanation, collector, |section, concept| {
            format!(
                "{}\n\nThis is how ink! handles {concept} in the {} migration.",
                excerpt(&section.body, self.config.excerpt_chars),
                name.replace('_', " ")
            )
        });
        self.code_examples(&input, collector);
        self.per_concept(&input, SectionKind::MigrationStep, ExampleType::MigrationStep, collector, |section, concept| {
            format!(
                "To migrate {concept} from Solidity to ink!, follow these steps:\n\n{}\n\nEach step keeps the contract behaviour while moving it to ink!.",
                excerpt(&section.body, self.config.excerpt_chars)
            )
        });
        self.patterns(&input, collector);
        self.per_concept(&input, SectionKind::BestPractices, ExampleType::BestPractices, collector, |section, concept| {
            format!(
                "Best practices for {concept} in ink!:\n\n{}\n\nFollowing them keeps ink! contracts robust and maintainable.",
                excerpt(&section.body, self.config.excerpt_chars)
            )
        });
    }

    /// One example per concept, answered from the first section of `section_kind`.
    fn per_concept(
        &self,
        input: &GuideInput<'_>,
        section_kind: SectionKind,
        kind: ExampleType,
        collector: &mut Collector,
        answer: impl Fn(&Section, &str) -> String,
    ) {
        let Some(section) = input.first(section_kind) else {
            return;
        };
        let mut added = 0;
        for (index, concept) in input.metadata.concepts.iter().enumerate() {
            if added == self.config.per_type_limit {
                break;
            }
            let example = input.draft(section, kind, answer(section, concept));
            if collector.offer(input.questions(kind, concept, index), example) {
                added += 1;
            }
        }
    }

    /// Pairs the first code block of each language in the guide.
    fn comparisons(&self, input: &GuideInput<'_>, collector: &mut Collector) {
        let profile = self.builder.profile();
        let Some((before_section, before)) = first_block(input.sections, &profile.before.name) else {
            return;
        };
        let Some((after_section, after)) = first_block(input.sections, &profile.after.name) else {
            return;
        };

        let limit = self.config.comparison_code_chars;
        let mut added = 0;
        for (index, concept) in input.metadata.concepts.iter().enumerate() {
            if added == self.config.per_type_limit {
                break;
            }
            let answer = format!(
                "When migrating {concept} from Solidity to ink!, these are the key differences:\n\n\
                 **Solidity implementation:**\n```{before_fence}\n{before_code}\n```\n\n\
                 **ink! implementation:**\n```{after_fence}\n{after_code}\n```\n\n\
                 The main differences are the storage layout, explicit error handling with `Result` and the attribute macros on the ink! side.",
                before_fence = profile.before.name,
                before_code = excerpt(&before.code, limit),
                after_fence = profile.after.name,
                after_code = excerpt(&after.code, limit),
            );
            let mut example = input.draft(before_section, ExampleType::Comparison, answer);
            if before_section.title != after_section.title {
                example.context = format!("{}\n\n{}", before_section.body, after_section.body);
            }
            if collector.offer(input.questions(ExampleType::Comparison, concept, index), example) {
                added += 1;
            }
        }
    }

    fn code_examples(&self, input: &GuideInput<'_>, collector: &mut Collector) {
        let language = &self.builder.profile().after.name;
        let Some((section, block)) = input
            .sections
            .iter()
            .filter(|section| section.classification == SectionKind::AfterLanguage)
            .find_map(|section| {
                section
                    .code_blocks
                    .iter()
                    .find(|block| &block.language == language)
                    .map(|block| (section, block))
            })
        else {
            return;
        };

        let mut added = 0;
        for (index, concept) in input.metadata.concepts.iter().enumerate() {
            if added == self.config.per_type_limit {
                break;
            }
            let answer = format!(
                "Here is how {concept} is implemented in ink!:\n\n```{language}\n{}\n```\n\n\
                 The example relies on ink! attribute macros and explicit `Result` returns.",
                excerpt(&block.code, self.config.code_chars)
            );
            let example = input.draft(section, ExampleType::CodeExample, answer);
            if collector.offer(input.questions(ExampleType::CodeExample, concept, index), example) {
                added += 1;
            }
        }
    }

    /// One example per pattern detected in the first pattern section.
    fn patterns(&self, input: &GuideInput<'_>, collector: &mut Collector) {
        let Some(section) = input.first(SectionKind::Pattern) else {
            return;
        };

        let mut added = 0;
        for (index, label) in detect_patterns(&section.body, self.builder.profile()).into_iter().enumerate() {
            if added == self.config.per_type_limit {
                break;
            }
            let subject = label.replace('_', " ");
            let answer = format!(
                "The {subject} pattern in ink! works as follows:\n\n{}",
                excerpt(&section.body, self.config.excerpt_chars)
            );
            let mut example = input.draft(section, ExampleType::Pattern, answer);
            example.patterns = vec![label];
            if collector.offer(input.questions(ExampleType::Pattern, &subject, index), example) {
                added += 1;
            }
        }
    }
}

fn first_block<'a>(sections: &'a [Section], language: &str) -> Option<(&'a Section, &'a CodeBlock)> {
    sections.iter().find_map(|section| {
        section
            .code_blocks
            .iter()
            .find(|block| block.language == language)
            .map(|block| (section, block))
    })
}

/// Distribution summary written next to the generated data.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingStats {
    pub total_examples: usize,
    pub guides_processed: usize,
    pub created_at: DateTime<Utc>,
    pub guide_distribution: BTreeMap<String, usize>,
    pub difficulty_distribution: BTreeMap<String, usize>,
    pub example_type_distribution: BTreeMap<String, usize>,
    pub concept_distribution: BTreeMap<String, usize>,
}

impl TrainingStats {
    pub fn from_examples(examples: &[TrainingExample], created_at: DateTime<Utc>) -> Self {
        let mut stats = Self {
            total_examples: examples.len(),
            guides_processed: 0,
            created_at,
            guide_distribution: BTreeMap::new(),
            difficulty_distribution: BTreeMap::new(),
            example_type_distribution: BTreeMap::new(),
            concept_distribution: BTreeMap::new(),
        };
        let mut guides = BTreeSet::new();

        for example in examples {
            guides.insert(example.guide_name.as_str());
            *stats.guide_distribution.entry(example.guide_name.clone()).or_default() += 1;
            *stats
                .difficulty_distribution
                .entry(example.difficulty.to_string())
                .or_default() += 1;
            *stats
                .example_type_distribution
                .entry(example.example_type.to_string())
                .or_default() += 1;
            for concept in &example.concepts {
                *stats.concept_distribution.entry(concept.clone()).or_default() += 1;
            }
        }
        stats.guides_processed = guides.len();
        stats
    }
}

/// Paths written by [`write_corpus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFiles {
    pub jsonl: PathBuf,
    pub json: PathBuf,
    pub stats: PathBuf,
}

/// Writes the JSONL chat records, the JSON document and the statistics into
/// `dir`, creating it if needed.
pub fn write_corpus(
    dir: &Path,
    examples: &[TrainingExample],
    created_at: DateTime<Utc>,
) -> Result<CorpusFiles, ValidationError> {
    fs::create_dir_all(dir)?;
    let files = CorpusFiles {
        jsonl: dir.join(JSONL_FILE),
        json: dir.join(JSON_FILE),
        stats: dir.join(STATS_FILE),
    };

    fs::write(&files.jsonl, to_jsonl(examples)?)?;
    fs::write(&files.json, serde_json::to_string_pretty(&to_document(examples, created_at))?)?;
    let stats = TrainingStats::from_examples(examples, created_at);
    fs::write(&files.stats, serde_json::to_string_pretty(&stats)?)?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::quality::checks::{QualityValidator, ValidationRules};
    use crate::quality::dataset::{into_examples, load_dataset, parse_document};
    use tempfile::tempdir;

    const GUIDES: [&str; 10] = [
        "counter",
        "flipper",
        "simple_storage",
        "event_emitter",
        "erc721_nft",
        "multisig_wallet",
        "erc20",
        "erc1155",
        "escrow_vesting",
        "main_tutorial",
    ];

    fn guide(name: &str) -> String {
        format!(
            "# {name} migration guide\n\n\
             ## Overview\nThe {name} contract keeps its data in ink! storage and exposes a few messages.\n\n\
             ## Solidity Implementation\n```solidity\ncontract C_{name} {{\n    bool value;\n    function flip() public {{ value = !value; }}\n}}\n```\n\n\
             ## ink! Implementation\n```rust\n#[ink(storage)]\npub struct C_{name} {{ value: bool }}\n```\n\n\
             ## Migration Steps\n1. Move the {name} fields into an `#[ink(storage)]` struct.\n2. Replace `require` checks with `Result` returns.\n\n\
             ## Common Patterns\nUse `Mapping` for storage in the {name} contract and emit an event for each change.\n\n\
             ## Best Practices\nKeep {name} messages small and return `Result` from every fallible ink! message.\n"
        )
    }

    fn generator() -> TrainingDataGenerator {
        TrainingDataGenerator::new(Arc::new(DomainProfile::solidity_to_ink())).unwrap()
    }

    fn count(examples: &[TrainingExample], kind: ExampleType) -> usize {
        examples.iter().filter(|example| example.example_type == kind).count()
    }

    #[test]
    fn every_example_type_comes_from_its_section() {
        let text = guide("flipper");
        let examples = generator().generate([("flipper", text.as_str())]);

        for kind in ExampleType::ALL {
            assert_eq!(count(&examples, kind), 2, "{kind}");
        }
        assert!(examples.iter().all(|example| example.difficulty == Difficulty::Beginner));
        assert!(examples.iter().all(|example| example.guide_name == "flipper"));

        let code = examples
            .iter()
            .find(|example| example.example_type == ExampleType::CodeExample)
            .unwrap();
        assert_eq!(code.section, "ink! Implementation");
        assert!(code.answer.contains("```rust\n#[ink(storage)]"));

        let comparison = examples
            .iter()
            .find(|example| example.example_type == ExampleType::Comparison)
            .unwrap();
        assert!(comparison.answer.contains("```solidity\ncontract C_flipper"));
        assert!(comparison.context.contains("pub struct C_flipper"));

        let patterns: BTreeSet<_> = examples
            .iter()
            .flat_map(|example| example.patterns.iter().cloned())
            .collect();
        assert_eq!(
            patterns,
            BTreeSet::from(["event_handling".to_string(), "storage_conversion".to_string()])
        );
    }

    #[test]
    fn concept_count_caps_per_type_output() {
        let text = guide("main_tutorial");
        let examples = generator().generate([("main_tutorial", text.as_str())]);
        // the fallback metadata has a single concept
        assert_eq!(count(&examples, ExampleType::Explanation), 1);
        assert_eq!(count(&examples, ExampleType::Pattern), 2);
        assert!(examples.iter().all(|example| example.difficulty == Difficulty::Intermediate));
    }

    #[test]
    fn shared_concepts_get_distinct_questions() {
        let counter = guide("counter");
        let flipper = guide("flipper");
        let examples = generator().generate([("counter", counter.as_str()), ("flipper", flipper.as_str())]);

        let questions: HashSet<_> = examples.iter().map(|example| example.question.as_str()).collect();
        assert_eq!(questions.len(), examples.len());
        // both guides list "state" first
        let state: Vec<_> = examples
            .iter()
            .filter(|example| example.example_type == ExampleType::Explanation && example.question.contains("state"))
            .collect();
        assert_eq!(state.len(), 2);
        assert_ne!(state[0].question, state[1].question);
    }

    #[test]
    fn guides_without_sections_yield_nothing() {
        let examples = generator().generate([("counter", "just some notes without headings")]);
        assert!(examples.is_empty());
    }

    #[test]
    fn excerpts_close_cut_fences() {
        assert_eq!(excerpt("short", 10), "short");
        let cut = excerpt("intro\n```rust\nlet value = 1;\n```", 18);
        assert!(cut.starts_with("intro\n```rust\nlet "));
        assert!(cut.ends_with("...\n```"));
        assert_eq!(cut.matches("```").count(), 2);
    }

    #[test]
    fn generated_corpus_passes_validation() -> Result<(), Box<dyn std::error::Error>> {
        let texts: Vec<_> = GUIDES.iter().map(|name| (*name, guide(name))).collect();
        let examples = generator().generate(texts.iter().map(|(name, text)| (*name, text.as_str())));
        assert_eq!(examples.len(), 9 * 12 + 7);

        let text = serde_json::to_string(&to_document(&examples, Utc::now()))?;
        let dataset = parse_document(&text)?;
        assert_eq!(into_examples(&dataset)?, examples);

        let report = QualityValidator::new(ValidationRules::default())?.validate(&dataset);
        assert_eq!(report.examples.invalid_examples, 0, "{:?}", report.examples.quality_issues);
        assert_eq!(report.duplicates.duplicate_count, 0);
        assert!(report.coverage.issues.is_empty(), "{:?}", report.coverage.issues);
        assert!(report.terminology.issues.is_empty(), "{:?}", report.terminology.issues);
        assert!(report.passes());
        assert_eq!(report.overall_quality_score, 100.0);
        Ok(())
    }

    #[test]
    fn corpus_files_are_written_and_reloadable() -> Result<(), Box<dyn std::error::Error>> {
        let guides = tempdir()?;
        fs::write(guides.path().join("migration_guide_erc20.md"), guide("erc20"))?;
        fs::write(guides.path().join("migration_guide_bad.md"), [0xff, 0xfe])?;

        let corpus = generator().generate_dir(guides.path(), &GuideLayout::default())?;
        assert_eq!(corpus.guides_processed, 1);
        assert_eq!(corpus.skipped.len(), 1);
        assert_eq!(corpus.examples.len(), 12);

        let out = tempdir()?;
        let created_at = Utc::now();
        let files = write_corpus(&out.path().join("training_data"), &corpus.examples, created_at)?;

        assert_eq!(into_examples(&load_dataset(&files.json)?)?, corpus.examples);
        assert_eq!(into_examples(&load_dataset(&files.jsonl)?)?, corpus.examples);

        let stats: serde_json::Value = serde_json::from_str(&fs::read_to_string(&files.stats)?)?;
        assert_eq!(stats["total_examples"], 12);
        assert_eq!(stats["guides_processed"], 1);
        assert_eq!(stats["difficulty_distribution"]["intermediate"], 12);
        assert_eq!(stats["example_type_distribution"]["pattern"], 2);
        assert_eq!(stats["concept_distribution"]["tokens"], 12);
        Ok(())
    }
}
