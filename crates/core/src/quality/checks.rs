use crate::error::ValidationError;
use crate::models::{Difficulty, ExampleType};
use crate::profile::DomainProfile;
use crate::quality::dataset::{ExampleList, ExampleRecord, TrainingDataset};
use crate::quality::report::{
    quality_score, CoverageReport, DuplicatePair, DuplicateReport, ExampleIssues, ExampleReport,
    QualityReport, QualityTier, SimilarPair, StructureReport, TerminologyIssue, TerminologyReport,
};
use crate::quality::similarity::{PairwiseJaccard, SimilarityIndex};
use chrono::Utc;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

const QUESTION_PATTERNS: [&str; 10] = [
    r"how\s+do\s+i",
    r"what\s+is",
    r"how\s+does",
    r"what\s+are",
    r"show\s+me",
    r"explain",
    r"compare",
    r"difference",
    r"migrate",
    r"convert",
];

const CODE_SPANS: &str = r"(?s)```.*?```|`[^`\n]*`";

/// Thresholds and required names for a training data set.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub min_question_chars: usize,
    pub max_question_chars: usize,
    pub min_answer_chars: usize,
    pub max_answer_chars: usize,
    pub question_patterns: Vec<String>,
    pub required_metadata: Vec<String>,
    pub required_guides: Vec<String>,
    /// Every answer must mention this term, case-insensitively.
    pub domain_term: String,
    pub near_duplicate_threshold: f64,
    pub uneven_factor: usize,
    pub min_difficulty_share: f64,
    /// Lower-case words that must be capitalized, with the expected spelling.
    pub capitalized_terms: Vec<(String, String)>,
}

impl ValidationRules {
    pub fn from_profile(profile: &DomainProfile) -> Self {
        Self {
            min_question_chars: 10,
            max_question_chars: 200,
            min_answer_chars: 50,
            max_answer_chars: 2000,
            question_patterns: QUESTION_PATTERNS.iter().map(|pattern| pattern.to_string()).collect(),
            required_metadata: ["created_at", "total_examples", "guides_processed"]
                .iter()
                .map(|field| field.to_string())
                .collect(),
            required_guides: profile.required_guides(),
            domain_term: "ink".to_string(),
            near_duplicate_threshold: 0.8,
            uneven_factor: 3,
            min_difficulty_share: 0.10,
            capitalized_terms: [
                ("solidity", "Solidity"),
                ("polkadot", "Polkadot"),
                ("substrate", "Substrate"),
            ]
            .iter()
            .map(|(word, expected)| (word.to_string(), expected.to_string()))
            .collect(),
        }
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from_profile(&DomainProfile::default())
    }
}

struct TermRule {
    pattern: Regex,
    issue: String,
}

/// Runs every check over a loaded dataset.
pub struct QualityValidator<S = PairwiseJaccard> {
    rules: ValidationRules,
    question_patterns: Vec<Regex>,
    terms: Vec<TermRule>,
    domain_word: Regex,
    code_spans: Regex,
    similarity: S,
}

impl QualityValidator<PairwiseJaccard> {
    pub fn new(rules: ValidationRules) -> Result<Self, ValidationError> {
        Self::with_similarity(rules, PairwiseJaccard)
    }
}

impl<S: SimilarityIndex> QualityValidator<S> {
    pub fn with_similarity(rules: ValidationRules, similarity: S) -> Result<Self, ValidationError> {
        let question_patterns = rules
            .question_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let terms = rules
            .capitalized_terms
            .iter()
            .map(|(word, expected)| -> Result<TermRule, regex::Error> {
                Ok(TermRule {
                    pattern: Regex::new(&format!(r"\b{}\b", regex::escape(word)))?,
                    issue: format!("Should use '{expected}' (capitalized)"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let domain_word = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&rules.domain_term)))?;

        Ok(Self {
            question_patterns,
            terms,
            domain_word,
            code_spans: Regex::new(CODE_SPANS)?,
            similarity,
            rules,
        })
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn validate(&self, dataset: &TrainingDataset) -> QualityReport {
        let records = dataset.records();
        let structure = self.check_structure(dataset);
        let examples = self.check_examples(records);
        let coverage = self.check_coverage(records);
        let duplicates = self.check_duplicates(records);
        let terminology = self.check_terminology(records);
        let score = quality_score(&structure, &examples, &coverage, &duplicates, &terminology);

        QualityReport {
            validation_timestamp: Utc::now(),
            structure,
            examples,
            coverage,
            duplicates,
            terminology,
            overall_quality_score: score,
            tier: QualityTier::from_score(score),
        }
    }

    pub fn check_structure(&self, dataset: &TrainingDataset) -> StructureReport {
        let mut report = StructureReport::default();

        match &dataset.metadata {
            Some(metadata) => {
                report.has_metadata = true;
                let missing: Vec<_> = self
                    .rules
                    .required_metadata
                    .iter()
                    .filter(|field| !metadata.contains_key(field.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    report.metadata_complete = true;
                } else {
                    report.issues.push(format!("Missing metadata fields: {}", missing.join(", ")));
                }
            }
            None => report.issues.push("Missing metadata section".to_string()),
        }

        match &dataset.examples {
            ExampleList::List(records) if !records.is_empty() => report.has_examples = true,
            ExampleList::List(_) => report.issues.push("Examples list is empty".to_string()),
            ExampleList::NotAList => report.issues.push("Examples should be a list".to_string()),
            ExampleList::Missing => report.issues.push("Missing examples section".to_string()),
        }

        report
    }

    fn example_issues(&self, record: &ExampleRecord) -> Vec<String> {
        let rules = &self.rules;
        let mut issues = Vec::new();

        let missing: Vec<_> = [
            ("question", record.question.is_none()),
            ("answer", record.answer.is_none()),
            ("guide_name", record.guide_name.is_none()),
            ("difficulty", record.difficulty.is_none()),
            ("example_type", record.example_type.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(field, _)| *field)
        .collect();
        if !missing.is_empty() {
            issues.push(format!("Missing fields: {}", missing.join(", ")));
        }

        if let Some(question) = &record.question {
            let length = question.chars().count();
            if length < rules.min_question_chars {
                issues.push(format!("Question too short ({length} chars)"));
            } else if length > rules.max_question_chars {
                issues.push(format!("Question too long ({length} chars)"));
            }

            let lowered = question.to_lowercase();
            if !self.question_patterns.iter().any(|pattern| pattern.is_match(&lowered)) {
                issues.push("Question doesn't match expected patterns".to_string());
            }
            if !question.trim_end().ends_with('?') {
                issues.push("Question should end with '?'".to_string());
            }
        }

        if let Some(answer) = &record.answer {
            let length = answer.chars().count();
            if length < rules.min_answer_chars {
                issues.push(format!("Answer too short ({length} chars)"));
            } else if length > rules.max_answer_chars {
                issues.push(format!("Answer too long ({length} chars)"));
            }

            if record.example_type.as_deref() == Some(ExampleType::CodeExample.as_str())
                && !answer.contains("```")
            {
                issues.push("Code example should contain code blocks".to_string());
            }
            if !answer.to_lowercase().contains(&rules.domain_term.to_lowercase()) {
                issues.push(format!("Answer should mention {}", rules.domain_term));
            }
        }

        if let Some(difficulty) = &record.difficulty {
            if difficulty.parse::<Difficulty>().is_err() {
                issues.push(format!("Invalid difficulty: {difficulty}"));
            }
        }
        if let Some(example_type) = &record.example_type {
            if example_type.parse::<ExampleType>().is_err() {
                issues.push(format!("Invalid example type: {example_type}"));
            }
        }

        issues
    }

    pub fn check_examples(&self, records: &[ExampleRecord]) -> ExampleReport {
        let mut report = ExampleReport {
            total_examples: records.len(),
            ..ExampleReport::default()
        };

        for (index, record) in records.iter().enumerate() {
            let issues = self.example_issues(record);
            if issues.is_empty() {
                report.valid_examples += 1;
            } else {
                report.invalid_examples += 1;
                report.quality_issues.push(ExampleIssues {
                    example_index: index,
                    issues,
                });
            }
        }
        report
    }

    pub fn check_coverage(&self, records: &[ExampleRecord]) -> CoverageReport {
        fn count<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
            let mut counts = BTreeMap::new();
            for value in values {
                *counts.entry(value.to_string()).or_default() += 1;
            }
            counts
        }
        let name = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());

        let guides: Vec<String> = records.iter().map(|record| name(&record.guide_name)).collect();
        let difficulties: Vec<String> = records.iter().map(|record| name(&record.difficulty)).collect();
        let types: Vec<String> = records.iter().map(|record| name(&record.example_type)).collect();

        let mut report = CoverageReport {
            guide_coverage: count(guides.iter().map(String::as_str)),
            difficulty_distribution: count(difficulties.iter().map(String::as_str)),
            example_type_distribution: count(types.iter().map(String::as_str)),
            concept_coverage: count(
                records
                    .iter()
                    .flat_map(|record| record.concepts.iter().map(String::as_str)),
            ),
            issues: Vec::new(),
        };

        for guide in &self.rules.required_guides {
            if !report.guide_coverage.contains_key(guide) {
                report.issues.push(format!("Missing guide: {guide}"));
            }
        }

        let min = report.guide_coverage.values().min().copied();
        let max = report.guide_coverage.values().max().copied();
        if let (Some(min), Some(max)) = (min, max) {
            if max > min * self.rules.uneven_factor {
                report.issues.push("Uneven guide distribution".to_string());
            }
        }

        if !records.is_empty() {
            let total = records.len() as f64;
            for difficulty in Difficulty::ALL {
                let count = report
                    .difficulty_distribution
                    .get(difficulty.as_str())
                    .copied()
                    .unwrap_or_default();
                let share = count as f64 / total;
                if share < self.rules.min_difficulty_share {
                    report
                        .issues
                        .push(format!("Low {difficulty} representation: {:.1}%", share * 100.0));
                }
            }
        }

        report
    }

    pub fn check_duplicates(&self, records: &[ExampleRecord]) -> DuplicateReport {
        fn exact_pairs<'a>(values: impl Iterator<Item = &'a str>) -> Vec<DuplicatePair> {
            let mut first_seen = HashMap::<&str, usize>::new();
            let mut pairs = Vec::new();
            for (index, value) in values.enumerate() {
                match first_seen.get(value) {
                    Some(&first) => pairs.push(DuplicatePair {
                        indices: [first, index],
                        text: value.chars().take(100).collect(),
                    }),
                    None => {
                        first_seen.insert(value, index);
                    }
                }
            }
            pairs
        }

        let questions: Vec<&str> = records
            .iter()
            .map(|record| record.question.as_deref().unwrap_or_default())
            .collect();
        let answers = records
            .iter()
            .map(|record| record.answer.as_deref().unwrap_or_default());

        let duplicate_questions = exact_pairs(questions.iter().copied());
        let duplicate_answers = exact_pairs(answers);
        let similar_questions = self
            .similarity
            .similar_pairs(&questions, self.rules.near_duplicate_threshold)
            .into_iter()
            .map(|(left, right, similarity)| SimilarPair {
                indices: [left, right],
                similarity,
                question1: questions[left].to_string(),
                question2: questions[right].to_string(),
            })
            .collect();

        DuplicateReport {
            duplicate_count: 2 * (duplicate_questions.len() + duplicate_answers.len()),
            duplicate_questions,
            duplicate_answers,
            similar_questions,
        }
    }

    /// Flags lower-case product names and a bare domain term without `!` in
    /// prose. Code blocks and inline code are not checked.
    pub fn check_terminology(&self, records: &[ExampleRecord]) -> TerminologyReport {
        let mut report = TerminologyReport::default();

        for (index, record) in records.iter().enumerate() {
            let fields = [("question", &record.question), ("answer", &record.answer)];
            for (field, value) in fields {
                let Some(text) = value else {
                    continue;
                };
                let prose = self.code_spans.replace_all(text, " ");

                let mut found: Vec<String> = self
                    .terms
                    .iter()
                    .filter(|term| term.pattern.is_match(&prose))
                    .map(|term| term.issue.clone())
                    .collect();
                if self.bare_domain_term(&prose) {
                    found.push(format!(
                        "Should use '{}!' (with exclamation)",
                        self.rules.domain_term
                    ));
                }

                for issue in found {
                    report.issues.push(TerminologyIssue {
                        example_index: index,
                        field: field.to_string(),
                        issue,
                        text: text.chars().take(100).collect(),
                    });
                }
            }
        }
        report
    }

    fn bare_domain_term(&self, prose: &str) -> bool {
        self.domain_word
            .find_iter(prose)
            .any(|found| !prose[found.end()..].starts_with('!'))
    }
}
