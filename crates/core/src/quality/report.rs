use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Minimum score for a dataset to be considered ready.
pub const PASSING_SCORE: f64 = 75.0;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StructureReport {
    pub has_metadata: bool,
    pub has_examples: bool,
    pub metadata_complete: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExampleIssues {
    pub example_index: usize,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExampleReport {
    pub total_examples: usize,
    pub valid_examples: usize,
    pub invalid_examples: usize,
    pub quality_issues: Vec<ExampleIssues>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CoverageReport {
    pub guide_coverage: BTreeMap<String, usize>,
    pub difficulty_distribution: BTreeMap<String, usize>,
    pub example_type_distribution: BTreeMap<String, usize>,
    pub concept_coverage: BTreeMap<String, usize>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DuplicatePair {
    pub indices: [usize; 2],
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimilarPair {
    pub indices: [usize; 2],
    pub similarity: f64,
    pub question1: String,
    pub question2: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DuplicateReport {
    pub duplicate_questions: Vec<DuplicatePair>,
    pub duplicate_answers: Vec<DuplicatePair>,
    pub similar_questions: Vec<SimilarPair>,
    /// Both members of every exact question or answer pair.
    pub duplicate_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TerminologyIssue {
    pub example_index: usize,
    pub field: String,
    pub issue: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TerminologyReport {
    pub issues: Vec<TerminologyIssue>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl QualityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityTier::Excellent
        } else if score >= PASSING_SCORE {
            QualityTier::Good
        } else if score >= 60.0 {
            QualityTier::Moderate
        } else {
            QualityTier::Poor
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "Excellent quality - ready for training",
            QualityTier::Good => "Good quality - minor issues to address",
            QualityTier::Moderate => "Moderate quality - several issues to fix",
            QualityTier::Poor => "Poor quality - major issues require attention",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityReport {
    pub validation_timestamp: DateTime<Utc>,
    pub structure: StructureReport,
    pub examples: ExampleReport,
    pub coverage: CoverageReport,
    pub duplicates: DuplicateReport,
    pub terminology: TerminologyReport,
    pub overall_quality_score: f64,
    pub tier: QualityTier,
}

/// Score in `[0, 100]` from the individual check results.
pub fn quality_score(
    structure: &StructureReport,
    examples: &ExampleReport,
    coverage: &CoverageReport,
    duplicates: &DuplicateReport,
    terminology: &TerminologyReport,
) -> f64 {
    let mut score = 100.0;

    if !structure.has_metadata {
        score -= 10.0;
    }
    if !structure.has_examples {
        score -= 20.0;
    }

    if examples.total_examples > 0 {
        let total = examples.total_examples as f64;
        score -= 30.0 * examples.invalid_examples as f64 / total;
        score -= 20.0 * (duplicates.duplicate_count as f64 / total).min(1.0);
    }

    score -= 5.0 * coverage.issues.len() as f64;
    score -= (2.0 * terminology.issues.len() as f64).min(20.0);

    score.clamp(0.0, 100.0)
}

fn mark(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl QualityReport {
    pub fn passes(&self) -> bool {
        self.overall_quality_score >= PASSING_SCORE
    }

    /// Human-readable summary written next to the JSON report.
    pub fn render_summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}\nTRAINING DATA VALIDATION REPORT\n{rule}")?;
        writeln!(f, "\nOverall quality score: {:.1}/100", self.overall_quality_score)?;
        writeln!(f, "{}", self.tier.description())?;

        let structure = &self.structure;
        writeln!(f, "\nStructure:")?;
        writeln!(f, "   Has metadata: {}", mark(structure.has_metadata))?;
        writeln!(f, "   Has examples: {}", mark(structure.has_examples))?;
        writeln!(f, "   Metadata complete: {}", mark(structure.metadata_complete))?;
        if !structure.issues.is_empty() {
            writeln!(f, "   Issues: {}", structure.issues.join(", "))?;
        }

        let examples = &self.examples;
        writeln!(f, "\nExamples:")?;
        writeln!(f, "   Total examples: {}", examples.total_examples)?;
        writeln!(f, "   Valid examples: {}", examples.valid_examples)?;
        writeln!(f, "   Invalid examples: {}", examples.invalid_examples)?;
        if !examples.quality_issues.is_empty() {
            writeln!(f, "   Top issues:")?;
            for issue in examples.quality_issues.iter().take(5) {
                writeln!(f, "     - Example {}: {}", issue.example_index, issue.issues.join(", "))?;
            }
        }

        let coverage = &self.coverage;
        writeln!(f, "\nCoverage:")?;
        writeln!(f, "   Guides covered: {}", coverage.guide_coverage.len())?;
        writeln!(f, "   Guide distribution:")?;
        for (guide, count) in &coverage.guide_coverage {
            writeln!(f, "     {guide}: {count} examples")?;
        }
        writeln!(f, "   Difficulty distribution:")?;
        for (difficulty, count) in &coverage.difficulty_distribution {
            writeln!(f, "     {difficulty}: {count} examples")?;
        }
        if !coverage.issues.is_empty() {
            writeln!(f, "   Coverage issues: {}", coverage.issues.join(", "))?;
        }

        let duplicates = &self.duplicates;
        writeln!(f, "\nDuplicates:")?;
        writeln!(f, "   Duplicate questions: {}", duplicates.duplicate_questions.len())?;
        writeln!(f, "   Duplicate answers: {}", duplicates.duplicate_answers.len())?;
        writeln!(f, "   Similar questions: {}", duplicates.similar_questions.len())?;

        let terminology = &self.terminology;
        writeln!(f, "\nTerminology:")?;
        writeln!(f, "   Terminology issues: {}", terminology.issues.len())?;
        let mut by_kind = BTreeMap::<&str, usize>::new();
        for issue in &terminology.issues {
            *by_kind.entry(issue.issue.as_str()).or_default() += 1;
        }
        for (kind, count) in by_kind {
            writeln!(f, "     {kind}: {count} occurrences")?;
        }

        writeln!(f, "\nRecommendations:")?;
        if !self.passes() {
            writeln!(f, "   - Review and fix invalid examples")?;
        }
        if !coverage.issues.is_empty() {
            writeln!(f, "   - Address coverage gaps")?;
        }
        if duplicates.duplicate_count > 0 {
            writeln!(f, "   - Remove or rephrase duplicate content")?;
        }
        if !terminology.issues.is_empty() {
            writeln!(f, "   - Fix terminology inconsistencies")?;
        }

        write!(f, "\nValidation completed at: {}", self.validation_timestamp.to_rfc3339())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure(has_metadata: bool, has_examples: bool) -> StructureReport {
        StructureReport {
            has_metadata,
            has_examples,
            metadata_complete: has_metadata,
            issues: Vec::new(),
        }
    }

    #[test]
    fn clean_dataset_scores_full_marks() {
        let examples = ExampleReport {
            total_examples: 4,
            valid_examples: 4,
            ..ExampleReport::default()
        };
        let score = quality_score(
            &structure(true, true),
            &examples,
            &CoverageReport::default(),
            &DuplicateReport::default(),
            &TerminologyReport::default(),
        );
        assert_eq!(score, 100.0);
        assert_eq!(QualityTier::from_score(score), QualityTier::Excellent);
    }

    #[test]
    fn penalties_are_capped_and_floored() {
        let examples = ExampleReport {
            total_examples: 2,
            invalid_examples: 2,
            ..ExampleReport::default()
        };
        let duplicates = DuplicateReport {
            duplicate_count: 10,
            ..DuplicateReport::default()
        };
        let terminology = TerminologyReport {
            issues: (0..50)
                .map(|index| TerminologyIssue {
                    example_index: index,
                    field: "answer".to_string(),
                    issue: "x".to_string(),
                    text: String::new(),
                })
                .collect(),
        };
        let score = quality_score(
            &structure(true, true),
            &examples,
            &CoverageReport::default(),
            &duplicates,
            &terminology,
        );
        // 100 - 30 - 20 - 20
        assert_eq!(score, 30.0);

        let coverage = CoverageReport {
            issues: vec!["gap".to_string(); 40],
            ..CoverageReport::default()
        };
        let score = quality_score(
            &structure(false, false),
            &ExampleReport::default(),
            &coverage,
            &DuplicateReport::default(),
            &TerminologyReport::default(),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(QualityTier::from_score(90.0), QualityTier::Excellent);
        assert_eq!(QualityTier::from_score(75.0), QualityTier::Good);
        assert_eq!(QualityTier::from_score(74.9), QualityTier::Moderate);
        assert_eq!(QualityTier::from_score(10.0), QualityTier::Poor);
    }

    #[test]
    fn summary_lists_sections_and_recommendations() {
        let coverage = CoverageReport {
            guide_coverage: BTreeMap::from([("flipper".to_string(), 3)]),
            issues: vec!["Missing guide: erc20".to_string()],
            ..CoverageReport::default()
        };
        let report = QualityReport {
            validation_timestamp: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            structure: structure(true, true),
            examples: ExampleReport {
                total_examples: 3,
                valid_examples: 3,
                ..ExampleReport::default()
            },
            coverage,
            duplicates: DuplicateReport::default(),
            terminology: TerminologyReport::default(),
            overall_quality_score: 95.0,
            tier: QualityTier::Excellent,
        };

        let summary = report.render_summary();
        assert_eq!(summary, report.to_string());
        assert!(summary.contains("Overall quality score: 95.0/100"));
        assert!(summary.contains("     flipper: 3 examples"));
        assert!(summary.contains("   Coverage issues: Missing guide: erc20"));
        assert!(summary.contains("   - Address coverage gaps"));
        assert!(!summary.contains("Review and fix invalid examples"));
        assert!(summary.ends_with("Validation completed at: 1970-01-01T00:00:00+00:00"));
    }
}
