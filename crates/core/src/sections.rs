//! Structural parsing of markdown guides: level-2 sections, fenced code
//! blocks, and the keyword classifiers applied to them.

use crate::error::IngestError;
use crate::models::{LanguageTag, SectionKind};
use crate::profile::DomainProfile;
use regex::Regex;
use std::collections::BTreeSet;

const SECTION_HEADING: &str = r"(?m)^## (.+?)\r?$";
const CODE_FENCE: &str = r"(?s)```(\w+)?\r?\n(.*?)```";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub body: String,
    /// 1-based line of the document on which the body starts.
    pub start_line: usize,
    pub classification: SectionKind,
    pub code_blocks: Vec<CodeBlock>,
}

#[derive(Debug, Clone)]
pub struct SectionParser {
    heading: Regex,
    fence: Regex,
}

impl SectionParser {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            heading: Regex::new(SECTION_HEADING)?,
            fence: Regex::new(CODE_FENCE)?,
        })
    }

    /// Splits a document on `## ` headings, in document order.
    ///
    /// Text before the first heading becomes an untitled section when it is
    /// not blank; a document without headings is one untitled section.
    pub fn parse(&self, document: &str, profile: &DomainProfile) -> Vec<Section> {
        let headings: Vec<_> = self
            .heading
            .captures_iter(document)
            .filter_map(|capture| {
                let whole = capture.get(0)?;
                let title = capture.get(1)?;
                Some((whole.start(), whole.end(), title.as_str().trim().to_string()))
            })
            .collect();

        let mut sections = Vec::new();
        let preamble_end = headings.first().map(|(start, _, _)| *start).unwrap_or(document.len());
        let preamble = &document[..preamble_end];
        if headings.is_empty() || !preamble.trim().is_empty() {
            sections.push(self.section(document, String::new(), 0, preamble_end, profile));
        }

        for (index, (_, body_start, title)) in headings.iter().enumerate() {
            let body_end = headings
                .get(index + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(document.len());
            sections.push(self.section(document, title.clone(), *body_start, body_end, profile));
        }

        sections
    }

    fn section(
        &self,
        document: &str,
        title: String,
        body_start: usize,
        body_end: usize,
        profile: &DomainProfile,
    ) -> Section {
        let raw = &document[body_start..body_end];
        let leading = raw.len() - raw.trim_start().len();
        let start_line = line_of(document, body_start + leading);
        let body = raw.trim().to_string();

        Section {
            classification: classify_title(&title, profile),
            code_blocks: self.extract_code_blocks(&body),
            title,
            body,
            start_line,
        }
    }

    pub fn extract_code_blocks(&self, text: &str) -> Vec<CodeBlock> {
        self.fence
            .captures_iter(text)
            .map(|capture| CodeBlock {
                language: capture
                    .get(1)
                    .map(|tag| tag.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                code: capture
                    .get(2)
                    .map(|code| code.as_str().trim().to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// One-shot form of [`SectionParser::parse`].
pub fn parse_sections(document: &str, profile: &DomainProfile) -> Result<Vec<Section>, IngestError> {
    Ok(SectionParser::new()?.parse(document, profile))
}

fn line_of(document: &str, byte_offset: usize) -> usize {
    document[..byte_offset].matches('\n').count() + 1
}

/// First matching rule in profile order wins; no match falls back to
/// [`SectionKind::General`].
pub fn classify_title(title: &str, profile: &DomainProfile) -> SectionKind {
    let lowered = title.to_lowercase();
    profile
        .classification_rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.kind)
        .unwrap_or(SectionKind::General)
}

pub fn detect_patterns(text: &str, profile: &DomainProfile) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    profile
        .patterns
        .iter()
        .filter(|pattern| {
            pattern
                .keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        })
        .map(|pattern| pattern.label.clone())
        .collect()
}

/// Counts keyword occurrences for each side; ties, including no hits at all,
/// are `Mixed`.
pub fn detect_language(text: &str, profile: &DomainProfile) -> LanguageTag {
    let occurrences = |keywords: &[String]| -> usize {
        keywords
            .iter()
            .map(|keyword| text.matches(keyword.as_str()).count())
            .sum()
    };

    let before = occurrences(&profile.before.keywords);
    let after = occurrences(&profile.after.keywords);

    match before.cmp(&after) {
        std::cmp::Ordering::Greater => LanguageTag::Before,
        std::cmp::Ordering::Less => LanguageTag::After,
        std::cmp::Ordering::Equal => LanguageTag::Mixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &str = "# Flipper migration\n\nIntro text.\n\n## Overview\nA boolean toggle.\n\n## Solidity vs ink! Implementation\n```solidity\ncontract Flipper {\n    bool value;\n}\n```\n\n```rust\n#[ink(storage)]\npub struct Flipper { value: bool }\n```\n\n```\nplain fence\n```\n### Not a section\nstill the same section\n";

    fn parser() -> SectionParser {
        SectionParser::new().unwrap()
    }

    #[test]
    fn splits_on_level_two_headings_in_order() {
        let profile = DomainProfile::solidity_to_ink();
        let sections = parser().parse(GUIDE, &profile);

        let titles: Vec<_> = sections.iter().map(|section| section.title.as_str()).collect();
        assert_eq!(titles, vec!["", "Overview", "Solidity vs ink! Implementation"]);
        assert_eq!(sections[1].body, "A boolean toggle.");
        assert_eq!(sections[1].start_line, 6);
        assert!(sections[2].body.contains("### Not a section"));
    }

    #[test]
    fn one_shot_parse_matches_parser() {
        let profile = DomainProfile::solidity_to_ink();
        assert_eq!(parse_sections(GUIDE, &profile).unwrap(), parser().parse(GUIDE, &profile));
    }

    #[test]
    fn document_without_headings_is_one_section() {
        let profile = DomainProfile::solidity_to_ink();
        let sections = parser().parse("just text\nmore text", &profile);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "");
        assert_eq!(sections[0].classification, SectionKind::General);
        assert_eq!(sections[0].body, "just text\nmore text");
    }

    #[test]
    fn blank_preamble_is_dropped() {
        let profile = DomainProfile::solidity_to_ink();
        let sections = parser().parse("\n\n## Overview\nbody", &profile);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].classification, SectionKind::Overview);
    }

    #[test]
    fn code_blocks_keep_order_and_language() {
        let profile = DomainProfile::solidity_to_ink();
        let sections = parser().parse(GUIDE, &profile);
        let blocks = &sections[2].code_blocks;

        let languages: Vec<_> = blocks.iter().map(|block| block.language.as_str()).collect();
        assert_eq!(languages, vec!["solidity", "rust", "unknown"]);
        assert!(blocks[0].code.starts_with("contract Flipper"));
        assert_eq!(blocks[2].code, "plain fence");
    }

    #[test]
    fn classification_prefers_earlier_rule() {
        let profile = DomainProfile::solidity_to_ink();
        // matches both the solidity and the ink rule
        assert_eq!(
            classify_title("Solidity vs ink! Implementation", &profile),
            SectionKind::BeforeLanguage
        );
        // matches both the overview and the migration rule
        assert_eq!(classify_title("Migration Overview", &profile), SectionKind::Overview);
        assert_eq!(classify_title("Step-by-step Migration", &profile), SectionKind::MigrationStep);
        assert_eq!(classify_title("Key Points", &profile), SectionKind::Comparison);
        assert_eq!(classify_title("Best Practices", &profile), SectionKind::BestPractices);
        assert_eq!(classify_title("Appendix", &profile), SectionKind::General);
    }

    #[test]
    fn patterns_are_detected_case_insensitively() {
        let profile = DomainProfile::solidity_to_ink();
        let patterns = detect_patterns("Emit an EVENT when the Mapping changes", &profile);
        assert!(patterns.contains("event_handling"));
        assert!(patterns.contains("storage_conversion"));
        assert!(!patterns.contains("fee_calculation"));
    }

    #[test]
    fn appending_text_never_removes_patterns() {
        let profile = DomainProfile::solidity_to_ink();
        let base = "transfer tokens after the deadline";
        let before = detect_patterns(base, &profile);
        let after = detect_patterns(&format!("{base} and withdraw the fee"), &profile);
        assert!(before.is_subset(&after));
        assert!(after.contains("withdrawal_pattern"));
        assert!(after.contains("fee_calculation"));
    }

    #[test]
    fn language_detection_uses_strict_majority() {
        let profile = DomainProfile::solidity_to_ink();
        let solidity = "pragma solidity ^0.8.0; contract A { function f() public { require(msg.sender != address(0)); } }";
        assert_eq!(detect_language(solidity, &profile), LanguageTag::Before);

        let ink = "#[ink(message)] pub fn get(&self) -> Result<Balance, Error> {} impl Flipper {}";
        assert_eq!(detect_language(ink, &profile), LanguageTag::After);

        assert_eq!(detect_language("nothing relevant", &profile), LanguageTag::Mixed);
        assert_eq!(detect_language("contract impl", &profile), LanguageTag::Mixed);
    }
}
