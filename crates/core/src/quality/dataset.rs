//! Training data files: a JSON document with a `metadata` header and an
//! `examples` array, or JSONL chat records.

use crate::error::ValidationError;
use crate::models::{Difficulty, ExampleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const SYSTEM_PROMPT: &str = "You are an expert in migrating smart contracts from Solidity to ink!. Provide detailed, accurate guidance on contract migration.";

/// A well-formed generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub context: String,
    pub guide_name: String,
    #[serde(default)]
    pub section: String,
    pub difficulty: Difficulty,
    pub example_type: ExampleType,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// An example as found on disk. Every field may be absent or malformed;
/// the validator reports such records instead of rejecting the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExampleRecord {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub context: Option<String>,
    pub guide_name: Option<String>,
    pub section: Option<String>,
    pub difficulty: Option<String>,
    pub example_type: Option<String>,
    pub concepts: Vec<String>,
    pub patterns: Vec<String>,
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn list_field(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl ExampleRecord {
    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            question: text_field(object, "question"),
            answer: text_field(object, "answer"),
            context: text_field(object, "context"),
            guide_name: text_field(object, "guide_name"),
            section: text_field(object, "section"),
            difficulty: text_field(object, "difficulty"),
            example_type: text_field(object, "example_type"),
            concepts: list_field(object, "concepts"),
            patterns: list_field(object, "patterns"),
        }
    }

    fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_object).unwrap_or_default()
    }

    fn from_chat(value: &Value) -> Self {
        let empty = Map::new();
        let metadata = value
            .get("metadata")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let message = |role: &str| {
            value
                .get("messages")
                .and_then(Value::as_array)?
                .iter()
                .find(|message| message.get("role").and_then(Value::as_str) == Some(role))?
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            question: message("user"),
            answer: message("assistant"),
            ..Self::from_object(metadata)
        }
    }
}

impl From<&TrainingExample> for ExampleRecord {
    fn from(example: &TrainingExample) -> Self {
        Self {
            question: Some(example.question.clone()),
            answer: Some(example.answer.clone()),
            context: Some(example.context.clone()),
            guide_name: Some(example.guide_name.clone()),
            section: Some(example.section.clone()),
            difficulty: Some(example.difficulty.to_string()),
            example_type: Some(example.example_type.to_string()),
            concepts: example.concepts.clone(),
            patterns: example.patterns.clone(),
        }
    }
}

impl TryFrom<&ExampleRecord> for TrainingExample {
    type Error = String;

    fn try_from(record: &ExampleRecord) -> Result<Self, Self::Error> {
        let required = |value: &Option<String>, name: &str| {
            value.clone().ok_or_else(|| format!("missing field {name}"))
        };
        Ok(Self {
            question: required(&record.question, "question")?,
            answer: required(&record.answer, "answer")?,
            context: record.context.clone().unwrap_or_default(),
            guide_name: required(&record.guide_name, "guide_name")?,
            section: record.section.clone().unwrap_or_default(),
            difficulty: required(&record.difficulty, "difficulty")?.parse()?,
            example_type: required(&record.example_type, "example_type")?.parse()?,
            concepts: record.concepts.clone(),
            patterns: record.patterns.clone(),
        })
    }
}

/// Shape of the `examples` entry of a training data document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExampleList {
    Missing,
    NotAList,
    List(Vec<ExampleRecord>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingDataset {
    /// `None` when the document has no metadata object.
    pub metadata: Option<Map<String, Value>>,
    pub examples: ExampleList,
}

impl TrainingDataset {
    pub fn records(&self) -> &[ExampleRecord] {
        match &self.examples {
            ExampleList::List(records) => records,
            ExampleList::Missing | ExampleList::NotAList => &[],
        }
    }
}

/// Parses a JSON training data document.
pub fn parse_document(text: &str) -> Result<TrainingDataset, ValidationError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Ok(TrainingDataset {
            metadata: None,
            examples: ExampleList::Missing,
        });
    };

    let examples = match object.get("examples") {
        None => ExampleList::Missing,
        Some(Value::Array(items)) => ExampleList::List(items.iter().map(ExampleRecord::from_value).collect()),
        Some(_) => ExampleList::NotAList,
    };

    Ok(TrainingDataset {
        metadata: object.get("metadata").and_then(Value::as_object).cloned(),
        examples,
    })
}

/// Parses JSONL chat records. JSONL carries no header, so the metadata is
/// derived from the records and has no `created_at`.
pub fn parse_jsonl(text: &str) -> Result<TrainingDataset, ValidationError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|error| ValidationError::Record {
            line: index + 1,
            details: error.to_string(),
        })?;
        records.push(ExampleRecord::from_chat(&value));
    }

    let guides: BTreeSet<_> = records.iter().filter_map(|record| record.guide_name.as_deref()).collect();
    let mut metadata = Map::new();
    metadata.insert("total_examples".to_string(), json!(records.len()));
    metadata.insert("guides_processed".to_string(), json!(guides.len()));

    Ok(TrainingDataset {
        metadata: Some(metadata),
        examples: ExampleList::List(records),
    })
}

/// Loads `path`, choosing the format by the `.jsonl` extension.
pub fn load_dataset(path: &Path) -> Result<TrainingDataset, ValidationError> {
    let text = fs::read_to_string(path)?;
    let is_jsonl = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("jsonl"));

    if is_jsonl {
        parse_jsonl(&text)
    } else {
        parse_document(&text)
    }
}

/// Converts every loaded record into a [`TrainingExample`]; the first record
/// that cannot be converted is reported with its 1-based position.
pub fn into_examples(dataset: &TrainingDataset) -> Result<Vec<TrainingExample>, ValidationError> {
    dataset
        .records()
        .iter()
        .enumerate()
        .map(|(index, record)| {
            TrainingExample::try_from(record).map_err(|details| ValidationError::Record {
                line: index + 1,
                details,
            })
        })
        .collect()
}

pub fn to_document(examples: &[TrainingExample], created_at: DateTime<Utc>) -> Value {
    let guides: BTreeSet<_> = examples.iter().map(|example| example.guide_name.as_str()).collect();
    json!({
        "metadata": {
            "created_at": created_at.to_rfc3339(),
            "total_examples": examples.len(),
            "guides_processed": guides.len(),
        },
        "examples": examples,
    })
}

pub fn to_jsonl(examples: &[TrainingExample]) -> Result<String, ValidationError> {
    let mut output = String::new();
    for example in examples {
        let record = json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": example.question },
                { "role": "assistant", "content": example.answer },
            ],
            "metadata": {
                "guide_name": example.guide_name,
                "section": example.section,
                "difficulty": example.difficulty,
                "concepts": example.concepts,
                "patterns": example.patterns,
                "example_type": example.example_type,
                "context": example.context,
            }
        });
        output.push_str(&serde_json::to_string(&record)?);
        output.push('\n');
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example() -> TrainingExample {
        TrainingExample {
            question: "How do I migrate a Solidity mapping to ink!?".to_string(),
            answer: "Use `ink::storage::Mapping` inside the ink! storage struct.\n\n```rust\nbalances: Mapping<AccountId, Balance>\n```".to_string(),
            context: "Storage section of the ERC20 guide".to_string(),
            guide_name: "erc20".to_string(),
            section: "Storage".to_string(),
            difficulty: Difficulty::Intermediate,
            example_type: ExampleType::CodeExample,
            concepts: vec!["tokens".to_string(), "mappings".to_string()],
            patterns: vec!["storage_conversion".to_string()],
        }
    }

    #[test]
    fn document_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let examples = vec![example()];
        let text = serde_json::to_string(&to_document(&examples, Utc::now()))?;
        let dataset = parse_document(&text)?;

        let metadata = dataset.metadata.as_ref().ok_or("missing metadata")?;
        assert!(metadata.contains_key("created_at"));
        assert_eq!(metadata["guides_processed"], 1);
        assert_eq!(into_examples(&dataset)?, examples);
        Ok(())
    }

    #[test]
    fn jsonl_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let examples = vec![example(), TrainingExample {
            question: "What is the ink! equivalent of msg.sender?".to_string(),
            difficulty: Difficulty::Beginner,
            example_type: ExampleType::Explanation,
            ..example()
        }];
        let text = to_jsonl(&examples)?;
        assert_eq!(text.lines().count(), 2);

        let dataset = parse_jsonl(&text)?;
        assert_eq!(into_examples(&dataset)?, examples);
        let metadata = dataset.metadata.as_ref().ok_or("missing metadata")?;
        assert_eq!(metadata["total_examples"], 2);
        assert!(!metadata.contains_key("created_at"));
        Ok(())
    }

    #[test]
    fn malformed_shapes_are_not_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dataset = parse_document("{}")?;
        assert_eq!(dataset.metadata, None);
        assert_eq!(dataset.examples, ExampleList::Missing);

        let dataset = parse_document(r#"{"examples": "nope"}"#)?;
        assert_eq!(dataset.examples, ExampleList::NotAList);

        let dataset = parse_document(r#"{"examples": [{"question": 7}]}"#)?;
        assert_eq!(dataset.records()[0].question, None);
        Ok(())
    }

    #[test]
    fn invalid_json_is_fatal() {
        assert!(matches!(parse_document("not json"), Err(ValidationError::Json(_))));
        assert!(matches!(
            parse_jsonl("{\"messages\": []}\n{broken"),
            Err(ValidationError::Record { line: 2, .. })
        ));
    }

    #[test]
    fn load_dispatches_on_extension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("data.jsonl");
        fs::write(&path, to_jsonl(&[example()])?)?;
        assert_eq!(load_dataset(&path)?.records().len(), 1);
        Ok(())
    }
}
