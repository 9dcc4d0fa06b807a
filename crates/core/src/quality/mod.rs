//! Quality checks for generated question/answer training data.

pub mod checks;
pub mod dataset;
pub mod generate;
pub mod report;
pub mod similarity;

pub use checks::{QualityValidator, ValidationRules};
pub use dataset::{
    into_examples, load_dataset, parse_document, parse_jsonl, to_document, to_jsonl, ExampleList,
    ExampleRecord, TrainingDataset, TrainingExample,
};
pub use generate::{
    write_corpus, CorpusFiles, GeneratedCorpus, GeneratorConfig, TrainingDataGenerator, TrainingStats,
};
pub use report::{QualityReport, QualityTier, PASSING_SCORE};
pub use similarity::{jaccard, PairwiseJaccard, SimilarityIndex};
