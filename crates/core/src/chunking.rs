use crate::error::IngestError;
use crate::models::{IngestionOptions, LineSpan};
use regex::Regex;

const TOKEN_PATTERN: &str = r"\w+|[^\w\s]";

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_tokens: value.chunk_max_tokens,
            overlap_tokens: value.chunk_overlap_tokens,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

/// One token window of a source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextWindow {
    pub content: String,
    pub position: u32,
    pub span: LineSpan,
    pub token_count: usize,
}

/// Byte offsets where each token starts. Whitespace between tokens belongs to
/// the token before it, so every window is a plain slice of the input.
struct TokenBoundaries<'a> {
    text: &'a str,
    offsets: Vec<usize>,
}

impl<'a> TokenBoundaries<'a> {
    fn new(pattern: &Regex, text: &'a str) -> Self {
        let mut offsets: Vec<usize> = pattern.find_iter(text).map(|token| token.start()).collect();
        if let Some(first) = offsets.first_mut() {
            *first = 0;
        }
        if !offsets.is_empty() {
            offsets.push(text.len());
        }
        Self { text, offsets }
    }

    fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    fn byte_range(&self, from: usize, to: usize) -> (usize, usize) {
        (self.offsets[from], self.offsets[to])
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        let (start, end) = self.byte_range(from, to);
        &self.text[start..end]
    }
}

#[derive(Debug, Clone)]
pub struct TokenWindowChunker {
    config: ChunkingConfig,
    pattern: Regex,
}

impl TokenWindowChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            pattern: Regex::new(TOKEN_PATTERN)?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }

    /// Splits `text` into overlapping token windows.
    ///
    /// Windows are uniform in size and ignore markdown structure, so a fenced
    /// code block can be split across two windows.
    pub fn split(&self, text: &str) -> Vec<TextWindow> {
        let tokens = TokenBoundaries::new(&self.pattern, text);
        let total = tokens.len();
        if total == 0 {
            return Vec::new();
        }

        let lines = LineEstimator::new(text);

        if total <= self.config.max_tokens {
            return vec![TextWindow {
                content: text.to_string(),
                position: 0,
                span: lines.whole(),
                token_count: total,
            }];
        }

        let mut windows = Vec::new();
        let mut start = 0usize;
        let mut position = 0u32;
        loop {
            let end = (start + self.config.max_tokens).min(total);
            let (start_byte, end_byte) = tokens.byte_range(start, end);
            windows.push(TextWindow {
                content: tokens.slice(start, end).to_string(),
                position,
                span: lines.estimate(start_byte, end_byte),
                token_count: end - start,
            });

            if end == total {
                break;
            }
            start += self.config.step();
            position += 1;
        }

        windows
    }
}

/// Maps byte offsets to approximate line numbers assuming evenly long lines.
struct LineEstimator<'a> {
    text: &'a str,
    line_count: usize,
    chars_per_line: f64,
}

impl<'a> LineEstimator<'a> {
    fn new(text: &'a str) -> Self {
        let line_count = text.split('\n').count().max(1);
        let chars = text.chars().count();
        Self {
            text,
            line_count,
            chars_per_line: (chars as f64 / line_count as f64).max(1.0),
        }
    }

    fn whole(&self) -> LineSpan {
        LineSpan {
            start: 1,
            end: self.line_count,
        }
    }

    fn estimate(&self, start_byte: usize, end_byte: usize) -> LineSpan {
        let start_char = self.text[..start_byte].chars().count() as f64;
        let end_char = self.text[..end_byte].chars().count() as f64;

        let start = ((start_char / self.chars_per_line).floor() as usize + 1).min(self.line_count);
        let end = ((end_char / self.chars_per_line).ceil() as usize)
            .clamp(start, self.line_count);

        LineSpan { start, end }
    }
}
