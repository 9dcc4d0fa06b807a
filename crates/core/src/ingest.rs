//! Source discovery for every ingestion pipeline.
//!
//! Discovery only decides which files take part in a run and under which
//! logical source id; reading happens later, per source, so one unreadable
//! file never aborts the run.

use crate::error::IngestError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Filters applied while walking a source tree.
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    /// Lower-case extension (or dotfile name without the dot) to language.
    pub languages: BTreeMap<String, String>,
    pub ignore_dirs: BTreeSet<String>,
    pub ignore_files: BTreeSet<String>,
    pub max_file_bytes: u64,
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        let languages = [
            ("py", "python"),
            ("rs", "rust"),
            ("js", "javascript"),
            ("ts", "typescript"),
            ("java", "java"),
            ("cpp", "cpp"),
            ("c", "c"),
            ("cs", "csharp"),
            ("go", "go"),
            ("rb", "ruby"),
            ("php", "php"),
            ("swift", "swift"),
            ("kt", "kotlin"),
            ("md", "markdown"),
            ("txt", "text"),
            ("yml", "yaml"),
            ("yaml", "yaml"),
            ("json", "json"),
            ("toml", "toml"),
            ("xml", "xml"),
            ("html", "html"),
            ("css", "css"),
            ("sql", "sql"),
            ("sh", "bash"),
            ("sol", "solidity"),
            ("dockerfile", "dockerfile"),
            ("gitignore", "gitignore"),
            ("env", "env"),
        ];
        let ignore_dirs = [
            "node_modules",
            ".git",
            "__pycache__",
            ".venv",
            "venv",
            "target",
            "build",
            "dist",
            ".next",
            ".nuxt",
            "coverage",
            ".pytest_cache",
            ".mypy_cache",
            ".tox",
            "htmlcov",
        ];
        let ignore_files = [
            ".DS_Store",
            "Thumbs.db",
            ".gitkeep",
            "package-lock.json",
            "yarn.lock",
            "Cargo.lock",
            ".env.local",
            ".env.production",
        ];

        Self {
            languages: languages
                .iter()
                .map(|(extension, language)| (extension.to_string(), language.to_string()))
                .collect(),
            ignore_dirs: ignore_dirs.iter().map(|name| name.to_string()).collect(),
            ignore_files: ignore_files.iter().map(|name| name.to_string()).collect(),
            max_file_bytes: MAX_FILE_BYTES,
        }
    }
}

impl DiscoveryRules {
    /// Language of `path`, or `None` when the file type is not indexed.
    pub fn language_for(&self, path: &Path) -> Option<&str> {
        let key = match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) => extension.to_ascii_lowercase(),
            None => path
                .file_name()
                .and_then(|name| name.to_str())?
                .trim_start_matches('.')
                .to_ascii_lowercase(),
        };
        self.languages.get(&key).map(String::as_str)
    }
}

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub path: PathBuf,
    /// Logical id used for point ids and payloads.
    pub source_id: String,
    /// Name used for the source metadata lookup.
    pub name: String,
    pub file_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedSource {
    fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Files selected from a codebase walk plus the ones filtered out for a
/// reason worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeDiscovery {
    pub sources: Vec<DiscoveredSource>,
    pub skipped: Vec<SkippedSource>,
}

/// Names of guide files inside a guides directory.
#[derive(Debug, Clone)]
pub struct GuideLayout {
    pub prefix: String,
    pub extension: String,
    pub tutorial_file: String,
    pub tutorial_name: String,
}

impl Default for GuideLayout {
    fn default() -> Self {
        Self {
            prefix: "migration_guide_".to_string(),
            extension: "md".to_string(),
            tutorial_file: "SOLIDITY_TO_INK_TUTORIAL.md".to_string(),
            tutorial_name: "main_tutorial".to_string(),
        }
    }
}

/// File names expected in every paired example directory.
#[derive(Debug, Clone)]
pub struct PairLayout {
    pub before_file: String,
    pub after_file: String,
}

impl Default for PairLayout {
    fn default() -> Self {
        Self {
            before_file: "contract.sol".to_string(),
            after_file: "lib.rs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractPairSource {
    pub name: String,
    pub source_id: String,
    pub before: PathBuf,
    pub after: PathBuf,
}

fn require_directory(path: &Path) -> Result<(), IngestError> {
    if !path.is_dir() {
        return Err(IngestError::MissingDirectory(path.display().to_string()));
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<&str, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

fn contract_name(raw: &str) -> String {
    raw.replace('-', "_")
}

/// Sorted immediate entries of `dir` matching `keep`.
fn list_dir(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, IngestError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if keep(&path) {
            entries.push(path);
        }
    }
    entries.sort_unstable();
    Ok(entries)
}

/// Walks `root` recursively and returns the indexable files, sorted by path.
/// The source id is the path relative to `root` with `/` separators.
///
/// Files over the size limit and paths that are not valid UTF-8 are reported
/// in [`CodeDiscovery::skipped`].
pub fn discover_code_files(root: &Path, rules: &DiscoveryRules) -> Result<CodeDiscovery, IngestError> {
    require_directory(root)?;
    let mut discovery = CodeDiscovery::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !entry
                .file_name()
                .to_str()
                .is_some_and(|name| rules.ignore_dirs.contains(name))
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(language) = rules.language_for(path) else {
            continue;
        };
        if file_name(path).map_or(true, |name| rules.ignore_files.contains(name)) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) if metadata.len() > rules.max_file_bytes => {
                debug!(path = %path.display(), bytes = metadata.len(), "skipping large file");
                discovery.skipped.push(SkippedSource::new(
                    path,
                    format!("too large ({} bytes, limit {})", metadata.len(), rules.max_file_bytes),
                ));
                continue;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping file without metadata");
                continue;
            }
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let Some(source_id) = source_id_for(relative) else {
            warn!(path = %path.display(), "skipping path that is not valid UTF-8");
            discovery.skipped.push(SkippedSource::new(path, "path is not valid UTF-8"));
            continue;
        };

        discovery.sources.push(DiscoveredSource {
            path: path.to_path_buf(),
            name: source_id.clone(),
            source_id,
            file_language: Some(language.to_string()),
        });
    }

    discovery
        .sources
        .sort_unstable_by(|left, right| left.source_id.cmp(&right.source_id));
    Ok(discovery)
}

/// `/`-joined components of `relative`, or `None` if any is not UTF-8.
fn source_id_for(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Guide files in `dir` (not recursive), sorted by name, followed by the
/// tutorial when present.
pub fn discover_guides(dir: &Path, layout: &GuideLayout) -> Result<Vec<DiscoveredSource>, IngestError> {
    require_directory(dir)?;
    let suffix = format!(".{}", layout.extension);

    let mut guides = Vec::new();
    for path in list_dir(dir, Path::is_file)? {
        let file = file_name(&path)?;
        let Some(name) = file
            .strip_prefix(layout.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        else {
            continue;
        };
        guides.push(DiscoveredSource {
            source_id: format!("guides/{file}"),
            name: name.to_string(),
            file_language: Some("markdown".to_string()),
            path: path.clone(),
        });
    }

    let tutorial = dir.join(&layout.tutorial_file);
    if tutorial.is_file() {
        guides.push(DiscoveredSource {
            path: tutorial,
            source_id: format!("guides/{}.{}", layout.tutorial_name, layout.extension),
            name: layout.tutorial_name.clone(),
            file_language: Some("markdown".to_string()),
        });
    }

    Ok(guides)
}

/// Before-language example contracts: `<dir>/src/*.sol`.
pub fn discover_before_examples(dir: &Path) -> Result<Vec<DiscoveredSource>, IngestError> {
    let src = dir.join("src");
    if !src.is_dir() {
        warn!(dir = %dir.display(), "solidity examples directory not found");
        return Ok(Vec::new());
    }

    list_dir(&src, |path| {
        path.is_file() && path.extension().and_then(|extension| extension.to_str()) == Some("sol")
    })?
    .into_iter()
    .map(|path| {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_lowercase();
        Ok(DiscoveredSource {
            source_id: format!("examples/solidity/{stem}.sol"),
            name: stem,
            file_language: Some("solidity".to_string()),
            path,
        })
    })
    .collect()
}

/// After-language example contracts: `<dir>/<name>/lib.rs`.
pub fn discover_after_examples(dir: &Path) -> Result<Vec<DiscoveredSource>, IngestError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "ink! examples directory not found");
        return Ok(Vec::new());
    }

    list_dir(dir, |path| path.join("lib.rs").is_file())?
        .into_iter()
        .map(|contract_dir| {
            let name = contract_name(file_name(&contract_dir)?);
            Ok(DiscoveredSource {
                path: contract_dir.join("lib.rs"),
                source_id: format!("examples/ink/{name}.rs"),
                name,
                file_language: Some("rust".to_string()),
            })
        })
        .collect()
}

/// One entry per subdirectory of `dir` holding both layout files.
pub fn discover_contract_pairs(dir: &Path, layout: &PairLayout) -> Result<Vec<ContractPairSource>, IngestError> {
    require_directory(dir)?;

    let mut pairs = Vec::new();
    for pair_dir in list_dir(dir, Path::is_dir)? {
        let before = pair_dir.join(&layout.before_file);
        let after = pair_dir.join(&layout.after_file);
        if !(before.is_file() && after.is_file()) {
            debug!(dir = %pair_dir.display(), "skipping incomplete contract pair");
            continue;
        }
        let name = contract_name(file_name(&pair_dir)?);
        pairs.push(ContractPairSource {
            source_id: format!("pairs/{name}"),
            name,
            before,
            after,
        });
    }
    Ok(pairs)
}

/// Reads a source as UTF-8 text.
pub fn read_source(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| IngestError::Encoding(path.display().to_string()))
}
