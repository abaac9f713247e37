//! Static classification tables and the context priority function.

use std::cmp::Ordering;

use crate::core::types::{FileRecord, OTHER_BUCKET};

/// Exact (case-insensitive) file names that describe a project's structure.
const MARKER_FILENAMES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "pipfile",
    "cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "makefile",
    "cmakelists.txt",
    "gemfile",
    "composer.json",
    "mix.exs",
    "dockerfile",
    "docker-compose.yml",
    "justfile",
];

/// Extensions recognised as a language or document type.
const KNOWN_EXTENSIONS: &[&str] = &[
    "c", "cc", "cfg", "clj", "cpp", "cs", "css", "dart", "ex", "exs", "go", "gradle", "h", "hpp",
    "hs", "html", "ini", "java", "js", "json", "jsx", "kt", "kts", "lua", "m", "md", "ml", "php",
    "pl", "proto", "py", "r", "rb", "rs", "rst", "scala", "scss", "sh", "sql", "swift", "toml",
    "ts", "tsx", "txt", "vue", "xml", "yaml", "yml", "zig",
];

/// True for README-like files and package/build manifests.
pub fn is_marker(relative_path: &str) -> bool {
    let name = file_name(relative_path).to_ascii_lowercase();
    name.starts_with("readme") || MARKER_FILENAMES.contains(&name.as_str())
}

/// Histogram key for a file: `.ext` when known, otherwise [`OTHER_BUCKET`].
pub fn histogram_key(relative_path: &str) -> String {
    match extension(relative_path) {
        Some(ext) if KNOWN_EXTENSIONS.contains(&ext.as_str()) => format!(".{ext}"),
        _ => OTHER_BUCKET.to_string(),
    }
}

/// Priority order: markers first, then shallower depth, then lexical path.
pub fn compare_priority(a: &FileRecord, b: &FileRecord) -> Ordering {
    let a_key = (!is_marker(&a.relative_path), a.depth, &a.relative_path);
    let b_key = (!is_marker(&b.relative_path), b.depth, &b.relative_path);
    a_key.cmp(&b_key)
}

/// Return the inventory sorted by [`compare_priority`].
pub fn rank_candidates(files: &[FileRecord]) -> Vec<&FileRecord> {
    let mut ranked: Vec<&FileRecord> = files.iter().collect();
    ranked.sort_by(|a, b| compare_priority(a, b));
    ranked
}

fn file_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

fn extension(relative_path: &str) -> Option<String> {
    let name = file_name(relative_path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
