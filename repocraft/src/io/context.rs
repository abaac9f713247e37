//! Bounded context payload built from the ranked file inventory.

use std::fs::File;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;

use tracing::{debug, instrument, warn};

use crate::core::ranking::rank_candidates;
use crate::core::types::{ContextEntry, ContextPayload, FileRecord, RepositoryScan};

/// Build the context payload for one analysed workspace.
///
/// Candidates are read in parallel one window at a time and kept in rank
/// order, so the result depends only on the tree and the two limits.
#[instrument(skip_all, fields(max_files, max_chars_per_file))]
pub fn build_context(
    root: &Path,
    scan: &RepositoryScan,
    max_files: usize,
    max_chars_per_file: usize,
) -> ContextPayload {
    let ranked = rank_candidates(&scan.files);
    let mut entries = Vec::with_capacity(max_files.min(ranked.len()));

    for window in ranked.chunks(max_files.max(1)) {
        if entries.len() >= max_files {
            break;
        }
        let results = read_window(root, window, max_chars_per_file);
        for (record, result) in window.iter().zip(results) {
            if entries.len() >= max_files {
                break;
            }
            match result {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => debug!(path = %record.relative_path, "skipping binary file"),
                Err(err) => {
                    warn!(path = %record.relative_path, err = %err, "skipping unreadable file");
                }
            }
        }
    }

    debug!(entries = entries.len(), "context built");
    ContextPayload {
        profile: scan.profile.clone(),
        entries,
        max_files,
        max_chars_per_file,
    }
}

fn read_window(
    root: &Path,
    window: &[&FileRecord],
    max_chars: usize,
) -> Vec<io::Result<Option<ContextEntry>>> {
    let workers = reader_count(window.len());
    let per_worker = window.len().div_ceil(workers.max(1)).max(1);
    thread::scope(|scope| {
        let handles: Vec<_> = window
            .chunks(per_worker)
            .map(|slice| {
                let handle = scope.spawn(move || {
                    slice
                        .iter()
                        .map(|record| read_entry(root, record, max_chars))
                        .collect::<Vec<_>>()
                });
                (slice.len(), handle)
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|(len, handle)| {
                handle.join().unwrap_or_else(|_| {
                    (0..len)
                        .map(|_| Err(io::Error::other("reader thread panicked")))
                        .collect()
                })
            })
            .collect()
    })
}

/// Reader threads for a window: one per available core, never more than
/// there are files to read.
fn reader_count(files: usize) -> usize {
    let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    cores.min(files).max(1)
}

/// Read at most enough bytes for `max_chars` characters plus one.
///
/// Returns `Ok(None)` for binary content (NUL byte or invalid UTF-8).
fn read_entry(
    root: &Path,
    record: &FileRecord,
    max_chars: usize,
) -> io::Result<Option<ContextEntry>> {
    let limit = max_chars.saturating_mul(4).saturating_add(4);
    let file = File::open(root.join(&record.relative_path))?;
    let mut buf = Vec::new();
    file.take(limit as u64).read_to_end(&mut buf)?;
    let hit_limit = buf.len() >= limit;

    if buf.contains(&0) {
        return Ok(None);
    }
    let text = match std::str::from_utf8(&buf) {
        Ok(text) => text,
        // A multi-byte character cut by the read bound is not binary.
        Err(err) if hit_limit && err.error_len().is_none() => {
            std::str::from_utf8(&buf[..err.valid_up_to()]).map_err(io::Error::other)?
        }
        Err(_) => return Ok(None),
    };

    let (truncated_content, was_truncated) = match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    };
    Ok(Some(ContextEntry {
        relative_path: record.relative_path.clone(),
        truncated_content,
        was_truncated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::analyzer::analyze;

    fn tree(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        for (path, content) in files {
            let full = temp.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(full, content).expect("write");
        }
        temp
    }

    fn paths(payload: &ContextPayload) -> Vec<&str> {
        payload
            .entries
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    #[test]
    fn markers_come_first_then_depth_then_path() {
        let temp = tree(&[
            ("src/deep/mod.rs", b"// deep"),
            ("b.rs", b"// b"),
            ("a.rs", b"// a"),
            ("docs/README.md", b"# docs"),
            ("Cargo.toml", b"[package]"),
        ]);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 20, 2000);
        assert_eq!(
            paths(&payload),
            vec!["Cargo.toml", "docs/README.md", "a.rs", "b.rs", "src/deep/mod.rs"]
        );
    }

    #[test]
    fn output_is_deterministic() {
        let files: Vec<(String, Vec<u8>)> = (0..40)
            .map(|i| (format!("dir{}/file{i:02}.txt", i % 3), format!("line {i}\n").into_bytes()))
            .collect();
        let refs: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let temp = tree(&refs);
        let scan = analyze(temp.path()).expect("analyze");

        let first = build_context(temp.path(), &scan, 7, 100);
        let second = build_context(temp.path(), &scan, 7, 100);
        assert_eq!(first.entries.len(), 7);
        assert_eq!(first, second);
        assert_eq!(first.render(), second.render());
    }

    #[test]
    fn truncates_to_exact_character_count() {
        let long = "é".repeat(50);
        let temp = tree(&[("long.txt", long.as_bytes()), ("short.txt", b"hi")]);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 20, 10);

        let long_entry = &payload.entries[0];
        assert_eq!(long_entry.relative_path, "long.txt");
        assert!(long_entry.was_truncated);
        assert_eq!(long_entry.truncated_content.chars().count(), 10);

        let short_entry = &payload.entries[1];
        assert!(!short_entry.was_truncated);
        assert_eq!(short_entry.truncated_content, "hi");
    }

    #[test]
    fn exactly_cap_sized_file_is_not_truncated() {
        let temp = tree(&[("a.txt", b"0123456789")]);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 20, 10);
        assert!(!payload.entries[0].was_truncated);
        assert_eq!(payload.entries[0].truncated_content, "0123456789");
    }

    #[test]
    fn binary_files_do_not_consume_budget() {
        let temp = tree(&[
            ("a.bin", b"\x00\x01\x02"),
            ("b.dat", &[0xff, 0xfe, 0x41]),
            ("c.txt", b"c"),
            ("d.txt", b"d"),
        ]);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 2, 100);
        assert_eq!(paths(&payload), vec!["c.txt", "d.txt"]);
    }

    #[test]
    fn empty_tree_yields_empty_payload() {
        let temp = tree(&[]);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 20, 2000);
        assert!(payload.entries.is_empty());
        assert!(payload.render().contains("Total files: 0\n"));
    }

    #[test]
    fn render_does_not_embed_workspace_path() {
        let temp = tree(&[("README.md", b"# x")]);
        let scan = analyze(temp.path()).expect("analyze");
        let rendered = build_context(temp.path(), &scan, 20, 2000).render();
        assert!(!rendered.contains(&temp.path().display().to_string()));
    }

    #[test]
    fn reader_threads_are_capped_by_cores() {
        let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        assert_eq!(reader_count(0), 1);
        assert_eq!(reader_count(1), 1);
        assert_eq!(reader_count(50_000), cores);
    }

    #[test]
    fn large_window_keeps_rank_order() {
        let names: Vec<String> = (0..300).map(|i| format!("f{i:03}.txt")).collect();
        let files: Vec<(&str, &[u8])> = names
            .iter()
            .map(|name| (name.as_str(), name.as_bytes()))
            .collect();
        let temp = tree(&files);
        let scan = analyze(temp.path()).expect("analyze");
        let payload = build_context(temp.path(), &scan, 50_000, 100);
        assert_eq!(paths(&payload), names.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(payload.entries.iter().all(|e| e.truncated_content == e.relative_path));
    }
}
