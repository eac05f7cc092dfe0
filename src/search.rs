//! Full-text search across stored baseline files.

use regex::RegexBuilder;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::baseline::SearchResult;
use crate::errors::Result;
use crate::protocol::Protocol;
use crate::store::BaselineStore;

const SNIPPET_CONTEXT: usize = 40;

impl BaselineStore {
    /// Search every payload and metadata file under the storage root for
    /// `query`. Exact mode matches on word boundaries, otherwise a
    /// case-insensitive substring match. Returns one hit per file.
    pub fn search(&self, query: &str, exact: bool) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();
        if query.trim().is_empty() || !self.base_dir().exists() {
            return Ok(results);
        }
        let word_matcher = if exact {
            match RegexBuilder::new(&format!(r"\b{}\b", regex::escape(query)))
                .case_insensitive(true)
                .build()
            {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(query, error = %e, "failed to build exact matcher");
                    None
                }
            }
        } else {
            None
        };
        let needle = query.to_lowercase();

        for entry in WalkDir::new(self.base_dir())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy();
            if !is_searchable(&name) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "skipping unreadable file");
                continue;
            };
            let position = match &word_matcher {
                Some(re) => re.find(&content).map(|m| m.start()),
                None => content.to_lowercase().find(&needle),
            };
            if let Some(start) = position {
                let mut result = classify_path(self.base_dir(), entry.path());
                result.snippet = snippet_around(&content, start, query.len());
                results.push(result);
            }
        }
        Ok(results)
    }
}

/// Only stored artifacts are searched: JSON metadata and payload files.
fn is_searchable(file_name: &str) -> bool {
    file_name.ends_with(".json")
        || file_name.starts_with("request.")
        || file_name.starts_with("response.")
}

/// Derive service/protocol/date/run/iteration from a hit's position in the
/// storage hierarchy. Unrecognisable layouts leave fields unset rather than
/// guessing.
fn classify_path(base_dir: &Path, path: &Path) -> SearchResult {
    let relative = path.strip_prefix(base_dir).unwrap_or(path);
    let mut result = SearchResult {
        file_path: relative.to_string_lossy().replace('\\', "/"),
        ..SearchResult::default()
    };
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if segments.len() < 3 {
        return result;
    }
    // Last segment is the file itself.
    for segment in &segments[..segments.len() - 1] {
        if segment.starts_with("run-") {
            result.run_id = Some(segment.clone());
        } else if segment.starts_with("iteration-") {
            result.iteration = Some(segment.clone());
        } else if segment.len() == 8 && segment.chars().all(|c| c.is_ascii_digit()) {
            result.date = Some(segment.clone());
        } else if Protocol::is_protocol_dir(segment) {
            result.protocol = Some(segment.clone());
        } else if result.service_name.is_none() {
            result.service_name = Some(segment.clone());
        }
    }
    result
}

/// Context window around a match, trimmed to char boundaries, newlines
/// flattened, ellipses marking truncation.
fn snippet_around(content: &str, start: usize, match_len: usize) -> String {
    let mut from = start.saturating_sub(SNIPPET_CONTEXT);
    while !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (start + match_len + SNIPPET_CONTEXT).min(content.len());
    while !content.is_char_boundary(to) {
        to += 1;
    }
    let mut snippet = content[from..to]
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string();
    if from > 0 {
        snippet = format!("...{snippet}");
    }
    if to < content.len() {
        snippet = format!("{snippet}...");
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seeded_store() -> (BaselineStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let iter_dir = dir.path().join("rest/orders/20260823/run-001/iteration-001");
        fs::create_dir_all(&iter_dir).unwrap();
        fs::write(
            iter_dir.join("response.json"),
            r#"{"orderId": "ORD-778899", "status": "SHIPPED"}"#,
        )
        .unwrap();
        fs::write(iter_dir.join("notes.txt"), "ORD-778899 should not match").unwrap();
        (BaselineStore::new(dir.path()), dir)
    }

    #[test]
    fn test_substring_search_classifies_hit() {
        let (store, _dir) = seeded_store();
        let hits = store.search("ord-7788", false).unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.protocol.as_deref(), Some("rest"));
        assert_eq!(hit.service_name.as_deref(), Some("orders"));
        assert_eq!(hit.date.as_deref(), Some("20260823"));
        assert_eq!(hit.run_id.as_deref(), Some("run-001"));
        assert_eq!(hit.iteration.as_deref(), Some("iteration-001"));
        assert!(hit.snippet.contains("ORD-778899"));
    }

    #[test]
    fn test_exact_search_requires_word_boundaries() {
        let (store, _dir) = seeded_store();
        assert!(store.search("ORD-7788", true).unwrap().is_empty());
        assert_eq!(store.search("SHIPPED", true).unwrap().len(), 1);
    }

    #[test]
    fn test_non_payload_files_are_skipped() {
        let (store, _dir) = seeded_store();
        let hits = store.search("should not match", false).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_snippet_window_and_ellipses() {
        let padding = "x".repeat(100);
        let content = format!("{padding}NEEDLE{padding}");
        let start = content.find("NEEDLE").unwrap();
        let snippet = snippet_around(&content, start, "NEEDLE".len());
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("NEEDLE"));
        assert!(snippet.len() <= 2 * SNIPPET_CONTEXT + "NEEDLE".len() + 6);
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let content = "héllo wörld héllo wörld NEEDLE héllo wörld héllo wörld";
        let start = content.find("NEEDLE").unwrap();
        let snippet = snippet_around(content, start, "NEEDLE".len());
        assert!(snippet.contains("NEEDLE"));
    }

    #[test]
    fn test_shallow_paths_left_unclassified() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stray.json"), r#"{"hit": "zzz-needle"}"#).unwrap();
        let store = BaselineStore::new(dir.path());
        let hits = store.search("zzz-needle", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].service_name.is_none());
        assert!(hits[0].run_id.is_none());
    }
}
