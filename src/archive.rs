//! Zip export and import of baseline trees.
//!
//! Archives contain files only, with forward-slash paths relative to the
//! storage root, so an export re-imports into any store byte for byte.

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{DriftError, Result};
use crate::protocol::Protocol;
use crate::store::BaselineStore;

/// What to do with services that already exist in the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Replace conflicting files with the archive's copies.
    Overwrite,
    /// Leave conflicting service subtrees untouched.
    Skip,
}

/// Export the whole store, or one service across all protocol subtrees, into
/// a temporary zip file. The caller decides where the archive finally lands;
/// the tempfile cleans itself up otherwise.
pub fn export_baselines(store: &BaselineStore, service: Option<&str>) -> Result<NamedTempFile> {
    let base_dir = store.base_dir();
    if !base_dir.exists() {
        return Err(DriftError::Archive(format!(
            "storage directory {} does not exist",
            base_dir.display()
        )));
    }
    let tempfile = NamedTempFile::new().map_err(|e| DriftError::io(Path::new("tempfile"), e))?;
    let mut writer = ZipWriter::new(tempfile.reopen().map_err(|e| DriftError::io(tempfile.path(), e))?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut exported = 0usize;
    for entry in WalkDir::new(base_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry
            .path()
            .strip_prefix(base_dir)
            .map_err(|e| DriftError::Archive(e.to_string()))?;
        let name = relative.to_string_lossy().replace('\\', "/");
        if let Some(service) = service {
            if !belongs_to_service(&name, service) {
                continue;
            }
        }
        writer
            .start_file(&name, options)
            .map_err(|e| DriftError::Archive(e.to_string()))?;
        let mut source =
            fs::File::open(entry.path()).map_err(|e| DriftError::io(entry.path(), e))?;
        std::io::copy(&mut source, &mut writer).map_err(|e| DriftError::io(entry.path(), e))?;
        exported += 1;
    }
    writer
        .finish()
        .map_err(|e| DriftError::Archive(e.to_string()))?
        .flush()
        .map_err(|e| DriftError::io(tempfile.path(), e))?;
    if exported == 0 {
        return Err(DriftError::Archive(match service {
            Some(s) => format!("no baselines found for service {s}"),
            None => "no baselines found to export".to_string(),
        }));
    }
    info!(files = exported, "exported baselines");
    Ok(tempfile)
}

/// Service keys present in both the archive and the target store, sorted.
/// A key is `{protocol}/{service}` for the canonical layout and the bare
/// service name for legacy entries.
pub fn detect_conflicts<R: Read + Seek>(
    reader: R,
    store: &BaselineStore,
) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(reader).map_err(|e| DriftError::Archive(e.to_string()))?;
    let mut conflicts = std::collections::BTreeSet::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| DriftError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        if let Some(key) = service_key(entry.name()) {
            if store.base_dir().join(&key).exists() {
                conflicts.insert(key);
            }
        }
    }
    Ok(conflicts.into_iter().collect())
}

/// Import an archive into the store, returning the relative paths written.
/// With [`ConflictAction::Skip`] every file under a conflicting service key
/// is left out; with [`ConflictAction::Overwrite`] existing files are
/// replaced in place.
pub fn import_baselines<R: Read + Seek>(
    reader: R,
    store: &BaselineStore,
    action: ConflictAction,
) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(reader).map_err(|e| DriftError::Archive(e.to_string()))?;
    let skipped_keys: Vec<String> = match action {
        ConflictAction::Skip => {
            let mut keys = Vec::new();
            for index in 0..archive.len() {
                let entry = archive
                    .by_index(index)
                    .map_err(|e| DriftError::Archive(e.to_string()))?;
                if entry.is_dir() {
                    continue;
                }
                if let Some(key) = service_key(entry.name()) {
                    if store.base_dir().join(&key).exists() && !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            keys
        }
        ConflictAction::Overwrite => Vec::new(),
    };

    let mut imported = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| DriftError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        // Reject entries that would escape the storage root.
        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let name = relative.to_string_lossy().replace('\\', "/");
        if skipped_keys.iter().any(|key| belongs_to_key(&name, key)) {
            continue;
        }
        let dest = store.base_dir().join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DriftError::io(parent, e))?;
        }
        let mut out = fs::File::create(&dest).map_err(|e| DriftError::io(&dest, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| DriftError::io(&dest, e))?;
        imported.push(name);
    }
    info!(
        files = imported.len(),
        skipped_services = skipped_keys.len(),
        "imported baselines"
    );
    Ok(imported)
}

/// Service key for an archive entry path: `protocol/service` under the
/// canonical layout, plain `service` for legacy top-level entries.
fn service_key(entry_name: &str) -> Option<String> {
    let mut segments = entry_name.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    if Protocol::is_protocol_dir(first) {
        let second = segments.next()?;
        Some(format!("{first}/{second}"))
    } else {
        // A bare file at the archive root belongs to no service.
        segments.next()?;
        Some(first.to_string())
    }
}

fn belongs_to_service(entry_name: &str, service: &str) -> bool {
    match service_key(entry_name) {
        Some(key) => key == service || key.ends_with(&format!("/{service}")),
        None => false,
    }
}

fn belongs_to_key(entry_name: &str, key: &str) -> bool {
    service_key(entry_name).as_deref() == Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_store() -> (BaselineStore, TempDir) {
        let dir = TempDir::new().unwrap();
        for (path, content) in [
            ("rest/orders/20260823/run-001/metadata.json", r#"{"runId":"run-001"}"#),
            (
                "rest/orders/20260823/run-001/iteration-001/response.json",
                r#"{"ok":true}"#,
            ),
            ("jms/billing/20260823/run-001/metadata.json", r#"{"runId":"run-001"}"#),
            ("legacy-svc/20260101/run-001/metadata.json", r#"{"runId":"run-001"}"#),
        ] {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        (BaselineStore::new(dir.path()), dir)
    }

    #[test]
    fn test_export_then_import_reproduces_tree() {
        let (source, _source_dir) = seeded_store();
        let archive = export_baselines(&source, None).unwrap();

        let target_dir = TempDir::new().unwrap();
        let target = BaselineStore::new(target_dir.path());
        let imported = import_baselines(
            archive.reopen().unwrap(),
            &target,
            ConflictAction::Overwrite,
        )
        .unwrap();
        assert_eq!(imported.len(), 4);
        assert_eq!(source.list_services(None), target.list_services(None));
        assert_eq!(
            fs::read_to_string(
                target_dir
                    .path()
                    .join("rest/orders/20260823/run-001/iteration-001/response.json")
            )
            .unwrap(),
            r#"{"ok":true}"#
        );
    }

    #[test]
    fn test_export_single_service_filters_other_services() {
        let (source, _source_dir) = seeded_store();
        let archive = export_baselines(&source, Some("orders")).unwrap();

        let target_dir = TempDir::new().unwrap();
        let target = BaselineStore::new(target_dir.path());
        import_baselines(archive.reopen().unwrap(), &target, ConflictAction::Overwrite).unwrap();
        assert_eq!(target.list_services(None), vec!["rest/orders".to_string()]);
    }

    #[test]
    fn test_export_unknown_service_is_an_error() {
        let (source, _source_dir) = seeded_store();
        let err = export_baselines(&source, Some("nope")).unwrap_err();
        assert!(matches!(err, DriftError::Archive(_)));
    }

    #[test]
    fn test_detect_conflicts_reports_existing_services_sorted() {
        let (source, _source_dir) = seeded_store();
        let archive = export_baselines(&source, None).unwrap();

        let target_dir = TempDir::new().unwrap();
        fs::create_dir_all(target_dir.path().join("rest/orders")).unwrap();
        fs::create_dir_all(target_dir.path().join("legacy-svc")).unwrap();
        let target = BaselineStore::new(target_dir.path());

        let conflicts = detect_conflicts(archive.reopen().unwrap(), &target).unwrap();
        assert_eq!(conflicts, vec!["legacy-svc".to_string(), "rest/orders".to_string()]);
    }

    #[test]
    fn test_import_skip_preserves_existing_service() {
        let (source, _source_dir) = seeded_store();
        let archive = export_baselines(&source, None).unwrap();

        let target_dir = TempDir::new().unwrap();
        let existing = target_dir
            .path()
            .join("rest/orders/20260823/run-001/metadata.json");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, r#"{"runId":"run-001","local":true}"#).unwrap();
        let target = BaselineStore::new(target_dir.path());

        let imported =
            import_baselines(archive.reopen().unwrap(), &target, ConflictAction::Skip).unwrap();
        assert!(imported.iter().all(|p| !p.starts_with("rest/orders/")));
        assert_eq!(
            fs::read_to_string(&existing).unwrap(),
            r#"{"runId":"run-001","local":true}"#
        );
        // Non-conflicting services still arrive.
        assert!(target_dir.path().join("jms/billing/20260823/run-001/metadata.json").exists());
    }

    #[test]
    fn test_import_overwrite_replaces_existing_files() {
        let (source, _source_dir) = seeded_store();
        let archive = export_baselines(&source, None).unwrap();

        let target_dir = TempDir::new().unwrap();
        let existing = target_dir
            .path()
            .join("rest/orders/20260823/run-001/metadata.json");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, "stale").unwrap();
        let target = BaselineStore::new(target_dir.path());

        import_baselines(archive.reopen().unwrap(), &target, ConflictAction::Overwrite).unwrap();
        assert_eq!(fs::read_to_string(&existing).unwrap(), r#"{"runId":"run-001"}"#);
    }

    #[test]
    fn test_service_key_classification() {
        assert_eq!(
            service_key("rest/orders/20260823/run-001/metadata.json").as_deref(),
            Some("rest/orders")
        );
        assert_eq!(
            service_key("legacy-svc/20260101/run-001/metadata.json").as_deref(),
            Some("legacy-svc")
        );
        assert_eq!(service_key("stray.json"), None);
    }
}
