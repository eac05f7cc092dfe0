//! Disk-backed baseline store.
//!
//! Canonical layout: `{base}/{protocol}/{service}/{yyyyMMdd}/run-NNN/` with
//! one `iteration-NNN/` subdirectory per captured iteration. Legacy runs omit
//! the protocol segment and live directly under the storage root. Runs are
//! immutable once written; concurrent readers are safe, writers are not
//! coordinated and must be serialised by the caller.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::baseline::{
    BaselineIteration, BaselineRun, IterationMetadata, ResponseMetadata, RunInfo, RunMetadata,
};
use crate::errors::{DriftError, Result};
use crate::outcome::Headers;
use crate::protocol::Protocol;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEntry {
    iteration_number: usize,
    tokens: indexmap::IndexMap<String, String>,
    status_code: u16,
    duration: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    total_iterations: usize,
    iterations: Vec<SummaryEntry>,
}

/// Hierarchical, versioned storage of captured runs.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    base_dir: PathBuf,
}

impl BaselineStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Today's capture date in storage format (`yyyyMMdd`).
    pub fn today_date() -> String {
        chrono::Local::now().format("%Y%m%d").to_string()
    }

    /// Directory of one run. `protocol: None` addresses the legacy,
    /// protocol-less layout at the storage root.
    pub fn run_dir(
        &self,
        protocol: Option<Protocol>,
        service: &str,
        date: &str,
        run_id: &str,
    ) -> PathBuf {
        self.date_dir(protocol, service, date).join(run_id)
    }

    fn date_dir(&self, protocol: Option<Protocol>, service: &str, date: &str) -> PathBuf {
        match protocol {
            Some(p) => self.base_dir.join(p.dir_name()).join(service).join(date),
            None => self.base_dir.join(service).join(date),
        }
    }

    /// Probe `rest`, `jms`, `soap` in that fixed order for the given key;
    /// `None` means the run lives under the legacy protocol-less root.
    pub fn detect_protocol(
        &self,
        service: &str,
        date: &str,
        run_id: Option<&str>,
    ) -> Option<Protocol> {
        Protocol::DETECT_ORDER.into_iter().find(|p| {
            let path = match run_id {
                Some(run) => self.run_dir(Some(*p), service, date, run),
                None => self.date_dir(Some(*p), service, date),
            };
            path.exists()
        })
    }

    // ─── Save ──────────────────────────────────────────────────────────

    /// Persist a whole captured run. Fails without leaving a partially
    /// readable `metadata.json`-less run behind only if directory creation
    /// itself fails; payload write errors propagate.
    pub fn save_baseline(
        &self,
        metadata: &RunMetadata,
        iterations: &[BaselineIteration],
    ) -> Result<()> {
        let run_dir = self.run_dir(
            Some(metadata.test_type),
            &metadata.service_name,
            &metadata.capture_date,
            &metadata.run_id,
        );
        fs::create_dir_all(&run_dir).map_err(|e| DriftError::io(&run_dir, e))?;
        write_json(&run_dir.join("metadata.json"), metadata)?;
        for iteration in iterations {
            self.save_iteration(&run_dir, iteration, metadata.test_type)?;
        }
        self.save_summary(&run_dir, iterations)?;
        info!(
            service = %metadata.service_name,
            protocol = %metadata.test_type,
            date = %metadata.capture_date,
            run = %metadata.run_id,
            iterations = iterations.len(),
            "baseline saved"
        );
        Ok(())
    }

    fn save_iteration(
        &self,
        run_dir: &Path,
        iteration: &BaselineIteration,
        protocol: Protocol,
    ) -> Result<()> {
        let iter_dir = run_dir.join(format!("iteration-{:03}", iteration.iteration_number));
        fs::create_dir_all(&iter_dir).map_err(|e| DriftError::io(&iter_dir, e))?;

        let ext = payload_extension(protocol, iteration.request_payload.as_deref());
        write_payload(
            &iter_dir.join(format!("request.{ext}")),
            iteration.request_payload.as_deref(),
        )?;
        write_json(&iter_dir.join("request-headers.json"), &iteration.request_headers)?;
        write_json(
            &iter_dir.join("request-metadata.json"),
            &iteration.request_metadata,
        )?;

        write_payload(
            &iter_dir.join(format!("response.{ext}")),
            iteration.response_payload.as_deref(),
        )?;
        write_json(
            &iter_dir.join("response-headers.json"),
            &iteration.response_headers,
        )?;
        write_json(
            &iter_dir.join("response-metadata.json"),
            &iteration.response_metadata,
        )?;
        Ok(())
    }

    fn save_summary(&self, run_dir: &Path, iterations: &[BaselineIteration]) -> Result<()> {
        let summary = RunSummary {
            total_iterations: iterations.len(),
            iterations: iterations
                .iter()
                .map(|iter| SummaryEntry {
                    iteration_number: iter.iteration_number,
                    tokens: iter.request_metadata.tokens_used.clone(),
                    status_code: iter.response_metadata.status_code,
                    duration: iter.response_metadata.duration,
                })
                .collect(),
        };
        write_json(&run_dir.join("summary.json"), &summary)
    }

    // ─── Load ──────────────────────────────────────────────────────────

    /// Load a full run, resolving the protocol automatically.
    pub fn load_baseline(&self, service: &str, date: &str, run_id: &str) -> Result<BaselineRun> {
        let protocol = self.detect_protocol(service, date, Some(run_id));
        let run_dir = self.run_dir(protocol, service, date, run_id);
        if !run_dir.exists() {
            return Err(DriftError::BaselineNotFound { path: run_dir });
        }
        let metadata: RunMetadata = read_json(&run_dir.join("metadata.json"))?;
        let mut iterations = Vec::new();
        for iter_dir in sorted_subdirs(&run_dir, "iteration-")? {
            iterations.push(self.load_iteration(&iter_dir)?);
        }
        info!(
            service,
            date,
            run = run_id,
            iterations = iterations.len(),
            "baseline loaded"
        );
        Ok(BaselineRun {
            metadata,
            iterations,
        })
    }

    fn load_iteration(&self, iter_dir: &Path) -> Result<BaselineIteration> {
        let request_payload = find_and_read_payload(iter_dir, "request.")?;
        let request_headers: Headers = read_json(&iter_dir.join("request-headers.json"))?;
        let request_metadata: IterationMetadata =
            read_json(&iter_dir.join("request-metadata.json"))?;
        let response_payload = find_and_read_payload(iter_dir, "response.")?;
        let response_headers: Headers = read_json(&iter_dir.join("response-headers.json"))?;
        let response_metadata: ResponseMetadata =
            read_json(&iter_dir.join("response-metadata.json"))?;
        Ok(BaselineIteration {
            iteration_number: request_metadata.iteration_number,
            request_payload,
            request_headers,
            request_metadata,
            response_payload,
            response_headers,
            response_metadata,
        })
    }

    // ─── Run ids and listings ──────────────────────────────────────────

    /// Next sequential run id for `(protocol, service, date)`: `run-NNN` of
    /// the highest existing numeric suffix plus one, or `run-001`. Ids are
    /// never reused even if earlier runs were deleted out of band, since the
    /// maximum survives deletion of lower-numbered runs.
    pub fn generate_run_id(&self, protocol: Protocol, service: &str, date: &str) -> String {
        let date_dir = self.date_dir(Some(protocol), service, date);
        let mut max_run = 0u32;
        if let Ok(entries) = fs::read_dir(&date_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(suffix) = name.strip_prefix("run-") {
                    match suffix.parse::<u32>() {
                        Ok(num) => max_run = max_run.max(num),
                        Err(_) => warn!(name, "invalid run directory name, ignoring"),
                    }
                }
            }
        }
        format!("run-{:03}", max_run + 1)
    }

    /// List services, newest-looking names first. With a protocol filter only
    /// that subtree is scanned; without one the three protocol subtrees are
    /// unioned with legacy top-level directories.
    pub fn list_services(&self, protocol_filter: Option<Protocol>) -> Vec<String> {
        let mut services = std::collections::BTreeSet::new();
        if !self.base_dir.exists() {
            return Vec::new();
        }
        let protocols: Vec<Protocol> = match protocol_filter {
            Some(p) => vec![p],
            None => {
                // Legacy runs live at the root, next to the protocol dirs.
                for name in subdir_names(&self.base_dir) {
                    if !Protocol::is_protocol_dir(&name) {
                        services.insert(name);
                    }
                }
                Protocol::DETECT_ORDER.to_vec()
            }
        };
        for protocol in protocols {
            let protocol_dir = self.base_dir.join(protocol.dir_name());
            for name in subdir_names(&protocol_dir) {
                if name.eq_ignore_ascii_case("certs") {
                    continue;
                }
                services.insert(format!("{}/{}", protocol.dir_name(), name));
            }
        }
        services.into_iter().rev().collect()
    }

    /// Capture dates for a service across the legacy root and all protocol
    /// subtrees, newest first.
    pub fn list_dates(&self, service: &str) -> Vec<String> {
        let mut dates = std::collections::BTreeSet::new();
        for name in subdir_names(&self.base_dir.join(service)) {
            dates.insert(name);
        }
        for protocol in Protocol::DETECT_ORDER {
            let service_dir = self.base_dir.join(protocol.dir_name()).join(service);
            for name in subdir_names(&service_dir) {
                dates.insert(name);
            }
        }
        dates.into_iter().rev().collect()
    }

    /// Runs for a service/date, ascending by run id.
    pub fn list_runs(&self, service: &str, date: &str) -> Result<Vec<RunInfo>> {
        let protocol = self.detect_protocol(service, date, None);
        let date_dir = self.date_dir(protocol, service, date);
        if !date_dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for run_dir in sorted_subdirs(&date_dir, "run-")? {
            let metadata_path = run_dir.join("metadata.json");
            if !metadata_path.exists() {
                continue;
            }
            let metadata: RunMetadata = read_json(&metadata_path)?;
            runs.push(RunInfo {
                run_id: metadata.run_id,
                description: metadata.description,
                tags: metadata.tags,
                total_iterations: metadata.total_iterations,
                timestamp: metadata.capture_timestamp,
            });
        }
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(runs)
    }

    // ─── First-iteration accessors ─────────────────────────────────────

    /// Run metadata without loading iterations.
    pub fn run_metadata(&self, service: &str, date: &str, run_id: &str) -> Result<RunMetadata> {
        let protocol = self.detect_protocol(service, date, Some(run_id));
        let run_dir = self.run_dir(protocol, service, date, run_id);
        if !run_dir.exists() {
            return Err(DriftError::BaselineNotFound { path: run_dir });
        }
        read_json(&run_dir.join("metadata.json"))
    }

    /// Endpoint recorded in the first iteration's request metadata.
    pub fn run_endpoint(&self, service: &str, date: &str, run_id: &str) -> Result<Option<String>> {
        let Some(iter_dir) = self.first_iteration_dir(service, date, run_id)? else {
            return Ok(None);
        };
        let metadata_path = iter_dir.join("request-metadata.json");
        if !metadata_path.exists() {
            return Ok(None);
        }
        let metadata: IterationMetadata = read_json(&metadata_path)?;
        Ok(Some(metadata.endpoint))
    }

    /// Request headers recorded in the first iteration.
    pub fn run_request_headers(&self, service: &str, date: &str, run_id: &str) -> Result<Headers> {
        let Some(iter_dir) = self.first_iteration_dir(service, date, run_id)? else {
            return Ok(Headers::new());
        };
        let headers_path = iter_dir.join("request-headers.json");
        if !headers_path.exists() {
            return Ok(Headers::new());
        }
        read_json(&headers_path)
    }

    /// Request payload recorded in the first iteration, whichever extension
    /// is present.
    pub fn run_request_payload(
        &self,
        service: &str,
        date: &str,
        run_id: &str,
    ) -> Result<Option<String>> {
        let Some(iter_dir) = self.first_iteration_dir(service, date, run_id)? else {
            return Ok(None);
        };
        find_and_read_payload(&iter_dir, "request.")
    }

    fn first_iteration_dir(
        &self,
        service: &str,
        date: &str,
        run_id: &str,
    ) -> Result<Option<PathBuf>> {
        let protocol = self.detect_protocol(service, date, Some(run_id));
        let run_dir = self.run_dir(protocol, service, date, run_id);
        if !run_dir.exists() {
            return Err(DriftError::BaselineNotFound { path: run_dir });
        }
        let canonical = run_dir.join("iteration-001");
        if canonical.exists() {
            return Ok(Some(canonical));
        }
        Ok(sorted_subdirs(&run_dir, "iteration-")?.into_iter().next())
    }

    // ─── Referenced files (certificates/keys) ──────────────────────────

    /// Best-effort copy of a certificate or key referenced by path into
    /// `{run_dir}/certs/`, returning the run-relative destination. If the
    /// source cannot be located the original path comes back unchanged.
    pub fn copy_referenced_file(&self, run_dir: &Path, source_path: &str) -> String {
        if source_path.is_empty() {
            return source_path.to_string();
        }
        let mut source = PathBuf::from(source_path);
        if !source.exists() {
            let resolved = self.base_dir.join(source_path);
            if resolved.exists() {
                source = resolved;
            } else {
                warn!(source = source_path, "source file not found for copying");
                return source_path.to_string();
            }
        }
        let Some(file_name) = source.file_name() else {
            return source_path.to_string();
        };
        let certs_dir = run_dir.join("certs");
        let dest = certs_dir.join(file_name);
        let copy = fs::create_dir_all(&certs_dir).and_then(|_| fs::copy(&source, &dest));
        match copy {
            Ok(_) => {
                info!(dest = %dest.display(), "copied referenced file into baseline");
                format!("certs/{}", file_name.to_string_lossy())
            }
            Err(e) => {
                warn!(source = source_path, error = %e, "failed to copy referenced file");
                source_path.to_string()
            }
        }
    }

    /// Resolve a possibly run-relative certificate path to an absolute one.
    pub fn resolve_cert_path(
        &self,
        protocol: Option<Protocol>,
        service: &str,
        date: &str,
        run_id: &str,
        path: &str,
    ) -> String {
        if path.is_empty() || Path::new(path).is_absolute() {
            return path.to_string();
        }
        self.run_dir(protocol, service, date, run_id)
            .join(path)
            .to_string_lossy()
            .to_string()
    }
}

/// Extension for request/response payload files, sniffed from the payload.
pub fn payload_extension(protocol: Protocol, payload: Option<&str>) -> &'static str {
    if payload.is_some_and(|p| p.trim_start().starts_with('{')) {
        "json"
    } else if protocol == Protocol::Jms {
        "txt"
    } else {
        "xml"
    }
}

fn write_payload(path: &Path, payload: Option<&str>) -> Result<()> {
    // A missing payload still produces an empty file so the layout stays
    // uniform across iterations.
    fs::write(path, payload.unwrap_or_default()).map_err(|e| DriftError::io(path, e))
}

fn find_and_read_payload(iter_dir: &Path, prefix: &str) -> Result<Option<String>> {
    let mut names: Vec<String> = fs::read_dir(iter_dir)
        .map_err(|e| DriftError::io(iter_dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    match names.first() {
        Some(name) => {
            let path = iter_dir.join(name);
            fs::read_to_string(&path)
                .map(Some)
                .map_err(|e| DriftError::io(&path, e))
        }
        None => Ok(None),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| DriftError::json(path, e))?;
    fs::write(path, json).map_err(|e| DriftError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|e| DriftError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| DriftError::json(path, e))
}

/// Immediate subdirectory names, unordered.
fn subdir_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

/// Subdirectories whose name starts with `prefix`, in lexical order (which
/// is numeric order given the zero-padded naming).
fn sorted_subdirs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| DriftError::io(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_dir() && e.file_name().to_string_lossy().starts_with(prefix)
        })
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}
