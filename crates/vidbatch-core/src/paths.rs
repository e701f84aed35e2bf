//! Output path resolution.
//!
//! Every job's destination is decided up front, in index order, so two jobs
//! never race for one file and a job cancelled before it ran still has a
//! deterministic name.

use crate::error::{BatchError, Result};
use crate::types::BatchSpec;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Extension added to output paths that have none.
pub const VIDEO_EXTENSION: &str = "mp4";

const SLUG_MAX_CHARS: usize = 40;

/// Resolves the destination of every job, in job order.
///
/// `None` means the job is not downloaded. Paths are absolute and lexically
/// normalized.
///
/// # Errors
/// Returns `BatchError::Validation` when a path escapes the output directory
/// and escapes are not allowed, or `BatchError::Io` when the working
/// directory cannot be determined.
pub fn resolve_output_paths(spec: &BatchSpec) -> Result<Vec<Option<PathBuf>>> {
    let cwd = std::env::current_dir()?;
    let base = normalize(&match &spec.defaults.output_dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    });

    let mut reserved = HashSet::new();
    let mut problems = Vec::new();
    let mut resolved = Vec::with_capacity(spec.jobs.len());

    for (i, job) in spec.jobs.iter().enumerate() {
        let index = i + 1;
        let candidate = match (&job.output_path, &spec.defaults.output_dir) {
            (Some(path), _) => Some(with_default_extension(base.join(path))),
            (None, Some(_)) => {
                Some(base.join(format!("{:03}-{}.{}", index, slugify(&job.prompt), VIDEO_EXTENSION)))
            }
            (None, None) => None,
        };

        let Some(candidate) = candidate.as_deref().map(normalize) else {
            resolved.push(None);
            continue;
        };

        if !spec.allow_path_escape && !candidate.starts_with(&base) {
            problems.push(format!(
                "jobs[{}]: output path {} escapes {}",
                index,
                candidate.display(),
                base.display()
            ));
            resolved.push(None);
            continue;
        }

        let path = decollide(candidate, &reserved);
        debug!(index, path = %path.display(), "Reserved output path");
        reserved.insert(path.clone());
        resolved.push(Some(path));
    }

    if problems.is_empty() { Ok(resolved) } else { Err(BatchError::Validation(problems)) }
}

/// Turns a prompt into a short file-name fragment.
pub fn slugify(prompt: &str) -> String {
    let mut slug = String::new();
    for c in prompt.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() { "video".to_string() } else { slug.to_string() }
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn with_default_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() { path } else { path.with_extension(VIDEO_EXTENSION) }
}

/// Appends `-1`, `-2`, ... to the file stem until the path is neither
/// reserved by this batch nor present on disk.
fn decollide(path: PathBuf, reserved: &HashSet<PathBuf>) -> PathBuf {
    let taken = |p: &Path| reserved.contains(p) || p.exists();
    if !taken(&path) {
        return path;
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
