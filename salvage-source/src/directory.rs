//! Directory source: stacks read from a mounted directory tree.
//!
//! # Naming
//!
//! | Relative path                  | Stack name   |
//! |--------------------------------|--------------|
//! | `web.yml`                      | `web`        |
//! | `infra/dns.yaml`               | `infra/dns`  |
//! | `immich/compose.yaml`          | `immich`     |
//! | `media/plex/docker-compose.yml`| `media`      |
//!
//! Compose files inside a sub-directory take the name of the top-level
//! directory (the `stacks/<name>/compose.yaml` layout used by Dockge and
//! plain Compose projects). Hidden entries are never read.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use salvage_core::Stack;

use crate::error::{io_err, SourceError};
use crate::StackSource;

/// File stems treated as "the compose file of the enclosing directory".
const COMPOSE_STEMS: &[&str] = &["compose", "docker-compose"];

/// Reads every matching file under `root` as one stack.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl StackSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn stacks(&self) -> Result<Vec<Stack>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::DirectoryMissing {
                path: self.root.clone(),
            });
        }

        let mut files = Vec::new();
        collect_files(&self.root, &mut files)?;

        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        let mut stacks = Vec::new();
        for path in files.into_iter().filter(|p| self.wants(p)) {
            let rel = path.strip_prefix(&self.root).unwrap_or(path.as_path());
            let Some(name) = stack_name_for(rel) else {
                tracing::debug!("skipping {}: no usable stack name", path.display());
                continue;
            };
            let rel_display = display_relative(rel);
            if let Some(first) = seen.get(&name) {
                return Err(SourceError::DuplicateStack {
                    name,
                    first: first.clone(),
                    second: rel_display,
                });
            }

            let content = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            tracing::debug!("found stack '{name}' at {rel_display} ({} bytes)", content.len());
            seen.insert(name.clone(), rel_display);
            stacks.push(Stack::new(name, content));
        }

        if stacks.is_empty() {
            return Err(SourceError::Empty {
                origin: self.describe(),
            });
        }
        tracing::info!("found {} stack(s) in {}", stacks.len(), self.root.display());
        Ok(stacks)
    }
}

/// Recursively collect regular files below `dir`, depth-first, sorted by name.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        // Follows symlinks so mounted stack links are read as files.
        let meta = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Derive a stack name from a path relative to the source root.
///
/// Returns `None` for paths without a usable file stem.
pub fn stack_name_for(rel: &Path) -> Option<String> {
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let (file, dirs) = parts.split_last()?;
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file.as_str(),
    };
    if stem.is_empty() {
        return None;
    }

    if !dirs.is_empty() && COMPOSE_STEMS.contains(&stem.to_ascii_lowercase().as_str()) {
        return Some(dirs[0].clone());
    }

    let mut segments: Vec<&str> = dirs.iter().map(String::as_str).collect();
    segments.push(stem);
    Some(segments.join("/"))
}

fn display_relative(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}
