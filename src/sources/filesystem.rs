use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::config::BrainbaseConfig;
use crate::document::{Metadata, parse_markdown_file};
use crate::entity::{Entity, EntityKind, raci_id};
use crate::error::{IndexError, Result, SourceKind};

use super::SourceBatch;
use super::tables::{enrich_raci, row_entities, table_source_kind};

/// Scans a codex directory for markdown entity files
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    root: PathBuf,
    supported_extensions: Vec<String>,
    ignored_file_names: Vec<String>,
}

impl FilesystemSource {
    /// Create a source rooted at `root` that reads `.md` files
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            supported_extensions: vec!["md".to_string()],
            ignored_file_names: vec!["README.md".to_string(), "index.md".to_string()],
        }
    }

    pub fn from_config(config: &BrainbaseConfig) -> Result<Self> {
        config
            .codex_path
            .as_ref()
            .map(Self::new)
            .ok_or_else(|| {
                IndexError::ConfigInconsistency("CODEX_PATH is not configured".to_string())
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a supported file extension
    pub fn add_extension(&mut self, extension: &str) {
        self.supported_extensions.push(extension.to_lowercase());
    }

    /// Check if a file is a markdown entity file
    pub fn is_supported_file(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.ignored_file_names.iter().any(|ignored| ignored == file_name) {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.supported_extensions.contains(&ext.to_lowercase()))
    }

    /// Walk the root and parse every entity file.
    ///
    /// Files are visited in lexical order of their path relative to the root,
    /// so the first of two files deriving the same id always wins.
    pub fn scan(&self) -> Result<SourceBatch> {
        if !self.root.is_dir() {
            return Err(IndexError::SourceUnavailable {
                source_kind: SourceKind::Filesystem,
                reason: format!("codex path {} is not a directory", self.root.display()),
            });
        }

        tracing::info!("Loading entities from: {}", self.root.display());
        let mut batch = SourceBatch::default();
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| self.root.display().to_string());
                    batch.skip(
                        location.clone(),
                        &IndexError::Io {
                            path: PathBuf::from(location),
                            source: e.into(),
                        },
                    );
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && self.is_supported_file(path) {
                let relative = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
                files.push(relative);
            }
        }

        files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));

        let mut seen = HashMap::new();
        for relative in files {
            let parsed = match parse_markdown_file::<Metadata>(self.root.join(&relative)) {
                Ok(parsed) => parsed,
                Err(e) => {
                    batch.skip(relative.display().to_string(), &e);
                    continue;
                }
            };

            if let Some(kind) = table_source_kind(&relative) {
                for entity in row_entities(kind, &parsed.body, &relative) {
                    batch.push_unique(entity, &mut seen);
                }
                continue;
            }
            if parsed.id.is_empty() {
                tracing::debug!("No id derivable from {}", relative.display());
                continue;
            }

            let mut entity = Entity::from_parsed(parsed, &relative);
            assign_codex_id(&mut entity, &relative);
            if entity.kind == EntityKind::Raci {
                enrich_raci(&mut entity.metadata, &entity.body);
            }
            batch.push_unique(entity, &mut seen);
        }

        tracing::info!(
            "Loaded {} entities from filesystem ({} warnings)",
            batch.entities.len(),
            batch.warnings.len()
        );
        Ok(batch)
    }
}

fn declared<'a>(entity: &'a Entity, key: &str) -> Option<&'a str> {
    entity
        .str_field(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Directory name `<code>` of a path under `projects/<code>/...`
fn project_dir(relative_path: &Path) -> Option<String> {
    let dirs: Vec<String> = relative_path
        .parent()?
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    dirs.windows(2)
        .find(|pair| pair[0] == "projects")
        .map(|pair| pair[1].clone())
}

/// Refine the base-name id using the codex layout.
///
/// `projects/<code>/project.md` is the project `<code>` (or its `project_id`),
/// decisions under `projects/<code>/` are `<code>-<decision>`, orgs honour
/// `org_id` and RACI files become `raci-<org_id>`.
fn assign_codex_id(entity: &mut Entity, relative_path: &Path) {
    let id = match entity.kind {
        EntityKind::Project => {
            let from_dir = relative_path
                .file_name()
                .filter(|name| *name == "project.md")
                .and_then(|_| relative_path.parent()?.file_name())
                .map(|dir| dir.to_string_lossy().into_owned());
            let id = declared(entity, "project_id")
                .map(str::to_string)
                .or(from_dir)
                .unwrap_or_else(|| entity.id.clone());
            entity
                .metadata
                .entry("project_id")
                .or_insert_with(|| Value::String(id.clone()));
            id
        }
        EntityKind::Org => declared(entity, "org_id")
            .map(str::to_string)
            .unwrap_or_else(|| entity.id.clone()),
        EntityKind::Raci => {
            let org_id = declared(entity, "org_id")
                .map(str::to_string)
                .unwrap_or_else(|| entity.id.clone());
            entity
                .metadata
                .entry("org_id")
                .or_insert_with(|| Value::String(org_id.clone()));
            raci_id(&org_id)
        }
        EntityKind::Decision => {
            let decision_id = declared(entity, "decision_id")
                .map(str::to_string)
                .unwrap_or_else(|| entity.id.clone());
            match project_dir(relative_path) {
                Some(project) => {
                    entity
                        .metadata
                        .insert("project_id".to_string(), Value::String(project.clone()));
                    format!("{}-{}", project, decision_id)
                }
                None => decision_id,
            }
        }
        _ => return,
    };
    entity.id = id;
}
