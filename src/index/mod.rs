use std::collections::BTreeMap;
use std::sync::Arc;

use regex::RegexBuilder;
use tokio::sync::{Mutex, RwLock};

use crate::config::{BrainbaseConfig, SourceMode};
use crate::entity::{Entity, EntityKind, raci_id};
use crate::error::{IndexError, IndexWarning, Result, SourceKind};
use crate::sources::{FilesystemSource, GraphApiSource, SourceBatch};

/// Immutable snapshot of all entities, keyed and ordered by id
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: BTreeMap<String, Entity>,
    aliases: BTreeMap<String, String>,
}

impl EntityIndex {
    /// Build an index from entities with unique ids; on a clash the first stays
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut map = BTreeMap::new();
        for entity in entities {
            if map.contains_key(&entity.id) {
                tracing::warn!("Dropping second entity with id '{}'", entity.id);
                continue;
            }
            map.insert(entity.id.clone(), entity);
        }

        let mut aliases = BTreeMap::new();
        for entity in map.values() {
            for alias in alias_keys(entity) {
                if alias != entity.id {
                    aliases.entry(alias).or_insert_with(|| entity.id.clone());
                }
            }
        }

        Self {
            entities: map,
            aliases,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// Exact id lookup
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Like `get`, but absence is a `NotFound` error
    pub fn require(&self, id: &str) -> Result<&Entity> {
        self.get(id)
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    /// Map an id, name or alias to an id. Exact ids win over aliases.
    pub fn resolve(&self, name_or_alias: &str) -> Option<&str> {
        if let Some((id, _)) = self.entities.get_key_value(name_or_alias) {
            return Some(id.as_str());
        }
        self.aliases.get(name_or_alias).map(String::as_str)
    }

    /// Entities in id order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities satisfying `predicate`, in id order
    pub fn list<F>(&self, predicate: F) -> Vec<&Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.entities.values().filter(|e| predicate(e)).collect()
    }

    pub fn list_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.list(|e| e.kind == kind)
    }

    /// Case-insensitive substring search over ids, names, aliases and bodies
    pub fn search(&self, query: &str) -> Vec<&Entity> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let pattern = match RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!("Unusable search query '{}': {}", query, e);
                return Vec::new();
            }
        };
        self.list(|e| e.matches(&pattern))
    }

    /// Number of entities per kind, kinds with none omitted
    pub fn counts_by_kind(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts = BTreeMap::new();
        for entity in self.entities.values() {
            *counts.entry(entity.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// An entity and the entities directly connected to it
#[derive(Debug, Clone)]
pub struct EntityContext<'a> {
    pub primary: &'a Entity,
    pub related: Vec<&'a Entity>,
}

impl<'a> EntityContext<'a> {
    fn add(&mut self, entity: Option<&'a Entity>) {
        let Some(entity) = entity else {
            return;
        };
        if entity.id != self.primary.id && !self.related.iter().any(|r| r.id == entity.id) {
            self.related.push(entity);
        }
    }
}

impl EntityIndex {
    fn resolve_kind(&self, name: &str, kind: EntityKind) -> Option<&Entity> {
        self.resolve(name.trim())
            .and_then(|id| self.get(id))
            .filter(|e| e.kind == kind)
    }

    /// Whether any `key` reference of `entity` resolves to `target`
    fn refers_to(&self, entity: &Entity, key: &str, target: &Entity) -> bool {
        entity
            .list_field(key)
            .iter()
            .any(|name| self.resolve(name.trim()) == Some(target.id.as_str()))
    }

    /// Find a project, person or org by `topic` and collect what it links to.
    ///
    /// Projects match on id or a case-insensitive name fragment; people and
    /// orgs through `resolve`. A project brings its team, orgs and their RACI;
    /// a person their projects and orgs; an org its projects, people and RACI.
    pub fn context(&self, topic: &str) -> Option<EntityContext<'_>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return None;
        }
        let lower = topic.to_lowercase();

        let primary = self
            .list_kind(EntityKind::Project)
            .into_iter()
            .find(|p| p.id.to_lowercase() == lower || p.display_name().to_lowercase().contains(&lower))
            .or_else(|| self.resolve_kind(topic, EntityKind::Person))
            .or_else(|| self.resolve_kind(topic, EntityKind::Org))?;

        let mut context = EntityContext {
            primary,
            related: Vec::new(),
        };

        match primary.kind {
            EntityKind::Project => {
                for member in primary.list_field("team") {
                    context.add(self.resolve_kind(&member, EntityKind::Person));
                }
                let orgs: Vec<&Entity> = primary
                    .list_field("orgs")
                    .iter()
                    .filter_map(|tag| self.resolve_kind(tag, EntityKind::Org))
                    .collect();
                for org in &orgs {
                    context.add(Some(*org));
                }
                for org in &orgs {
                    context.add(self.get(&raci_id(&org.id)));
                }
                context.add(self.get(&raci_id(&primary.id)));
            }
            EntityKind::Person => {
                for project in primary.list_field("projects") {
                    context.add(self.resolve_kind(&project, EntityKind::Project));
                }
                for tag in primary.list_field("org_tags").into_iter().chain(primary.list_field("org")) {
                    context.add(self.resolve_kind(&tag, EntityKind::Org));
                }
            }
            EntityKind::Org => {
                for project in self.list_kind(EntityKind::Project) {
                    if self.refers_to(project, "orgs", primary) {
                        context.add(Some(project));
                    }
                }
                for person in self.list_kind(EntityKind::Person) {
                    if self.refers_to(person, "org_tags", primary) || self.refers_to(person, "org", primary) {
                        context.add(Some(person));
                    }
                }
                context.add(self.get(&raci_id(&primary.id)));
            }
            _ => {}
        }

        Some(context)
    }
}

/// Name, name without whitespace, and every alias of an entity
fn alias_keys(entity: &Entity) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(name) = entity.str_field("name").map(str::trim).filter(|n| !n.is_empty()) {
        keys.push(name.to_string());
        let compact: String = name.split_whitespace().collect();
        if compact != name {
            keys.push(compact);
        }
    }
    keys.extend(
        entity
            .aliases()
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    );
    keys
}

/// Combine filesystem and Graph API entities by id.
///
/// Entities present in both become `Origin::Hybrid` with remote fields taking
/// precedence; entities present in one source keep that source's origin.
pub fn merge_hybrid(filesystem: Vec<Entity>, remote: Vec<Entity>) -> Vec<Entity> {
    let mut merged: BTreeMap<String, Entity> = filesystem
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect();

    for entity in remote {
        let combined = match merged.remove(&entity.id) {
            Some(local) => local.merge_remote(entity),
            None => entity,
        };
        merged.insert(combined.id.clone(), combined);
    }

    merged.into_values().collect()
}

/// A built index and the non-fatal problems met while building it
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub index: EntityIndex,
    pub warnings: Vec<IndexWarning>,
    /// Position in the store's sequence of snapshots; the first build is 0
    pub generation: u64,
}

impl BuildReport {
    fn from_batch(batch: SourceBatch) -> Self {
        Self {
            index: EntityIndex::from_entities(batch.entities),
            warnings: batch.warnings,
            generation: 0,
        }
    }
}

/// Runs the configured source adapter(s) and merges their output
#[derive(Clone)]
pub struct IndexBuilder {
    mode: SourceMode,
    filesystem: Option<FilesystemSource>,
    graph_api: Option<GraphApiSource>,
}

impl IndexBuilder {
    pub fn new(
        mode: SourceMode,
        filesystem: Option<FilesystemSource>,
        graph_api: Option<GraphApiSource>,
    ) -> Result<Self> {
        if mode.uses_filesystem() && filesystem.is_none() {
            return Err(IndexError::ConfigInconsistency(format!(
                "{} mode needs a filesystem source",
                mode
            )));
        }
        if mode.uses_graph_api() && graph_api.is_none() {
            return Err(IndexError::ConfigInconsistency(format!(
                "{} mode needs a Graph API source",
                mode
            )));
        }
        Ok(Self {
            mode,
            filesystem,
            graph_api,
        })
    }

    pub fn from_config(config: &BrainbaseConfig) -> Result<Self> {
        let filesystem = if config.source_mode.uses_filesystem() {
            Some(FilesystemSource::from_config(config)?)
        } else {
            None
        };
        let graph_api = if config.source_mode.uses_graph_api() {
            Some(GraphApiSource::from_config(config)?)
        } else {
            None
        };
        Self::new(config.source_mode, filesystem, graph_api)
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    async fn scan_filesystem(&self) -> Result<SourceBatch> {
        let Some(source) = self.filesystem.clone() else {
            return Err(IndexError::ConfigInconsistency(
                "no filesystem source configured".to_string(),
            ));
        };
        tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| IndexError::SourceUnavailable {
                source_kind: SourceKind::Filesystem,
                reason: format!("scan task failed: {}", e),
            })?
    }

    async fn fetch_graph_api(&self) -> Result<SourceBatch> {
        match &self.graph_api {
            Some(source) => source.fetch().await,
            None => Err(IndexError::ConfigInconsistency(
                "no Graph API source configured".to_string(),
            )),
        }
    }

    /// Build a fresh index.
    ///
    /// A single-source build fails when its source is unavailable. A hybrid
    /// build only fails when both sources are; otherwise it degrades to the
    /// surviving source and records a partial-availability warning.
    pub async fn build(&self) -> Result<BuildReport> {
        tracing::info!("Building index ({} mode)", self.mode);
        let report = match self.mode {
            SourceMode::Filesystem => BuildReport::from_batch(self.scan_filesystem().await?),
            SourceMode::GraphApi => BuildReport::from_batch(self.fetch_graph_api().await?),
            SourceMode::Hybrid => {
                let (filesystem, remote) =
                    tokio::join!(self.scan_filesystem(), self.fetch_graph_api());
                match (filesystem, remote) {
                    (Ok(filesystem), Ok(remote)) => {
                        let mut warnings = filesystem.warnings;
                        warnings.extend(remote.warnings);
                        let entities = merge_hybrid(filesystem.entities, remote.entities);
                        BuildReport {
                            index: EntityIndex::from_entities(entities),
                            warnings,
                            generation: 0,
                        }
                    }
                    (Ok(survivor), Err(e)) | (Err(e), Ok(survivor)) => {
                        tracing::warn!("Hybrid build degraded: {}", e);
                        let mut report = BuildReport::from_batch(survivor);
                        report.warnings.push(IndexWarning::from_error("hybrid", &e));
                        report
                    }
                    (Err(filesystem_err), Err(remote_err)) => {
                        tracing::error!(
                            "Both sources failed: {}; {}",
                            filesystem_err,
                            remote_err
                        );
                        return Err(remote_err);
                    }
                }
            }
        };

        tracing::info!(
            "Index built: {} entities, {} aliases, {} warnings",
            report.index.len(),
            report.index.alias_count(),
            report.warnings.len()
        );
        Ok(report)
    }
}

/// Holds the current index snapshot and swaps it wholesale on refresh
pub struct IndexStore {
    builder: IndexBuilder,
    current: RwLock<Arc<BuildReport>>,
    /// Held across build and swap so refreshes apply in call order
    refresh_lock: Mutex<()>,
}

impl IndexStore {
    /// Run the first build; fails if that build fails
    pub async fn open(builder: IndexBuilder) -> Result<Self> {
        let report = builder.build().await?;
        Ok(Self::with_report(builder, report))
    }

    pub fn with_report(builder: IndexBuilder, report: BuildReport) -> Self {
        Self {
            builder,
            current: RwLock::new(Arc::new(report)),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current snapshot. It stays coherent even if a refresh replaces it.
    pub async fn snapshot(&self) -> Arc<BuildReport> {
        self.current.read().await.clone()
    }

    /// Rebuild and replace the snapshot. On failure the old snapshot stays.
    ///
    /// Concurrent refreshes run one after another, so a slow build never
    /// replaces the result of a refresh that started after it.
    pub async fn refresh(&self) -> Result<Arc<BuildReport>> {
        let _guard = self.refresh_lock.lock().await;

        let mut report = self.builder.build().await?;
        let mut current = self.current.write().await;
        report.generation = current.generation + 1;

        let report = Arc::new(report);
        *current = report.clone();
        tracing::info!("Index snapshot {} replaced", report.generation);
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Option<Entity> {
        self.snapshot().await.index.get(id).cloned()
    }

    pub async fn list<F>(&self, predicate: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.snapshot()
            .await
            .index
            .list(predicate)
            .into_iter()
            .cloned()
            .collect()
    }
}
