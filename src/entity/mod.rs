use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::document::{Metadata, ParsedFile, ensure_array};

/// Which source(s) contributed an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Filesystem,
    GraphApi,
    Hybrid,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Filesystem => f.write_str("filesystem"),
            Origin::GraphApi => f.write_str("graphapi"),
            Origin::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Broad category of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Person,
    Org,
    Raci,
    App,
    Customer,
    Decision,
    Other,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Project,
        EntityKind::Person,
        EntityKind::Org,
        EntityKind::Raci,
        EntityKind::App,
        EntityKind::Customer,
        EntityKind::Decision,
        EntityKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Person => "person",
            EntityKind::Org => "org",
            EntityKind::Raci => "raci",
            EntityKind::App => "app",
            EntityKind::Customer => "customer",
            EntityKind::Decision => "decision",
            EntityKind::Other => "other",
        }
    }

    /// Kind implied by where a file sits under the codex root
    pub fn from_codex_path(relative_path: &Path) -> Self {
        let dirs: Vec<String> = relative_path
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_lowercase()),
                _ => None,
            })
            .collect();
        let has = |name: &str| dirs.iter().any(|d| d == name);

        if has("decisions") {
            EntityKind::Decision
        } else if has("people") {
            EntityKind::Person
        } else if has("raci") {
            EntityKind::Raci
        } else if has("orgs") {
            EntityKind::Org
        } else if has("projects")
            && relative_path.file_name().is_some_and(|n| n == "project.md")
        {
            EntityKind::Project
        } else {
            EntityKind::Other
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(EntityKind::Project),
            "person" => Ok(EntityKind::Person),
            "org" => Ok(EntityKind::Org),
            "raci" => Ok(EntityKind::Raci),
            "app" => Ok(EntityKind::App),
            "customer" => Ok(EntityKind::Customer),
            "decision" => Ok(EntityKind::Decision),
            "other" => Ok(EntityKind::Other),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RACI_ID_PREFIX: &str = "raci-";

/// Id of the RACI record for an org. Orgs and their RACI share `org_id`.
pub fn raci_id(org_id: &str) -> String {
    if org_id.starts_with(RACI_ID_PREFIX) {
        org_id.to_string()
    } else {
        format!("{}{}", RACI_ID_PREFIX, org_id)
    }
}

/// A queryable record produced by a source adapter or by a hybrid merge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub origin: Origin,
    pub metadata: Metadata,
    pub body: String,
    /// Path relative to the codex root, when a file contributed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Graph API `entity_id`, when the remote service contributed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Entity {
    /// Entity for a parsed codex file; `relative_path` is relative to the codex root
    pub fn from_parsed(parsed: ParsedFile<Metadata>, relative_path: &Path) -> Self {
        let kind = parsed
            .metadata
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| t.parse().ok())
            .unwrap_or_else(|| EntityKind::from_codex_path(relative_path));

        Self {
            id: parsed.id,
            kind,
            origin: Origin::Filesystem,
            metadata: parsed.metadata,
            body: parsed.body,
            file_path: Some(relative_path.to_path_buf()),
            remote_id: None,
        }
    }

    /// Human-readable place this entity came from
    pub fn location(&self) -> String {
        match (&self.file_path, &self.remote_id) {
            (Some(path), None) => path.display().to_string(),
            (None, Some(remote_id)) => format!("[Graph API: {}]", remote_id),
            (Some(path), Some(remote_id)) => {
                format!("{} + [Graph API: {}]", path.display(), remote_id)
            }
            (None, None) => self.id.clone(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    pub fn list_field(&self, key: &str) -> Vec<String> {
        ensure_array(self.field(key))
    }

    /// `name`, then `title`, then the id
    pub fn display_name(&self) -> &str {
        self.str_field("name")
            .or_else(|| self.str_field("title"))
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.id)
    }

    pub fn aliases(&self) -> Vec<String> {
        self.list_field("aliases")
    }

    /// Whether the id, name, title, aliases, description or body match `pattern`
    pub fn matches(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.id)
            || ["name", "title", "description"]
                .iter()
                .filter_map(|key| self.str_field(key))
                .any(|text| pattern.is_match(text))
            || self.aliases().iter().any(|alias| pattern.is_match(alias))
            || pattern.is_match(&self.body)
    }

    /// Overlay a remote copy onto this filesystem copy.
    ///
    /// Remote metadata wins on shared keys; keys only present locally are
    /// kept. The remote body replaces the local one unless it is blank.
    pub fn merge_remote(self, remote: Entity) -> Entity {
        let mut metadata = self.metadata;
        for (key, value) in remote.metadata {
            metadata.insert(key, value);
        }

        let body = if remote.body.trim().is_empty() {
            self.body
        } else {
            remote.body
        };
        let kind = if remote.kind == EntityKind::Other {
            self.kind
        } else {
            remote.kind
        };

        Entity {
            id: self.id,
            kind,
            origin: Origin::Hybrid,
            metadata,
            body,
            file_path: self.file_path,
            remote_id: remote.remote_id,
        }
    }
}
