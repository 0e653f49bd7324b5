use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Url, header};
use serde::Deserialize;
use serde_json::Value;

use crate::config::BrainbaseConfig;
use crate::document::{Metadata, ensure_array};
use crate::entity::{Entity, EntityKind, Origin, raci_id};
use crate::error::{IndexError, IndexWarning, Result, SourceKind};

use super::SourceBatch;

const ENTITIES_PATH: &str = "api/info/graph/entities";

/// Wire shape of one record returned by the Graph API
#[derive(Debug, Clone, Deserialize)]
pub struct GraphEntity {
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub payload: Option<Metadata>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: Vec<GraphEntity>,
}

/// Fetches entity records from the Graph API
#[derive(Clone)]
pub struct GraphApiSource {
    client: Client,
    base_url: Url,
    token: Option<String>,
    project_codes: Vec<String>,
    timeout: Duration,
}

fn unavailable(reason: impl Into<String>) -> IndexError {
    IndexError::SourceUnavailable {
        source_kind: SourceKind::GraphApi,
        reason: reason.into(),
    }
}

impl GraphApiSource {
    pub fn new(
        base_url: Url,
        token: Option<String>,
        project_codes: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token,
            project_codes,
            timeout,
        })
    }

    pub fn from_config(config: &BrainbaseConfig) -> Result<Self> {
        let base_url = config.graph_api_url.clone().ok_or_else(|| {
            IndexError::ConfigInconsistency("BRAINBASE_GRAPH_API_URL is not configured".to_string())
        })?;
        Self::new(
            base_url,
            config.graph_api_token.clone(),
            config.project_codes.clone(),
            config.request_timeout,
        )
    }

    /// Full URL of the entity listing endpoint
    pub fn entities_url(&self) -> Result<Url> {
        let url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            ENTITIES_PATH
        );
        Url::parse(&url).map_err(|e| unavailable(format!("invalid endpoint {}: {}", url, e)))
    }

    /// Fetch all entities once. No retries: a failure is `SourceUnavailable`.
    pub async fn fetch(&self) -> Result<SourceBatch> {
        let url = self.entities_url()?;
        tracing::info!("Fetching entities from Graph API: {}", url);

        let mut request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let fetch = async {
            let response = request
                .send()
                .await
                .map_err(|e| unavailable(format!("request to {} failed: {}", url, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(unavailable(format!("{} returned {}", url, status)));
            }

            response
                .json::<EntitiesResponse>()
                .await
                .map_err(|e| unavailable(format!("invalid response from {}: {}", url, e)))
        };

        let response = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(unavailable(format!(
                    "no response within {}s",
                    self.timeout.as_secs_f64()
                )));
            }
        };

        tracing::info!("Loaded {} records from Graph API", response.entities.len());
        Ok(convert_entities(response.entities, &self.project_codes))
    }
}

/// Payload key carrying the natural identifier for each kind
fn id_key(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Project => Some("code"),
        EntityKind::Org | EntityKind::Raci => Some("org_id"),
        EntityKind::App => Some("app_id"),
        EntityKind::Customer => Some("customer_id"),
        EntityKind::Decision => Some("decision_id"),
        EntityKind::Person | EntityKind::Other => None,
    }
}

/// Index id of a record: its natural key, else `entity_id`.
/// RACI records are `raci-<org_id>` so they never collide with their org.
fn entity_id_for(kind: EntityKind, payload: &Metadata, entity_id: &str) -> Option<String> {
    let id = id_key(kind)
        .and_then(|key| non_empty_str(payload, key))
        .or_else(|| Some(entity_id.trim()).filter(|id| !id.is_empty()))?;
    match kind {
        EntityKind::Raci => Some(raci_id(id)),
        _ => Some(id.to_string()),
    }
}

fn non_empty_str<'a>(payload: &'a Metadata, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Whether a record belongs to one of `project_codes`.
///
/// Projects match on their own code. Other records match when any project
/// they reference is listed, and always pass when they reference none.
pub fn matches_project_codes(kind: EntityKind, payload: &Metadata, project_codes: &[String]) -> bool {
    if project_codes.is_empty() {
        return true;
    }
    if kind == EntityKind::Project {
        return non_empty_str(payload, "code").is_some_and(|code| project_codes.iter().any(|c| c == code));
    }

    let references: Vec<String> = ["project", "project_id", "projects"]
        .iter()
        .flat_map(|key| ensure_array(payload.get(*key)))
        .filter(|r| !r.trim().is_empty())
        .collect();

    references.is_empty() || references.iter().any(|r| project_codes.contains(r))
}

/// Turn Graph API records into entities, applying the project filter
pub fn convert_entities(records: Vec<GraphEntity>, project_codes: &[String]) -> SourceBatch {
    let mut batch = SourceBatch::default();
    let mut seen = HashMap::new();

    for record in records {
        let kind: EntityKind = record.entity_type.parse().unwrap_or(EntityKind::Other);
        let payload = record.payload.unwrap_or_default();

        if !matches_project_codes(kind, &payload, project_codes) {
            continue;
        }

        let Some(id) = entity_id_for(kind, &payload, &record.entity_id) else {
            let location = format!("Graph API {} record", record.entity_type);
            tracing::warn!("Skipping {}: record has no identifier", location);
            batch.warnings.push(IndexWarning::Parse {
                location,
                message: "record has no identifier".to_string(),
            });
            continue;
        };

        let body = ["content", "description", "bio"]
            .iter()
            .find_map(|key| non_empty_str(&payload, key))
            .unwrap_or_default()
            .to_string();

        let mut metadata = payload;
        if let Some(updated_at) = record.updated_at {
            metadata
                .entry("updated")
                .or_insert_with(|| Value::String(updated_at));
        }

        let remote_id = if record.entity_id.is_empty() {
            id.clone()
        } else {
            record.entity_id
        };

        let entity = Entity {
            id,
            kind,
            origin: Origin::GraphApi,
            metadata,
            body,
            file_path: None,
            remote_id: Some(remote_id),
        };
        batch.push_unique(entity, &mut seen);
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(entity_id: &str, entity_type: &str, payload: Value) -> GraphEntity {
        GraphEntity {
            entity_id: entity_id.to_string(),
            entity_type: entity_type.to_string(),
            payload: payload.as_object().cloned(),
            updated_at: Some("2026-01-01T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_convert_uses_kind_specific_id() {
        let batch = convert_entities(
            vec![
                record("uuid-1", "project", json!({"code": "zep", "name": "Zep", "description": "Voice agent"})),
                record("uuid-2", "person", json!({"name": "Sato", "bio": "Engineer"})),
                record("uuid-3", "org", json!({"name": "Acme"})),
            ],
            &[],
        );

        let ids: Vec<_> = batch.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["zep", "uuid-2", "uuid-3"]);

        let project = &batch.entities[0];
        assert_eq!(project.kind, EntityKind::Project);
        assert_eq!(project.origin, Origin::GraphApi);
        assert_eq!(project.body, "Voice agent");
        assert_eq!(project.remote_id.as_deref(), Some("uuid-1"));
        assert_eq!(project.metadata.get("updated"), Some(&json!("2026-01-01T00:00:00Z")));
        assert_eq!(batch.entities[1].body, "Engineer");
        assert!(batch.warnings.is_empty());
    }

    #[test]
    fn test_convert_keeps_payload_updated() {
        let batch = convert_entities(
            vec![record("p1", "person", json!({"updated": "2025-05-05"}))],
            &[],
        );
        assert_eq!(batch.entities[0].metadata.get("updated"), Some(&json!("2025-05-05")));
    }

    #[test]
    fn test_convert_skips_records_without_id() {
        let batch = convert_entities(vec![record("", "person", json!({"name": "Nobody"}))], &[]);
        assert!(batch.entities.is_empty());
        assert_eq!(batch.warnings.len(), 1);
    }

    #[test]
    fn test_convert_reports_remote_duplicates() {
        let batch = convert_entities(
            vec![
                record("a", "app", json!({"app_id": "same", "name": "First"})),
                record("b", "app", json!({"app_id": "same", "name": "Second"})),
            ],
            &[],
        );
        assert_eq!(batch.entities.len(), 1);
        assert_eq!(batch.entities[0].str_field("name"), Some("First"));
        assert!(matches!(
            &batch.warnings[0],
            IndexWarning::DuplicateId { id, .. } if id == "same"
        ));
    }

    #[test]
    fn test_raci_and_org_sharing_org_id_both_kept() {
        let batch = convert_entities(
            vec![
                record("u1", "org", json!({"org_id": "acme", "name": "Acme"})),
                record("u2", "raci", json!({"org_id": "acme", "name": "Acme RACI"})),
                record("u3", "raci", json!({"name": "Orphan RACI"})),
            ],
            &[],
        );

        let ids: Vec<_> = batch.entities.iter().map(|e| (e.id.as_str(), e.kind)).collect();
        assert_eq!(
            ids,
            vec![
                ("acme", EntityKind::Org),
                ("raci-acme", EntityKind::Raci),
                ("raci-u3", EntityKind::Raci),
            ]
        );
        assert!(batch.warnings.is_empty());
    }

    #[test]
    fn test_project_code_filter() {
        let codes = vec!["zep".to_string()];
        let batch = convert_entities(
            vec![
                record("1", "project", json!({"code": "zep"})),
                record("2", "project", json!({"code": "mana"})),
                record("3", "decision", json!({"decision_id": "d1", "project_id": "mana"})),
                record("4", "decision", json!({"decision_id": "d2", "project_id": "zep"})),
                record("5", "person", json!({"projects": ["mana", "zep"]})),
                record("6", "org", json!({"org_id": "acme"})),
            ],
            &codes,
        );

        let ids: Vec<_> = batch.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["zep", "d2", "5", "acme"]);
    }

    #[test]
    fn test_entities_url() {
        let source = GraphApiSource::new(
            Url::parse("https://graph.example.com/").unwrap(),
            None,
            Vec::new(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            source.entities_url().unwrap().as_str(),
            "https://graph.example.com/api/info/graph/entities"
        );
    }
}
