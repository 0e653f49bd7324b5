use std::sync::Arc;
use serde_json::{json, Value};
use serde::Deserialize;

use rmcp::{Error as McpError, ServerHandler, model::*, schemars, tool};

use crate::document::summarize_body;
use crate::entity::{Entity, EntityKind};
use crate::index::{BuildReport, IndexStore};

const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
pub struct EntityTools {
    pub store: Arc<IndexStore>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetEntityRequest {
    #[schemars(description = "the entity id, or a person/org name or alias")]
    pub id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListEntitiesRequest {
    #[schemars(description = "only list this type: project, person, org, raci, app, customer, decision or other")]
    #[serde(default)]
    pub kind: Option<String>,

    #[schemars(description = "the maximum number of entities to return", default)]
    #[serde(default)]
    pub limit: i32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchEntitiesRequest {
    #[schemars(description = "text to look for in ids, names, aliases, descriptions and content")]
    pub query: String,

    #[schemars(description = "the maximum number of entities to return", default)]
    #[serde(default)]
    pub limit: i32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetContextRequest {
    #[schemars(description = "a project code or name, or a person or org name or alias")]
    pub topic: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ResolveAliasRequest {
    #[schemars(description = "a name or alias to map to an entity id")]
    pub name: String,
}

fn summary_record(entity: &Entity) -> Value {
    json!({
        "id": entity.id,
        "type": entity.kind,
        "name": entity.display_name(),
        "origin": entity.origin,
        "status": entity.str_field("status"),
        "summary": summarize_body(&entity.body),
    })
}

fn apply_limit(records: Vec<Value>, limit: i32, default: Option<usize>) -> Vec<Value> {
    let limit = if limit > 0 { Some(limit as usize) } else { default };
    match limit {
        Some(limit) => records.into_iter().take(limit).collect(),
        None => records,
    }
}

fn status_record(report: &BuildReport) -> Value {
    let counts: serde_json::Map<String, Value> = report
        .index
        .counts_by_kind()
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), json!(count)))
        .collect();
    let warnings: Vec<String> = report.warnings.iter().map(ToString::to_string).collect();

    json!({
        "total": report.index.len(),
        "aliases": report.index.alias_count(),
        "by_type": counts,
        "warnings": warnings,
        "generation": report.generation,
    })
}

fn text_result(value: Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(value.to_string())]))
}

#[tool(tool_box)]
impl EntityTools {

    pub fn new(store: Arc<IndexStore>) -> Self {
        Self {
            store,
        }
    }

    #[tool(description = "Get a project, person or org together with related entities: a project's team, orgs and RACI, a person's projects and orgs, or an org's projects, people and RACI")]
    async fn get_context(
        &self,
        #[tool(aggr)] GetContextRequest { topic }: GetContextRequest,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self.store.snapshot().await;

        match snapshot.index.context(&topic) {
            Some(context) => text_result(json!({
                "topic": topic,
                "primary": context.primary,
                "related": context.related.into_iter().map(summary_record).collect::<Vec<_>>(),
            })),
            None => text_result(json!({
                "topic": topic,
                "related": [],
                "message": format!("No project, person or org found for \"{}\"", topic)
            })),
        }
    }

    #[tool(description = "Get a single entity by id. Person and org names or aliases are resolved to ids.")]
    async fn get_entity(
        &self,
        #[tool(aggr)] GetEntityRequest { id }: GetEntityRequest,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self.store.snapshot().await;
        let index = &snapshot.index;

        let entity = index
            .resolve(&id)
            .and_then(|resolved| index.get(resolved));
        match entity {
            Some(entity) => text_result(json!(entity)),
            None => Err(McpError::resource_not_found("entity_not_found", Some(json!({ "id": id })))),
        }
    }

    #[tool(description = "List entities in id order, optionally restricted to one type")]
    async fn list_entities(
        &self,
        #[tool(aggr)] ListEntitiesRequest { kind, limit }: ListEntitiesRequest,
    ) -> Result<CallToolResult, McpError> {
        let kind = match kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(kind) => Some(kind.parse::<EntityKind>().map_err(|e| McpError::invalid_params(e, None))?),
            None => None,
        };

        let snapshot = self.store.snapshot().await;
        let entities = snapshot
            .index
            .list(|e| kind.is_none_or(|kind| e.kind == kind));

        let total = entities.len();
        let records = apply_limit(entities.into_iter().map(summary_record).collect(), limit, None);

        text_result(json!({
            "total": total,
            "returned": records.len(),
            "entities": records
        }))
    }

    #[tool(description = "Search all entities by keyword across ids, names, aliases, descriptions and content")]
    async fn search_entities(
        &self,
        #[tool(aggr)] SearchEntitiesRequest { query, limit }: SearchEntitiesRequest,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self.store.snapshot().await;
        let results = snapshot.index.search(&query);

        if results.is_empty() {
            return text_result(json!({
                "entities": [],
                "message": format!("No results found for \"{}\"", query)
            }));
        }

        let total = results.len();
        let records = apply_limit(
            results.into_iter().map(summary_record).collect(),
            limit,
            Some(DEFAULT_SEARCH_LIMIT),
        );

        text_result(json!({
            "total": total,
            "returned": records.len(),
            "entities": records
        }))
    }

    #[tool(description = "Map a name or alias to an entity id")]
    async fn resolve_alias(
        &self,
        #[tool(aggr)] ResolveAliasRequest { name }: ResolveAliasRequest,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self.store.snapshot().await;
        text_result(json!({
            "name": name,
            "id": snapshot.index.resolve(&name),
        }))
    }

    #[tool(description = "Rebuild the entity index from its configured sources")]
    async fn refresh_index(&self) -> Result<CallToolResult, McpError> {
        match self.store.refresh().await {
            Ok(report) => text_result(status_record(&report)),
            Err(e) => {
                tracing::error!("Refresh failed: {}", e);
                Err(McpError::internal_error(e.to_string(), None))
            }
        }
    }

    #[tool(description = "Show entity counts per type and warnings from the last index build")]
    async fn index_status(&self) -> Result<CallToolResult, McpError> {
        let snapshot = self.store.snapshot().await;
        text_result(status_record(&snapshot))
    }
}


#[tool(tool_box)]
impl ServerHandler for EntityTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("This server exposes brainbase entities (projects, people, orgs, RACI, apps, customers, decisions). Use 'get_context' to fetch a project, person or org with its related entities, 'get_entity' to fetch one entity by id, name or alias, 'list_entities' to list entities of a type, 'search_entities' for keyword search, 'resolve_alias' to map a name to an id, 'refresh_index' to rebuild from the sources and 'index_status' to see counts and build warnings.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_limit() {
        let records: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        assert_eq!(apply_limit(records.clone(), 2, None).len(), 2);
        assert_eq!(apply_limit(records.clone(), 0, None).len(), 5);
        assert_eq!(apply_limit(records.clone(), -1, Some(3)).len(), 3);
        assert_eq!(apply_limit(records, 10, Some(3)).len(), 5);
    }
}
