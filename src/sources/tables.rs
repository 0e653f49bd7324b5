//! Entities kept as markdown tables rather than one file per entity
//!
//! `common/meta/apps.md` and `common/meta/customers.md` hold one entity per
//! table row. RACI files carry position, decision and assignment tables plus a
//! product list, which are lifted into the RACI entity's metadata.

use std::path::Path;

use serde_json::{Value, json};

use crate::document::Metadata;
use crate::document::table::{Section, TableRow, cell, first_table, parse_sections};
use crate::entity::{Entity, EntityKind, Origin};

/// Codex files whose table rows are entities of the given kind
pub const TABLE_SOURCES: [(&str, EntityKind); 2] = [
    ("common/meta/apps.md", EntityKind::App),
    ("common/meta/customers.md", EntityKind::Customer),
];

/// Kind of the rows of `relative_path`, if it is a table source
pub fn table_source_kind(relative_path: &Path) -> Option<EntityKind> {
    TABLE_SOURCES
        .iter()
        .find(|(path, _)| relative_path == Path::new(path))
        .map(|(_, kind)| *kind)
}

fn row_entity(id: &str, kind: EntityKind, metadata: Metadata, relative_path: &Path) -> Entity {
    Entity {
        id: id.to_string(),
        kind,
        origin: Origin::Filesystem,
        metadata,
        body: String::new(),
        file_path: Some(relative_path.to_path_buf()),
        remote_id: None,
    }
}

fn split_tags(value: &str) -> Value {
    let tags: Vec<&str> = value
        .split('/')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect();
    json!(tags)
}

fn app_entity(row: &TableRow, relative_path: &Path) -> Option<Entity> {
    let app_id = cell(row, &["app_id"]);
    if app_id.is_empty() {
        return None;
    }

    let mut metadata = Metadata::new();
    metadata.insert("app_id".into(), json!(app_id));
    metadata.insert("name".into(), json!(cell(row, &["アプリ名", "name"])));
    metadata.insert("project".into(), json!(cell(row, &["所属プロジェクト", "project"])));
    metadata.insert("orgs".into(), split_tags(cell(row, &["所属組織", "orgs"])));
    metadata.insert("status".into(), json!(cell(row, &["ステータス", "status"])));
    metadata.insert("description".into(), json!(cell(row, &["概要", "description"])));

    Some(row_entity(app_id, EntityKind::App, metadata, relative_path))
}

fn customer_entity(row: &TableRow, relative_path: &Path) -> Option<Entity> {
    let customer_id = cell(row, &["customer_id"]);
    if customer_id.is_empty() {
        return None;
    }

    let mut metadata = Metadata::new();
    metadata.insert("customer_id".into(), json!(customer_id));
    for (key, headers) in [
        ("name", ["顧客", "name"]),
        ("sales_org", ["営業組織タグ", "sales_org"]),
        ("impl_org", ["実装組織タグ", "impl_org"]),
        ("project", ["プロジェクト", "project"]),
        ("contract_type", ["契約形態メモ", "contract_type"]),
        ("upfront", ["前受け", "upfront"]),
        ("status", ["ステータス", "status"]),
        ("notes", ["備考", "notes"]),
    ] {
        metadata.insert(key.into(), json!(cell(row, &headers)));
    }

    Some(row_entity(customer_id, EntityKind::Customer, metadata, relative_path))
}

/// One entity per table row that carries an id; rows without one are skipped
pub fn row_entities(kind: EntityKind, body: &str, relative_path: &Path) -> Vec<Entity> {
    let rows = first_table(body);
    let entities: Vec<Entity> = rows
        .iter()
        .filter_map(|row| match kind {
            EntityKind::App => app_entity(row, relative_path),
            EntityKind::Customer => customer_entity(row, relative_path),
            _ => None,
        })
        .collect();

    if entities.len() < rows.len() {
        tracing::debug!(
            "{}: {} rows without an id skipped",
            relative_path.display(),
            rows.len() - entities.len()
        );
    }
    entities
}

fn section_rows<'a>(sections: &'a [Section], heading: &str) -> impl Iterator<Item = &'a TableRow> {
    sections
        .iter()
        .filter(move |section| section.heading.contains(heading))
        .flat_map(|section| section.tables.iter().flatten())
}

fn records(rows: impl Iterator<Item = Value>) -> Option<Value> {
    let rows: Vec<Value> = rows.collect();
    (!rows.is_empty()).then(|| Value::Array(rows))
}

/// Lift the tables of a RACI body into `metadata`. Frontmatter keys win.
pub fn enrich_raci(metadata: &mut Metadata, body: &str) {
    let sections = parse_sections(body);

    let positions = records(section_rows(&sections, "立ち位置").map(|row| {
        json!({
            "person": cell(row, &["人"]),
            "assets": cell(row, &["資産"]),
            "authority": cell(row, &["権利の範囲"]),
        })
    }));
    let decisions = records(section_rows(&sections, "決裁").map(|row| {
        json!({
            "domain": cell(row, &["領域"]),
            "decider": cell(row, &["決裁者"]),
        })
    }));
    let assignments = records(section_rows(&sections, "主な担当").map(|row| {
        json!({
            "person": cell(row, &["人"]),
            "areas": cell(row, &["領域"]),
        })
    }));
    let products = records(
        sections
            .iter()
            .filter(|section| section.heading.contains("管轄プロダクト"))
            .flat_map(|section| section.items.iter())
            .map(|item| json!(item)),
    );
    let entries = records(
        sections
            .iter()
            .flat_map(|section| section.tables.iter().flatten())
            .filter(|row| !cell(row, &["項目"]).is_empty())
            .map(|row| {
                json!({
                    "item": cell(row, &["項目"]),
                    "responsible": cell(row, &["R（実行）", "R"]),
                    "accountable": cell(row, &["A（説明責任）", "A"]),
                    "consulted": cell(row, &["C（相談）", "C"]),
                    "informed": cell(row, &["I（報告）", "I"]),
                })
            }),
    );

    for (key, value) in [
        ("positions", positions),
        ("decisions", decisions),
        ("assignments", assignments),
        ("products", products),
        ("entries", entries),
    ] {
        if let Some(value) = value {
            metadata.entry(key).or_insert(value);
        }
    }
}
