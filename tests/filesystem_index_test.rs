use std::fs;
use std::path::Path;

use brainbase_mcp::config::{BrainbaseConfig, SourceMode};
use brainbase_mcp::entity::{EntityKind, Origin};
use brainbase_mcp::error::IndexWarning;
use brainbase_mcp::index::{IndexBuilder, IndexStore};
use brainbase_mcp::sources::FilesystemSource;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_codex(root: &Path) {
    write(
        root,
        "common/meta/people/sato_keigo.md",
        "---\nname: 佐藤 圭吾\nrole: Engineer\naliases:\n  - keigo\nstatus: active\n---\n# Sato\n\nWorks on the zep project.\n",
    );
    write(
        root,
        "orgs/acme.md",
        "---\nname: Acme\ntype: legal_entity\naliases: ACME Inc\n---\nAcme is a partner.\n",
    );
    write(root, "common/meta/people/README.md", "# People\n");
    write(root, "notes/plain.md", "No frontmatter here.\n");
    write(root, "notes/broken.md", "---\nname: Broken\nno closing delimiter\n");
    write(root, "notes/bad_yaml.md", "---\nname: [oops\n---\nbody\n");
    write(root, "notes/skip.txt", "---\nname: ignored\n---\n");
}

#[test]
fn test_scan_parses_entities_and_collects_warnings() {
    let dir = tempfile::tempdir().unwrap();
    sample_codex(dir.path());

    let batch = FilesystemSource::new(dir.path()).scan().unwrap();

    let mut ids: Vec<_> = batch.entities.iter().map(|e| e.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["acme", "plain", "sato_keigo"]);

    let sato = batch.entities.iter().find(|e| e.id == "sato_keigo").unwrap();
    assert_eq!(sato.kind, EntityKind::Person);
    assert_eq!(sato.origin, Origin::Filesystem);
    assert_eq!(sato.body, "# Sato\n\nWorks on the zep project.\n");
    assert_eq!(sato.aliases(), vec!["keigo"]);

    let acme = batch.entities.iter().find(|e| e.id == "acme").unwrap();
    assert_eq!(acme.kind, EntityKind::Org);
    assert_eq!(acme.aliases(), vec!["ACME Inc"]);

    let plain = batch.entities.iter().find(|e| e.id == "plain").unwrap();
    assert!(plain.metadata.is_empty());
    assert_eq!(plain.body, "No frontmatter here.\n");

    assert_eq!(batch.warnings.len(), 2);
    assert!(batch.warnings.iter().all(|w| matches!(w, IndexWarning::Parse { .. })));
    assert!(batch.warnings.iter().any(|w| w.to_string().contains("broken.md")));
    assert!(batch.warnings.iter().any(|w| w.to_string().contains("bad_yaml.md")));
}

#[test]
fn test_duplicate_ids_keep_lexically_first_path() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b/dup.md", "---\nname: second\n---\n");
    write(dir.path(), "a/dup.md", "---\nname: first\n---\n");

    let batch = FilesystemSource::new(dir.path()).scan().unwrap();

    assert_eq!(batch.entities.len(), 1);
    assert_eq!(batch.entities[0].str_field("name"), Some("first"));
    assert_eq!(batch.warnings.len(), 1);
    match &batch.warnings[0] {
        IndexWarning::DuplicateId { id, kept, duplicate } => {
            assert_eq!(id, "dup");
            assert!(kept.ends_with("dup.md") && kept.starts_with('a'));
            assert!(duplicate.starts_with('b'));
        }
        other => panic!("expected duplicate warning, got {:?}", other),
    }
}

#[tokio::test]
async fn test_filesystem_build_and_queries() {
    let dir = tempfile::tempdir().unwrap();
    sample_codex(dir.path());

    let config = BrainbaseConfig::filesystem(dir.path());
    let builder = IndexBuilder::from_config(&config).unwrap();
    assert_eq!(builder.mode(), SourceMode::Filesystem);

    let report = builder.build().await.unwrap();
    let index = &report.index;

    assert_eq!(index.len(), 3);
    assert_eq!(report.warnings.len(), 2);
    assert!(index.get("sato_keigo").is_some());
    assert!(index.get("nobody").is_none());
    assert_eq!(index.resolve("佐藤圭吾"), Some("sato_keigo"));
    assert_eq!(index.resolve("ACME Inc"), Some("acme"));

    let people: Vec<_> = index.list(|e| e.kind == EntityKind::Person).iter().map(|e| e.id.clone()).collect();
    assert_eq!(people, vec!["sato_keigo"]);

    let all: Vec<_> = index.list(|_| true).iter().map(|e| e.id.clone()).collect();
    assert_eq!(all, vec!["acme", "plain", "sato_keigo"]);

    let hits: Vec<_> = index.search("ZEP").iter().map(|e| e.id.clone()).collect();
    assert_eq!(hits, vec!["sato_keigo"]);
}

#[tokio::test]
async fn test_missing_codex_fails_single_source_build() {
    let config = BrainbaseConfig::filesystem("/no/such/codex/dir");
    let builder = IndexBuilder::from_config(&config).unwrap();
    assert!(builder.build().await.is_err());
}

#[tokio::test]
async fn test_refresh_replaces_snapshot_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "people/a.md", "---\nname: A\n---\n");

    let builder = IndexBuilder::from_config(&BrainbaseConfig::filesystem(dir.path())).unwrap();
    let store = IndexStore::open(builder).await.unwrap();

    let before = store.snapshot().await;
    assert_eq!(before.index.len(), 1);

    write(dir.path(), "people/b.md", "---\nname: B\n---\n");
    fs::remove_file(dir.path().join("people/a.md")).unwrap();

    // Stale until refreshed
    assert!(store.get("b").await.is_none());

    let after = store.refresh().await.unwrap();
    assert_eq!(after.index.len(), 1);
    assert!(after.index.get("b").is_some());

    // The old snapshot is untouched
    assert!(before.index.get("a").is_some());
    assert!(before.index.get("b").is_none());

    assert!(store.get("b").await.is_some());
    assert_eq!(store.list(|_| true).await.len(), 1);
}

fn layout_codex(root: &Path) {
    write(root, "projects/mana/project.md", "---\nname: Mana\nteam: [Tanaka]\norgs: [acme]\n---\nWorkflow board.\n");
    write(root, "projects/zep/project.md", "---\nname: Zep\nteam:\n  - 佐藤 圭吾\norgs: acme\n---\nVoice agent.\n");
    write(root, "projects/mana/decisions/pricing.md", "---\ntitle: Mana pricing\n---\n");
    write(root, "projects/zep/decisions/pricing.md", "---\ntitle: Zep pricing\n---\n");
    write(root, "common/meta/people/sato_keigo.md", "---\nname: 佐藤 圭吾\nprojects: [zep]\norg_tags: [acme]\n---\n");
    write(root, "common/meta/people/tanaka.md", "---\nname: Tanaka\nprojects: [mana]\n---\n");
    write(root, "orgs/acme.md", "---\nname: Acme\n---\n");
    write(
        root,
        "common/meta/raci/acme.md",
        "---\nname: Acme RACI\n---\n## 決裁\n\n| 領域 | 決裁者 |\n|---|---|\n| 採用 | 佐藤 圭吾 |\n",
    );
    write(
        root,
        "common/meta/apps.md",
        "# Apps\n\n| アプリ名 | app_id | 所属プロジェクト | 所属組織 | ステータス | 概要 |\n|---|---|---|---|---|---|\n| Zep Voice | zep-voice | zep | acme | active | Phone agent |\n| Mana Board | mana-board | mana | acme | beta | Kanban |\n",
    );
    write(
        root,
        "common/meta/customers.md",
        "| 顧客 | customer_id | プロジェクト | ステータス |\n|---|---|---|---|\n| 山田商事 | yamada | zep | contracted |\n",
    );
}

#[test]
fn test_layout_ids_keep_every_project_and_decision() {
    let dir = tempfile::tempdir().unwrap();
    layout_codex(dir.path());

    let batch = FilesystemSource::new(dir.path()).scan().unwrap();
    assert!(batch.warnings.is_empty(), "unexpected warnings: {:?}", batch.warnings);

    let mut ids: Vec<_> = batch.entities.iter().map(|e| (e.id.as_str(), e.kind)).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            ("acme", EntityKind::Org),
            ("mana", EntityKind::Project),
            ("mana-board", EntityKind::App),
            ("mana-pricing", EntityKind::Decision),
            ("raci-acme", EntityKind::Raci),
            ("sato_keigo", EntityKind::Person),
            ("tanaka", EntityKind::Person),
            ("yamada", EntityKind::Customer),
            ("zep", EntityKind::Project),
            ("zep-pricing", EntityKind::Decision),
            ("zep-voice", EntityKind::App),
        ]
    );

    let raci = batch.entities.iter().find(|e| e.id == "raci-acme").unwrap();
    assert_eq!(raci.str_field("org_id"), Some("acme"));
    assert_eq!(
        raci.field("decisions"),
        Some(&serde_json::json!([{"domain": "採用", "decider": "佐藤 圭吾"}]))
    );

    let app = batch.entities.iter().find(|e| e.id == "zep-voice").unwrap();
    assert_eq!(app.str_field("project"), Some("zep"));
    assert_eq!(app.location(), Path::new("common/meta/apps.md").display().to_string());
}

#[tokio::test]
async fn test_context_over_codex_layout() {
    let dir = tempfile::tempdir().unwrap();
    layout_codex(dir.path());

    let report = IndexBuilder::from_config(&BrainbaseConfig::filesystem(dir.path()))
        .unwrap()
        .build()
        .await
        .unwrap();

    let context = report.index.context("zep").unwrap();
    let related: Vec<_> = context.related.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(related, vec!["sato_keigo", "acme", "raci-acme"]);

    let context = report.index.context("Acme").unwrap();
    let related: Vec<_> = context.related.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(related, vec!["mana", "zep", "sato_keigo", "raci-acme"]);

    assert_eq!(report.index.search("kanban").len(), 1);
}

#[tokio::test]
async fn test_concurrent_refreshes_apply_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "people/a.md", "---\nname: A\n---\n");

    let builder = IndexBuilder::from_config(&BrainbaseConfig::filesystem(dir.path())).unwrap();
    let store = IndexStore::open(builder).await.unwrap();
    assert_eq!(store.snapshot().await.generation, 0);

    let (first, second) = tokio::join!(store.refresh(), store.refresh());
    let mut generations = vec![first.unwrap().generation, second.unwrap().generation];
    generations.sort();
    assert_eq!(generations, vec![1, 2]);
    assert_eq!(store.snapshot().await.generation, 2);

    store.refresh().await.unwrap();
    assert_eq!(store.snapshot().await.generation, 3);
}
