//! End-to-end lifecycle tests: staged startup, uploads, and replacement.

use async_trait::async_trait;
use skillseek_runtime::{
    EmbeddingProvider, Result, ServiceConfig, ServiceContext, SkillScope, SourceConfig,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic bag-of-words embedder; optionally slowed down to observe
/// the loading state mid-ingestion.
struct BagEmbedder {
    delay: Duration,
}

impl BagEmbedder {
    fn instant() -> Arc<Self> {
        Arc::new(Self { delay: Duration::ZERO })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

#[async_trait]
impl EmbeddingProvider for BagEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut row = vec![0.0f32; 64];
                for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                    if token.is_empty() {
                        continue;
                    }
                    let mut hasher = DefaultHasher::new();
                    token.hash(&mut hasher);
                    row[(hasher.finish() % 64) as usize] += 1.0;
                }
                row
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "bag-of-words"
    }
}

fn write_skill(dir: &Path, folder: &str, name: &str, description: &str) {
    let root = dir.join(folder);
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        root.join("SKILL.md"),
        format!("---\nname: {name}\ndescription: {description}\n---\n\nDo the thing.\n"),
    )
    .unwrap();
}

fn local_source(path: &Path) -> SourceConfig {
    SourceConfig::Local {
        path: path.to_path_buf(),
        scope: SkillScope::Global,
        tenant_id: String::new(),
    }
}

fn test_config(cache: &Path, sources: Vec<SourceConfig>) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.skill_sources = sources;
    config.cache_dir = cache.to_path_buf();
    config.auto_update_enabled = false;
    config
}

async fn wait_for_complete(ctx: &ServiceContext) {
    for _ in 0..200 {
        if ctx.loading().is_complete() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ingestion did not complete in time");
}

fn zip_with_skill(folder: &str, name: &str, description: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file(format!("{folder}/SKILL.md"), options).unwrap();
        writer
            .write_all(
                format!("---\nname: {name}\ndescription: {description}\n---\n\nUploaded body.\n")
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn staged_startup_indexes_all_sources() {
    let fixtures = tempfile::tempdir().unwrap();
    let source_a = fixtures.path().join("a");
    let source_b = fixtures.path().join("b");
    write_skill(&source_a, "skill-a", "Alpha", "image editing helper");
    write_skill(&source_b, "skill-b", "Beta", "csv parsing utility");

    let ctx = ServiceContext::new(
        test_config(fixtures.path(), vec![local_source(&source_a), local_source(&source_b)]),
        BagEmbedder::instant(),
    );
    ctx.start();
    wait_for_complete(&ctx).await;

    let mut names: Vec<String> = ctx.index.list().await.into_iter().map(|s| s.name).collect();
    names.sort();
    assert_eq!(names, vec!["Alpha", "Beta"]);

    let snap = ctx.loading().snapshot();
    assert_eq!(snap.sources_total, 2);
    assert_eq!(snap.sources_done, 2);
    assert_eq!(snap.skills_loaded, 2);
    assert!(snap.errors.is_empty());

    let hits = ctx.index.search("parse csv file", 1, None, &[]).await.unwrap();
    assert_eq!(hits[0].skill.name, "Beta");

    ctx.coordinator.stop().await;
}

#[tokio::test]
async fn queries_are_served_while_loading_is_in_progress() {
    let fixtures = tempfile::tempdir().unwrap();
    let source = fixtures.path().join("slow");
    write_skill(&source, "skill", "Slowpoke", "eventually indexed");

    let ctx = ServiceContext::new(
        test_config(fixtures.path(), vec![local_source(&source)]),
        BagEmbedder::slow(Duration::from_millis(500)),
    );
    ctx.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Ingestion is still embedding: the flag is up and reads don't block.
    assert!(!ctx.loading().is_complete());
    assert!(ctx.index.list().await.is_empty());

    wait_for_complete(&ctx).await;
    assert_eq!(ctx.index.len().await, 1);
    ctx.coordinator.stop().await;
}

#[tokio::test]
async fn unavailable_source_records_error_and_serves_partial_index() {
    let fixtures = tempfile::tempdir().unwrap();
    let good = fixtures.path().join("good");
    write_skill(&good, "skill", "Survivor", "still indexed");
    let missing = fixtures.path().join("does-not-exist");

    let ctx = ServiceContext::new(
        test_config(fixtures.path(), vec![local_source(&good), local_source(&missing)]),
        BagEmbedder::instant(),
    );
    ctx.start();
    wait_for_complete(&ctx).await;

    assert_eq!(ctx.index.len().await, 1);
    let snap = ctx.loading().snapshot();
    assert!(snap.is_complete);
    assert_eq!(snap.errors.len(), 1);
    assert!(snap.errors[0].message.contains("does-not-exist"));
    ctx.coordinator.stop().await;
}

#[tokio::test]
async fn upload_then_query_sees_the_new_skill() {
    let fixtures = tempfile::tempdir().unwrap();
    let ctx = ServiceContext::new(test_config(fixtures.path(), Vec::new()), BagEmbedder::instant());

    let names = ctx
        .coordinator
        .upload_archive(zip_with_skill("up", "Uploaded", "uploaded via zip"), None, None)
        .await
        .unwrap();
    assert_eq!(names, vec!["Uploaded"]);

    let listed: Vec<String> = ctx.index.list().await.into_iter().map(|s| s.name).collect();
    assert!(listed.contains(&"Uploaded".to_string()));
}

#[tokio::test]
async fn colliding_upload_replaces_without_growing_the_matrix() {
    let fixtures = tempfile::tempdir().unwrap();
    let ctx = ServiceContext::new(test_config(fixtures.path(), Vec::new()), BagEmbedder::instant());

    ctx.coordinator
        .upload_archive(zip_with_skill("up", "Uploaded", "first version"), None, None)
        .await
        .unwrap();
    let source_a = ctx.index.get("Uploaded").await.unwrap().source;
    let rows_before = ctx.index.embedding_rows().await;

    ctx.coordinator
        .upload_archive(zip_with_skill("up", "Uploaded", "second version"), None, None)
        .await
        .unwrap();

    assert_eq!(ctx.index.embedding_rows().await, rows_before);
    let skill = ctx.index.get("Uploaded").await.unwrap();
    assert_eq!(skill.description, "second version");
    assert_ne!(skill.source, source_a);
}

#[tokio::test]
async fn concurrent_uploads_serialize_cleanly() {
    let fixtures = tempfile::tempdir().unwrap();
    let ctx = ServiceContext::new(test_config(fixtures.path(), Vec::new()), BagEmbedder::instant());

    let a = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.coordinator
                .upload_archive(zip_with_skill("one", "One", "first upload"), None, None)
                .await
        })
    };
    let b = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.coordinator
                .upload_archive(zip_with_skill("two", "Two", "second upload"), None, None)
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(ctx.index.len().await, 2);
    assert_eq!(ctx.index.embedding_rows().await, 2);
}

#[tokio::test]
async fn malformed_archive_is_rejected_without_mutation() {
    let fixtures = tempfile::tempdir().unwrap();
    let ctx = ServiceContext::new(test_config(fixtures.path(), Vec::new()), BagEmbedder::instant());

    let err = ctx
        .coordinator
        .upload_archive(b"definitely not a zip".to_vec(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upload-rejected");
    assert_eq!(ctx.index.len().await, 0);
}

#[tokio::test]
async fn tenant_upload_is_scoped_and_isolated() {
    let fixtures = tempfile::tempdir().unwrap();
    let ctx = ServiceContext::new(test_config(fixtures.path(), Vec::new()), BagEmbedder::instant());

    ctx.coordinator
        .upload_archive(
            zip_with_skill("t", "TenantSkill", "acme only helper"),
            Some("acme".to_string()),
            Some(SkillScope::Tenant),
        )
        .await
        .unwrap();

    // Invisible without the allow-list, visible with it.
    let hits = ctx.index.search("acme helper", 5, Some("acme"), &[]).await.unwrap();
    assert!(hits.is_empty());
    let allowed = vec!["TenantSkill".to_string()];
    let hits = ctx.index.search("acme helper", 5, Some("acme"), &allowed).await.unwrap();
    assert_eq!(hits[0].skill.name, "TenantSkill");

    // Tenant scope without a tenant id is rejected up front.
    let err = ctx
        .coordinator
        .upload_archive(
            zip_with_skill("t2", "Other", "whatever"),
            None,
            Some(SkillScope::Tenant),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upload-rejected");
}
