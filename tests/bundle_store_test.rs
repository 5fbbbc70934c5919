mod common;

use chrono::Utc;

use common::PROFILE_VERSION;
use recapd::application::ports::{BundleInvalid, BundleStore};
use recapd::domain::{
    BundleManifest, CacheKey, EntryStatus, JobId, SourceType, SummaryDocument,
    BUNDLE_FORMAT_VERSION,
};
use recapd::infrastructure::storage::FsBundleStore;

fn cache_key(fill: char) -> CacheKey {
    CacheKey::parse(&fill.to_string().repeat(64)).unwrap()
}

async fn write_summary_json(dir: &std::path::Path, summary_text: &str) {
    let doc = SummaryDocument {
        summary_text: summary_text.to_string(),
        model: "mock-model".to_string(),
        input_chars: 42,
        profile_version: PROFILE_VERSION.to_string(),
        created_at: Utc::now(),
    };
    tokio::fs::write(
        dir.join("summary.json"),
        serde_json::to_vec_pretty(&doc).unwrap(),
    )
    .await
    .unwrap();
}

async fn staged_bundle(
    store: &FsBundleStore,
    job_id: &JobId,
    summary_text: &str,
) -> BundleManifest {
    let staging = store.stage(job_id).await.unwrap();
    tokio::fs::write(staging.join("asr.json"), b"[]").await.unwrap();
    write_summary_json(&staging, summary_text).await;

    let artifacts = store.scan_artifacts(job_id).await.unwrap();
    let now = Utc::now();
    BundleManifest {
        version: BUNDLE_FORMAT_VERSION.to_string(),
        profile_version: PROFILE_VERSION.to_string(),
        cache_key: String::new(),
        source_type: SourceType::Local,
        source_ref: "deadbeef".to_string(),
        source_name: Some("sample.srt".to_string()),
        status: EntryStatus::Completed,
        created_at: now,
        updated_at: now,
        artifacts,
        summary_text: Some(summary_text.to_string()),
        error: None,
    }
}

#[tokio::test]
async fn given_job_when_staged_twice_then_same_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();

    let first = store.stage(&job_id).await.unwrap();
    let second = store.stage(&job_id).await.unwrap();
    assert_eq!(first, second);
    assert!(tokio::fs::try_exists(&first).await.unwrap());
}

#[tokio::test]
async fn given_staged_artifacts_when_promoted_then_bundle_is_final_and_staging_gone() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('a');

    let mut manifest = staged_bundle(&store, &job_id, "a fine summary").await;
    manifest.cache_key = key.to_string();

    let final_dir = store
        .promote(&job_id, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    assert!(tokio::fs::try_exists(final_dir.join("bundle.json")).await.unwrap());
    assert!(!tokio::fs::try_exists(store.staging_dir(&job_id)).await.unwrap());
    assert_eq!(final_dir, store.bundle_dir(&key, SourceType::Local));

    store
        .validate(&key, SourceType::Local, PROFILE_VERSION)
        .await
        .unwrap();
}

#[tokio::test]
async fn given_existing_bundle_when_promoted_again_then_replaced() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let key = cache_key('b');

    let first_job = JobId::generate();
    let mut manifest = staged_bundle(&store, &first_job, "first summary").await;
    manifest.cache_key = key.to_string();
    store
        .promote(&first_job, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    let second_job = JobId::generate();
    let mut manifest = staged_bundle(&store, &second_job, "second summary").await;
    manifest.cache_key = key.to_string();
    store
        .promote(&second_job, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    let loaded = store.load_manifest(&key, SourceType::Local).await.unwrap();
    assert_eq!(loaded.summary_text.as_deref(), Some("second summary"));
}

#[tokio::test]
async fn given_missing_staging_when_discarded_then_ok() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    store.discard(&JobId::generate()).await.unwrap();
}

#[tokio::test]
async fn given_absent_bundle_when_validated_then_missing_manifest() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let result = store
        .validate(&cache_key('c'), SourceType::Url, PROFILE_VERSION)
        .await;
    assert_eq!(result.unwrap_err(), BundleInvalid::MissingManifest);
}

#[tokio::test]
async fn given_profile_version_mismatch_when_validated_then_invalid() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('d');

    let mut manifest = staged_bundle(&store, &job_id, "summary text").await;
    manifest.cache_key = key.to_string();
    store
        .promote(&job_id, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    let result = store.validate(&key, SourceType::Local, "v999").await;
    assert_eq!(result.unwrap_err(), BundleInvalid::ProfileVersionMismatch);
}

#[tokio::test]
async fn given_artifact_listed_but_deleted_when_validated_then_invalid() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('e');

    let mut manifest = staged_bundle(&store, &job_id, "summary text").await;
    manifest.cache_key = key.to_string();
    let final_dir = store
        .promote(&job_id, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    tokio::fs::remove_file(final_dir.join("asr.json")).await.unwrap();

    let result = store.validate(&key, SourceType::Local, PROFILE_VERSION).await;
    assert_eq!(result.unwrap_err(), BundleInvalid::MissingArtifact);
}

#[tokio::test]
async fn given_summary_json_disagreeing_with_manifest_when_validated_then_invalid() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('f');

    let staging = store.stage(&job_id).await.unwrap();
    write_summary_json(&staging, "different text").await;
    let artifacts = store.scan_artifacts(&job_id).await.unwrap();

    let now = Utc::now();
    let manifest = BundleManifest {
        version: BUNDLE_FORMAT_VERSION.to_string(),
        profile_version: PROFILE_VERSION.to_string(),
        cache_key: key.to_string(),
        source_type: SourceType::Local,
        source_ref: "deadbeef".to_string(),
        source_name: None,
        status: EntryStatus::Completed,
        created_at: now,
        updated_at: now,
        artifacts,
        summary_text: Some("the real summary".to_string()),
        error: None,
    };
    store
        .promote(&job_id, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    let result = store.validate(&key, SourceType::Local, PROFILE_VERSION).await;
    assert_eq!(result.unwrap_err(), BundleInvalid::SummaryTextMismatch);
}

#[tokio::test]
async fn given_staged_files_when_scanned_then_sizes_and_hashes_recorded() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();

    let staging = store.stage(&job_id).await.unwrap();
    tokio::fs::write(staging.join("audio.wav"), b"wavdata").await.unwrap();
    tokio::fs::write(staging.join("subtitle.srt"), b"1\n").await.unwrap();
    tokio::fs::write(staging.join("notes.txt"), b"ignored").await.unwrap();

    let artifacts = store.scan_artifacts(&job_id).await.unwrap();
    let keys: Vec<&str> = artifacts.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["audio", "subtitle"]);

    let audio = &artifacts["audio"];
    assert_eq!(audio.size, 7);
    assert_eq!(audio.sha256.len(), 64);
}

#[tokio::test]
async fn given_committed_bundle_when_deleted_then_size_drops_to_zero() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('1');

    let mut manifest = staged_bundle(&store, &job_id, "summary text").await;
    manifest.cache_key = key.to_string();
    store
        .promote(&job_id, &key, SourceType::Url, &manifest)
        .await
        .unwrap();

    assert!(store.bundle_size(&key, SourceType::Url).await > 0);
    assert!(store.delete(&key, SourceType::Url).await.unwrap());
    assert_eq!(store.bundle_size(&key, SourceType::Url).await, 0);
    assert!(!store.delete(&key, SourceType::Url).await.unwrap());
}

#[tokio::test]
async fn given_empty_summary_in_manifest_when_validated_then_invalid() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FsBundleStore::new(dir.path()).await.unwrap();
    let job_id = JobId::generate();
    let key = cache_key('2');

    let mut manifest = staged_bundle(&store, &job_id, "  ").await;
    manifest.cache_key = key.to_string();
    store
        .promote(&job_id, &key, SourceType::Local, &manifest)
        .await
        .unwrap();

    let result = store.validate(&key, SourceType::Local, PROFILE_VERSION).await;
    assert_eq!(result.unwrap_err(), BundleInvalid::EmptySummary);
}
