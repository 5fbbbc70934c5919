mod common;

use chrono::{Duration, Utc};

use common::memory_store;
use recapd::application::ports::{EntryUpdate, GetOrCreateOutcome, MetadataStore};
use recapd::domain::{
    CacheKey, EntryStatus, FileHash, FileId, FileType, JobStatus, SourceType, UploadRecord,
};

fn upload_record(name: &str, hash_fill: &str, path: &str, ttl_secs: i64) -> UploadRecord {
    let now = Utc::now();
    UploadRecord {
        file_id: FileId::generate(),
        original_name: name.to_string(),
        size: 42,
        mime_type: "application/x-subrip".to_string(),
        file_type: FileType::Subtitle,
        file_hash: FileHash::parse(&hash_fill.repeat(32)).unwrap(),
        stored_path: path.into(),
        created_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
    }
}

fn key(fill: char) -> CacheKey {
    CacheKey::parse(&fill.to_string().repeat(64)).unwrap()
}

#[tokio::test]
async fn given_inserted_upload_when_fetched_then_fields_round_trip() {
    let store = memory_store().await;
    let record = upload_record("a.srt", "ab", "/tmp/u/a.srt", 3600);

    store.insert_upload(&record).await.unwrap();
    let fetched = store.get_upload(&record.file_id).await.unwrap().unwrap();

    assert_eq!(fetched.original_name, "a.srt");
    assert_eq!(fetched.file_type, FileType::Subtitle);
    assert_eq!(fetched.file_hash, record.file_hash);
    assert_eq!(fetched.stored_path, record.stored_path);
}

#[tokio::test]
async fn given_shared_path_when_counting_then_refcount_matches() {
    let store = memory_store().await;
    let a = upload_record("a.srt", "ab", "/tmp/u/shared.srt", 3600);
    let b = upload_record("b.srt", "ab", "/tmp/u/shared.srt", 3600);
    store.insert_upload(&a).await.unwrap();
    store.insert_upload(&b).await.unwrap();

    assert_eq!(
        store.count_uploads_at_path(&a.stored_path).await.unwrap(),
        2
    );
    store.delete_upload(&a.file_id).await.unwrap();
    assert_eq!(
        store.count_uploads_at_path(&a.stored_path).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn given_expired_and_live_uploads_when_listing_expired_then_only_expired() {
    let store = memory_store().await;
    let live = upload_record("live.srt", "ab", "/tmp/u/live.srt", 3600);
    let expired = upload_record("old.srt", "cd", "/tmp/u/old.srt", -10);
    store.insert_upload(&live).await.unwrap();
    store.insert_upload(&expired).await.unwrap();

    let listed = store.list_expired_uploads(Utc::now()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_id, expired.file_id);

    // The hash lookup only ever returns live records.
    assert!(store
        .find_live_upload_by_hash(&expired.file_hash, Utc::now())
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_live_upload_by_hash(&live.file_hash, Utc::now())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn given_new_key_when_get_or_create_then_pending_entry_and_job() {
    let store = memory_store().await;

    let outcome = store
        .get_or_create(&key('a'), SourceType::Url, "https://example.com/v", None, "v1", false)
        .await
        .unwrap();

    let GetOrCreateOutcome::Enqueue { entry, job } = outcome else {
        panic!("expected enqueue");
    };
    assert_eq!(entry.status, EntryStatus::Pending);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.cache_key, entry.cache_key);

    // The job is the newest one for the key.
    let latest = store.latest_job_for(&key('a')).await.unwrap().unwrap();
    assert_eq!(latest.job_id, job.job_id);
}

#[tokio::test]
async fn given_completed_entry_when_refreshed_then_fields_cleared_and_new_job() {
    let store = memory_store().await;
    let cache_key = key('b');

    let GetOrCreateOutcome::Enqueue { job: first, .. } = store
        .get_or_create(&cache_key, SourceType::Url, "ref", None, "v1", false)
        .await
        .unwrap()
    else {
        panic!("expected enqueue");
    };

    store
        .update_entry(
            &cache_key,
            EntryUpdate {
                status: Some(EntryStatus::Completed),
                summary_text: Some("old summary".to_string()),
                bundle_path: Some("/tmp/bundle".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .update_job(&first.job_id, JobStatus::Completed, None)
        .await
        .unwrap();

    let GetOrCreateOutcome::Enqueue { entry, job } = store
        .get_or_create(&cache_key, SourceType::Url, "ref", None, "v1", true)
        .await
        .unwrap()
    else {
        panic!("refresh must enqueue");
    };

    assert_ne!(job.job_id, first.job_id);
    assert_eq!(entry.status, EntryStatus::Pending);
    assert!(entry.summary_text.is_none());
    assert!(entry.bundle_path.is_none());

    let row = store.get_entry(&cache_key).await.unwrap().unwrap();
    assert!(row.summary_text.is_none());
    assert!(row.bundle_path.is_none());
}

#[tokio::test]
async fn given_completed_status_update_then_stale_error_is_cleared() {
    let store = memory_store().await;
    let cache_key = key('c');

    store
        .get_or_create(&cache_key, SourceType::Url, "ref", None, "v1", false)
        .await
        .unwrap();
    store
        .update_entry(
            &cache_key,
            EntryUpdate {
                status: Some(EntryStatus::Failed),
                error: Some("upstream: boom".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store
        .update_entry(
            &cache_key,
            EntryUpdate {
                status: Some(EntryStatus::Completed),
                summary_text: Some("fine now".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entry = store.get_entry(&cache_key).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert!(entry.error.is_none());
}

#[tokio::test]
async fn given_entry_when_deleted_then_jobs_cascade() {
    let store = memory_store().await;
    let cache_key = key('d');

    let GetOrCreateOutcome::Enqueue { job, .. } = store
        .get_or_create(&cache_key, SourceType::Url, "ref", None, "v1", false)
        .await
        .unwrap()
    else {
        panic!("expected enqueue");
    };

    assert!(store.delete_entry(&cache_key).await.unwrap());
    assert!(store.get_entry(&cache_key).await.unwrap().is_none());
    assert!(store.get_job(&job.job_id).await.unwrap().is_none());
    assert!(!store.delete_entry(&cache_key).await.unwrap());
}

#[tokio::test]
async fn given_non_terminal_jobs_when_swept_then_all_marked_interrupted() {
    let store = memory_store().await;

    let GetOrCreateOutcome::Enqueue { job: pending, .. } = store
        .get_or_create(&key('e'), SourceType::Url, "ref-e", None, "v1", false)
        .await
        .unwrap()
    else {
        panic!("expected enqueue");
    };
    let GetOrCreateOutcome::Enqueue { job: running, .. } = store
        .get_or_create(&key('f'), SourceType::Url, "ref-f", None, "v1", false)
        .await
        .unwrap()
    else {
        panic!("expected enqueue");
    };
    store
        .update_job(&running.job_id, JobStatus::Running, None)
        .await
        .unwrap();

    let swept = store.sweep_interrupted().await.unwrap();
    assert_eq!(swept.len(), 2);

    for job_id in [&pending.job_id, &running.job_id] {
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("interrupted"));
    }

    // A second sweep finds nothing.
    assert!(store.sweep_interrupted().await.unwrap().is_empty());
}

#[tokio::test]
async fn given_touched_entries_when_listing_stale_then_ordered_by_idleness() {
    let store = memory_store().await;

    store
        .get_or_create(&key('1'), SourceType::Url, "ref-1", None, "v1", false)
        .await
        .unwrap();
    store
        .get_or_create(&key('2'), SourceType::Url, "ref-2", None, "v1", false)
        .await
        .unwrap();
    store.touch_entry(&key('2')).await.unwrap();

    // Everything is stale relative to a future cutoff; least recently
    // accessed first.
    let cutoff = Utc::now() + Duration::seconds(60);
    let stale = store.list_stale_entries(cutoff, None).await.unwrap();
    assert_eq!(stale.len(), 2);
    assert_eq!(stale[0].cache_key, key('1'));

    // A past cutoff excludes both.
    let cutoff = Utc::now() - Duration::seconds(60);
    assert!(store.list_stale_entries(cutoff, None).await.unwrap().is_empty());

    let lru = store.list_entries_by_lru().await.unwrap();
    assert_eq!(lru.len(), 2);
    assert_eq!(lru[0].cache_key, key('1'));
}
