mod common;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use sha2::{Digest, Sha256};

use common::{memory_store, temp_vault, upload_service, SAMPLE_SRT};
use recapd::application::ports::MetadataStore;
use recapd::application::services::UploadError;
use recapd::domain::FileType;

fn byte_stream(content: &[u8]) -> futures::stream::BoxStream<'static, Result<Bytes, io::Error>> {
    Box::pin(stream::iter(vec![Ok(Bytes::copy_from_slice(content))]))
}

#[tokio::test]
async fn given_valid_srt_when_put_then_record_retrievable_with_matching_hash() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024 * 1024).await;
    let service = upload_service(store.clone(), vault, 1024 * 1024, 3600);

    let record = service
        .put(byte_stream(SAMPLE_SRT.as_bytes()), "sample.srt", None, None)
        .await
        .unwrap();

    assert_eq!(record.file_type, FileType::Subtitle);
    assert_eq!(record.size, SAMPLE_SRT.len() as u64);

    let expected = hex::encode(Sha256::digest(SAMPLE_SRT.as_bytes()));
    assert_eq!(record.file_hash.as_str(), expected);

    // The returned id resolves, and the stored bytes read back exactly.
    let fetched = service.get(&record.file_id).await.unwrap();
    let bytes = tokio::fs::read(&fetched.stored_path).await.unwrap();
    assert_eq!(bytes, SAMPLE_SRT.as_bytes());
}

#[tokio::test]
async fn given_body_one_byte_over_limit_when_put_then_too_large_and_no_partial_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let limit = 64u64;
    let vault = temp_vault(&dir, limit).await;
    let service = upload_service(store.clone(), vault, limit, 3600);

    let body = vec![b'x'; limit as usize + 1];
    let err = service
        .put(byte_stream(&body), "big.mp3", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::TooLarge { .. }));

    // Nothing persisted: the uploads directory has no children.
    let mut entries = tokio::fs::read_dir(dir.path().join("uploads")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn given_declared_size_over_grace_when_put_then_rejected_before_reading() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024).await;
    let service = upload_service(store, vault, 1024, 3600);

    let polled = Arc::new(AtomicBool::new(false));
    let polled_clone = polled.clone();
    let stream = Box::pin(stream::once(async move {
        polled_clone.store(true, Ordering::SeqCst);
        Ok::<Bytes, io::Error>(Bytes::from_static(b"data"))
    }));

    // Declared length exceeds limit + grace (grace is 1024 in the fixture).
    let err = service
        .put(stream, "big.mp3", None, Some(1024 + 1024 + 1))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::TooLarge { .. }));
    assert!(!polled.load(Ordering::SeqCst), "body must not be read");
}

#[tokio::test]
async fn given_identical_content_when_uploaded_twice_then_stored_path_is_shared() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024 * 1024).await;
    let service = upload_service(store.clone(), vault, 1024 * 1024, 3600);

    let first = service
        .put(byte_stream(SAMPLE_SRT.as_bytes()), "one.srt", None, None)
        .await
        .unwrap();
    let second = service
        .put(byte_stream(SAMPLE_SRT.as_bytes()), "two.srt", None, None)
        .await
        .unwrap();

    assert_ne!(first.file_id, second.file_id);
    assert_eq!(first.file_hash, second.file_hash);
    assert_eq!(first.stored_path, second.stored_path);

    // Removing one record keeps the shared content for the other.
    service.remove(&first.file_id).await.unwrap();
    let survivor = service.get(&second.file_id).await.unwrap();
    assert!(tokio::fs::try_exists(&survivor.stored_path).await.unwrap());

    // Removing the last reference unlinks the file.
    service.remove(&second.file_id).await.unwrap();
    assert!(!tokio::fs::try_exists(&survivor.stored_path).await.unwrap());
}

#[tokio::test]
async fn given_expired_record_when_get_then_not_found_and_record_removed() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024 * 1024).await;
    let service = upload_service(store.clone(), vault, 1024 * 1024, 0);

    let record = service
        .put(byte_stream(SAMPLE_SRT.as_bytes()), "sample.srt", None, None)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let err = service.get(&record.file_id).await.unwrap_err();
    assert!(matches!(err, UploadError::NotFound(_)));
    assert!(store.get_upload(&record.file_id).await.unwrap().is_none());
}

#[tokio::test]
async fn given_unknown_extension_when_put_then_unsupported_type() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024).await;
    let service = upload_service(store, vault, 1024, 3600);

    let err = service
        .put(byte_stream(b"data"), "script.exe", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnsupportedType(_)));
}

#[tokio::test]
async fn given_mime_disagreeing_with_extension_when_put_then_unsupported_type() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024).await;
    let service = upload_service(store, vault, 1024, 3600);

    let err = service
        .put(byte_stream(b"data"), "movie.mp4", Some("audio/mpeg"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnsupportedType(_)));

    // The streamed file is unlinked along with the rejection.
    let mut entries = tokio::fs::read_dir(dir.path().join("uploads")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn given_oversized_body_with_wrong_mime_when_put_then_too_large_wins() {
    // The MIME check runs after the final chunk, so the size ceiling is hit
    // first and decides the outcome.
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let limit = 64u64;
    let vault = temp_vault(&dir, limit).await;
    let service = upload_service(store, vault, limit, 3600);

    let body = vec![b'x'; limit as usize + 1];
    let err = service
        .put(byte_stream(&body), "movie.mp4", Some("audio/mpeg"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::TooLarge { .. }));
}

#[tokio::test]
async fn given_empty_body_when_put_then_invalid_argument() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024).await;
    let service = upload_service(store, vault, 1024, 3600);

    let err = service
        .put(byte_stream(b""), "empty.srt", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidArgument(_)));
}

#[tokio::test]
async fn given_expired_records_when_reaped_then_files_and_rows_are_gone() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = memory_store().await;
    let vault = temp_vault(&dir, 1024 * 1024).await;
    let service = upload_service(store.clone(), vault, 1024 * 1024, 0);

    let record = service
        .put(byte_stream(SAMPLE_SRT.as_bytes()), "sample.srt", None, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let reaped = service.reap_expired().await.unwrap();
    assert_eq!(reaped, 1);
    assert!(!tokio::fs::try_exists(&record.stored_path).await.unwrap());
    assert!(store.get_upload(&record.file_id).await.unwrap().is_none());
}
