use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;

use uploadstream_metadata::{
    FileId, FileRecord, JobCompletion, JobStatus, MemoryMetadataStore, MetadataStore, ThumbnailKeys,
};

fn text_file(owner: &str, name: &str) -> FileRecord {
    FileRecord::new(FileId::new(), owner, name, "text/plain", 23)
}

/// C1. Each Eligible Job Is Claimed Exactly Once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claimants_never_share_a_job() {
    let store = Arc::new(MemoryMetadataStore::new());

    // Arrange: 50 pending jobs
    let mut created = HashSet::new();
    for _ in 0..50 {
        created.insert(store.create_job(&FileId::new()).await.unwrap());
    }

    // Act: 8 claimants drain the pool concurrently
    let claimants = (0..8).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut mine = Vec::new();
            while let Some(job) = store.claim_next_job().await.unwrap() {
                mine.push(job.id);
                tokio::task::yield_now().await;
            }
            mine
        })
    });
    let results = join_all(claimants).await;

    // Assert: every job claimed once, no duplicates
    let mut seen = HashSet::new();
    for result in results {
        for job_id in result.unwrap() {
            assert!(seen.insert(job_id), "job {job_id} claimed twice");
        }
    }
    assert_eq!(seen, created);
}

/// C2. Claim Order Is Oldest First
#[tokio::test]
async fn test_claim_order_is_oldest_first() {
    let store = MemoryMetadataStore::new();

    let first = store.create_job(&FileId::new()).await.unwrap();
    let second = store.create_job(&FileId::new()).await.unwrap();

    assert_eq!(store.claim_next_job().await.unwrap().unwrap().id, first);
    assert_eq!(store.claim_next_job().await.unwrap().unwrap().id, second);
    assert!(store.claim_next_job().await.unwrap().is_none());
}

/// C3. Listing Is Newest First And Owner Scoped
#[tokio::test]
async fn test_list_is_newest_first_and_owner_scoped() {
    let store = MemoryMetadataStore::new();
    let now = Utc::now();

    let old = text_file("alice", "old.txt");
    let new = text_file("alice", "new.txt");
    let other = text_file("bob", "bob.txt");
    for f in [&old, &new, &other] {
        store.save_file(f).await.unwrap();
    }
    store.set_uploaded_at(&old.id, now - Duration::hours(2));
    store.set_uploaded_at(&new.id, now - Duration::hours(1));

    let page = store.list_files("alice", 10, 0).await.unwrap();
    let names: Vec<_> = page.iter().map(|f| f.display_name.as_str()).collect();
    assert_eq!(names, vec!["new.txt", "old.txt"]);

    let window = store.list_files("alice", 1, 1).await.unwrap();
    assert_eq!(window[0].id, old.id);
}

/// C4. Completion Records Artifacts
#[tokio::test]
async fn test_completion_records_artifacts() {
    let store = MemoryMetadataStore::new();
    let file = FileRecord::new(FileId::new(), "alice", "cat.png", "image/png", 100);
    store.save_file(&file).await.unwrap();
    let job_id = store.create_job(&file.id).await.unwrap();
    store.claim_next_job().await.unwrap().unwrap();

    let completion = JobCompletion {
        thumbnails: ThumbnailKeys {
            small: Some(format!("{}-thumb-small", file.id)),
            medium: Some(format!("{}-thumb-medium", file.id)),
            large: Some(format!("{}-thumb-large", file.id)),
        },
        original_width: Some(1024),
        original_height: Some(768),
    };
    store.complete_job(job_id, &completion).await.unwrap();

    let job = store.get_job_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.thumbnails, completion.thumbnails);
    assert_eq!(job.original_width, Some(1024));
    assert!(job.completed_at.is_some());
}

/// C5. Status Updates Keep Messages
#[tokio::test]
async fn test_update_status_records_message() {
    let store = MemoryMetadataStore::new();
    let job_id = store.create_job(&FileId::new()).await.unwrap();

    store
        .update_job_status(job_id, JobStatus::Failed, Some("File not found"))
        .await
        .unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("File not found"));
    assert!(store.claim_next_job().await.unwrap().is_none());
}
