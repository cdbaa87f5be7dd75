//! Sent file cache tests.

mod common;

use common::run_store_test_both;
use sessionvault_core::{FileKind, FileReference};
use sessionvault_store::StoreError;

const DIGEST: [u8; 16] = [0xab; 16];

#[tokio::test]
async fn test_cached_file_is_found_by_key() {
    run_store_test_both(|store| async move {
        let reference = FileReference::photo(11, 22);
        store.cache_file("s", &DIGEST, 1024, &reference).await.unwrap();

        let found = store
            .get_file("s", &DIGEST, 1024, FileKind::Photo)
            .await
            .unwrap();
        assert_eq!(found, Some(reference));

        // Size is part of the key.
        assert!(
            store
                .get_file("s", &DIGEST, 1025, FileKind::Photo)
                .await
                .unwrap()
                .is_none()
        );
    })
    .await;
}

#[tokio::test]
async fn test_kind_is_part_of_the_key() {
    run_store_test_both(|store| async move {
        store
            .cache_file("s", &DIGEST, 10, &FileReference::document(1, 1))
            .await
            .unwrap();
        store
            .cache_file("s", &DIGEST, 10, &FileReference::photo(2, 2))
            .await
            .unwrap();

        assert_eq!(
            store.get_file("s", &DIGEST, 10, FileKind::Document).await.unwrap(),
            Some(FileReference::document(1, 1))
        );
        assert_eq!(
            store.get_file("s", &DIGEST, 10, FileKind::Photo).await.unwrap(),
            Some(FileReference::photo(2, 2))
        );
        assert_eq!(store.list_files("s").await.unwrap().len(), 2);
    })
    .await;
}

#[tokio::test]
async fn test_recaching_overwrites_reference() {
    run_store_test_both(|store| async move {
        store
            .cache_file("s", &DIGEST, 10, &FileReference::document(1, 1))
            .await
            .unwrap();
        store
            .cache_file("s", &DIGEST, 10, &FileReference::document(5, 6))
            .await
            .unwrap();

        let files = store.list_files("s").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].reference().unwrap(), FileReference::document(5, 6));
    })
    .await;
}

#[tokio::test]
async fn test_unknown_type_code_is_rejected_without_writing() {
    run_store_test_both(|store| async move {
        let err = store
            .cache_file_raw("s", &DIGEST, 10, 7, 1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        assert!(store.list_files("s").await.unwrap().is_empty());

        store
            .cache_file_raw("s", &DIGEST, 10, FileKind::Photo.code(), 3, 4)
            .await
            .unwrap();
        assert_eq!(
            store.get_file("s", &DIGEST, 10, FileKind::Photo).await.unwrap(),
            Some(FileReference::photo(3, 4))
        );
    })
    .await;
}

#[tokio::test]
async fn test_files_are_scoped_to_session() {
    run_store_test_both(|store| async move {
        store
            .cache_file("a", &DIGEST, 10, &FileReference::document(1, 1))
            .await
            .unwrap();
        assert!(
            store
                .get_file("b", &DIGEST, 10, FileKind::Document)
                .await
                .unwrap()
                .is_none()
        );
    })
    .await;
}
