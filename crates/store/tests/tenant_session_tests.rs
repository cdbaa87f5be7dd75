//! Tests for the session-scoped client handle.

mod common;

use common::run_store_test_both;
use sessionvault_core::{AuthKey, EntityRef, FileKind, FileReference, PeerEntry, UpdateCursor};
use sessionvault_store::{ClientSession, TenantSession};

#[tokio::test]
async fn test_open_creates_record_with_defaults() {
    run_store_test_both(|store| async move {
        let session = TenantSession::open(store.clone(), "fresh").await.unwrap();
        assert_eq!(session.session_name(), "fresh");
        assert_eq!(session.dc_id(), 0);
        assert!(session.server_address().is_none());
        assert!(session.auth_key().is_none());
        assert!(session.takeout_id().is_none());
        assert!(store.session_exists("fresh").await.unwrap());
    })
    .await;
}

#[tokio::test]
async fn test_state_survives_reopen() {
    run_store_test_both(|store| async move {
        let key = AuthKey::from_bytes(vec![9u8; 256]);
        {
            let mut session = TenantSession::open(store.clone(), "persist").await.unwrap();
            session.set_auth_key(Some(key.clone())).await.unwrap();
            session
                .set_dc(2, Some("149.154.167.51".to_string()), Some(443))
                .await
                .unwrap();
            session.set_takeout_id(Some(77)).await.unwrap();
            session.save().await.unwrap();
        }

        let reopened = TenantSession::open(store, "persist").await.unwrap();
        assert_eq!(reopened.dc_id(), 2);
        assert_eq!(reopened.server_address(), Some("149.154.167.51"));
        assert_eq!(reopened.port(), Some(443));
        assert_eq!(reopened.auth_key(), Some(&key));
        assert_eq!(reopened.takeout_id(), Some(77));
    })
    .await;
}

#[tokio::test]
async fn test_set_dc_reloads_key_from_record() {
    run_store_test_both(|store| async move {
        let mut session = TenantSession::open(store.clone(), "dc").await.unwrap();
        let key = AuthKey::from_bytes(vec![1, 2, 3]);
        store.set_auth_key("dc", Some(&key)).await.unwrap();
        assert!(session.auth_key().is_none());

        session.set_dc(4, None, None).await.unwrap();
        assert_eq!(session.auth_key(), Some(&key));
    })
    .await;
}

#[tokio::test]
async fn test_empty_auth_key_clears_record() {
    run_store_test_both(|store| async move {
        let mut session = TenantSession::open(store.clone(), "clear").await.unwrap();
        session
            .set_auth_key(Some(AuthKey::from_bytes(vec![5; 8])))
            .await
            .unwrap();
        session
            .set_auth_key(Some(AuthKey::from_bytes(Vec::new())))
            .await
            .unwrap();

        assert!(session.auth_key().is_none());
        let row = store.get_session("clear").await.unwrap().unwrap();
        assert!(row.auth_key.is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_entity_processing_honours_flag() {
    run_store_test_both(|store| async move {
        let mut session = TenantSession::open(store.clone(), "ents").await.unwrap();
        session.save_entities = false;
        session
            .process_entities(&[PeerEntry::new(1, 10).with_username("skipped")])
            .await
            .unwrap();
        assert!(store.list_entities("ents").await.unwrap().is_empty());

        session.save_entities = true;
        session
            .process_entities(&[PeerEntry::new(1, 10).with_username("Kept").with_phone("123")])
            .await
            .unwrap();
        let expected = Some(EntityRef { id: 1, hash: 10 });
        assert_eq!(session.get_entity_rows_by_username("kept").await.unwrap(), expected);
        assert_eq!(session.get_entity_rows_by_phone("123").await.unwrap(), expected);
        assert_eq!(session.get_entity_rows_by_id(1, true).await.unwrap(), expected);
    })
    .await;
}

#[tokio::test]
async fn test_delete_removes_everything_for_the_tenant() {
    run_store_test_both(|store| async move {
        let session = TenantSession::open(store.clone(), "gone").await.unwrap();
        session
            .process_entities(&[PeerEntry::new(1, 1), PeerEntry::new(2, 2)])
            .await
            .unwrap();
        session
            .set_update_state(0, &UpdateCursor::new(1, 1, None, 1))
            .await
            .unwrap();
        session
            .cache_file(&[1; 16], 5, &FileReference::document(1, 1))
            .await
            .unwrap();
        let neighbour = TenantSession::open(store.clone(), "stays").await.unwrap();
        neighbour.process_entities(&[PeerEntry::new(1, 1)]).await.unwrap();

        let stats = session.delete().await.unwrap();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.update_states, 1);
        assert_eq!(stats.sent_files, 1);

        assert!(!store.session_exists("gone").await.unwrap());
        assert!(session.get_update_states().await.unwrap().is_empty());
        assert!(
            session
                .get_file(&[1; 16], 5, FileKind::Document)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.list_entities("stays").await.unwrap().len(), 1);
    })
    .await;
}
