//! `PgStore` against a live PostgreSQL, configured through the `DB_*` variables.
//!
//! Run with `cargo test -p colmeia-api --features db-tests`.
#![cfg(feature = "db-tests")]

use colmeia_api::{DbConfig, PgStore};
use colmeia_core::{MemberRole, StorageError};
use colmeia_storage::RelationalStore;
use uuid::Uuid;

async fn store() -> PgStore {
    let store = PgStore::from_config(&DbConfig::from_env()).expect("pool");
    store.apply_migrations().await.expect("migrations");
    store
}

/// A user with a unique uid and email, so runs do not collide.
async fn user(store: &PgStore, name: &str) -> (String, String) {
    let tag = Uuid::new_v4().simple().to_string();
    let uid = format!("uid-{}", tag);
    let email = format!("{}-{}@colmeia.test", name, tag);
    store.user_insert(&uid, &email, name).await.expect("user insert");
    (uid, email)
}

#[tokio::test]
async fn ping_and_user_lifecycle() {
    let store = store().await;
    store.ping().await.expect("ping");

    let (uid, email) = user(&store, "ana").await;
    let fetched = store.user_get(&uid).await.unwrap().expect("user");
    assert_eq!(fetched.email, email);
    assert_eq!(
        store.user_get_by_email(&email).await.unwrap().unwrap().firebase_uid,
        uid
    );

    assert!(!store.user_ensure(&uid, &email, "ana").await.unwrap());
    assert!(store.user_update_display_name(&uid, "Ana B").await.unwrap());
    assert_eq!(store.user_get(&uid).await.unwrap().unwrap().display_name, "Ana B");

    let err = store.user_insert(&uid, &email, "ana").await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    assert!(store.user_delete(&uid).await.unwrap());
    assert!(store.user_get(&uid).await.unwrap().is_none());
}

#[tokio::test]
async fn private_workspace_is_unique_per_owner() {
    let store = store().await;
    let (uid, _) = user(&store, "bia").await;

    let ws = store.workspace_create_private(&uid).await.unwrap();
    assert!(!ws.is_public);
    assert_eq!(ws.members, 1);

    let err = store.workspace_create_private(&uid).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    assert!(store.workspace_delete_owned(ws.id, &uid).await.unwrap());
    store.user_delete(&uid).await.unwrap();
}

#[tokio::test]
async fn membership_rules() {
    let store = store().await;
    let (owner, _) = user(&store, "owner").await;
    let (guest, guest_email) = user(&store, "guest").await;

    let ws = store
        .workspace_create_public(&owner, "Launch", "rockets")
        .await
        .unwrap();
    assert!(store.member_is(&owner, ws.id).await.unwrap());
    assert!(!store.member_is(&guest, ws.id).await.unwrap());

    store
        .member_add(ws.id, &guest_email, MemberRole::Admin)
        .await
        .unwrap();
    let err = store
        .member_add(ws.id, &guest_email, MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyMember { .. }));

    let err = store
        .member_add(ws.id, "nobody@colmeia.test", MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UserNotFound { .. }));

    let members = store.member_list(ws.id).await.unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(store.workspace_get(ws.id).await.unwrap().unwrap().members, 2);

    assert!(store.member_remove(ws.id, &guest).await.unwrap());
    assert!(!store.member_remove(ws.id, &guest).await.unwrap());

    assert!(!store.workspace_delete_owned(ws.id, &guest).await.unwrap());
    assert!(store.workspace_delete_owned(ws.id, &owner).await.unwrap());
    assert!(store.workspace_get(ws.id).await.unwrap().is_none());

    store.user_delete(&owner).await.unwrap();
    store.user_delete(&guest).await.unwrap();
}

#[tokio::test]
async fn task_stubs_follow_the_workspace() {
    let store = store().await;
    let (owner, _) = user(&store, "tasker").await;
    let internal_id = store.user_internal_id(&owner).await.unwrap().expect("id");
    let ws = store.workspace_create_public(&owner, "Tasks", "").await.unwrap();

    let doc_id = Uuid::new_v4().to_string();
    store.task_stub_insert(&doc_id, ws.id, internal_id).await.unwrap();
    assert_eq!(store.task_stub_touch(&doc_id, ws.id).await.unwrap(), 1);

    let stubs = store.task_stub_list(ws.id).await.unwrap();
    assert_eq!(stubs.len(), 1);
    assert_eq!(stubs[0].firestore_doc_id, doc_id);
    assert_eq!(stubs[0].created_by, Some(internal_id));

    assert_eq!(store.task_stub_delete(&doc_id, ws.id).await.unwrap(), 1);
    assert_eq!(store.task_stub_delete(&doc_id, ws.id).await.unwrap(), 0);

    store.workspace_delete_owned(ws.id, &owner).await.unwrap();
    store.user_delete(&owner).await.unwrap();
}

#[tokio::test]
async fn workspace_ids_page_walks_in_order() {
    let store = store().await;
    let (owner, _) = user(&store, "pager").await;
    let a = store.workspace_create_public(&owner, "A", "").await.unwrap();
    let b = store.workspace_create_public(&owner, "B", "").await.unwrap();

    let page = store.workspace_ids_page(a.id - 1, 1).await.unwrap();
    assert_eq!(page, vec![a.id]);
    let rest = store.workspace_ids_page(a.id, 1000).await.unwrap();
    assert!(rest.contains(&b.id));
    assert!(rest.iter().all(|id| *id > a.id));
    assert_eq!(store.workspace_owned_count(&owner).await.unwrap(), 2);

    store.workspace_delete_owned(a.id, &owner).await.unwrap();
    store.workspace_delete_owned(b.id, &owner).await.unwrap();
    store.user_delete(&owner).await.unwrap();
}
