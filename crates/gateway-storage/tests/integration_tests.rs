use gateway_core::{CapabilityKind, Message, Role};
use gateway_storage::Database;

#[tokio::test]
async fn config_store_and_session_store_share_one_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.sqlite3");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();

    db.config_store
        .set_system_default(CapabilityKind::Llm, "openai".into())
        .await
        .unwrap();

    let session = db
        .session_store
        .create_session("device-1".into(), Some("user-1".into()))
        .await
        .unwrap();
    db.session_store
        .append_message(Message::new(session.session_id, Role::User, "hi"))
        .await
        .unwrap();

    // Reopen against the same file and confirm both tables persisted.
    drop(db);
    let db2 = Database::open(path.to_str().unwrap()).await.unwrap();
    assert_eq!(
        db2.config_store
            .get_system_default(CapabilityKind::Llm)
            .await
            .unwrap(),
        Some("openai".to_string())
    );
    let dialogue = db2.session_store.dialogue(session.session_id).await.unwrap();
    assert_eq!(dialogue.len(), 1);
}
