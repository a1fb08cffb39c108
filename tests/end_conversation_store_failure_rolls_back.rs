use chatportal_rust::db::{self, ConversationStatus};
use chatportal_rust::lifecycle::{self, LifecycleError};
use chatportal_rust::llm::{MockProvider, Role};

#[test]
fn failed_index_write_leaves_conversation_active_and_retryable() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(temp_dir.path()).expect("open db");
    let provider = MockProvider::new();

    let conv = lifecycle::start_conversation(&conn, None, None).expect("start");
    for text in ["first", "second", "third"] {
        db::insert_message(&conn, &conv.id, Role::User, text, &serde_json::Value::Null)
            .expect("insert");
    }

    conn.execute_batch(
        r#"CREATE TRIGGER fail_second_embedding BEFORE INSERT ON embeddings
           WHEN NEW.excerpt = 'second'
           BEGIN SELECT RAISE(ABORT, 'disk full'); END;"#,
    )
    .expect("create trigger");

    let err = lifecycle::end_conversation(&conn, &provider, &conv.id).expect_err("store failure");
    assert!(matches!(err, LifecycleError::Store(_)), "unexpected error: {err:?}");

    let after_failure = db::get_conversation(&conn, &conv.id)
        .expect("get")
        .expect("exists");
    assert_eq!(after_failure.status, ConversationStatus::Active);
    assert_eq!(after_failure.end_time_ms, None);
    assert_eq!(after_failure.summary, None);
    assert_eq!(db::count_embeddings(&conn, &conv.id).expect("count"), 0);

    conn.execute_batch("DROP TRIGGER fail_second_embedding;")
        .expect("drop trigger");

    let ended = lifecycle::end_conversation(&conn, &provider, &conv.id).expect("retry");
    assert_eq!(ended.conversation.status, ConversationStatus::Ended);
    assert_eq!(ended.embeddings_indexed, 3);
    assert_eq!(db::count_embeddings(&conn, &conv.id).expect("count"), 3);
}
