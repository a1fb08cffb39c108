use chatportal_rust::db::{self, ConversationStatus};
use chatportal_rust::lifecycle;
use chatportal_rust::llm::{MockProvider, Role};

#[test]
fn ending_indexes_one_embedding_per_message() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(temp_dir.path()).expect("open db");
    let provider = MockProvider::new();

    let conv = lifecycle::start_conversation(&conn, None, None).expect("start");
    let user = db::insert_message(&conn, &conv.id, Role::User, "hello", &serde_json::Value::Null)
        .expect("insert user");
    let ai = db::insert_message(&conn, &conv.id, Role::Ai, "hi there", &serde_json::Value::Null)
        .expect("insert ai");

    let ended = lifecycle::end_conversation(&conn, &provider, &conv.id).expect("end");

    assert_eq!(ended.embeddings_indexed, 2);
    assert_eq!(ended.embeddings_empty, 0);
    assert_eq!(ended.summary, "(mock) Summary: hello | hi there");
    assert_eq!(ended.conversation.status, ConversationStatus::Ended);
    assert_eq!(ended.conversation.summary.as_deref(), Some(ended.summary.as_str()));
    assert!(ended.conversation.end_time_ms.is_some());

    let embeddings = db::list_embeddings_for_conversation(&conn, &conv.id).expect("embeddings");
    assert_eq!(embeddings.len(), 2);
    let linked: Vec<Option<&str>> = embeddings.iter().map(|e| e.message_id.as_deref()).collect();
    assert_eq!(linked, vec![Some(user.id.as_str()), Some(ai.id.as_str())]);
    for e in &embeddings {
        assert!(!e.excerpt.is_empty());
        assert!(e.excerpt.chars().count() <= 500);
        assert!(!e.vector.is_empty());
    }
}

#[test]
fn long_messages_are_excerpted_to_five_hundred_chars() {
    let conn = db::open_in_memory().expect("open db");
    let conv = lifecycle::start_conversation(&conn, None, None).expect("start");
    let long = "x".repeat(1200);
    db::insert_message(&conn, &conv.id, Role::User, &long, &serde_json::Value::Null)
        .expect("insert");

    lifecycle::end_conversation(&conn, &MockProvider::new(), &conv.id).expect("end");

    let embeddings = db::list_embeddings_for_conversation(&conn, &conv.id).expect("embeddings");
    assert_eq!(embeddings.len(), 1);
    assert_eq!(embeddings[0].excerpt, "x".repeat(500));
}
