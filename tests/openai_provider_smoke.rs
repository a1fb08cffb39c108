use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use chatportal_rust::llm::{
    AiProvider, ChatTurn, ConversationContext, OpenAiCompatibleProvider, ProviderError,
    ProviderFlavor, Role, CHAT_FALLBACK_REPLY,
};

/// Serves one response and hands back the request line and body it received.
fn start_one_shot_server(
    status_line: &'static str,
    body: String,
) -> (String, mpsc::Receiver<(String, String)>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("read request line");
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut req_body = vec![0u8; content_length];
        reader.read_exact(&mut req_body).expect("read body");
        tx.send((
            request_line.trim().to_string(),
            String::from_utf8(req_body).expect("utf8 body"),
        ))
        .expect("send request");

        let resp = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.as_bytes().len()
        );
        let mut stream = stream;
        stream.write_all(resp.as_bytes()).expect("write response");
    });

    (format!("http://{}/v1", addr), rx, handle)
}

fn lmstudio(base_url: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(
        ProviderFlavor::LmStudio,
        base_url,
        None,
        "local-model".to_string(),
        Some("local-embed".to_string()),
    )
}

#[test]
fn chat_maps_roles_and_strips_control_tokens() {
    let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"<s>[INST] Hello back [/INST]</s>"}}]}"#;
    let (base_url, rx, handle) = start_one_shot_server("200 OK", body.to_string());
    let provider = lmstudio(base_url);

    let history = vec![
        ChatTurn::new(Role::User, "hi"),
        ChatTurn::new(Role::Ai, "hello"),
    ];
    let reply = provider.chat_response(&history, " how are you? ", &ConversationContext::default());
    handle.join().expect("join server thread");

    assert_eq!(reply, "Hello back");

    let (request_line, req_body) = rx.recv().expect("request");
    assert_eq!(request_line, "POST /v1/chat/completions HTTP/1.1");
    let json: serde_json::Value = serde_json::from_str(&req_body).expect("request json");
    assert_eq!(json["model"], "local-model");
    assert_eq!(json["stream"], false);
    let roles: Vec<&str> = json["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["role"].as_str().expect("role"))
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(json["messages"][2]["content"], "how are you?");
}

#[test]
fn blank_chat_output_becomes_fallback() {
    let body = r#"{"choices":[{"message":{"role":"assistant","content":"  </s> "}}]}"#;
    let (base_url, _rx, handle) = start_one_shot_server("200 OK", body.to_string());
    let provider = lmstudio(base_url);

    let reply = provider.chat_response(&[], "hi", &ConversationContext::default());
    handle.join().expect("join server thread");

    assert_eq!(reply, CHAT_FALLBACK_REPLY);
}

#[test]
fn http_error_carries_status_and_body() {
    let (base_url, _rx, handle) =
        start_one_shot_server("500 Internal Server Error", r#"{"error":"boom"}"#.to_string());
    let provider = lmstudio(base_url);

    let err = provider
        .try_chat_response(&[], "hi", &ConversationContext::default())
        .expect_err("http 500");
    handle.join().expect("join server thread");

    match &err {
        ProviderError::Http { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn embedding_posts_model_and_returns_vector() {
    let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.25,-0.5,1.0]}]}"#;
    let (base_url, rx, handle) = start_one_shot_server("200 OK", body.to_string());
    let provider = lmstudio(base_url);

    let v = provider.get_embedding("some text");
    handle.join().expect("join server thread");

    assert_eq!(v, vec![0.25, -0.5, 1.0]);
    let (request_line, req_body) = rx.recv().expect("request");
    assert_eq!(request_line, "POST /v1/embeddings HTTP/1.1");
    let json: serde_json::Value = serde_json::from_str(&req_body).expect("request json");
    assert_eq!(json["model"], "local-embed");
    assert_eq!(json["input"][0], "some text");
}

#[test]
fn missing_api_key_fails_before_any_request() {
    let provider = OpenAiCompatibleProvider::new(
        ProviderFlavor::OpenAi,
        "http://127.0.0.1:9/v1".to_string(),
        Some("   ".to_string()),
        "gpt-3.5-turbo".to_string(),
        Some("text-embedding-3-small".to_string()),
    );

    let err = provider.try_get_embedding("x").expect_err("no key");
    assert!(matches!(err, ProviderError::NotConfigured(_)));
    assert!(provider.get_embedding("x").is_empty());
}

#[test]
fn openrouter_has_no_embeddings() {
    let provider = OpenAiCompatibleProvider::with_defaults(
        ProviderFlavor::OpenRouter,
        Some("key".to_string()),
    );
    assert_eq!(provider.try_get_embedding("x").expect("no request made"), Vec::<f32>::new());
}
