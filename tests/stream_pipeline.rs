//! End-to-end tests for the client against a canned HTTP responder
//!
//! A one-shot TCP listener stands in for the Ollama server so the suite
//! runs without a live model host.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ollama_client::{
    ChatRequest, DeleteModelRequest, GenerateRequest, Message, OllamaClient, OllamaError,
    PullModelRequest, StreamOutcome,
};

/// Serve one canned response on a fresh port and return the base URL.
async fn serve_once(status_line: &str, content_type: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body,
    );

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}", addr)
}

/// Serve response headers plus one chunk, then hold the connection open.
async fn serve_stalled(content_type: &str, first_chunk: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\n\r\n{}",
        content_type, first_chunk,
    );

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });

    format!("http://{}", addr)
}

fn generate_request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        model: "llama3.2:latest".to_string(),
        prompt: prompt.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn generate_stream_delivers_ndjson_events_in_order() {
    let body = concat!(
        "{\"response\":\"Why\",\"done\":false}\n",
        "{\"response\":\" not\",\"done\":false}\n",
        "{\"response\":\".\",\"done\":true,\"eval_count\":3}\n",
    );
    let host = serve_once("200 OK", "application/x-ndjson", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("why?"));
    let mut fragments = Vec::new();
    while let Some(event) = stream.recv().await {
        fragments.push(event.response);
    }

    assert_eq!(fragments, vec!["Why", " not", "."]);
    assert!(stream.finish().await.is_success());
}

#[tokio::test]
async fn chat_stream_supports_json_value_framing() {
    let body = concat!(
        r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
        r#"{"message":{"role":"assistant","content":"lo"},"done":true}"#,
    );
    let host = serve_once("200 OK", "application/json", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.chat_stream(ChatRequest {
        model: "llama3.2:latest".to_string(),
        messages: vec![Message::user("hi")],
        ..Default::default()
    });

    let mut contents = Vec::new();
    while let Some(event) = stream.recv().await {
        contents.push(event.message.content);
    }

    assert_eq!(contents, vec!["Hel", "lo"]);
    assert!(stream.finish().await.is_success());
}

#[tokio::test]
async fn stream_without_done_event_completes_normally() {
    let body = "{\"response\":\"partial\",\"done\":false}\n";
    let host = serve_once("200 OK", "application/x-ndjson", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("hi"));
    let mut events = 0;
    while stream.recv().await.is_some() {
        events += 1;
    }

    assert_eq!(events, 1);
    assert!(stream.finish().await.is_success());
}

#[tokio::test]
async fn error_status_yields_api_outcome_and_no_events() {
    let host = serve_once(
        "404 Not Found",
        "application/json",
        r#"{"error":"model not found"}"#,
    )
    .await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("hi"));
    assert!(stream.recv().await.is_none());

    match stream.finish().await {
        StreamOutcome::Failed(OllamaError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "model not found");
        }
        other => panic!("expected api failure, got {:?}", other),
    }
}

#[tokio::test]
async fn unexpected_content_type_fails_the_stream() {
    let host = serve_once("200 OK", "text/html", "<html></html>").await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("hi"));
    assert!(stream.recv().await.is_none());
    assert!(matches!(
        stream.finish().await,
        StreamOutcome::Failed(OllamaError::UnexpectedContentType(_))
    ));
}

#[tokio::test]
async fn malformed_record_aborts_after_delivered_events() {
    let body = "{\"response\":\"ok\",\"done\":false}\nnot json\n";
    let host = serve_once("200 OK", "application/x-ndjson", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("hi"));
    let mut delivered = Vec::new();
    while let Some(event) = stream.recv().await {
        delivered.push(event.response);
    }

    assert_eq!(delivered, vec!["ok"]);
    match stream.finish().await {
        StreamOutcome::Failed(OllamaError::Decode { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected decode failure, got {:?}", other),
    }
}

#[tokio::test]
async fn aborting_mid_stream_yields_cancelled_outcome() {
    let host = serve_stalled(
        "application/x-ndjson",
        "{\"response\":\"first\",\"done\":false}\n",
    )
    .await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.generate_stream(generate_request("hi"));
    let first = stream.recv().await.expect("first event");
    assert_eq!(first.response, "first");

    stream.abort();
    assert!(stream.recv().await.is_none());
    assert!(matches!(stream.finish().await, StreamOutcome::Cancelled));
}

#[tokio::test]
async fn missing_model_never_reaches_the_network() {
    // Nothing is listening on this host; only the validation error can
    // produce an InvalidRequest outcome.
    let client = OllamaClient::with_host("http://127.0.0.1:9").unwrap();

    let mut stream = client.generate_stream(GenerateRequest {
        prompt: "hi".to_string(),
        ..Default::default()
    });

    assert!(stream.recv().await.is_none());
    assert!(matches!(
        stream.finish().await,
        StreamOutcome::Failed(OllamaError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn pull_stream_finishes_on_success_status() {
    let body = concat!(
        "{\"status\":\"pulling manifest\"}\n",
        "{\"status\":\"downloading\",\"digest\":\"sha256:abc\",\"total\":100,\"completed\":50}\n",
        "{\"status\":\"success\"}\n",
    );
    let host = serve_once("200 OK", "application/x-ndjson", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let mut stream = client.pull_model_stream(PullModelRequest {
        name: "llama3.2:latest".to_string(),
        stream: true,
        ..Default::default()
    });

    let mut statuses = Vec::new();
    while let Some(event) = stream.recv().await {
        statuses.push(event.status);
    }

    assert_eq!(statuses, vec!["pulling manifest", "downloading", "success"]);
    assert!(stream.finish().await.is_success());
}

#[tokio::test]
async fn non_streaming_generate_returns_full_response() {
    let body = r#"{"model":"llama3.2:latest","response":"Paris.","done":true,"eval_count":2}"#;
    let host = serve_once("200 OK", "application/json", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let response = client.generate(generate_request("capital of France?")).await.unwrap();

    assert_eq!(response.response, "Paris.");
    assert!(response.done);
    assert_eq!(response.eval_count, Some(2));
}

#[tokio::test]
async fn list_models_parses_tags_response() {
    let body = r#"{"models":[{
        "name": "llama3.2:latest",
        "size": 4683087332,
        "modified_at": "2024-11-04T14:56:49.277302595-07:00",
        "digest": "abc123",
        "details": {"family": "llama"}
    }]}"#;
    let host = serve_once("200 OK", "application/json", body).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let models = client.list_models().await.unwrap().models;

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "llama3.2:latest");
    assert_eq!(models[0].formatted_size(), "4.36 GB");
}

#[tokio::test]
async fn delete_model_returns_status() {
    let host = serve_once("200 OK", "application/json", r#"{"status":"success"}"#).await;
    let client = OllamaClient::with_host(&host).unwrap();

    let status = client
        .delete_model(DeleteModelRequest {
            name: "old-model:latest".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(status.status, "success");
}

#[tokio::test]
async fn non_streaming_error_body_is_extracted() {
    let host = serve_once(
        "500 Internal Server Error",
        "application/json",
        r#"{"error":"out of memory"}"#,
    )
    .await;
    let client = OllamaClient::with_host(&host).unwrap();

    let err = client.generate(generate_request("hi")).await.unwrap_err();

    match err {
        OllamaError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "out of memory");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}
