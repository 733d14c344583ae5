use std::time::Duration;

use cortex_agent::{
    AgentMessage, AgentRunRequest, ClientConfig, CortexAgentClient, RunOutcome, RunSummary,
    StreamChunk,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_PATH: &str = "/api/v2/databases/DB/schemas/SCH/agents/AGENT:run";
const THREADS_PATH: &str = "/api/v2/cortex/threads";

fn client(server: &MockServer) -> CortexAgentClient {
    CortexAgentClient::new(ClientConfig::new(&server.uri(), "secret-token")).unwrap()
}

fn request(text: &str) -> AgentRunRequest {
    AgentRunRequest::new("DB", "SCH", "AGENT", vec![AgentMessage::user(text)])
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

const HAPPY_STREAM: &str = "event: response.status\n\
data: {\"message\":\"Planning\"}\n\n\
event: response.text.delta\n\
data: {\"text\":\"Hi\"}\n\n\
event: response.text.delta\n\
data: {\"text\":\" there\"}\n\n\
event: response\n\
data: {\"content\":[{\"type\":\"text\",\"text\":\"Hi there\"}]}\n\n";

async fn collect(client: &CortexAgentClient, req: AgentRunRequest, events: bool) -> Vec<StreamChunk> {
    client.run_agent_stream(req, events).collect().await
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_thread_sends_bearer_and_origin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(THREADS_PATH))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({"origin_application": "my_app"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"thread_id": 12345})))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server).create_thread("my_app").await;
    assert_eq!(id.as_deref(), Some("12345"));
}

#[tokio::test]
async fn list_threads_accepts_both_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(THREADS_PATH))
        .and(query_param("limit", "5"))
        .and(query_param("origin_application", "my_app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "threads": [{"thread_id": "a", "created_on": 1700000000000_i64}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(THREADS_PATH))
        .and(query_param("limit", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"thread_id": 1}, {"thread_id": 2}])),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let wrapped = client.list_threads(5, Some("my_app")).await;
    assert_eq!(wrapped.len(), 1);
    assert_eq!(wrapped[0].thread_id, "a");
    assert_eq!(wrapped[0].created_on, Some(1_700_000_000_000));

    let bare = client.list_threads(2, None).await;
    let ids: Vec<_> = bare.iter().map(|t| t.thread_id.as_str()).collect();
    assert_eq!(ids, ["1", "2"]);
}

#[tokio::test]
async fn describe_thread_passes_paging_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{THREADS_PATH}/t1")))
        .and(query_param("page_size", "1"))
        .and(query_param("last_message_id", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"thread_id": "t1"},
            "messages": [{"message_id": 39, "role": "assistant", "message_payload": "x"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let desc = client(&server).describe_thread("t1", 1, Some(40)).await.unwrap();
    assert_eq!(desc.latest_message_id(), Some("39"));
}

#[tokio::test]
async fn describe_thread_with_null_messages_is_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{THREADS_PATH}/t1")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"metadata": {"thread_id": "t1"}, "messages": null})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let desc = client.describe_thread("t1", 20, None).await.unwrap();
    assert!(desc.messages.is_empty());
    assert_eq!(desc.metadata.unwrap().thread_id, "t1");
    assert_eq!(client.last_error(), None);
}

#[tokio::test]
async fn delete_thread_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{THREADS_PATH}/t1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert!(client(&server).delete_thread("t1").await);
}

#[tokio::test]
async fn thread_failures_are_swallowed_and_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thread"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(!client.delete_thread("missing").await);
    assert_eq!(client.last_error().as_deref(), Some("HTTP 404: no such thread"));

    assert!(client.describe_thread("t1", 20, None).await.is_none());
    assert!(client.list_threads(10, None).await.is_empty());
    assert_eq!(client.last_error().as_deref(), Some("HTTP 500: boom"));
}

// ---------------------------------------------------------------------------
// Streaming runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_yields_deltas_then_final() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse(HAPPY_STREAM))
        .mount(&server)
        .await;

    let chunks = collect(&client(&server), request("hello"), false).await;
    assert_eq!(
        chunks,
        vec![
            StreamChunk::Content { content: "Hi".into() },
            StreamChunk::Content { content: " there".into() },
            StreamChunk::Final { content: "Hi there".into() },
        ]
    );
}

#[tokio::test]
async fn stream_events_precede_their_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(HAPPY_STREAM))
        .mount(&server)
        .await;

    let chunks = collect(&client(&server), request("hello"), true).await;
    let kinds: Vec<&str> = chunks
        .iter()
        .map(|c| match c {
            StreamChunk::Event { .. } => "event",
            StreamChunk::Content { .. } => "content",
            StreamChunk::Final { .. } => "final",
            StreamChunk::Error { .. } => "error",
        })
        .collect();
    assert_eq!(
        kinds,
        ["event", "event", "content", "event", "content", "event", "final"]
    );
    match &chunks[0] {
        StreamChunk::Event { event } => {
            assert_eq!(event.name(), Some("response.status"));
            assert_eq!(event.status_message(), Some("Planning"));
        }
        other => panic!("expected event, got {other:?}"),
    }
}

#[tokio::test]
async fn non_200_yields_exactly_one_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let client = client(&server);
    let chunks = collect(&client, request("hello"), true).await;
    assert_eq!(
        chunks,
        vec![StreamChunk::Error { error: "HTTP 503: Service Unavailable".into() }]
    );
    assert_eq!(client.last_error().as_deref(), Some("HTTP 503: Service Unavailable"));
}

#[tokio::test]
async fn truncated_stream_ends_without_final() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(
            "event: response.text.delta\ndata: {\"text\":\"Hi\"}\n\n\
             event: response.text.delta\ndata: {\"text\":\" th\"}",
        ))
        .mount(&server)
        .await;

    let summary = RunSummary::collect(client(&server).run_agent_stream(request("hello"), false)).await;
    assert_eq!(summary.outcome(), RunOutcome::Partial);
    assert_eq!(summary.streamed, "Hi th");
    assert!(summary.final_text.is_none());
}

#[tokio::test]
async fn unreachable_host_yields_error_chunk() {
    let client = CortexAgentClient::new(ClientConfig::new("http://127.0.0.1:1", "tok")).unwrap();
    let chunks = collect(&client, request("hello"), false).await;
    assert_eq!(chunks.len(), 1);
    assert!(matches!(&chunks[0], StreamChunk::Error { .. }));
    assert!(client.last_error().is_some());
}

#[tokio::test]
async fn slow_stream_yields_single_read_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(HAPPY_STREAM).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = ClientConfig::new(&server.uri(), "tok")
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
    let client = CortexAgentClient::new(config).unwrap();
    let chunks = collect(&client, request("hello"), true).await;
    assert_eq!(chunks.len(), 1, "got {chunks:?}");
    match &chunks[0] {
        StreamChunk::Error { error } => assert!(error.starts_with("Stream read timeout"), "{error}"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn dropping_a_started_stream_leaves_client_usable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(HAPPY_STREAM))
        .mount(&server)
        .await;

    let client = client(&server);
    {
        let stream = client.run_agent_stream(request("first"), false);
        futures_util::pin_mut!(stream);
        let first = stream.next().await;
        assert_eq!(first, Some(StreamChunk::Content { content: "Hi".into() }));
    }

    let chunks = collect(&client, request("second"), false).await;
    assert_eq!(
        chunks.last(),
        Some(&StreamChunk::Final { content: "Hi there".into() })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(HAPPY_STREAM))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    let stream = client.run_agent_stream(request("hello"), false);
    drop(stream);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn continued_thread_payload_carries_ids_and_newest_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(HAPPY_STREAM))
        .mount(&server)
        .await;

    let req = request("second question").in_thread(Some("t7".into()), Some("42".into()));
    collect(&client(&server), req, false).await;

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["thread_id"], "t7");
    assert_eq!(body["parent_message_id"], "42");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["content"][0]["text"], "second question");
}

// ---------------------------------------------------------------------------
// Buffered runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn buffered_run_concatenates_all_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .respond_with(sse(HAPPY_STREAM))
        .mount(&server)
        .await;

    let result = client(&server).run_agent(&request("hello"), true).await;
    assert!(result.is_success());
    // deltas plus the terminal response, in block order
    assert_eq!(result.response, "Hi thereHi there");
    assert_eq!(result.events.len(), 4);
}

#[tokio::test]
async fn json_run_extracts_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RUN_PATH))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "role": "assistant",
            "content": [{"type": "text", "text": "42"}]
        })))
        .mount(&server)
        .await;

    let result = client(&server).run_agent(&request("answer?"), false).await;
    assert!(result.is_success());
    assert_eq!(result.response, "42");
    assert!(result.json.is_some());
}

#[tokio::test]
async fn buffered_run_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let client = client(&server);
    let result = client.run_agent(&request("hello"), true).await;
    assert!(!result.is_success());
    assert_eq!(result.error.as_deref(), Some("HTTP 401: bad token"));
    assert_eq!(client.last_error().as_deref(), Some("HTTP 401: bad token"));
}
