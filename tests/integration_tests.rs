//! End-to-end tests of the client and chat session against a local mock of
//! the chat completions endpoint.

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use chatting::chat::{ChatConfig, ChatSession, ResponseOutcome};
    use chatting::{
        ChatCompletionRequest, ChatMessage, DeepSeek, KnownModel, Model, RecordingRenderer, Role,
        SpanStyle, StreamEvent,
    };

    const API_KEY: &str = "sk-test";

    fn sse_body(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            let payload = serde_json::json!({
                "id": "cmpl-1",
                "model": "deepseek-chat",
                "choices": [{"index": 0, "delta": {"content": chunk}, "finish_reason": null}],
            });
            body.push_str(&format!("data: {payload}\n\n"));
        }
        body.push_str(": keep-alive\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn client(server: &mockito::Server) -> DeepSeek {
        DeepSeek::with_options(API_KEY, Some(server.url().as_str()), None)
            .expect("client should build")
    }

    fn request(text: &str) -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            Model::Known(KnownModel::DeepseekChat),
            vec![ChatMessage {
                role: Role::User,
                content: text.to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn streams_events_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "deepseek-chat",
                "stream": true,
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Hel", "lo"]))
            .create_async()
            .await;

        let mut stream = client(&server).stream(request("hi")).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hel".to_string()),
                StreamEvent::Text("lo".to_string()),
                StreamEvent::Done,
            ]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn session_renders_and_records_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["He", "llo, **wor", "ld**!"]))
            .create_async()
            .await;

        let mut session = ChatSession::new(client(&server), ChatConfig::new());
        let mut renderer = RecordingRenderer::new();
        let outcome = session.send_streaming("hi", &mut renderer).await.unwrap();

        assert_eq!(outcome, ResponseOutcome::Completed);
        assert_eq!(renderer.text(), "Hello, **world**!");
        assert!(
            renderer
                .spans
                .iter()
                .any(|s| s.style == SpanStyle::Bold && s.text == "**world**")
        );
        assert_eq!(session.turn_count(), 1);
        assert_eq!(
            session.transcript().turns()[1].content,
            "Hello, **world**!"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#,
            )
            .create_async()
            .await;

        let mut session = ChatSession::new(client(&server), ChatConfig::new());
        let mut renderer = RecordingRenderer::new();
        let err = session
            .send_streaming("hi", &mut renderer)
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert!(err.to_string().contains("Authentication Fails"));
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body("slow down")
            .create_async()
            .await;

        let err = client(&server).stream(request("hi")).await.err().unwrap();
        assert!(err.is_rate_limit());
        assert_eq!(err.status_code(), Some(429));
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client(&server).stream(request("hi")).await.err().unwrap();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn truncated_stream_keeps_partial_reply() {
        let mut server = mockito::Server::new_async().await;
        let body = sse_body(&["partial"]).replace("data: [DONE]\n\n", "");
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let mut session = ChatSession::new(client(&server), ChatConfig::new());
        let mut renderer = RecordingRenderer::new();
        let err = session
            .send_streaming("hi", &mut renderer)
            .await
            .unwrap_err();

        assert!(err.is_streaming());
        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[1].content.starts_with("partial\n\n[response incomplete:"));
    }
}
