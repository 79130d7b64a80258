//! Start-up checks of the `chatting` binary.

#[cfg(test)]
mod tests {
    use std::process::Stdio;

    use tokio::process::Command;

    #[tokio::test]
    async fn missing_api_key_exits_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();

        let output = Command::new(env!("CARGO_BIN_EXE_chatting"))
            .current_dir(dir.path())
            .env_remove("DEEPSEEK_API_KEY")
            .env("API_BASE", server.url())
            .stdin(Stdio::null())
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("DEEPSEEK_API_KEY"), "stderr: {stderr}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unexpected_arguments_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let output = Command::new(env!("CARGO_BIN_EXE_chatting"))
            .current_dir(dir.path())
            .env("DEEPSEEK_API_KEY", "sk-test")
            .arg("stray")
            .stdin(Stdio::null())
            .output()
            .await
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
    }
}
