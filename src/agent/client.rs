//! HTTP client for the remote agent service.
//!
//! One attempt per call: no retries, no backoff. Every failure is returned
//! to the caller tagged with the operation it belongs to.

use crate::archive::Archive;
use crate::config::Config;
use crate::error::{ApiError, TransportError};
use crate::session::{FileSet, SessionId};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Reply to a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
    #[serde(default)]
    pub files: FileSet,
}

/// Reply to a successfully applied instruction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstructionReply {
    pub files: FileSet,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, deserialize_with = "text_or_lines")]
    pub logs: String,
}

#[derive(Debug, Serialize)]
struct InstructionRequest<'a> {
    session_id: &'a str,
    prompt: &'a str,
}

// Some agent builds report logs as a list of lines.
fn text_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Logs {
        Text(String),
        Lines(Vec<String>),
        Missing(()),
    }

    Ok(match Logs::deserialize(deserializer)? {
        Logs::Text(text) => text,
        Logs::Lines(lines) => lines.join("\n"),
        Logs::Missing(()) => String::new(),
    })
}

#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds `{base}/{segments...}`, encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> String {
        if let Ok(mut url) = Url::parse(&self.base_url) {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            } else {
                return self.joined(segments);
            }
            return url.to_string();
        }
        self.joined(segments)
    }

    fn joined(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    pub async fn create_session(&self, archive: &Archive) -> Result<CreatedSession, ApiError> {
        let part = Part::bytes(archive.bytes.clone())
            .file_name(archive.file_name.clone())
            .mime_str("application/zip")
            .map_err(|err| ApiError::Upload(err.into()))?;
        let form = Form::new().part("file", part);

        tracing::info!(
            file = %archive.file_name,
            size = %archive.size_label(),
            "uploading project archive"
        );
        let response = self
            .client
            .post(self.endpoint(&["upload"]))
            .multipart(form)
            .send()
            .await
            .map_err(|err| ApiError::Upload(err.into()))?;
        let response = expect_success(response).await.map_err(ApiError::Upload)?;

        let created: CreatedSession = response
            .json()
            .await
            .map_err(|err| ApiError::Upload(decode_error(err)))?;
        tracing::info!(
            session_id = %created.session_id,
            files = created.files.len(),
            "session created"
        );
        Ok(created)
    }

    pub async fn send_instruction(
        &self,
        session_id: &SessionId,
        prompt: &str,
    ) -> Result<InstructionReply, ApiError> {
        let body = InstructionRequest {
            session_id: session_id.as_str(),
            prompt,
        };

        tracing::info!(session_id = %session_id, chars = prompt.len(), "sending instruction");
        let response = self
            .client
            .post(self.endpoint(&["chat"]))
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::Chat(err.into()))?;
        let response = expect_success(response).await.map_err(ApiError::Chat)?;

        let reply: InstructionReply = response
            .json()
            .await
            .map_err(|err| ApiError::Chat(decode_error(err)))?;
        tracing::info!(session_id = %session_id, files = reply.files.len(), "instruction applied");
        Ok(reply)
    }

    /// Session-scoped download location. Pure: no request is made.
    pub fn download_url(&self, session_id: &SessionId) -> String {
        self.endpoint(&["download", session_id.as_str()])
    }

    pub async fn download_archive(&self, session_id: &SessionId) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.download_url(session_id))
            .send()
            .await
            .map_err(|err| ApiError::Download(err.into()))?;
        let response = expect_success(response).await.map_err(ApiError::Download)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Download(err.into()))?;
        Ok(bytes.to_vec())
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.endpoint(&["session", session_id.as_str()]))
            .send()
            .await
            .map_err(|err| ApiError::Delete(err.into()))?;
        expect_success(response).await.map_err(ApiError::Delete)?;
        tracing::debug!(session_id = %session_id, "session deleted");
        Ok(())
    }
}

async fn expect_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "agent service rejected request");
    Err(TransportError::status(status.as_u16(), body))
}

// `Response::json` reports body parse failures as decode errors; keep them
// apart from transport failures even when reqwest classifies them otherwise.
fn decode_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() || err.is_connect() {
        err.into()
    } else {
        TransportError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentClient, CreatedSession, InstructionReply};
    use crate::archive::Archive;
    use crate::config::Config;
    use crate::error::{ApiError, TransportError};
    use crate::session::SessionId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    struct Recorded {
        head: String,
        body: Vec<u8>,
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|window| window == b"\r\n\r\n").map(|at| at + 4)
    }

    fn request_complete(head: &str, body: &[u8]) -> bool {
        let head = head.to_ascii_lowercase();
        if head.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    /// Serves one canned HTTP response and hands back the request it saw.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Recorded>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let base = format!("http://{}", listener.local_addr().expect("addr should resolve"));

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("client should connect");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let recorded = loop {
                let read = stream.read(&mut chunk).await.expect("request should read");
                buf.extend_from_slice(&chunk[..read]);
                if let Some(end) = header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    if read == 0 || request_complete(&head, &buf[end..]) {
                        break Recorded {
                            head,
                            body: buf[end..].to_vec(),
                        };
                    }
                }
                assert!(read > 0, "connection closed before headers");
            };

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .expect("response should write");
            stream.shutdown().await.ok();
            recorded
        });
        (base, handle)
    }

    fn archive() -> Archive {
        Archive::new("site.zip", b"PK\x03\x04fake".to_vec())
    }

    fn client(base: &str) -> AgentClient {
        let config = Config {
            api_base_url: base.to_string(),
            ..Config::default()
        };
        AgentClient::new(&config).expect("client should build")
    }

    #[test]
    fn download_url_is_session_scoped_and_stable() {
        let client = client("http://localhost:8000/");
        let id = SessionId::new("s1");
        assert_eq!(client.download_url(&id), "http://localhost:8000/download/s1");
        assert_eq!(client.download_url(&id), client.download_url(&id));
    }

    #[test]
    fn download_url_keeps_base_path_and_encodes_id() {
        let client = client("https://agent.example.com/api");
        let id = SessionId::new("a/b c");
        assert_eq!(
            client.download_url(&id),
            "https://agent.example.com/api/download/a%2Fb%20c"
        );
    }

    #[test]
    fn endpoint_falls_back_to_plain_join_for_unparseable_base() {
        let client = client("agent-host");
        assert_eq!(client.endpoint(&["chat"]), "agent-host/chat");
    }

    #[test]
    fn created_session_decodes_service_reply() {
        let created: CreatedSession = serde_json::from_str(
            r#"{"session_id": "s1", "files": {"/index.html": "<h1>Hi</h1>"}}"#,
        )
        .expect("upload reply should decode");
        assert_eq!(created.session_id, SessionId::new("s1"));
        assert_eq!(created.files.get("/index.html"), Some("<h1>Hi</h1>"));
    }

    #[test]
    fn instruction_reply_tolerates_missing_and_list_logs() {
        let bare: InstructionReply =
            serde_json::from_str(r#"{"files": {}}"#).expect("minimal reply should decode");
        assert!(bare.explanation.is_empty());
        assert!(bare.logs.is_empty());

        let listed: InstructionReply = serde_json::from_str(
            r#"{"files": {"/a.js": "1"}, "explanation": "done", "logs": ["step 1", "step 2"]}"#,
        )
        .expect("list logs should decode");
        assert_eq!(listed.logs, "step 1\nstep 2");
        assert_eq!(listed.explanation, "done");

        let nulled: InstructionReply =
            serde_json::from_str(r#"{"files": {}, "logs": null}"#).expect("null logs should decode");
        assert!(nulled.logs.is_empty());
    }

    #[tokio::test]
    async fn upload_posts_multipart_file_field() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"session_id": "s1", "files": {"/index.html": "<h1>Hi</h1>"}}"#,
        )
        .await;

        let created = client(&base)
            .create_session(&archive())
            .await
            .expect("upload should succeed");
        assert_eq!(created.session_id, SessionId::new("s1"));
        assert_eq!(created.files.len(), 1);

        let request = server.await.expect("server task should finish");
        assert!(request.head.starts_with("POST /upload "));
        assert!(request
            .head
            .to_ascii_lowercase()
            .contains("content-type: multipart/form-data"));
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains(r#"name="file""#));
        assert!(body.contains(r#"filename="site.zip""#));
        assert!(body.contains("PK\u{3}\u{4}fake"));
    }

    #[tokio::test]
    async fn upload_server_error_keeps_status_and_body() {
        let (base, server) = serve_once("500 Internal Server Error", "boom").await;

        let error = client(&base)
            .create_session(&archive())
            .await
            .expect_err("500 should fail");
        assert_eq!(error, ApiError::Upload(TransportError::status(500, "boom")));
        server.await.expect("server task should finish");
    }

    #[tokio::test]
    async fn upload_connection_refused_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let base = format!("http://{}", listener.local_addr().expect("addr should resolve"));
        drop(listener);

        let error = client(&base)
            .create_session(&archive())
            .await
            .expect_err("closed port should fail");
        assert!(
            matches!(error, ApiError::Upload(TransportError::Connect(_))),
            "{error:?}"
        );
    }

    #[tokio::test]
    async fn instruction_posts_session_and_prompt_as_json() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"files": {"/index.html": "<h1>Hello</h1>"}, "explanation": "Updated heading text", "logs": "ok"}"#,
        )
        .await;

        let reply = client(&base)
            .send_instruction(&SessionId::new("s1"), "make heading say Hello")
            .await
            .expect("instruction should succeed");
        assert_eq!(reply.explanation, "Updated heading text");
        assert_eq!(reply.files.get("/index.html"), Some("<h1>Hello</h1>"));

        let request = server.await.expect("server task should finish");
        assert!(request.head.starts_with("POST /chat "));
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request body should be json");
        assert_eq!(
            body,
            serde_json::json!({"session_id": "s1", "prompt": "make heading say Hello"})
        );
    }

    #[tokio::test]
    async fn instruction_failures_are_tagged_as_chat_errors() {
        let (base, server) = serve_once("422 Unprocessable Entity", "bad prompt").await;
        let error = client(&base)
            .send_instruction(&SessionId::new("s1"), "x")
            .await
            .expect_err("422 should fail");
        assert_eq!(error, ApiError::Chat(TransportError::status(422, "bad prompt")));
        server.await.expect("server task should finish");

        let (base, server) = serve_once("200 OK", "<html>not json</html>").await;
        let error = client(&base)
            .send_instruction(&SessionId::new("s1"), "x")
            .await
            .expect_err("html body should fail");
        assert!(
            matches!(error, ApiError::Chat(TransportError::Decode(_))),
            "{error:?}"
        );
        server.await.expect("server task should finish");
    }

    #[tokio::test]
    async fn delete_hits_session_endpoint_and_reports_status() {
        let (base, server) = serve_once("204 No Content", "").await;
        client(&base)
            .delete_session(&SessionId::new("s1"))
            .await
            .expect("delete should succeed");
        let request = server.await.expect("server task should finish");
        assert!(request.head.starts_with("DELETE /session/s1 "));

        let (base, server) = serve_once("404 Not Found", "").await;
        let error = client(&base)
            .delete_session(&SessionId::new("gone"))
            .await
            .expect_err("404 should fail");
        assert_eq!(error, ApiError::Delete(TransportError::status(404, "")));
        server.await.expect("server task should finish");
    }
}
