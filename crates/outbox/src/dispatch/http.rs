//! HTTP dispatcher: delivers mutations to an RPC-style backend
//!
//! Uses synchronous HTTP (ureq) to stay executor-agnostic, like the rest of
//! the engine.

use anyhow::{Context, Result};
use log::debug;
use url::Url;

use super::MutationDispatcher;
use crate::config::RemoteConfig;
use crate::error::DispatchError;
use crate::models::SyncQueueItem;

/// Delivers each item as `POST {base_url}/{entity_kind}.{operation}`
///
/// The payload is sent verbatim as the JSON body. The item id travels in the
/// `Idempotency-Key` header so the backend can deduplicate a retry of a write
/// whose response was lost.
pub struct HttpDispatcher {
    agent: ureq::Agent,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpDispatcher {
    /// Create a dispatcher for the given remote configuration
    pub fn new(remote: &RemoteConfig) -> Result<Self> {
        let mut base_url = Url::parse(&remote.base_url)
            .with_context(|| format!("Invalid remote URL: {}", remote.base_url))?;

        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(remote.request_timeout))
            .http_status_as_error(true)
            .build()
            .into();

        Ok(Self {
            agent,
            base_url,
            auth_token: remote.auth_token.clone(),
        })
    }

    /// Endpoint for an item, e.g. `https://api.example.com/rpc/todo.create`
    pub fn endpoint(&self, item: &SyncQueueItem) -> Result<Url, DispatchError> {
        let procedure = format!(
            "{}.{}",
            urlencoding::encode(item.entity_kind.as_str()),
            item.operation
        );
        self.base_url
            .join(&procedure)
            .map_err(|e| DispatchError::other(format!("Invalid endpoint for {procedure}: {e}")))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl MutationDispatcher for HttpDispatcher {
    fn dispatch(&self, item: &SyncQueueItem) -> Result<(), DispatchError> {
        let url = self.endpoint(item)?;
        debug!("POST {} (item {})", url, item.id);

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Idempotency-Key", item.id.as_str())
            .header("X-Outbox-Attempt", &(item.retry_count + 1).to_string());

        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", &format!("Bearer {}", token));
        }

        match request.send_json(&item.payload) {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(status)) => Err(DispatchError::Rejected {
                status,
                message: ureq::http::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown status")
                    .to_string(),
            }),
            Err(e) => Err(DispatchError::Transport {
                message: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for HttpDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDispatcher")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, OperationKind};
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Request as seen by the one-shot test server
    struct Captured {
        request_line: String,
        headers: Vec<String>,
        body: String,
    }

    /// Serve exactly one request with the given status, returning what was received
    fn one_shot_server(status: u16) -> (String, thread::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/rpc", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut headers = Vec::new();
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some(len) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = len.trim().parse().unwrap();
                }
                if line.to_ascii_lowercase() == "transfer-encoding: chunked" {
                    chunked = true;
                }
                headers.push(line);
            }

            let mut body = Vec::new();
            if chunked {
                loop {
                    let mut size_line = String::new();
                    reader.read_line(&mut size_line).unwrap();
                    let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
                    let mut chunk = vec![0u8; size + 2];
                    reader.read_exact(&mut chunk).unwrap();
                    if size == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..size]);
                }
            } else {
                body.resize(content_length, 0);
                reader.read_exact(&mut body).unwrap();
            }

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            )
            .unwrap();

            Captured {
                request_line: request_line.trim_end().to_string(),
                headers,
                body: String::from_utf8(body).unwrap(),
            }
        });

        (base, handle)
    }

    fn remote(base_url: &str) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            auth_token: Some("secret".to_string()),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn make_item(operation: OperationKind) -> SyncQueueItem {
        SyncQueueItem::new(
            operation,
            EntityKind::new("todo").unwrap(),
            json!({"id": 7, "title": "Ship it"}),
        )
    }

    #[test]
    fn test_endpoint_layout() {
        let dispatcher = HttpDispatcher::new(&remote("https://api.example.com/rpc")).unwrap();
        let item = make_item(OperationKind::Update);

        assert_eq!(dispatcher.base_url().as_str(), "https://api.example.com/rpc/");
        assert_eq!(
            dispatcher.endpoint(&item).unwrap().as_str(),
            "https://api.example.com/rpc/todo.update"
        );
    }

    #[test]
    fn test_endpoint_encodes_entity_kind() {
        let dispatcher = HttpDispatcher::new(&remote("https://api.example.com/")).unwrap();
        let item = SyncQueueItem::new(
            OperationKind::Create,
            EntityKind::new("team/member").unwrap(),
            json!({}),
        );
        assert_eq!(
            dispatcher.endpoint(&item).unwrap().as_str(),
            "https://api.example.com/team%2Fmember.create"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpDispatcher::new(&remote("not a url")).is_err());
    }

    #[test]
    fn test_dispatch_success_sends_payload_and_headers() {
        let (base, server) = one_shot_server(200);
        let dispatcher = HttpDispatcher::new(&remote(&base)).unwrap();
        let item = make_item(OperationKind::Create);

        dispatcher.dispatch(&item).unwrap();

        let captured = server.join().unwrap();
        assert!(captured.request_line.starts_with("POST /rpc/todo.create "));
        let headers = captured.headers.join("\n").to_ascii_lowercase();
        assert!(headers.contains(&format!("idempotency-key: {}", item.id).to_ascii_lowercase()));
        assert!(headers.contains("authorization: bearer secret"));
        assert!(headers.contains("x-outbox-attempt: 1"));

        let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body, item.payload);
    }

    #[test]
    fn test_dispatch_maps_status_to_rejected() {
        let (base, server) = one_shot_server(409);
        let dispatcher = HttpDispatcher::new(&remote(&base)).unwrap();

        let err = dispatcher.dispatch(&make_item(OperationKind::Delete)).unwrap_err();
        server.join().unwrap();

        assert_eq!(
            err,
            DispatchError::Rejected {
                status: 409,
                message: "Conflict".to_string(),
            }
        );
    }

    #[test]
    fn test_dispatch_connection_refused_is_transport_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let dispatcher = HttpDispatcher::new(&remote(&format!("http://{addr}/rpc"))).unwrap();

        let err = dispatcher.dispatch(&make_item(OperationKind::Create)).unwrap_err();
        assert!(matches!(err, DispatchError::Transport { .. }));
    }
}
