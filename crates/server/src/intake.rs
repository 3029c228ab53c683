//! Line-delimited JSON submission intake.
//!
//! Each input line is one request, each output line one reply, in order:
//!
//! ```text
//! > {"token": "AQ...", "record": {"schema_version": 1, "slug": "seeds", ...}}
//! < {"id": "7300563720634368"}
//! > {"token": "expired...", "record": {...}}
//! < {"error": {"code": 2001, "message": "...", "retryable": true}}
//! ```
//!
//! Blank lines are skipped.

use std::future::Future;

use modgarden_auth::AccessToken;
use modgarden_types::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::orchestrator::{SubmissionError, SubmissionOrchestrator};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubmitRequest {
    token: String,
    record: Value,
}

/// Outcome of one request line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// The record was stored under `id`.
    Accepted { id: String },
    /// The request was refused.
    Rejected { error: ErrorBody },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub retryable: bool,
}

impl From<&SubmissionError> for ErrorBody {
    fn from(err: &SubmissionError) -> Self {
        Self { code: err.code().as_u16(), message: err.to_string(), retryable: err.is_retryable() }
    }
}

/// Handles a single request line.
///
/// A line that is not a `{"token", "record"}` object is answered with
/// [`ErrorCode::SchemaMalformedRecord`].
pub async fn handle_line(orchestrator: &SubmissionOrchestrator, line: &str) -> Reply {
    let request: SubmitRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Reply::Rejected {
                error: ErrorBody {
                    code: ErrorCode::SchemaMalformedRecord.as_u16(),
                    message: format!("invalid request: {e}"),
                    retryable: false,
                },
            };
        },
    };

    let token = AccessToken::new(request.token);
    match orchestrator.submit(&token, request.record).await {
        Ok(id) => Reply::Accepted { id: id.value().to_string() },
        Err(e) => Reply::Rejected { error: ErrorBody::from(&e) },
    }
}

/// Serves requests from `reader` until EOF or `shutdown` completes.
///
/// A request already being handled when `shutdown` fires is finished and
/// answered first. Returns the number of requests answered.
///
/// # Errors
///
/// Returns an I/O error if reading or writing fails.
pub async fn serve_lines<R, W, S>(
    orchestrator: &SubmissionOrchestrator,
    reader: R,
    mut writer: W,
    shutdown: S,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut answered = 0u64;
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = &mut shutdown => {
                info!(answered, "Intake stopped by shutdown signal");
                break;
            }
        };
        let Some(line) = line else {
            debug!(answered, "Intake reached end of input");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(orchestrator, &line).await;
        let mut out = serde_json::to_vec(&reply).map_err(std::io::Error::other)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        answered += 1;
    }

    Ok(answered)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use modgarden_auth::CapabilitySet;
    use modgarden_test_utils::{ManualClock, assert_eventually, test_core_config};
    use modgarden_types::AccountId;
    use serde_json::json;
    use tokio::io::BufReader;

    use super::*;
    use crate::{
        bootstrap::{Core, bootstrap},
        storage::MemoryStore,
    };

    fn core(store: &MemoryStore) -> (Core, ManualClock) {
        let clock = ManualClock::default();
        let core =
            bootstrap(&test_core_config(), Arc::new(clock.clone()), Arc::new(store.clone()))
                .unwrap();
        (core, clock)
    }

    fn token(core: &Core, capabilities: &[&str]) -> String {
        let subject = AccountId::parse("abcde").unwrap();
        let capabilities = CapabilitySet::from_names(capabilities.iter().copied()).unwrap();
        let issued =
            core.credentials.issue(&subject, capabilities, Duration::from_secs(60)).unwrap();
        issued.token.as_str().to_string()
    }

    fn request(token: &str) -> String {
        json!({
            "token": token,
            "record": {
                "schema_version": 1,
                "slug": "seeds",
                "name": "Seeds",
                "event": "spring-2025",
                "authors": ["abcde"],
            },
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_accepted_line() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);
        let line = request(&token(&core, &["submit"]));

        let reply = handle_line(&core.orchestrator, &line).await;

        let Reply::Accepted { id } = reply else { panic!("unexpected reply: {reply:?}") };
        assert!(id.parse::<u64>().is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_line() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);
        let line = request(&token(&core, &["read"]));

        let reply = handle_line(&core.orchestrator, &line).await;

        let Reply::Rejected { error } = reply else { panic!("unexpected reply: {reply:?}") };
        assert_eq!(error.code, ErrorCode::AuthorizationForbidden.as_u16());
        assert!(!error.retryable);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_line_is_retryable() {
        let store = MemoryStore::new();
        let (core, clock) = core(&store);
        let line = request(&token(&core, &["submit"]));
        clock.advance(Duration::from_secs(61));

        let reply = handle_line(&core.orchestrator, &line).await;

        let Reply::Rejected { error } = reply else { panic!("unexpected reply: {reply:?}") };
        assert_eq!(error.code, ErrorCode::CredentialTokenExpired.as_u16());
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn test_garbage_line() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);

        let reply = handle_line(&core.orchestrator, "{\"record\": {}}").await;

        let Reply::Rejected { error } = reply else { panic!("unexpected reply: {reply:?}") };
        assert_eq!(error.code, ErrorCode::SchemaMalformedRecord.as_u16());
        assert!(error.message.starts_with("invalid request"));
    }

    #[tokio::test]
    async fn test_serve_lines_answers_in_order() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);
        let input =
            format!("{}\n\nnot json\n{}\n", request(&token(&core, &["submit"])), request("bad"));
        let mut output = Vec::new();

        let answered = serve_lines(
            &core.orchestrator,
            input.as_bytes(),
            &mut output,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(answered, 3);
        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(replies[0]["id"].is_string());
        assert_eq!(replies[1]["error"]["code"], json!(1006));
        assert_eq!(replies[2]["error"]["code"], json!(2002));
    }

    #[tokio::test]
    async fn test_serve_lines_stops_on_shutdown() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);
        let (_writer, reader) = tokio::io::duplex(64);
        let mut output = Vec::new();

        let answered = serve_lines(
            &core.orchestrator,
            BufReader::new(reader),
            &mut output,
            std::future::ready(()),
        )
        .await
        .unwrap();

        assert_eq!(answered, 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_serve_lines_over_live_stream() {
        let store = MemoryStore::new();
        let (core, _) = core(&store);
        let line = request(&token(&core, &["submit"]));
        let (mut client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let orchestrator = Arc::clone(&core.orchestrator);
        let intake = tokio::spawn(async move {
            serve_lines(
                &orchestrator,
                BufReader::new(server_read),
                server_write,
                std::future::pending(),
            )
            .await
        });

        client.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        let stored = store.clone();
        assert!(assert_eventually(Duration::from_secs(2), || stored.len() == 1).await);

        let mut reply = String::new();
        BufReader::new(&mut client).read_line(&mut reply).await.unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        let id = store.records()[0].id;
        assert_eq!(reply["id"], json!(id.value().to_string()));

        drop(client);
        assert_eq!(intake.await.unwrap().unwrap(), 1);
    }
}
