use crate::config::SessionConfig;
use crate::decoder::StreamDecoder;
use crate::error::InferenceError;
use crate::protocol::{ChatChunk, ChatRequest};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client as HttpClient, Response};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type ChunkStream = BoxStream<'static, Result<ChatChunk, InferenceError>>;

/// Aborts one streamed chat request.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Drops the connection; the paired stream yields nothing further.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub struct StreamingTransport {
    http: HttpClient,
    chat_url: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl StreamingTransport {
    pub fn new(http: HttpClient, config: &SessionConfig) -> Self {
        Self {
            http,
            chat_url: config.endpoint("chat"),
            request_timeout: config.request_timeout,
            idle_timeout: config.stream_idle_timeout,
        }
    }

    /// Starts a streamed chat request on a worker task.
    ///
    /// Records arrive in wire order. The stream ends after the `done` record,
    /// after the first error, or as soon as the request is cancelled.
    pub fn send(&self, mut request: ChatRequest) -> (ChunkStream, CancelHandle) {
        request.stream = true;

        let (tx, rx) = mpsc::channel(64);
        let token = CancellationToken::new();
        let worker = self.clone();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!(url = %worker.chat_url, "chat stream cancelled");
                }
                result = worker.pump(request, &tx) => {
                    if let Err(err) = result {
                        let _ = tx.send(Err(err)).await;
                    }
                }
            }
        });

        let stream = ReceiverStream::new(rx)
            .take_until(token.clone().cancelled_owned())
            .boxed();
        (stream, CancelHandle { token })
    }

    /// Single-document chat request; the whole body is one JSON object.
    pub async fn send_blocking(&self, mut request: ChatRequest) -> Result<ChatChunk, InferenceError> {
        request.stream = false;

        let response = self
            .http
            .post(&self.chat_url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await?;
        let body = ensure_success(response).await?.bytes().await?;

        if body.trim_ascii().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }

        let chunk: ChatChunk = serde_json::from_slice(&body)
            .map_err(|e| InferenceError::Protocol(format!("undecodable chat response: {e}")))?;
        if let Some(message) = chunk.error {
            return Err(InferenceError::Backend {
                status: None,
                message,
            });
        }
        if chunk.message.is_none() {
            return Err(InferenceError::Protocol(
                "chat response carries no message".to_string(),
            ));
        }
        Ok(chunk)
    }

    async fn pump(
        &self,
        request: ChatRequest,
        tx: &mpsc::Sender<Result<ChatChunk, InferenceError>>,
    ) -> Result<(), InferenceError> {
        debug!(url = %self.chat_url, model = %request.model, "opening chat stream");
        let response = tokio::time::timeout(
            self.idle_timeout,
            self.http.post(&self.chat_url).json(&request).send(),
        )
        .await
        .map_err(|_| {
            InferenceError::Transport(format!(
                "backend did not answer within {}s",
                self.idle_timeout.as_secs()
            ))
        })??;
        let response = ensure_success(response).await?;

        let mut body = response.bytes_stream();
        let mut decoder = StreamDecoder::new();
        let mut produced = 0usize;

        loop {
            let next = tokio::time::timeout(self.idle_timeout, body.next())
                .await
                .map_err(|_| {
                    InferenceError::Transport(format!(
                        "no data from backend for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            let records = decoder.push(&chunk).inspect_err(|err| {
                warn!(error = %err, "chat stream desynchronized");
            })?;
            for record in records {
                produced += 1;
                if !forward(record, tx).await? {
                    return Ok(());
                }
            }
            if decoder.is_done() {
                return Ok(());
            }
        }

        if let Some(record) = decoder.finish()? {
            produced += 1;
            forward(record, tx).await?;
        }

        if decoder.is_done() {
            Ok(())
        } else if produced == 0 {
            Err(InferenceError::EmptyResponse)
        } else {
            Err(InferenceError::Protocol(
                "chat stream ended before the final record".to_string(),
            ))
        }
    }
}

/// Hands one record to the consumer. `Ok(false)` means nobody is listening
/// anymore.
async fn forward(
    record: ChatChunk,
    tx: &mpsc::Sender<Result<ChatChunk, InferenceError>>,
) -> Result<bool, InferenceError> {
    if let Some(message) = record.error {
        return Err(InferenceError::Backend {
            status: None,
            message,
        });
    }
    Ok(tx.send(Ok(record)).await.is_ok())
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, InferenceError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Backend {
        status: Some(status.as_u16()),
        message: backend_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
    })
}

fn backend_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => Some(parsed.error),
        Err(_) => Some(body.to_string()),
    }
}
