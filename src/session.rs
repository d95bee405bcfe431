use crate::config::SessionConfig;
use crate::error::InferenceError;
use crate::history::ChatHistory;
use crate::probe::ServiceProbe;
use crate::protocol::{ChatChunk, ChatRequest, Message};
use crate::transport::{CancelHandle, ChunkStream, StreamingTransport};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Readiness of a session. `Ready` and `Failed` are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    ProbingReachability,
    ProbingModel,
    Ready,
    Failed(InferenceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    InFlight,
    Completing,
}

type TokenFn = Box<dyn FnMut(&str) + Send>;
type ResultFn = Box<dyn FnOnce(Result<String, InferenceError>) + Send>;

/// Receivers for the outcome of one [`InferenceSession::generate`] call.
///
/// The terminal callback is consumed on use, so each call ends with exactly
/// one completion or one error. Supplying a token callback selects the
/// streaming protocol.
pub struct Callbacks {
    on_token: Option<TokenFn>,
    on_result: ResultFn,
}

impl Callbacks {
    pub fn new(
        on_complete: impl FnOnce(String) + Send + 'static,
        on_error: impl FnOnce(InferenceError) + Send + 'static,
    ) -> Self {
        Self::on_result(move |result| match result {
            Ok(text) => on_complete(text),
            Err(err) => on_error(err),
        })
    }

    pub fn on_result(f: impl FnOnce(Result<String, InferenceError>) + Send + 'static) -> Self {
        Self {
            on_token: None,
            on_result: Box::new(f),
        }
    }

    pub fn on_token(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_token = Some(Box::new(f));
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.on_token.is_some()
    }

    fn token(&mut self, delta: &str) {
        if let Some(on_token) = self.on_token.as_mut() {
            on_token(delta);
        }
    }

    fn complete(self, text: String) {
        (self.on_result)(Ok(text));
    }

    fn fail(self, err: InferenceError) {
        (self.on_result)(Err(err));
    }
}

enum Command {
    Generate {
        prompt: String,
        callbacks: Callbacks,
    },
    Cancel {
        ack: oneshot::Sender<()>,
    },
    #[cfg(test)]
    History {
        reply: oneshot::Sender<Vec<Message>>,
    },
}

enum ProbeOutcome {
    Reachable(bool),
    ModelFound(bool),
}

/// Handle to a chat session against one model.
///
/// All session state lives on a dedicated task; handles only send it
/// commands, so clones can be shared freely. The task stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct InferenceSession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    stream_state: watch::Receiver<StreamState>,
    model: Arc<str>,
}

impl InferenceSession {
    /// Spawns the session task and starts the readiness probe. Must be called
    /// from within a tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_client(HttpClient::new(), config)
    }

    pub fn with_client(http: HttpClient, config: SessionConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Uninitialized);
        let (stream_tx, stream_state) = watch::channel(StreamState::Idle);
        let model: Arc<str> = Arc::from(config.model.as_str());

        let task = SessionTask {
            probe: ServiceProbe::new(http.clone(), &config),
            transport: StreamingTransport::new(http, &config),
            config,
            state: state_tx,
            stream_state: stream_tx,
            history: ChatHistory::new(),
            in_flight: None,
        };
        tokio::spawn(task.run(command_rx));

        Self {
            commands,
            state,
            stream_state,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn stream_state(&self) -> StreamState {
        *self.stream_state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Ready)
    }

    pub fn last_initialization_error(&self) -> Option<InferenceError> {
        match &*self.state.borrow() {
            SessionState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Resolves once the readiness probe has settled.
    pub async fn wait_ready(&self) -> Result<(), InferenceError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Failed(_)))
            .await
            .map_err(|_| InferenceError::Closed)?
            .clone();

        match settled {
            SessionState::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Queues a generation. The outcome always arrives through `callbacks`,
    /// including immediate rejections (`NotReady`, `Busy`, or the
    /// initialization failure).
    pub fn generate(&self, prompt: impl Into<String>, callbacks: Callbacks) {
        let command = Command::Generate {
            prompt: prompt.into(),
            callbacks,
        };
        if let Err(mpsc::error::SendError(Command::Generate { callbacks, .. })) =
            self.commands.send(command)
        {
            callbacks.fail(InferenceError::Closed);
        }
    }

    /// Non-streaming generation as a future.
    pub async fn complete(&self, prompt: impl Into<String>) -> Result<String, InferenceError> {
        let (tx, rx) = oneshot::channel();
        self.generate(
            prompt,
            Callbacks::on_result(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.map_err(|_| InferenceError::Closed)?
    }

    /// Aborts the in-flight generation, if any. When this returns the session
    /// is idle and the aborted call has seen its final callback.
    pub async fn cancel(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Cancel { ack }).is_ok() {
            let _ = done.await;
        }
    }

    #[cfg(test)]
    async fn history(&self) -> Vec<Message> {
        let (reply, rx) = oneshot::channel();
        let _ = self.commands.send(Command::History { reply });
        rx.await.unwrap_or_default()
    }
}

struct InFlight {
    id: Uuid,
    streaming: bool,
    records: ChunkStream,
    cancel: Option<CancelHandle>,
    callbacks: Callbacks,
    response: String,
}

struct SessionTask {
    config: SessionConfig,
    probe: ServiceProbe,
    transport: StreamingTransport,
    state: watch::Sender<SessionState>,
    stream_state: watch::Sender<StreamState>,
    history: ChatHistory,
    in_flight: Option<InFlight>,
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut probe = self.spawn_probe();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(outcome) = probe.recv() => self.apply_probe(outcome),
                item = next_record(&mut self.in_flight) => self.handle_record(item),
            }
        }

        if let Some(flight) = self.in_flight.take() {
            self.abort(flight, InferenceError::Closed);
        }
        debug!(model = %self.config.model, "session task stopped");
    }

    fn spawn_probe(&self) -> mpsc::UnboundedReceiver<ProbeOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = self.probe.clone();
        let model = self.config.model.clone();

        self.set_state(SessionState::ProbingReachability);
        tokio::spawn(async move {
            let reachable = probe.check_reachable().await;
            if tx.send(ProbeOutcome::Reachable(reachable)).is_err() || !reachable {
                return;
            }
            let found = probe.model_exists(&model).await;
            let _ = tx.send(ProbeOutcome::ModelFound(found));
        });
        rx
    }

    fn apply_probe(&mut self, outcome: ProbeOutcome) {
        let next = match outcome {
            ProbeOutcome::Reachable(true) => SessionState::ProbingModel,
            ProbeOutcome::Reachable(false) => SessionState::Failed(InferenceError::Unreachable {
                base_url: self.config.base_url.clone(),
            }),
            ProbeOutcome::ModelFound(true) => SessionState::Ready,
            ProbeOutcome::ModelFound(false) => SessionState::Failed(InferenceError::ModelMissing {
                model: self.config.model.clone(),
            }),
        };

        match &next {
            SessionState::Ready => info!(model = %self.config.model, "inference session ready"),
            SessionState::Failed(err) => warn!(error = %err, "inference session failed to initialize"),
            _ => debug!(base_url = %self.config.base_url, "backend reachable, checking model"),
        }
        self.set_state(next);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Generate { prompt, callbacks } => self.start(prompt, callbacks),
            Command::Cancel { ack } => {
                if let Some(flight) = self.in_flight.take() {
                    info!(request_id = %flight.id, "generation cancelled");
                    self.abort(flight, InferenceError::Cancelled);
                }
                let _ = ack.send(());
            }
            #[cfg(test)]
            Command::History { reply } => {
                let _ = reply.send(self.history.snapshot());
            }
        }
    }

    fn start(&mut self, prompt: String, callbacks: Callbacks) {
        let state = self.state.borrow().clone();
        match state {
            SessionState::Ready => {}
            SessionState::Failed(err) => return callbacks.fail(err),
            _ => return callbacks.fail(InferenceError::NotReady),
        }
        if self.in_flight.is_some() {
            warn!("generation rejected, another one is in flight");
            return callbacks.fail(InferenceError::Busy);
        }

        self.history.clear();
        self.history.append(Message::user(prompt));

        let streaming = callbacks.is_streaming();
        let request = self.build_request(streaming);
        let id = Uuid::new_v4();
        debug!(request_id = %id, streaming, model = %request.model, "starting generation");

        let (records, cancel) = if streaming {
            let (records, cancel) = self.transport.send(request);
            (records, Some(cancel))
        } else {
            let transport = self.transport.clone();
            let records = futures::stream::once(async move { transport.send_blocking(request).await });
            (records.boxed(), None)
        };

        self.in_flight = Some(InFlight {
            id,
            streaming,
            records,
            cancel,
            callbacks,
            response: String::new(),
        });
        self.set_stream_state(StreamState::InFlight);
    }

    fn build_request(&self, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: self.history.snapshot(),
            stream,
            system: self.config.system_prompt.clone(),
            options: self.config.options.clone(),
        }
    }

    fn handle_record(&mut self, item: Option<Result<ChatChunk, InferenceError>>) {
        let Some(mut flight) = self.in_flight.take() else {
            return;
        };

        match item {
            Some(Ok(chunk)) => {
                if let Some(delta) = chunk.content().filter(|delta| !delta.is_empty()) {
                    flight.callbacks.token(delta);
                    flight.response.push_str(delta);
                }
                // A non-streamed reply is a single document, final by definition.
                if chunk.done || !flight.streaming {
                    self.finish(flight, &chunk);
                } else {
                    self.in_flight = Some(flight);
                }
            }
            Some(Err(err)) => self.abort(flight, err),
            None => self.abort(
                flight,
                InferenceError::Protocol("response ended before the final record".to_string()),
            ),
        }
    }

    fn finish(&mut self, flight: InFlight, last: &ChatChunk) {
        self.set_stream_state(StreamState::Completing);

        let InFlight {
            id,
            callbacks,
            response,
            ..
        } = flight;
        if !response.is_empty() {
            self.history.append(Message::assistant(response.clone()));
        }
        info!(
            request_id = %id,
            chars = response.len(),
            eval_count = ?last.usage.eval_count,
            total_duration_ns = ?last.usage.total_duration,
            "generation complete"
        );

        callbacks.complete(response);
        self.set_stream_state(StreamState::Idle);
    }

    fn abort(&mut self, flight: InFlight, err: InferenceError) {
        if let Some(cancel) = &flight.cancel {
            cancel.cancel();
        }
        if !matches!(err, InferenceError::Cancelled | InferenceError::Closed) {
            warn!(request_id = %flight.id, error = %err, "generation failed");
        }

        let InFlight {
            records, callbacks, ..
        } = flight;
        drop(records);
        self.set_stream_state(StreamState::Idle);
        callbacks.fail(err);
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn set_stream_state(&self, state: StreamState) {
        self.stream_state.send_replace(state);
    }
}

async fn next_record(in_flight: &mut Option<InFlight>) -> Option<Result<ChatChunk, InferenceError>> {
    match in_flight {
        Some(flight) => flight.records.next().await,
        None => std::future::pending().await,
    }
}
