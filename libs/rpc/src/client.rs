use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use filament_fabric::codec::JsonCodec;
use filament_fabric::{Channel, Error as TransportError};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::Method;
use crate::error::{CallError, CallErrorKind};
use crate::message::{Inbound, RawMessage, RemoteError, Request, SubscriptionId};

/// Callback receiving the values pushed on one subscription
///
/// Handlers run on the dispatcher task, in delivery order, and must not block
/// or panic. A panicking handler takes the dispatcher down, which closes the
/// connection and fails every pending call with `ConnectionClosed`.
pub type NotificationHandler = Box<dyn FnMut(Value) + Send>;

/// Snapshot of the dispatcher's registries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub pending_calls: usize,
    pub subscriptions: usize,
}

/// JSON-RPC client multiplexing calls and subscriptions over one connection
///
/// Cloning is cheap; every clone talks to the same dispatcher task, which
/// exclusively owns the connection and the pending-call and subscription
/// registries. The connection closes when the peer goes away, when
/// [`RpcClient::close`] is called, or when the last clone is dropped.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    next_id: AtomicU64,
    calls: mpsc::UnboundedSender<PendingCall>,
    control: mpsc::UnboundedSender<Control>,
}

enum Control {
    Stats(oneshot::Sender<ClientStats>),
    Close,
}

/// Successful call, handed back with its context
struct Completed {
    id: u64,
    method: String,
    params: Vec<Value>,
    value: Value,
}

type Reply = oneshot::Sender<Result<Completed, CallError>>;

/// One in-flight request
///
/// Resolved exactly once: by a response, by a local failure, or with
/// `ConnectionClosed` when dropped unresolved.
struct PendingCall {
    id: u64,
    method: String,
    params: Vec<Value>,
    handler: Option<NotificationHandler>,
    reply: Option<Reply>,
}

impl PendingCall {
    fn resolve(&mut self, outcome: Result<Value, CallErrorKind>) {
        let Some(reply) = self.reply.take() else {
            return;
        };
        let id = self.id;
        let method = std::mem::take(&mut self.method);
        let params = std::mem::take(&mut self.params);
        let result = match outcome {
            Ok(value) => Ok(Completed {
                id,
                method,
                params,
                value,
            }),
            Err(kind) => Err(CallError {
                id,
                method,
                params,
                kind,
            }),
        };
        // The caller may have stopped waiting
        let _ = reply.send(result);
    }

    /// Fail without going through the reply channel
    fn into_error(mut self, kind: CallErrorKind) -> CallError {
        self.reply = None;
        CallError {
            id: self.id,
            method: std::mem::take(&mut self.method),
            params: std::mem::take(&mut self.params),
            kind,
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.resolve(Err(CallErrorKind::ConnectionClosed));
    }
}

impl RpcClient {
    /// Take ownership of an open channel and start dispatching
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(channel: Channel<JsonCodec>) -> Self {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            channel,
            calls: calls_rx,
            control: control_rx,
            pending: HashMap::new(),
            subscriptions: HashMap::new(),
        };
        tokio::spawn(dispatcher.run());

        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                calls: calls_tx,
                control: control_tx,
            }),
        }
    }

    /// Call `method` and wait for its result
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, CallError> {
        let completed = self.submit(method.into(), params, None).await?;
        Ok(completed.value)
    }

    /// Call a method from a typed table and decode its result
    pub async fn request<M: Method>(&self, method: M) -> Result<M::Output, CallError> {
        let completed = self
            .submit(M::NAME.to_string(), method.into_params(), None)
            .await?;
        serde_json::from_value(completed.value).map_err(|e| CallError {
            id: completed.id,
            method: completed.method,
            params: completed.params,
            kind: CallErrorKind::Decode(e.to_string()),
        })
    }

    /// Open a subscription, `handler` receives every value pushed on it
    ///
    /// The handler is registered in the same dispatcher step that consumes
    /// the response, so no value sent after it can be missed.
    pub async fn subscribe<F>(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
        handler: F,
    ) -> Result<SubscriptionId, CallError>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let completed = self
            .submit(method.into(), params, Some(Box::new(handler)))
            .await?;
        SubscriptionId::from_value(&completed.value).ok_or_else(|| CallError {
            id: completed.id,
            method: completed.method,
            params: completed.params,
            kind: CallErrorKind::Decode(format!("expected subscription id, got {}", completed.value)),
        })
    }

    /// Open a subscription from a typed table
    pub async fn subscribe_to<M, F>(&self, method: M, handler: F) -> Result<SubscriptionId, CallError>
    where
        M: Method,
        F: FnMut(Value) + Send + 'static,
    {
        self.subscribe(M::NAME, method.into_params(), handler).await
    }

    /// Open a subscription and receive its values as a stream
    ///
    /// The stream ends when the peer closes the subscription or the
    /// connection closes.
    pub async fn subscribe_stream(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Subscription, CallError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .subscribe(method, params, move |value| {
                let _ = tx.send(value);
            })
            .await?;
        Ok(Subscription { id, rx })
    }

    /// Registry sizes, `None` once the connection is closed
    pub async fn stats(&self) -> Option<ClientStats> {
        let (tx, rx) = oneshot::channel();
        self.inner.control.send(Control::Stats(tx)).ok()?;
        rx.await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.calls.is_closed()
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        self.inner.calls.closed().await
    }

    /// Close the connection, failing every outstanding call
    pub async fn close(&self) {
        let _ = self.inner.control.send(Control::Close);
        self.closed().await
    }

    async fn submit(
        &self,
        method: String,
        params: Vec<Value>,
        handler: Option<NotificationHandler>,
    ) -> Result<Completed, CallError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        let call = PendingCall {
            id,
            method,
            params,
            handler,
            reply: Some(reply),
        };

        if let Err(mpsc::error::SendError(call)) = self.inner.calls.send(call) {
            return Err(call.into_error(CallErrorKind::NotWritable));
        }

        match response.await {
            Ok(result) => result,
            // Unreachable while PendingCall resolves itself on drop
            Err(_) => Err(CallError {
                id,
                method: String::new(),
                params: Vec::new(),
                kind: CallErrorKind::ConnectionClosed,
            }),
        }
    }
}

/// Values pushed on one subscription
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next value, `None` once the subscription or connection is closed
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

/// Sole owner of the connection and the registries
struct Dispatcher {
    channel: Channel<JsonCodec>,
    calls: mpsc::UnboundedReceiver<PendingCall>,
    control: mpsc::UnboundedReceiver<Control>,
    pending: HashMap<u64, PendingCall>,
    subscriptions: HashMap<SubscriptionId, NotificationHandler>,
}

impl Dispatcher {
    async fn run(mut self) {
        debug!("rpc dispatcher started");

        let reason = loop {
            tokio::select! {
                call = self.calls.recv() => match call {
                    Some(call) => {
                        if let Err(e) = self.send(call).await {
                            break format!("write failed: {}", e);
                        }
                    }
                    None => break "client dropped".to_string(),
                },
                control = self.control.recv() => match control {
                    Some(Control::Stats(reply)) => {
                        let _ = reply.send(ClientStats {
                            pending_calls: self.pending.len(),
                            subscriptions: self.subscriptions.len(),
                        });
                    }
                    Some(Control::Close) => break "closed by client".to_string(),
                    None => break "client dropped".to_string(),
                },
                inbound = self.channel.receive::<RawMessage>() => match inbound {
                    Ok(message) => self.dispatch(message),
                    Err(TransportError::Codec(e)) => warn!("dropping undecodable message: {}", e),
                    Err(TransportError::ConnectionClosed) => break "closed by peer".to_string(),
                    Err(e) => break format!("read failed: {}", e),
                },
            }
        };

        self.shutdown(&reason).await;
    }

    async fn send(&mut self, call: PendingCall) -> Result<(), TransportError> {
        let request = Request::new(call.id, &call.method, &call.params);
        match self.channel.send(&request).await {
            Ok(()) => {
                self.pending.insert(call.id, call);
                Ok(())
            }
            Err(e) => {
                let mut call = call;
                call.resolve(Err(CallErrorKind::NotWritable));
                match e {
                    TransportError::Codec(msg) => {
                        warn!(id = call.id, "failed to encode request: {}", msg);
                        Ok(())
                    }
                    e => Err(e),
                }
            }
        }
    }

    fn dispatch(&mut self, message: RawMessage) {
        let inbound = match message.classify() {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("dropping unroutable message: {}", e);
                return;
            }
        };

        match inbound {
            Inbound::ChannelClose(sub) => {
                if self.subscriptions.remove(&sub).is_some() {
                    debug!(%sub, "subscription closed by peer");
                } else {
                    warn!(%sub, "close for unknown subscription");
                }
            }
            Inbound::ChannelValue(sub, value) => match self.subscriptions.get_mut(&sub) {
                Some(handler) => handler(value),
                None => warn!(%sub, "dropping value for unknown subscription"),
            },
            Inbound::Response { id, outcome } => match self.pending.remove(&id) {
                Some(call) => self.complete(call, outcome),
                None => warn!(id, "dropping response for unknown call"),
            },
        }
    }

    fn complete(&mut self, mut call: PendingCall, outcome: Result<Value, RemoteError>) {
        let outcome = match (outcome, call.handler.take()) {
            (Err(e), _) => Err(CallErrorKind::Remote(e)),
            (Ok(value), None) => Ok(value),
            (Ok(value), Some(handler)) => match SubscriptionId::from_value(&value) {
                Some(sub) => {
                    if self.subscriptions.insert(sub, handler).is_some() {
                        warn!(%sub, "peer reused subscription id, replacing handler");
                    }
                    Ok(value)
                }
                None => Err(CallErrorKind::Decode(format!(
                    "expected subscription id, got {}",
                    value
                ))),
            },
        };
        call.resolve(outcome);
    }

    async fn shutdown(mut self, reason: &str) {
        // Refuse new work first so callers observe closure immediately
        self.calls.close();
        self.control.close();

        let failed = self.pending.len();
        // Dropping a PendingCall resolves it with ConnectionClosed
        self.pending.clear();
        while let Ok(call) = self.calls.try_recv() {
            drop(call);
        }
        self.subscriptions.clear();

        if let Err(e) = self.channel.close().await {
            debug!("error closing connection: {}", e);
        }
        info!(reason, failed_calls = failed, "rpc connection closed");
    }
}
