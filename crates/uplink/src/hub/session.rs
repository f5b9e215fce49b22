//! Hub side of one validator connection.
//!
//! `HubSession` holds the handshake state machine and is driven frame by
//! frame; `serve_connection` binds it to a WebSocket.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::callbacks::CallbackTable;
use super::registry::{ConnectionHandle, ValidatorRegistry};
use super::storage::{HubStorage, Validator};
use crate::crypto::{verify, Challenge};
use crate::protocol::{self, CheckReply, HubBound, SignupAck, SignupRequest, ValidatorBound};

/// Shared hub state a session reads and mutates
#[derive(Clone)]
pub struct SessionContext {
    pub storage: Arc<dyn HubStorage>,
    pub registry: Arc<ValidatorRegistry>,
    pub callbacks: Arc<CallbackTable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Admitted { validator_id: String },
    Closed,
}

pub struct HubSession {
    ctx: SessionContext,
    handle: ConnectionHandle,
    peer: String,
    state: SessionState,
}

impl HubSession {
    /// Session for a connection whose transport is already established
    pub fn new(ctx: SessionContext, handle: ConnectionHandle, peer: impl Into<String>) -> Self {
        Self { ctx, handle, peer: peer.into(), state: SessionState::Handshaking }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one inbound text frame. Malformed frames are dropped.
    pub async fn on_frame(&mut self, frame: &str) {
        if self.state == SessionState::Closed {
            return;
        }

        let message: HubBound = match protocol::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(peer = %self.peer, "Discarding frame: {e}");
                return;
            }
        };

        match message {
            HubBound::Signup(request) => self.on_signup(request).await,
            HubBound::CheckReply(reply) => self.on_check_reply(reply).await,
        }
    }

    async fn on_signup(&mut self, request: SignupRequest) {
        if self.state != SessionState::Handshaking {
            debug!(peer = %self.peer, "Ignoring signup on already admitted session");
            return;
        }

        let challenge = Challenge::Signup {
            correlation_id: &request.correlation_id,
            public_key: &request.public_key,
        };
        if !verify(&challenge, &request.public_key, &request.signature) {
            warn!(peer = %self.peer, "Signup signature rejected");
            return;
        }

        let validator = match self.lookup_or_create(&request).await {
            Ok(validator) => validator,
            Err(e) => {
                error!(peer = %self.peer, "Could not load validator record: {e:#}");
                return;
            }
        };

        let ack = ValidatorBound::SignupAck(SignupAck {
            validator_id: validator.id.clone(),
            correlation_id: request.correlation_id,
        });
        if let Err(e) = self.handle.send(ack) {
            warn!(
                peer = %self.peer,
                validator_id = %validator.id,
                "Failed to send signup ack: {e}"
            );
            return;
        }

        self.ctx
            .registry
            .admit(validator.id.clone(), validator.public_key, self.handle.clone())
            .await;

        info!(peer = %self.peer, validator_id = %validator.id, "Validator admitted");
        self.state = SessionState::Admitted { validator_id: validator.id };
    }

    async fn lookup_or_create(&self, request: &SignupRequest) -> anyhow::Result<Validator> {
        if let Some(existing) =
            self.ctx.storage.find_validator_by_public_key(&request.public_key).await?
        {
            return Ok(existing);
        }

        let created =
            self.ctx.storage.create_validator(&request.public_key, &request.origin_address).await?;
        info!(
            validator_id = %created.id,
            origin = %created.origin_address,
            "Registered new validator"
        );
        Ok(created)
    }

    async fn on_check_reply(&mut self, reply: CheckReply) {
        if !matches!(self.state, SessionState::Admitted { .. }) {
            debug!(peer = %self.peer, "Discarding check reply before admission");
            return;
        }

        let correlation_id = reply.correlation_id.clone();
        self.ctx.callbacks.resolve(&correlation_id, reply).await;
    }

    /// Move to `Closed` and drop the registry entry
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(entry) = self.ctx.registry.remove(&self.handle).await {
            info!(peer = %self.peer, validator_id = %entry.validator_id, "Validator disconnected");
        }
        self.state = SessionState::Closed;
    }
}

/// Serve one accepted TCP connection until either side closes it
pub async fn serve_connection(stream: TcpStream, peer: SocketAddr, ctx: SessionContext) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, "WebSocket handshake failed: {e}");
            return;
        }
    };
    debug!(%peer, "Validator connection established");

    let (mut sink, mut source) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ValidatorBound>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match protocol::encode(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {}: {e}", message.kind());
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Write to validator failed: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let handle = ConnectionHandle::new(tx);
    let mut session = HubSession::new(ctx, handle.clone(), peer.to_string());

    loop {
        let frame = tokio::select! {
            frame = source.next() => frame,
            _ = handle.superseded() => {
                info!(%peer, "Connection superseded by a newer one for the same validator");
                break;
            }
        };
        let Some(frame) = frame else { break };

        match frame {
            Ok(Message::Text(text)) => session.on_frame(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => debug!(%peer, "Discarding binary frame"),
            Ok(_) => {}
            Err(e) => {
                debug!(%peer, "Read from validator failed: {e}");
                break;
            }
        }
    }

    session.close().await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, sign, KeyPair};
    use crate::hub::memory::MemoryStorage;
    use crate::protocol::CheckOutcome;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        registry: Arc<ValidatorRegistry>,
        callbacks: Arc<CallbackTable>,
        session: HubSession,
        rx: mpsc::UnboundedReceiver<ValidatorBound>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let registry = Arc::new(ValidatorRegistry::new());
        let callbacks = Arc::new(CallbackTable::new());
        let ctx = SessionContext {
            storage: storage.clone(),
            registry: registry.clone(),
            callbacks: callbacks.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let session = HubSession::new(ctx, ConnectionHandle::new(tx), "test-peer");
        Fixture { storage, registry, callbacks, session, rx }
    }

    fn signup_frame(keypair: &KeyPair, correlation_id: &str, signer: &KeyPair) -> String {
        let public_key = keypair.public_key_hex();
        let signature =
            sign(&Challenge::Signup { correlation_id, public_key: &public_key }, signer);
        protocol::encode(&HubBound::Signup(SignupRequest {
            public_key,
            origin_address: "10.0.0.7".into(),
            signature,
            correlation_id: correlation_id.into(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_signup_admits_and_acks() {
        let mut f = fixture();
        let keypair = generate_keypair();

        f.session.on_frame(&signup_frame(&keypair, "cb-1", &keypair)).await;

        let ack = match f.rx.try_recv().unwrap() {
            ValidatorBound::SignupAck(ack) => ack,
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(ack.correlation_id, "cb-1");
        assert_eq!(
            f.session.state(),
            &SessionState::Admitted { validator_id: ack.validator_id.clone() }
        );

        let snapshot = f.registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].public_key, keypair.public_key_hex());

        let stored = f.storage.validator(&ack.validator_id).await.unwrap();
        assert_eq!(stored.origin_address, "10.0.0.7");
    }

    #[tokio::test]
    async fn test_returning_validator_keeps_its_id() {
        let keypair = generate_keypair();

        let mut first = fixture();
        first.session.on_frame(&signup_frame(&keypair, "cb-1", &keypair)).await;
        let first_id = first.storage.validators().await[0].id.clone();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = SessionContext {
            storage: first.storage.clone(),
            registry: first.registry.clone(),
            callbacks: first.callbacks.clone(),
        };
        let mut second = HubSession::new(ctx, ConnectionHandle::new(tx), "reconnect");
        second.on_frame(&signup_frame(&keypair, "cb-7", &keypair)).await;

        match rx.try_recv().unwrap() {
            ValidatorBound::SignupAck(ack) => assert_eq!(ack.validator_id, first_id),
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(first.storage.validators().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signup_signature_is_silent() {
        let mut f = fixture();
        let keypair = generate_keypair();
        let impostor = generate_keypair();

        f.session.on_frame(&signup_frame(&keypair, "cb-1", &impostor)).await;

        assert!(f.rx.try_recv().is_err());
        assert_eq!(f.session.state(), &SessionState::Handshaking);
        assert!(f.registry.is_empty().await);
        assert!(f.storage.validators().await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_before_admission_is_discarded() {
        let mut f = fixture();
        let frame = protocol::encode(&HubBound::CheckReply(CheckReply {
            correlation_id: "cb-2".into(),
            validator_id: "V1".into(),
            target_id: "T1".into(),
            outcome: CheckOutcome::Good,
            latency_millis: 1,
            signature: "00".into(),
        }))
        .unwrap();

        f.session.on_frame(&frame).await;
        assert_eq!(f.session.state(), &SessionState::Handshaking);
    }

    #[tokio::test]
    async fn test_garbage_frame_keeps_session_open() {
        let mut f = fixture();
        f.session.on_frame("{\"type\":\"nonsense\"}").await;
        f.session.on_frame("not json").await;

        assert_eq!(f.session.state(), &SessionState::Handshaking);

        let keypair = generate_keypair();
        f.session.on_frame(&signup_frame(&keypair, "cb-1", &keypair)).await;
        assert!(matches!(f.session.state(), SessionState::Admitted { .. }));
    }

    #[tokio::test]
    async fn test_close_removes_registry_entry_and_stops_processing() {
        let mut f = fixture();
        let keypair = generate_keypair();
        f.session.on_frame(&signup_frame(&keypair, "cb-1", &keypair)).await;
        let _ack = f.rx.try_recv().unwrap();

        f.session.close().await;
        assert!(f.registry.is_empty().await);
        assert_eq!(f.session.state(), &SessionState::Closed);

        f.session.on_frame(&signup_frame(&keypair, "cb-2", &keypair)).await;
        assert!(f.rx.try_recv().is_err());
        assert_eq!(f.session.state(), &SessionState::Closed);
    }

    #[tokio::test]
    async fn test_second_connection_for_same_key_replaces_first() {
        use crate::config::DispatchConfig;
        use crate::hub::dispatch::Dispatcher;

        let f = fixture();
        let mut first = f.session;
        let mut first_rx = f.rx;
        let keypair = generate_keypair();
        f.storage.add_target("https://example.com").await;

        first.on_frame(&signup_frame(&keypair, "cb-1", &keypair)).await;
        let _ack = first_rx.try_recv().unwrap();

        let (tx, mut second_rx) = mpsc::unbounded_channel();
        let second_handle = ConnectionHandle::new(tx);
        let ctx = SessionContext {
            storage: f.storage.clone(),
            registry: f.registry.clone(),
            callbacks: f.callbacks.clone(),
        };
        let mut second = HubSession::new(ctx, second_handle.clone(), "second");
        second.on_frame(&signup_frame(&keypair, "cb-2", &keypair)).await;
        let validator_id = match second_rx.try_recv().unwrap() {
            ValidatorBound::SignupAck(ack) => ack.validator_id,
            other => panic!("unexpected message: {other:?}"),
        };

        let snapshot = f.registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].handle, second_handle);

        let dispatcher = Dispatcher::new(
            f.storage.clone(),
            f.registry.clone(),
            f.callbacks.clone(),
            DispatchConfig::default(),
        );
        let summary = dispatcher.dispatch_tick().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert!(first_rx.try_recv().is_err());

        let request = match second_rx.try_recv().unwrap() {
            ValidatorBound::CheckRequest(request) => request,
            other => panic!("unexpected message: {other:?}"),
        };
        let signature =
            sign(&Challenge::Reply { correlation_id: &request.correlation_id }, &keypair);
        let reply = protocol::encode(&HubBound::CheckReply(CheckReply {
            correlation_id: request.correlation_id.clone(),
            validator_id: validator_id.clone(),
            target_id: request.target_id.clone(),
            outcome: CheckOutcome::Good,
            latency_millis: 30,
            signature,
        }))
        .unwrap();
        second.on_frame(&reply).await;

        assert_eq!(f.storage.ticks().await.len(), 1);
        assert_eq!(f.storage.validator(&validator_id).await.unwrap().pending_reward, 100);

        // Closing the superseded session leaves the live entry alone
        first.close().await;
        assert_eq!(f.registry.len().await, 1);
    }
}
