//! Validator: holds a signing key, connects to the hub, probes on request.

pub mod executor;
pub mod probe;
pub mod session;

pub use executor::ProbeExecutor;
pub use probe::{HttpProber, Prober};
pub use session::{ValidatorSession, ValidatorState};

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

use crate::config::ValidatorConfig;
use crate::crypto::KeyPair;
use crate::protocol::{self, HubBound};

/// Replies that may be waiting for the writer
const OUTBOUND_QUEUE: usize = 256;

/// A running validator
pub struct ValidatorNode {
    hub_url: String,
    origin_address: String,
    keypair: Arc<KeyPair>,
    executor: Arc<ProbeExecutor>,
}

impl ValidatorNode {
    /// Validator probing over HTTP with the configured timeout
    pub fn new(config: &ValidatorConfig, keypair: KeyPair) -> Result<Self> {
        validate_hub_url(&config.hub.url)?;
        let prober = Arc::new(HttpProber::new(config.probe.timeout())?);
        Ok(Self::with_prober(config, keypair, prober))
    }

    pub fn with_prober(
        config: &ValidatorConfig,
        keypair: KeyPair,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let keypair = Arc::new(keypair);
        Self {
            hub_url: config.hub.url.clone(),
            origin_address: config.identity.origin_address.clone(),
            executor: Arc::new(ProbeExecutor::new(prober, keypair.clone())),
            keypair,
        }
    }

    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    /// Connect, sign up and serve check requests until the hub closes the connection
    pub async fn run(&self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.hub_url.as_str())
            .await
            .with_context(|| format!("Failed to connect to hub at {}", self.hub_url))?;
        info!(hub = %self.hub_url, public_key = %self.public_key_hex(), "Connected to hub");

        let (mut sink, mut source) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<HubBound>(OUTBOUND_QUEUE);

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
                    debug!("Write to hub failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut session = ValidatorSession::new(
            self.executor.clone(),
            self.keypair.clone(),
            self.origin_address.clone(),
            tx.clone(),
        );

        tx.send(session.begin_handshake()).await.context("Hub connection closed during signup")?;

        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => session.on_frame(&text).await,
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => debug!("Discarding binary frame from hub"),
                Ok(_) => {}
                Err(e) => {
                    debug!("Read from hub failed: {e}");
                    break;
                }
            }
        }

        session.close();
        writer.abort();
        info!("Hub connection closed");
        Ok(())
    }
}

/// The hub must be reached over `ws://` or `wss://`
pub fn validate_hub_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).with_context(|| format!("Invalid hub URL {raw}"))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => bail!("Unsupported hub URL scheme {other}, expected ws or wss"),
    }
}
