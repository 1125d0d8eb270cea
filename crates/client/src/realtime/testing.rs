//! In-memory transport for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use super::transport::{Link, LinkPeer, Transport, TransportKind};
use crate::error::TransportError;

/// What the next `open` call does
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Accept,
    Fail,
    /// Never completes; exercises the handshake timeout
    Hang,
}

/// Plays back a fixed script of handshake outcomes, then fails forever
pub(crate) struct ScriptedTransport {
    kind: TransportKind,
    script: Mutex<VecDeque<Step>>,
    peers: mpsc::UnboundedSender<LinkPeer>,
    opens: AtomicU32,
}

impl ScriptedTransport {
    pub(crate) fn new(
        kind: TransportKind,
        steps: impl IntoIterator<Item = Step>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            kind,
            script: Mutex::new(steps.into_iter().collect()),
            peers,
            opens: AtomicU32::new(0),
        });
        (transport, peer_rx)
    }

    pub(crate) fn shared(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::clone(self) as Arc<dyn Transport>
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, _endpoint: &Url, _token: Option<&str>) -> Result<Link, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .map(|mut script| script.pop_front())
            .unwrap_or(None)
            .unwrap_or(Step::Fail);

        match step {
            Step::Accept => {
                let (link, peer) = Link::pair(self.kind);
                let _ = self.peers.send(peer);
                Ok(link)
            }
            Step::Fail => Err(TransportError::Handshake {
                kind: self.kind,
                message: "connection refused".into(),
            }),
            Step::Hang => {
                futures::future::pending::<()>().await;
                Err(TransportError::Closed)
            }
        }
    }
}
