//! In-memory transport for client tests.
//!
//! Each accepted connection is handed to the test as a [`MockSocket`]:
//! frames the client writes show up on `next_frame()`, and the test pushes
//! relay frames with `send_text()` / `close()`. Dropping the socket ends
//! the client's stream without a close frame.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::RelayError;
use crate::relay::transport::{Connector, OutboundFrame, Transport, TransportEvent};

const WAIT: Duration = Duration::from_secs(2);

/// What the next connection attempt does. Unscripted attempts are accepted.
#[derive(Debug, Clone)]
pub(crate) enum Plan {
    Accept,
    Refuse(RelayError),
    /// Never resolves; only the connect timeout ends it
    Hang,
}

#[derive(Debug)]
struct State {
    script: VecDeque<Plan>,
    connects: usize,
    accepted_tx: mpsc::UnboundedSender<MockSocket>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<State>>,
    accepted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockSocket>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(State {
                script: VecDeque::new(),
                connects: 0,
                accepted_tx,
            })),
            accepted_rx: Arc::new(tokio::sync::Mutex::new(accepted_rx)),
        }
    }

    /// Queue the outcome of a future connection attempt.
    pub(crate) fn script(&self, plan: Plan) {
        self.state.lock().unwrap().script.push_back(plan);
    }

    /// Connection attempts made so far.
    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Next accepted connection.
    pub(crate) async fn accepted(&self) -> MockSocket {
        let mut rx = self.accepted_rx.lock().await;
        timeout(WAIT, rx.recv())
            .await
            .expect("no connection accepted")
            .expect("connector dropped")
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Transport, RelayError>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;

        match state.script.pop_front().unwrap_or(Plan::Accept) {
            Plan::Accept => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();

                let sink = sink::unfold(
                    out_tx,
                    |tx: mpsc::UnboundedSender<OutboundFrame>, frame: OutboundFrame| async move {
                        tx.send(frame).map_err(|_| RelayError::ChannelClosed)?;
                        Ok::<_, RelayError>(tx)
                    },
                );
                let stream = stream::unfold(in_rx, |mut rx| async move {
                    rx.recv().await.map(|event| (event, rx))
                });

                let _ = state.accepted_tx.send(MockSocket {
                    outbound: out_rx,
                    inbound: in_tx,
                });

                Box::pin(future::ready(Ok(Transport {
                    sink: Box::pin(sink),
                    stream: Box::pin(stream),
                })))
            }
            Plan::Refuse(err) => Box::pin(future::ready(Err(err))),
            Plan::Hang => Box::pin(future::pending()),
        }
    }
}

/// Relay side of one accepted connection.
#[derive(Debug)]
pub(crate) struct MockSocket {
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MockSocket {
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.inbound.send(TransportEvent::Text(text.to_string()));
    }

    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next frame written by the client.
    pub(crate) async fn next_frame(&mut self) -> OutboundFrame {
        timeout(WAIT, self.outbound.recv())
            .await
            .expect("client sent nothing")
            .expect("client sink dropped")
    }

    /// Frames already written and not yet read.
    pub(crate) fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Resolves once the client has dropped its end.
    pub(crate) async fn closed(&mut self) {
        while self.outbound.recv().await.is_some() {}
    }
}
