//! Native transport over `tokio-tungstenite`.

use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::RelayError;
use crate::relay::transport::{Connector, OutboundFrame, Transport, TransportEvent, CLOSE_ABNORMAL};

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport, RelayError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str()).await.map_err(RelayError::from)?;
            let (sink, stream) = ws_stream.split();

            let sink = sink
                .sink_map_err(RelayError::from)
                .with(|frame: OutboundFrame| future::ready(Ok::<_, RelayError>(to_message(frame))));

            let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text.into()),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn from_message(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<TransportEvent> {
    match msg {
        Ok(Message::Text(text)) => {
            let text_str: &str = text.as_ref();
            Some(TransportEvent::Text(text_str.to_owned()))
        }
        Ok(Message::Close(frame)) => {
            let (code, reason) = extract_close(frame.as_ref());
            Some(TransportEvent::Closed { code, reason })
        }
        // Binary, Ping, Pong, Frame: tungstenite answers pings itself
        Ok(_) => None,
        Err(e) => Some(TransportEvent::Error(e.to_string())),
    }
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (CLOSE_ABNORMAL, "No close frame".into()),
    }
}
