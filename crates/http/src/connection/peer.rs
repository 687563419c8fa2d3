//! The worker telemetry flavour of a WebSocket connection.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::PeerRecord;
use crate::connection::{FrameHook, UpgradeParams, WebSocketConnection};

/// Receives every telemetry record a peer sends.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    fn record(&self, params: &UpgradeParams, record: PeerRecord);
}

/// Logs records instead of keeping them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl TelemetrySink for LoggingSink {
    fn record(&self, params: &UpgradeParams, record: PeerRecord) {
        info!(peer = params.param("uid"), addr = %record.addr, age = record.age, "peer telemetry");
    }
}

/// Decodes each frame as a [`PeerRecord`] and forwards it to a [`TelemetrySink`].
///
/// A frame that does not decode is logged and otherwise ignored; it is still echoed
/// and the connection stays open.
#[derive(Clone)]
pub struct PeerHook {
    sink: Arc<dyn TelemetrySink>,
}

impl PeerHook {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

impl std::fmt::Debug for PeerHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHook").finish_non_exhaustive()
    }
}

impl FrameHook for PeerHook {
    fn on_frame(&mut self, params: &UpgradeParams, payload: &[u8]) {
        match PeerRecord::decode(payload) {
            Ok(record) => {
                debug!(addr = %record.addr, age = record.age, "peer record");
                self.sink.record(params, record);
            }
            Err(e) => warn!(cause = %e, len = payload.len(), "undecodable peer record"),
        }
    }
}

pub type PeerConnection<S> = WebSocketConnection<S, PeerHook>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::websocket::tests::upgraded;
    use crate::handler::PathParams;
    use futures::{SinkExt, StreamExt};
    use mockall::predicate::{always, eq};
    use tokio::io::duplex;
    use tokio_tungstenite::client_async;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn record_is_forwarded_and_echoed() {
        let mut sink = MockTelemetrySink::new();
        sink.expect_record().with(always(), eq(PeerRecord::new("10.0.0.5", 42))).times(1).return_const(());

        let (client, server) = duplex(4096);
        let task = tokio::spawn(async move {
            let upgrade = upgraded(server).await;
            let params = UpgradeParams::from_request(&upgrade.request, &[("uid", "abc")].into_iter().collect());
            PeerConnection::new(upgrade, params, PeerHook::new(Arc::new(sink))).process().await
        });

        let (mut ws, _) = client_async("ws://localhost/miner/abc", client).await.unwrap();

        let frame = PeerRecord::new("10.0.0.5", 42).to_bytes();
        ws.send(Message::binary(frame.clone())).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::Binary(frame));

        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn undecodable_frame_keeps_connection_open() {
        let mut sink = MockTelemetrySink::new();
        sink.expect_record().with(always(), eq(PeerRecord::new("10.0.0.9", 7))).times(1).return_const(());

        let (client, server) = duplex(4096);
        let task = tokio::spawn(async move {
            let upgrade = upgraded(server).await;
            let params = UpgradeParams::from_request(&upgrade.request, &PathParams::empty());
            PeerConnection::new(upgrade, params, PeerHook::new(Arc::new(sink))).process().await
        });

        let (mut ws, _) = client_async("ws://localhost/miner/abc", client).await.unwrap();

        // length prefix runs past the end of the payload
        let broken = vec![0x0a, 0x10, b'x'];
        ws.send(Message::binary(broken.clone())).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::binary(broken));

        let valid = PeerRecord::new("10.0.0.9", 7).to_bytes();
        ws.send(Message::binary(valid.clone())).await.unwrap();
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::Binary(valid));

        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn logging_sink_accepts_records() {
        LoggingSink.record(&UpgradeParams::from(serde_json::json!({})), PeerRecord::default());
    }
}
