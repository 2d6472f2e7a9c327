//! Event stream pump — the transport adapter for the fleet push channel.
//!
//! Reads the controller's newline-delimited JSON event stream and forwards
//! every decodable firewall event into the bounded reconciler channel.
//! Reconnects with capped exponential backoff; a full channel applies
//! backpressure to the socket rather than dropping events, preserving
//! arrival order end to end.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::events::{self, FleetEvent};
use crate::upstream::{ControllerClient, UpstreamError};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub async fn run_pump(client: Arc<ControllerClient>, tx: mpsc::Sender<FleetEvent>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match client.open_event_stream().await {
            Ok(resp) => {
                info!("event stream connected");
                backoff = INITIAL_BACKOFF;
                if drain(resp, &tx).await.is_err() {
                    // Receiver dropped: the daemon is shutting down.
                    return;
                }
                warn!("event stream closed by controller, reconnecting");
            }
            Err(UpstreamError::AuthRequired) => {
                warn!("event stream rejected: authentication required");
            }
            Err(err) => {
                warn!(error = %err, "event stream connection failed");
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Forward events from one connected stream until it ends.
///
/// Returns `Err(())` only when the reconciler side has gone away.
async fn drain(resp: reqwest::Response, tx: &mpsc::Sender<FleetEvent>) -> Result<(), ()> {
    let mut body = resp.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "event stream read failed");
                return Ok(());
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match events::decode(line) {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        return Err(());
                    }
                }
                Ok(None) => debug!("skipping event of unhandled kind"),
                Err(err) => warn!(error = %err, "dropping undecodable event line"),
            }
        }
    }
    Ok(())
}
