//! Real-time event stream
//!
//! `GET /ws?since=N` replays the recorded events after sequence number `N`,
//! then streams every new one as it is recorded. Without `since` only new
//! events are sent. Each message is one JSON-encoded [`EventRecord`].

use crate::api::handlers::ApiState;
use crate::core::EventRecord;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

/// Records buffered per subscriber before it starts lagging
const STREAM_CAPACITY: usize = 256;

/// Fan-out of newly recorded events to open streams
#[derive(Debug)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<EventRecord>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self { sender }
    }

    /// Send `record` to every open stream; dropped when nobody listens
    pub fn publish(&self, record: EventRecord) {
        let _ = self.sender.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Replay records after this sequence number first
    pub since: Option<u64>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    // Subscribe before reading the backlog so nothing recorded in between is lost
    let live = state.ws_broadcaster.subscribe();
    let backlog = match query.since {
        Some(seq) => state.runtime.read().await.events_since(seq).to_vec(),
        None => Vec::new(),
    };
    ws.on_upgrade(move |socket| stream_events(socket, backlog, live))
}

fn encode(record: &EventRecord) -> Option<Message> {
    match serde_json::to_string(record) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            log::warn!("Failed to encode event #{}: {}", record.seq, e);
            None
        }
    }
}

async fn stream_events(
    socket: WebSocket,
    backlog: Vec<EventRecord>,
    mut live: broadcast::Receiver<EventRecord>,
) {
    let (mut sink, mut incoming) = socket.split();
    let mut last_sent = 0;

    for record in &backlog {
        let Some(message) = encode(record) else {
            continue;
        };
        if sink.send(message).await.is_err() {
            return;
        }
        last_sent = record.seq;
    }
    log::debug!("Event stream opened after #{}", last_sent);

    let mut forward = tokio::spawn(async move {
        loop {
            match live.recv().await {
                // Already part of the backlog
                Ok(record) if record.seq <= last_sent => {}
                Ok(record) => {
                    let Some(message) = encode(&record) else {
                        continue;
                    };
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Clients never send anything but a close
    let mut drain = tokio::spawn(async move {
        while let Some(message) = incoming.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut forward => drain.abort(),
        _ = &mut drain => forward.abort(),
    }
    log::debug!("Event stream closed");
}
