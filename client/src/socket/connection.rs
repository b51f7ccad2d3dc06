use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use war_api::prelude::*;

use super::{
    frame::{decode, encode, Packet},
    rooms::{RoomRegistry, RoomSubscription},
};
use crate::error::{ClientError, Result};

const EVENT_BUFFER: usize = 1024;

/// A decoded push from the shared game room.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Game(GameUpdate),
    Chat(ChatMessage),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

/// What consumers of a connection get: room membership, the event stream
/// and the connection status. Cheap to clone.
#[derive(Clone)]
pub struct SocketHandle {
    rooms: Arc<RoomRegistry>,
    events: broadcast::Sender<InboundEvent>,
    status: watch::Receiver<ConnectionStatus>,
}

impl SocketHandle {
    pub fn subscribe(&self, room: &str) -> RoomSubscription {
        self.rooms.subscribe(room)
    }

    pub fn events(&self) -> broadcast::Receiver<InboundEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// One socket connection with an explicit open/close lifetime. Dropping it
/// closes the connection too.
pub struct SocketConnection {
    handle: SocketHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// The driving half of a connection: frames to write, events to publish.
pub struct SocketIo {
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub events: broadcast::Sender<InboundEvent>,
    pub status: watch::Sender<ConnectionStatus>,
    pub rooms: Arc<RoomRegistry>,
    pub shutdown: oneshot::Receiver<()>,
}

enum Exit {
    Closed,
    Shutdown,
}

enum Step {
    Reply(Vec<String>),
    Exit,
    Rejected(String),
}

impl SocketConnection {
    /// Connect to the backend socket and keep reconnecting until closed.
    pub fn open(url: &str) -> Self {
        let (mut connection, io) = Self::unconnected();
        let endpoint = socket_endpoint(url);
        connection.task = Some(tokio::spawn(io.run(endpoint)));
        connection
    }

    /// A connection with no transport attached. The returned [`SocketIo`]
    /// stands in for the wire.
    pub fn unconnected() -> (Self, SocketIo) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let rooms = RoomRegistry::new(outbound_tx);

        let connection = Self {
            handle: SocketHandle {
                rooms: Arc::clone(&rooms),
                events: events.clone(),
                status: status_rx,
            },
            shutdown: Some(shutdown_tx),
            task: None,
        };
        let io = SocketIo {
            outbound: outbound_rx,
            events,
            status: status_tx,
            rooms,
            shutdown: shutdown_rx,
        };
        (connection, io)
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle.clone()
    }

    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Socket task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl SocketIo {
    async fn run(mut self, url: String) {
        let mut delay = Duration::from_secs(1);
        let max_delay = Duration::from_secs(30);

        loop {
            self.status.send_replace(ConnectionStatus::Connecting);
            match self.stream(&url).await {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Closed) => {
                    info!("Socket closed by server");
                    delay = Duration::from_secs(1);
                }
                Err(e) => error!("Socket error: {}", e),
            }

            self.status.send_replace(ConnectionStatus::Disconnected);
            warn!("Reconnecting socket in {:?}", delay);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut self.shutdown => break,
            }
            delay = (delay * 2).min(max_delay);
        }

        self.status.send_replace(ConnectionStatus::Closed);
        info!("Socket closed");
    }

    async fn stream(&mut self, url: &str) -> Result<Exit> {
        let (ws_stream, response) = connect_async(url).await?;
        info!("Socket connected (status: {})", response.status());
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => match self.on_frame(&text) {
                        Step::Reply(frames) => {
                            for frame in frames {
                                write.send(Message::Text(frame)).await?;
                            }
                        }
                        Step::Exit => return Ok(Exit::Closed),
                        Step::Rejected(reason) => return Err(ClientError::Protocol(reason)),
                    },
                    Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(Exit::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                frame = self.outbound.recv() => match frame {
                    Some(frame) if self.is_connected() => write.send(Message::Text(frame)).await?,
                    // Rooms are rejoined on connect, so nothing is lost.
                    Some(frame) => debug!("Socket not connected, dropping {}", frame),
                    None => return Ok(Exit::Shutdown),
                },
                _ = &mut self.shutdown => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Exit::Shutdown);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionStatus::Connected
    }

    fn on_frame(&mut self, text: &str) -> Step {
        let packet = match decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Ignoring socket frame: {}", e);
                return Step::Reply(vec![]);
            }
        };

        match packet {
            Packet::Open(handshake) => {
                debug!("Socket handshake {}", handshake.sid);
                Step::Reply(vec![encode(&Packet::Connect(None))])
            }
            Packet::Ping => Step::Reply(vec![encode(&Packet::Pong)]),
            Packet::Connect(_) => {
                self.status.send_replace(ConnectionStatus::Connected);
                Step::Reply(self.rooms.rejoin_frames())
            }
            Packet::Event { name, payload } => {
                self.publish(&name, &payload);
                Step::Reply(vec![])
            }
            Packet::ConnectError(reason) => Step::Rejected(reason.to_string()),
            Packet::Disconnect | Packet::Close => Step::Exit,
            Packet::Pong | Packet::Noop => Step::Reply(vec![]),
        }
    }

    /// Decode a room event and hand it to every listener.
    pub fn publish(&self, name: &str, payload: &Value) {
        let event = match name {
            GAME_UPDATE_EVENT => InboundEvent::Game(decode_game_update(payload, Utc::now().timestamp())),
            CHAT_UPDATE_EVENT => InboundEvent::Chat(decode_chat(payload, Utc::now())),
            other => {
                debug!("Ignoring socket event {}", other);
                return;
            }
        };
        // No listeners simply means no war view is mounted.
        let _ = self.events.send(event);
    }
}

/// Turn a backend base url into the Socket.IO websocket endpoint.
pub fn socket_endpoint(url: &str) -> String {
    let url = url.trim_end_matches('/');
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    };
    if url.contains("/socket.io") {
        url
    } else {
        format!("{}/socket.io/?EIO=4&transport=websocket", url)
    }
}
