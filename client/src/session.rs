//! The live war view: one task owns the reconciler and feeds it polled
//! snapshots, socket pushes and local commands.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{interval, sleep_until, Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use war_api::prelude::*;

use crate::{
    auth::TokenStore,
    config::ClientConfig,
    error::{ClientError, Result},
    reconciler::{DisplayState, Reconciler, RequestTicket, Snapshot},
    rest::WarBackend,
    rpc::{wait_for_confirmation, SignatureConfirmer, SignatureStatus},
    socket::{ConnectionStatus, InboundEvent, RoomSubscription, SocketHandle},
};

/// Poll failures in a row before the view reports stale data.
const STALE_AFTER_FAILURES: u32 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    /// Holding the room but the connection is not up yet.
    Subscribing,
    Subscribed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub display: DisplayState,
    pub subscription: SubscriptionState,
    /// True until the first snapshot for the current war lands.
    pub loading: bool,
    pub pending_transactions: Vec<String>,
    pub notices: Vec<Notice>,
}

/// Everything a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub config: ClientConfig,
    pub backend: Arc<dyn WarBackend>,
    pub confirmer: Arc<dyn SignatureConfirmer>,
    pub auth: Arc<dyn TokenStore>,
    pub socket: SocketHandle,
    /// Connected wallet, if any. Used for user state and as chat sender.
    pub wallet: Option<String>,
}

enum Command {
    SwitchWar(WarId),
    Refresh,
    SendChat {
        token: String,
        body: String,
        reply: oneshot::Sender<Result<ChatMessage>>,
    },
    TrackTransaction(String),
    Shutdown(oneshot::Sender<()>),
}

enum Outcome {
    Snapshot(RequestTicket, Result<Snapshot>),
    Chat(RequestTicket, u64, Result<Vec<ChatMessage>>),
    User(RequestTicket, Result<Option<UserState>>),
    ChatSent {
        ticket: RequestTicket,
        local_id: u64,
        result: Result<ChatMessage>,
        reply: oneshot::Sender<Result<ChatMessage>>,
    },
    Confirmation {
        ticket: RequestTicket,
        signature: String,
        result: Result<SignatureStatus>,
    },
}

/// Control surface of a running session. Dropping every handle stops it.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    auth: Arc<dyn TokenStore>,
}

impl SessionHandle {
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn switch_war(&self, war_id: WarId) -> Result<()> {
        self.send(Command::SwitchWar(war_id))
    }

    /// Re-fetch the baseline now instead of at the next interval.
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Post a chat message. Fails with [`ClientError::AuthRequired`] without
    /// touching the network when no token is stored.
    pub async fn send_chat(&self, body: &str) -> Result<ChatMessage> {
        let token = self.auth.token().ok_or(ClientError::AuthRequired)?;
        let (reply, response) = oneshot::channel();
        self.send(Command::SendChat {
            token,
            body: body.to_string(),
            reply,
        })?;
        response.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Follow a submitted transaction until it lands or times out.
    pub fn track_transaction(&self, signature: &str) -> Result<()> {
        self.send(Command::TrackTransaction(signature.to_string()))
    }

    /// Stop the session and wait until it has left its room.
    pub async fn shutdown(self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| ClientError::SessionClosed)
    }
}

pub struct WarSession {
    reconciler: Reconciler,
    deps: SessionDeps,
    room: Option<RoomSubscription>,
    connection: ConnectionStatus,
    loading: bool,
    poll_in_flight: Option<RequestTicket>,
    repoll_after_current: bool,
    chat_issued: u64,
    chat_applied: u64,
    poll_failures: u32,
    refetch_at: Option<Instant>,
    pending_transactions: HashMap<String, Instant>,
    notices: Vec<(Notice, Instant)>,
    tasks: FuturesUnordered<BoxFuture<'static, Outcome>>,
    state: watch::Sender<SessionState>,
}

impl WarSession {
    /// Start a session for `war_id` on the current runtime.
    pub fn mount(war_id: WarId, deps: SessionDeps) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState {
            loading: true,
            ..Default::default()
        });
        let auth = Arc::clone(&deps.auth);

        let reconciler = Reconciler::with_highlights(war_id, deps.config.trade_highlight, deps.config.chat_highlight);
        let connection = *deps.socket.status().borrow();
        let session = Self {
            reconciler,
            deps,
            room: None,
            connection,
            loading: true,
            poll_in_flight: None,
            repoll_after_current: false,
            chat_issued: 0,
            chat_applied: 0,
            poll_failures: 0,
            refetch_at: None,
            pending_transactions: HashMap::new(),
            notices: Vec::new(),
            tasks: FuturesUnordered::new(),
            state: state_tx,
        };
        tokio::spawn(session.run(commands_rx));

        SessionHandle {
            commands: commands_tx,
            state: state_rx,
            auth,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Mounting war {}", self.reconciler.war_id());
        let mut events = self.deps.socket.events();
        let mut status = self.deps.socket.status();
        let mut events_open = true;
        let mut status_open = true;

        let mut poll = interval(self.deps.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.subscribe();
        self.publish();

        let mut done = None;
        loop {
            let deadline = self.next_deadline();
            let wake = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        done = Some(reply);
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => break,
                },
                _ = poll.tick() => self.poll(),
                Some(outcome) = self.tasks.next(), if !self.tasks.is_empty() => self.on_outcome(outcome),
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} socket events, re-fetching", missed);
                        self.poll();
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                changed = status.changed(), if status_open => match changed {
                    Ok(()) => {
                        let connection = *status.borrow_and_update();
                        self.on_connection(connection);
                    }
                    Err(_) => {
                        status_open = false;
                        self.on_connection(ConnectionStatus::Closed);
                    }
                },
                _ = sleep_until(wake), if deadline.is_some() => self.on_deadline(Instant::now()),
            }

            self.publish();
        }

        self.unsubscribe();
        self.publish();
        info!("Unmounted war {}", self.reconciler.war_id());
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn subscribe(&mut self) {
        self.room = Some(self.deps.socket.subscribe(GAME_ROOM));
    }

    fn unsubscribe(&mut self) {
        self.room = None;
    }

    fn subscription(&self) -> SubscriptionState {
        match (&self.room, self.connection) {
            (None, _) => SubscriptionState::Unsubscribed,
            (Some(_), ConnectionStatus::Connected) => SubscriptionState::Subscribed,
            (Some(_), _) => SubscriptionState::Subscribing,
        }
    }

    fn on_connection(&mut self, connection: ConnectionStatus) {
        if connection == self.connection {
            return;
        }
        debug!("Socket {:?} -> {:?}", self.connection, connection);
        let reconnected = connection == ConnectionStatus::Connected;
        self.connection = connection;
        // Pushes missed while disconnected only show up in the baseline.
        if reconnected && !self.loading {
            self.poll();
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SwitchWar(war_id) => self.switch_war(war_id),
            Command::Refresh => self.poll(),
            Command::SendChat { token, body, reply } => self.send_chat(token, body, reply),
            Command::TrackTransaction(signature) => self.track_transaction(signature),
            Command::Shutdown(_) => {}
        }
    }

    fn switch_war(&mut self, war_id: WarId) {
        if &war_id == self.reconciler.war_id() {
            return;
        }
        info!("Switching war {} -> {}", self.reconciler.war_id(), war_id);
        // Leave before joining so the room sees a full unsubscribe/subscribe.
        self.unsubscribe();
        self.reconciler.switch_war(war_id);
        self.loading = true;
        self.poll_in_flight = None;
        self.repoll_after_current = false;
        self.poll_failures = 0;
        self.refetch_at = None;
        self.pending_transactions.clear();
        self.subscribe();
        self.poll();
    }

    fn poll(&mut self) {
        if let Some(ticket) = &self.poll_in_flight {
            if self.reconciler.is_current(ticket) {
                // The running poll may predate whatever asked for this one.
                debug!("Poll for war {} still in flight, queueing another", ticket.war_id());
                self.repoll_after_current = true;
                return;
            }
        }
        let ticket = self.reconciler.begin_request();
        self.poll_in_flight = Some(ticket.clone());
        let war_id = ticket.war_id().clone();

        let backend = Arc::clone(&self.deps.backend);
        let (t, id) = (ticket.clone(), war_id.clone());
        self.tasks.push(
            async move {
                let result = tokio::try_join!(backend.war(&id), backend.trades(&id))
                    .map(|(war, trades)| Snapshot { war, trades });
                Outcome::Snapshot(t, result)
            }
            .boxed(),
        );

        self.chat_issued += 1;
        let seq = self.chat_issued;
        let backend = Arc::clone(&self.deps.backend);
        let (t, id) = (ticket.clone(), war_id.clone());
        self.tasks
            .push(async move { Outcome::Chat(t, seq, backend.chat(&id).await) }.boxed());

        if let Some(wallet) = &self.deps.wallet {
            match user_state_address(&war_id, wallet) {
                Ok(address) => {
                    let backend = Arc::clone(&self.deps.backend);
                    let address = address.to_string();
                    self.tasks.push(
                        async move { Outcome::User(ticket, backend.user_state(&address).await) }.boxed(),
                    );
                }
                Err(e) => debug!("No user state for war {}: {}", war_id, e),
            }
        }
    }

    fn send_chat(&mut self, token: String, body: String, reply: oneshot::Sender<Result<ChatMessage>>) {
        let war_id = self.reconciler.war_id().clone();
        let message = ChatMessage {
            id: None,
            sender_address: self.deps.wallet.clone().unwrap_or_else(|| UNKNOWN_WALLET.to_string()),
            body: body.clone(),
            sent_at: Utc::now(),
            war_id: war_id.clone(),
        };
        let Some(local_id) = self.reconciler.send_optimistic_chat(message) else {
            let _ = reply.send(Err(ClientError::SessionClosed));
            return;
        };

        let ticket = self.reconciler.begin_request();
        let backend = Arc::clone(&self.deps.backend);
        self.tasks.push(
            async move {
                let result = backend.send_chat(&token, &war_id, &body).await;
                Outcome::ChatSent {
                    ticket,
                    local_id,
                    result,
                    reply,
                }
            }
            .boxed(),
        );
    }

    fn track_transaction(&mut self, signature: String) {
        let now = Instant::now();
        info!("Tracking transaction {}", signature);
        self.pending_transactions
            .insert(signature.clone(), now + self.deps.config.confirm_timeout);
        self.refetch_at = Some(now + self.deps.config.refetch_delay);

        let ticket = self.reconciler.begin_request();
        let confirmer = Arc::clone(&self.deps.confirmer);
        let (poll, timeout) = (self.deps.config.confirm_poll, self.deps.config.confirm_timeout);
        self.tasks.push(
            async move {
                let result = wait_for_confirmation(&*confirmer, &signature, poll, timeout).await;
                Outcome::Confirmation {
                    ticket,
                    signature,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn on_event(&mut self, event: InboundEvent) {
        let now = Instant::now();
        match event {
            InboundEvent::Game(update) => {
                self.reconciler.apply_incremental_event(update, now);
            }
            InboundEvent::Chat(message) => {
                self.reconciler.apply_chat_event(message, now);
            }
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Snapshot(ticket, result) => {
                let finished = self.poll_in_flight.as_ref() == Some(&ticket);
                if finished {
                    self.poll_in_flight = None;
                }
                match result {
                    Ok(snapshot) => {
                        if self.reconciler.apply_snapshot(&ticket, snapshot) {
                            self.loading = false;
                            self.poll_failures = 0;
                        }
                    }
                    Err(e) => {
                        if self.on_poll_error(&ticket, "war", e) {
                            self.poll_failures += 1;
                            if self.poll_failures == STALE_AFTER_FAILURES {
                                self.notify(NoticeLevel::Error, "Live data may be out of date".to_string());
                            }
                        }
                    }
                }
                if finished && self.repoll_after_current {
                    self.repoll_after_current = false;
                    self.poll();
                }
            }
            Outcome::Chat(ticket, seq, result) => match result {
                Ok(messages) => {
                    // Chat lists can overtake each other; keep the newest request's.
                    if seq < self.chat_applied {
                        debug!("Dropping chat list {} older than {}", seq, self.chat_applied);
                        return;
                    }
                    if self.reconciler.apply_chat_snapshot(&ticket, messages) {
                        self.chat_applied = seq;
                    }
                }
                Err(e) => {
                    self.on_poll_error(&ticket, "chat", e);
                }
            },
            Outcome::User(ticket, result) => match result {
                Ok(user) => {
                    self.reconciler.apply_user_state(&ticket, user);
                }
                Err(e) => {
                    self.on_poll_error(&ticket, "user state", e);
                }
            },
            Outcome::ChatSent {
                ticket,
                local_id,
                result,
                reply,
            } => {
                let result = result.map_err(|e| if e.is_auth_failure() { ClientError::AuthRequired } else { e });
                if self.reconciler.is_current(&ticket) {
                    match &result {
                        Ok(message) => {
                            self.reconciler.confirm_chat(local_id, message.clone());
                        }
                        Err(e) => {
                            warn!("Chat message rejected: {}", e);
                            self.reconciler.fail_chat(local_id);
                        }
                    }
                }
                let _ = reply.send(result);
            }
            Outcome::Confirmation {
                ticket,
                signature,
                result,
            } => {
                if !self.reconciler.is_current(&ticket) || self.pending_transactions.remove(&signature).is_none() {
                    debug!("Dropping confirmation of {}", signature);
                    return;
                }
                match result {
                    Ok(SignatureStatus::Confirmed) => {
                        info!("Transaction {} confirmed", signature);
                        self.notify(NoticeLevel::Info, "Transaction confirmed".to_string());
                        self.poll();
                    }
                    Ok(SignatureStatus::Failed(reason)) => {
                        warn!("Transaction {} failed: {}", signature, reason);
                        self.notify(NoticeLevel::Error, format!("Transaction failed: {}", reason));
                    }
                    Ok(SignatureStatus::Pending) => {
                        self.notify(NoticeLevel::Error, "Transaction was not confirmed in time".to_string());
                    }
                    Err(e) => {
                        self.notify(NoticeLevel::Error, format!("Could not confirm transaction: {}", e));
                    }
                }
            }
        }
    }

    /// Log a failed fetch. The previous baseline stays on screen. Returns
    /// false for failures of a war that is no longer shown.
    fn on_poll_error(&self, ticket: &RequestTicket, what: &str, e: ClientError) -> bool {
        if !self.reconciler.is_current(ticket) {
            return false;
        }
        warn!("Failed to fetch {} for war {}: {}", what, ticket.war_id(), e);
        true
    }

    fn on_deadline(&mut self, now: Instant) {
        self.reconciler.expire_highlights(now);

        if self.refetch_at.is_some_and(|at| at <= now) {
            self.refetch_at = None;
            self.poll();
        }

        let expired: Vec<String> = self
            .pending_transactions
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(signature, _)| signature.clone())
            .collect();
        for signature in expired {
            warn!("Gave up on transaction {}", signature);
            self.pending_transactions.remove(&signature);
            self.notify(NoticeLevel::Error, "Transaction was not confirmed in time".to_string());
        }

        self.notices.retain(|(_, until)| *until > now);
    }

    fn notify(&mut self, level: NoticeLevel, text: String) {
        let until = Instant::now() + self.deps.config.notice_ttl;
        self.notices.push((Notice { level, text }, until));
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.reconciler
            .next_deadline()
            .into_iter()
            .chain(self.refetch_at)
            .chain(self.pending_transactions.values().copied())
            .chain(self.notices.iter().map(|(_, until)| *until))
            .min()
    }

    fn publish(&self) {
        let mut pending_transactions: Vec<String> = self.pending_transactions.keys().cloned().collect();
        pending_transactions.sort();
        let next = SessionState {
            display: self.reconciler.view().clone(),
            subscription: self.subscription(),
            loading: self.loading,
            pending_transactions,
            notices: self.notices.iter().map(|(notice, _)| notice.clone()).collect(),
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
