//! Merges polled snapshots, socket pushes and local optimistic updates into
//! one display state for the active war.
//!
//! Everything here is synchronous. Callers pass the current time in, which
//! keeps highlight expiry deterministic and lets the session loop decide
//! when to wake up.

use std::collections::{HashMap, HashSet};

use tokio::time::{Duration, Instant};
use war_api::prelude::*;

/// Identifies the war context a request was issued under. A response whose
/// ticket no longer matches is stale and gets dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    war_id: WarId,
    epoch: u64,
}

impl RequestTicket {
    pub fn war_id(&self) -> &WarId {
        &self.war_id
    }
}

/// A polled war: aggregate totals plus the authoritative trade list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub war: WarSnapshot,
    pub trades: Vec<TradeEvent>,
}

/// What rendering code reads. Never mutated outside the reconciler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub war_id: WarId,
    pub war: Option<WarSnapshot>,
    pub user: Option<UserState>,
    /// Trades per side, newest first.
    pub trades: [Vec<TradeEvent>; SIDES],
    /// Chat lines, newest first.
    pub chat: Vec<ChatEntry>,
    pub highlighted_trade: Option<TradeKey>,
    pub highlighted_chat: Option<String>,
}

impl DisplayState {
    pub fn trades(&self, side: Side) -> &[TradeEvent] {
        &self.trades[side.index()]
    }
}

pub struct Reconciler {
    state: DisplayState,
    epoch: u64,
    trade_keys: [HashSet<TradeKey>; SIDES],
    trade_highlight_until: Option<Instant>,
    chat_highlight_until: Option<Instant>,
    trade_highlight: Duration,
    chat_highlight: Duration,
    next_local_id: u64,
}

impl Reconciler {
    pub fn new(war_id: WarId) -> Self {
        Self::with_highlights(
            war_id,
            Duration::from_millis(TRADE_HIGHLIGHT_MS),
            Duration::from_millis(CHAT_HIGHLIGHT_MS),
        )
    }

    pub fn with_highlights(war_id: WarId, trade_highlight: Duration, chat_highlight: Duration) -> Self {
        Self {
            state: DisplayState {
                war_id,
                ..Default::default()
            },
            epoch: 0,
            trade_keys: Default::default(),
            trade_highlight_until: None,
            chat_highlight_until: None,
            trade_highlight,
            chat_highlight,
            next_local_id: 1,
        }
    }

    pub fn view(&self) -> &DisplayState {
        &self.state
    }

    pub fn war_id(&self) -> &WarId {
        &self.state.war_id
    }

    /// Capture the current context before issuing a request.
    pub fn begin_request(&self) -> RequestTicket {
        RequestTicket {
            war_id: self.state.war_id.clone(),
            epoch: self.epoch,
        }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        ticket.epoch == self.epoch && ticket.war_id == self.state.war_id
    }

    /// Move to another war. Everything held for the previous one is dropped,
    /// including pending highlight deadlines, and tickets issued before the
    /// switch become stale.
    pub fn switch_war(&mut self, war_id: WarId) {
        let trade_highlight = self.trade_highlight;
        let chat_highlight = self.chat_highlight;
        let next_local_id = self.next_local_id;
        let epoch = self.epoch + 1;
        *self = Self::with_highlights(war_id, trade_highlight, chat_highlight);
        self.epoch = epoch;
        self.next_local_id = next_local_id;
    }

    /// Replace the war totals and baseline trade lists wholesale. Returns
    /// false when the response is stale.
    pub fn apply_snapshot(&mut self, ticket: &RequestTicket, snapshot: Snapshot) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!("Dropping stale snapshot for war {}", ticket.war_id);
            return false;
        }

        let Snapshot { war, trades } = snapshot;
        let mut sides: [Vec<TradeEvent>; SIDES] = Default::default();
        let mut keys: [HashSet<TradeKey>; SIDES] = Default::default();
        for trade in trades {
            let Some(side) = war.side_of_mint(&trade.mint_address) else {
                tracing::debug!("Snapshot trade for foreign mint {}", trade.mint_address);
                continue;
            };
            if keys[side.index()].insert(trade.key()) {
                sides[side.index()].push(trade);
            }
        }
        for list in sides.iter_mut() {
            list.sort_by(|a, b| b.event_timestamp.cmp(&a.event_timestamp));
        }

        self.state.war = Some(war);
        self.state.trades = sides;
        self.trade_keys = keys;
        true
    }

    pub fn apply_user_state(&mut self, ticket: &RequestTicket, user: Option<UserState>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state.user = user;
        true
    }

    /// Merge one pushed trade. Returns true if the view changed.
    pub fn apply_incremental_event(&mut self, update: GameUpdate, now: Instant) -> bool {
        if update.war_id != self.state.war_id {
            return false;
        }
        let GameUpdate { event, .. } = update;

        let Some(war) = self.state.war.as_mut() else {
            tracing::debug!("Trade for war {} arrived before its first snapshot", self.state.war_id);
            return false;
        };

        let side = war.side_of_mint(&event.mint_address);
        if event.event_type == EventType::EndWar && !war.ended {
            war.ended = true;
            if side.is_none() {
                return true;
            }
        }
        let Some(side) = side else {
            tracing::debug!("Trade for foreign mint {}", event.mint_address);
            return false;
        };

        let key = event.key();
        if !self.trade_keys[side.index()].insert(key.clone()) {
            return false;
        }

        let highlight = event.event_type == EventType::Deposit;
        let list = &mut self.state.trades[side.index()];
        let at = list.partition_point(|t| t.event_timestamp > event.event_timestamp);
        list.insert(at, event);

        if highlight {
            self.state.highlighted_trade = Some(key);
            self.trade_highlight_until = Some(now + self.trade_highlight);
        }
        true
    }

    /// Merge one pushed chat message. Returns true if the view changed.
    pub fn apply_chat_event(&mut self, message: ChatMessage, now: Instant) -> bool {
        if message.war_id != self.state.war_id {
            return false;
        }
        if let Some(id) = message.id.as_deref() {
            if self.state.chat.iter().any(|entry| entry.id() == Some(id)) {
                return false;
            }
        }

        let id = message.id.clone();
        self.insert_chat(ChatEntry::confirmed(message));
        if let Some(id) = id {
            self.state.highlighted_chat = Some(id);
            self.chat_highlight_until = Some(now + self.chat_highlight);
        }
        true
    }

    /// Show a locally authored message immediately. Returns the local id the
    /// caller uses to confirm or fail it later, or `None` if the message was
    /// written for another war.
    pub fn send_optimistic_chat(&mut self, mut message: ChatMessage) -> Option<u64> {
        if message.war_id != self.state.war_id {
            return None;
        }
        message.id = None;
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.insert_chat(ChatEntry::pending(message, local_id));
        Some(local_id)
    }

    /// The backend persisted a local echo as `persisted`.
    pub fn confirm_chat(&mut self, local_id: u64, persisted: ChatMessage) -> bool {
        if persisted.war_id != self.state.war_id {
            return false;
        }
        let echo = self.state.chat.iter().position(|e| e.local_id() == Some(local_id));
        let known = persisted
            .id
            .as_deref()
            .is_some_and(|id| self.state.chat.iter().any(|e| e.id() == Some(id)));

        match (echo, known) {
            // The server copy already arrived over the socket.
            (Some(at), true) => {
                self.state.chat.remove(at);
                true
            }
            (Some(at), false) => {
                self.state.chat.remove(at);
                self.insert_chat(ChatEntry::confirmed(persisted));
                true
            }
            (None, false) => {
                self.insert_chat(ChatEntry::confirmed(persisted));
                true
            }
            (None, true) => false,
        }
    }

    /// The backend rejected a local echo.
    pub fn fail_chat(&mut self, local_id: u64) -> bool {
        let before = self.state.chat.len();
        self.state.chat.retain(|e| e.local_id() != Some(local_id));
        before != self.state.chat.len()
    }

    /// Replace confirmed chat wholesale. Unacknowledged echoes survive.
    pub fn apply_chat_snapshot(&mut self, ticket: &RequestTicket, messages: Vec<ChatMessage>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!("Dropping stale chat list for war {}", ticket.war_id);
            return false;
        }

        let mut seen = HashSet::new();
        let mut chat: Vec<ChatEntry> = messages
            .into_iter()
            .filter(|m| m.id.as_ref().map_or(true, |id| seen.insert(id.clone())))
            .map(ChatEntry::confirmed)
            .collect();
        chat.sort_by(|a, b| b.message.sent_at.cmp(&a.message.sent_at));

        let pending: Vec<ChatEntry> = self
            .state
            .chat
            .drain(..)
            .filter(ChatEntry::is_pending)
            .collect();
        self.state.chat = chat;
        for entry in pending.into_iter().rev() {
            self.insert_chat(entry);
        }
        true
    }

    /// Clear highlights whose deadline has passed. Returns true if the view
    /// changed.
    pub fn expire_highlights(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.trade_highlight_until.is_some_and(|until| until <= now) {
            self.trade_highlight_until = None;
            self.state.highlighted_trade = None;
            changed = true;
        }
        if self.chat_highlight_until.is_some_and(|until| until <= now) {
            self.chat_highlight_until = None;
            self.state.highlighted_chat = None;
            changed = true;
        }
        changed
    }

    /// The earliest pending highlight deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.trade_highlight_until, self.chat_highlight_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Local ids of echoes that are still waiting for the backend.
    pub fn pending_chat(&self) -> Vec<u64> {
        self.state.chat.iter().filter_map(ChatEntry::local_id).collect()
    }

    /// Counts of trades per wallet across both sides.
    pub fn trade_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for trade in self.state.trades.iter().flatten() {
            *counts.entry(trade.wallet_address.as_str()).or_insert(0) += 1;
        }
        counts
    }

    fn insert_chat(&mut self, entry: ChatEntry) {
        let sent_at = entry.message.sent_at;
        let at = self.state.chat.partition_point(|e| e.message.sent_at > sent_at);
        self.state.chat.insert(at, entry);
    }
}
