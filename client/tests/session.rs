use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::{
    sync::watch,
    time::{sleep, timeout, Duration, Instant},
};
use war_api::prelude::*;
use war_client::{
    ClientConfig, ClientError, ConnectionStatus, MemoryTokenStore, NoticeLevel, Result, SessionDeps, SessionHandle,
    SessionState, SignatureConfirmer, SignatureStatus, Snapshot, SocketConnection, SocketIo, SubscriptionState,
    TokenStore, WarBackend, WarSession,
};

const WAR_A: &str = "war-a";
const WAR_B: &str = "war-b";

#[derive(Default)]
struct FakeBackend {
    wars: Mutex<HashMap<WarId, Snapshot>>,
    chat: Mutex<Vec<ChatMessage>>,
    delays: Mutex<HashMap<WarId, Duration>>,
    chat_delays: Mutex<VecDeque<Duration>>,
    polls: Mutex<Vec<WarId>>,
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
    reject_chat: Mutex<Option<u16>>,
}

impl FakeBackend {
    fn with_wars() -> Arc<Self> {
        let backend = Self::default();
        backend.wars.lock().insert(WarId::from(WAR_A), snapshot(WAR_A, "dog", "cat"));
        backend.wars.lock().insert(WarId::from(WAR_B), snapshot(WAR_B, "frog", "toad"));
        Arc::new(backend)
    }

    fn polls_of(&self, war: &str) -> usize {
        self.polls.lock().iter().filter(|id| id.as_str() == war).count()
    }

    fn lookup(&self, war_id: &WarId) -> Result<Snapshot> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Http {
                status: 503,
                message: None,
            });
        }
        self.wars.lock().get(war_id).cloned().ok_or(ClientError::Http {
            status: 404,
            message: Some("war not found".to_string()),
        })
    }
}

#[async_trait]
impl WarBackend for FakeBackend {
    async fn war(&self, war_id: &WarId) -> Result<WarSnapshot> {
        self.polls.lock().push(war_id.clone());
        let delay = self.delays.lock().get(war_id).copied();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.lookup(war_id).map(|snapshot| snapshot.war)
    }

    async fn trades(&self, war_id: &WarId) -> Result<Vec<TradeEvent>> {
        self.lookup(war_id).map(|snapshot| snapshot.trades)
    }

    async fn chat(&self, war_id: &WarId) -> Result<Vec<ChatMessage>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Http {
                status: 503,
                message: None,
            });
        }
        let messages: Vec<ChatMessage> = self
            .chat
            .lock()
            .iter()
            .filter(|message| &message.war_id == war_id)
            .cloned()
            .collect();
        let delay = self.chat_delays.lock().pop_front();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        Ok(messages)
    }

    async fn user_state(&self, _address: &str) -> Result<Option<UserState>> {
        Ok(None)
    }

    async fn send_chat(&self, _token: &str, war_id: &WarId, body: &str) -> Result<ChatMessage> {
        self.sent.lock().push(body.to_string());
        if let Some(status) = *self.reject_chat.lock() {
            return Err(ClientError::Http { status, message: None });
        }
        let message = ChatMessage {
            id: Some(format!("srv-{}", self.sent.lock().len())),
            sender_address: "me".to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            war_id: war_id.clone(),
        };
        self.chat.lock().push(message.clone());
        Ok(message)
    }
}

struct FixedConfirmer(SignatureStatus);

#[async_trait]
impl SignatureConfirmer for FixedConfirmer {
    async fn status(&self, _signature: &str) -> Result<SignatureStatus> {
        Ok(self.0.clone())
    }
}

fn snapshot(war: &str, mint_one: &str, mint_two: &str) -> Snapshot {
    let side = |mint: &str| TokenSide {
        mint: mint.to_string(),
        symbol: mint.to_uppercase(),
        decimals: 6,
        price: 1.0,
        total_deposits: 1_000_000,
        ..Default::default()
    };
    Snapshot {
        war: WarSnapshot {
            war_id: WarId::from(war),
            sides: [side(mint_one), side(mint_two)],
            end_time: 4_000_000_000,
            ..Default::default()
        },
        trades: vec![TradeEvent {
            event_type: EventType::Deposit,
            mint_address: mint_one.to_string(),
            amount: 1_000_000,
            wallet_address: "whale".to_string(),
            event_timestamp: 100,
            transaction_signature: Some(format!("{}-baseline", war)),
            ..Default::default()
        }],
    }
}

struct Harness {
    handle: SessionHandle,
    backend: Arc<FakeBackend>,
    auth: Arc<MemoryTokenStore>,
    io: SocketIo,
    _connection: SocketConnection,
}

impl Harness {
    async fn mount(confirmer: SignatureStatus) -> Self {
        Self::mount_with(FakeBackend::with_wars(), confirmer).await
    }

    async fn mount_with(backend: Arc<FakeBackend>, confirmer: SignatureStatus) -> Self {
        let (connection, io) = SocketConnection::unconnected();
        let auth = Arc::new(MemoryTokenStore::new());
        let deps = SessionDeps {
            config: ClientConfig::default(),
            backend: backend.clone(),
            confirmer: Arc::new(FixedConfirmer(confirmer)),
            auth: auth.clone(),
            socket: connection.handle(),
            wallet: None,
        };
        let handle = WarSession::mount(WarId::from(WAR_A), deps);
        let harness = Self {
            handle,
            backend,
            auth,
            io,
            _connection: connection,
        };
        harness.wait_for(|s| !s.loading).await;
        harness
    }

    async fn wait_for(&self, done: impl Fn(&SessionState) -> bool) -> SessionState {
        wait_for(&mut self.handle.state(), done).await
    }

    fn frames(&mut self) -> Vec<String> {
        let mut frames = vec![];
        while let Ok(frame) = self.io.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn push_trade(&self, war: &str, mint: &str, event_type: &str, signature: &str, timestamp: i64) {
        self.io.publish(
            GAME_UPDATE_EVENT,
            &json!({
                "warId": war,
                "eventType": event_type,
                "mintAddress": mint,
                "amount": "2500000",
                "walletAddress": "degen",
                "eventTimestamp": timestamp,
                "transactionSignature": signature,
            }),
        );
    }
}

async fn wait_for(state: &mut watch::Receiver<SessionState>, done: impl Fn(&SessionState) -> bool) -> SessionState {
    timeout(Duration::from_secs(600), async {
        loop {
            {
                let current = state.borrow_and_update();
                if done(&current) {
                    return current.clone();
                }
            }
            state.changed().await.expect("session dropped its state");
        }
    })
    .await
    .expect("state never reached")
}

#[tokio::test(start_paused = true)]
async fn mount_loads_baseline_and_joins_room() {
    let mut harness = Harness::mount(SignatureStatus::Pending).await;

    let state = harness.handle.current();
    assert_eq!(state.display.war_id, WarId::from(WAR_A));
    assert_eq!(state.display.trades(Side::One).len(), 1);
    assert_eq!(state.subscription, SubscriptionState::Subscribing);
    assert_eq!(harness.frames(), vec![r#"42["subscribeToGame","game"]"#]);

    harness.io.status.send_replace(ConnectionStatus::Connected);
    harness.wait_for(|s| s.subscription == SubscriptionState::Subscribed).await;

    harness.io.status.send_replace(ConnectionStatus::Disconnected);
    harness.wait_for(|s| s.subscription == SubscriptionState::Subscribing).await;
}

#[tokio::test(start_paused = true)]
async fn deposit_highlight_clears_after_delay() {
    let harness = Harness::mount(SignatureStatus::Pending).await;

    harness.push_trade(WAR_A, "dog", "deposit", "fresh", 200);
    let state = harness
        .wait_for(|s| s.display.highlighted_trade.is_some())
        .await;
    let merged_at = Instant::now();
    assert_eq!(state.display.trades(Side::One)[0].transaction_signature.as_deref(), Some("fresh"));
    assert_eq!(state.display.trades(Side::One)[0].amount, 2_500_000);
    assert_eq!(
        state.display.highlighted_trade,
        Some(TradeKey::Signature("fresh".to_string()))
    );

    harness.wait_for(|s| s.display.highlighted_trade.is_none()).await;
    let elapsed = Instant::now() - merged_at;
    assert!(elapsed >= Duration::from_millis(3_500), "cleared after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3_600), "cleared after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn foreign_and_duplicate_events_are_ignored() {
    let harness = Harness::mount(SignatureStatus::Pending).await;

    harness.push_trade(WAR_B, "dog", "deposit", "elsewhere", 300);
    harness.push_trade(WAR_A, "dog", "withdraw", "war-a-baseline", 100);
    harness.push_trade(WAR_A, "cat", "withdraw", "mine", 150);

    let state = harness.wait_for(|s| s.display.trades(Side::Two).len() == 1).await;
    assert_eq!(state.display.trades(Side::One).len(), 1);
    assert_eq!(state.display.trades(Side::Two)[0].event_type, EventType::Withdraw);
    // Withdrawals never highlight.
    assert_eq!(state.display.highlighted_trade, None);
}

#[tokio::test(start_paused = true)]
async fn chat_push_highlights_briefly() {
    let harness = Harness::mount(SignatureStatus::Pending).await;

    harness.io.publish(
        CHAT_UPDATE_EVENT,
        &json!({ "id": "m1", "warId": WAR_A, "senderAddress": "anon", "message": "gm" }),
    );
    let state = harness.wait_for(|s| s.display.highlighted_chat.is_some()).await;
    let merged_at = Instant::now();
    assert_eq!(state.display.chat.len(), 1);
    assert_eq!(state.display.chat[0].message.body, "gm");

    harness.wait_for(|s| s.display.highlighted_chat.is_none()).await;
    assert!(Instant::now() - merged_at >= Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn chat_without_token_never_hits_the_network() {
    let harness = Harness::mount(SignatureStatus::Pending).await;

    let result = harness.handle.send_chat("gm").await;
    assert!(matches!(result, Err(ClientError::AuthRequired)));
    assert!(harness.backend.sent.lock().is_empty());
    assert!(harness.handle.current().display.chat.is_empty());
}

#[tokio::test(start_paused = true)]
async fn chat_echo_resolves_to_one_entry() {
    let harness = Harness::mount(SignatureStatus::Pending).await;
    harness.auth.set_token("jwt").unwrap();

    let persisted = harness.handle.send_chat("to the moon").await.unwrap();
    assert_eq!(persisted.id.as_deref(), Some("srv-1"));
    assert_eq!(*harness.backend.sent.lock(), vec!["to the moon".to_string()]);

    let state = harness
        .wait_for(|s| s.display.chat.len() == 1 && !s.display.chat[0].is_pending())
        .await;
    assert_eq!(state.display.chat[0].id(), Some("srv-1"));

    // The socket copy of the same message does not add a second line.
    harness.io.publish(
        CHAT_UPDATE_EVENT,
        &json!({ "id": "srv-1", "warId": WAR_A, "senderAddress": "me", "message": "to the moon" }),
    );
    harness.handle.refresh().unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.handle.current().display.chat.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_token_surfaces_as_auth_error() {
    let harness = Harness::mount(SignatureStatus::Pending).await;
    harness.auth.set_token("expired").unwrap();
    *harness.backend.reject_chat.lock() = Some(401);

    let result = harness.handle.send_chat("gm").await;
    assert!(matches!(result, Err(ClientError::AuthRequired)));
    let state = harness.wait_for(|s| s.display.chat.is_empty()).await;
    assert!(state.display.chat.is_empty());

    *harness.backend.reject_chat.lock() = Some(500);
    let result = harness.handle.send_chat("gm").await;
    assert!(matches!(result, Err(ClientError::Http { status: 500, .. })));
}

#[tokio::test(start_paused = true)]
async fn switching_wars_resubscribes_and_drops_stale_responses() {
    let backend = FakeBackend::with_wars();
    let mut harness = Harness::mount_with(backend.clone(), SignatureStatus::Pending).await;
    harness.frames();

    // The next war A response will land after the switch.
    backend.delays.lock().insert(WarId::from(WAR_A), Duration::from_secs(2));
    harness.handle.refresh().unwrap();
    sleep(Duration::from_millis(10)).await;
    harness.handle.switch_war(WarId::from(WAR_B)).unwrap();

    let state = harness
        .wait_for(|s| s.display.war_id == WarId::from(WAR_B) && !s.loading)
        .await;
    assert_eq!(state.display.trades(Side::One)[0].mint_address, "frog");
    assert_eq!(
        harness.frames(),
        vec![
            r#"42["unsubscribeFromGame","game"]"#.to_string(),
            r#"42["subscribeToGame","game"]"#.to_string(),
        ]
    );

    // Let the slow war A response arrive. It must not overwrite war B.
    sleep(Duration::from_secs(3)).await;
    let state = harness.handle.current();
    assert_eq!(state.display.war_id, WarId::from(WAR_B));
    assert_eq!(
        state.display.war.as_ref().map(|war| war.war_id.clone()),
        Some(WarId::from(WAR_B))
    );

    // Pushes for the old war no longer apply.
    harness.push_trade(WAR_A, "dog", "deposit", "late", 500);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.handle.current().display.highlighted_trade, None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_the_room() {
    let mut harness = Harness::mount(SignatureStatus::Pending).await;
    harness.frames();
    let mut state = harness.handle.state();

    harness.handle.clone().shutdown().await;
    assert_eq!(harness.frames(), vec![r#"42["unsubscribeFromGame","game"]"#]);
    let last = wait_for(&mut state, |s| s.subscription == SubscriptionState::Unsubscribed).await;
    assert_eq!(last.subscription, SubscriptionState::Unsubscribed);
    assert!(matches!(harness.handle.refresh(), Err(ClientError::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn poll_failures_keep_the_last_baseline() {
    let harness = Harness::mount(SignatureStatus::Pending).await;
    harness.backend.fail.store(true, Ordering::SeqCst);

    sleep(Duration::from_secs(16)).await;
    let state = harness.handle.current();
    assert_eq!(state.display.trades(Side::One).len(), 1);
    assert!(state.display.war.is_some());
    assert!(state
        .notices
        .iter()
        .any(|notice| notice.level == NoticeLevel::Error));
}

#[tokio::test(start_paused = true)]
async fn confirmed_transaction_refetches() {
    let harness = Harness::mount(SignatureStatus::Confirmed).await;
    let polls = harness.backend.polls_of(WAR_A);

    harness.handle.track_transaction("sig-1").unwrap();
    let state = harness
        .wait_for(|s| s.pending_transactions.is_empty() && !s.notices.is_empty())
        .await;
    assert_eq!(state.notices[0].level, NoticeLevel::Info);
    sleep(Duration::from_millis(10)).await;
    assert!(harness.backend.polls_of(WAR_A) > polls);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_transaction_times_out() {
    let harness = Harness::mount(SignatureStatus::Pending).await;
    let polls = harness.backend.polls_of(WAR_A);
    let started = Instant::now();

    harness.handle.track_transaction("sig-2").unwrap();
    harness
        .wait_for(|s| s.pending_transactions == vec!["sig-2".to_string()])
        .await;

    // Re-fetch after the short delay, well before the next poll.
    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(harness.backend.polls_of(WAR_A), polls + 1);

    let state = harness.wait_for(|s| s.pending_transactions.is_empty()).await;
    assert!(Instant::now() - started >= Duration::from_secs(58));
    assert!(state
        .notices
        .iter()
        .any(|notice| notice.level == NoticeLevel::Error));
}

#[tokio::test(start_paused = true)]
async fn confirmation_during_slow_poll_refetches_after_it() {
    let backend = FakeBackend::with_wars();
    let harness = Harness::mount_with(backend.clone(), SignatureStatus::Confirmed).await;

    // This poll starts before the transaction lands and is still running at confirmation.
    backend.delays.lock().insert(WarId::from(WAR_A), Duration::from_secs(1));
    harness.handle.refresh().unwrap();
    sleep(Duration::from_millis(10)).await;
    harness.handle.track_transaction("sig-3").unwrap();
    harness
        .wait_for(|s| s.notices.iter().any(|notice| notice.level == NoticeLevel::Info))
        .await;
    let at_confirm = backend.polls_of(WAR_A);

    // Before the delayed re-fetch at 2s and the next tick at 5s.
    sleep(Duration::from_millis(1_500)).await;
    assert!(
        backend.polls_of(WAR_A) > at_confirm,
        "no re-fetch after the in-flight poll landed"
    );
}

#[tokio::test(start_paused = true)]
async fn older_chat_list_does_not_overwrite_newer() {
    let backend = FakeBackend::with_wars();
    let harness = Harness::mount_with(backend.clone(), SignatureStatus::Pending).await;

    // The first list is read empty and delivered late.
    backend.chat_delays.lock().push_back(Duration::from_secs(2));
    harness.handle.refresh().unwrap();
    sleep(Duration::from_millis(10)).await;

    backend.chat.lock().push(ChatMessage {
        id: Some("m1".to_string()),
        sender_address: "anon".to_string(),
        body: "gm".to_string(),
        sent_at: Utc::now(),
        war_id: WarId::from(WAR_A),
    });
    harness.handle.refresh().unwrap();
    harness.wait_for(|s| s.display.chat.len() == 1).await;

    sleep(Duration::from_secs(3)).await;
    let state = harness.handle.current();
    assert_eq!(state.display.chat.len(), 1);
    assert_eq!(state.display.chat[0].id(), Some("m1"));
}
