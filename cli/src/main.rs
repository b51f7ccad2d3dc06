use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use war_api::prelude::*;
use war_client::{
    rpc::wait_for_confirmation, ClientConfig, FileTokenStore, Reconciler, RestClient, RpcConfirmer, SessionDeps,
    SessionState, SignatureStatus, Snapshot, SocketConnection, TokenStore, WarBackend, WarSession,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env();
    let rest = RestClient::new(&config.api_url);
    match std::env::var("COMMAND")
        .expect("Missing COMMAND env var")
        .as_str()
    {
        "watch" => {
            watch(&config).await.unwrap();
        }
        "war" => {
            log_war(&rest).await.unwrap();
        }
        "trades" => {
            log_trades(&rest).await.unwrap();
        }
        "chat" => {
            chat(&config).await.unwrap();
        }
        "login" => {
            login().unwrap();
        }
        "logout" => {
            logout().unwrap();
        }
        "address" => {
            log_address().unwrap();
        }
        "confirm" => {
            confirm(&config).await.unwrap();
        }
        _ => panic!("Invalid command"),
    };
}

fn war_id() -> WarId {
    WarId::new(std::env::var("WAR").expect("Missing WAR env var"))
}

fn wallet() -> Option<String> {
    std::env::var("WALLET").ok().filter(|w| !w.is_empty())
}

async fn watch(config: &ClientConfig) -> Result<(), anyhow::Error> {
    let war_id = war_id();
    tracing::info!("Watching war {} via {}", war_id, config.api_url);
    let connection = SocketConnection::open(&config.socket_url);
    let session = WarSession::mount(
        war_id,
        SessionDeps {
            config: config.clone(),
            backend: Arc::new(RestClient::new(&config.api_url)),
            confirmer: Arc::new(RpcConfirmer::new(&config.rpc_url)),
            auth: Arc::new(FileTokenStore::default_location()?),
            socket: connection.handle(),
            wallet: wallet(),
        },
    );

    let mut state = session.state();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_session(&state.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    connection.close().await;
    Ok(())
}

fn print_session(state: &SessionState) {
    let display = &state.display;
    println!("War {} ({:?})", display.war_id, state.subscription);
    if state.loading {
        println!("  loading...");
        return;
    }
    if let Some(war) = &display.war {
        print_standings(war);
    }
    for side in Side::ALL {
        if let Some(trade) = display.trades(side).first() {
            let marker = if display.highlighted_trade.as_ref() == Some(&trade.key()) {
                "*"
            } else {
                " "
            };
            println!(
                " {}latest {:?}: {} {} by {}",
                marker,
                side,
                trade.event_type.label(),
                trade.amount,
                short_address(&trade.wallet_address)
            );
        }
    }
    for entry in display.chat.iter().take(5) {
        let status = if entry.is_pending() { " (sending)" } else { "" };
        println!(
            "  [{}] {}: {}{}",
            entry.message.sent_at.format("%H:%M:%S"),
            short_address(&entry.message.sender_address),
            entry.message.body,
            status
        );
    }
    for signature in &state.pending_transactions {
        println!("  pending tx: {}", signature);
    }
    for notice in &state.notices {
        println!("  {:?}: {}", notice.level, notice.text);
    }
}

fn print_standings(war: &WarSnapshot) {
    let now = Utc::now().timestamp();
    for side in Side::ALL {
        let token = war.side(side);
        println!(
            "  {:>8}: {} pledged ({}, {})",
            token.symbol,
            format_token_amount(token.net_pledged(), token.decimals, 2),
            format_usd(token.pledged_value()),
            format_percent(war.pool_share(side))
        );
    }
    match (war.is_over(now), war.leader()) {
        (true, _) => println!("  Ended, winner: {:?}", war.winner),
        (false, Some(side)) => println!(
            "  {} leads, {} left",
            war.side(side).symbol,
            format_countdown(war.seconds_remaining(now))
        ),
        (false, None) => println!("  Tied, {} left", format_countdown(war.seconds_remaining(now))),
    }
}

async fn log_war(rest: &RestClient) -> Result<(), anyhow::Error> {
    let war = rest.war(&war_id()).await?;
    println!("War");
    println!("  address: {}", war.war_id);
    println!("  end_time: {}", war.end_time);
    println!("  ended: {}", war.ended);
    println!("  total_value: {}", format_usd(war.total_value()));
    for side in Side::ALL {
        let token = war.side(side);
        println!("  {:?}", side);
        println!("    mint: {}", token.mint);
        println!("    symbol: {}", token.symbol);
        println!("    price: {}", format_usd(token.price));
        println!(
            "    deposits: {}",
            format_token_amount(token.total_deposits, token.decimals, 2)
        );
        println!(
            "    risk_free_deposits: {}",
            format_token_amount(token.total_risk_free_deposits, token.decimals, 2)
        );
        println!(
            "    withdrawals: {}",
            format_token_amount(token.total_withdrawals, token.decimals, 2)
        );
        println!(
            "    penalties: {}",
            format_token_amount(token.total_penalties, token.decimals, 2)
        );
    }
    print_standings(&war);
    Ok(())
}

async fn log_trades(rest: &RestClient) -> Result<(), anyhow::Error> {
    let war_id = war_id();
    let (war, trades) = tokio::try_join!(rest.war(&war_id), rest.trades(&war_id))?;
    let mut reconciler = Reconciler::new(war_id);
    let ticket = reconciler.begin_request();
    reconciler.apply_snapshot(&ticket, Snapshot { war, trades });

    let display = reconciler.view();
    let Some(war) = &display.war else {
        return Ok(());
    };
    for side in Side::ALL {
        let token = war.side(side);
        println!("{} ({} trades)", token.symbol, display.trades(side).len());
        for trade in display.trades(side) {
            println!(
                "  {} {:>18} {} {}",
                trade.event_timestamp,
                trade.event_type.label(),
                format_token_amount(trade.amount, token.decimals, 2),
                short_address(&trade.wallet_address)
            );
        }
    }

    let mut counts: Vec<(&str, usize)> = reconciler.trade_counts().into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    println!("Most active");
    for (wallet, count) in counts.iter().take(10) {
        println!("  {}: {}", short_address(wallet), count);
    }
    Ok(())
}

async fn chat(config: &ClientConfig) -> Result<(), anyhow::Error> {
    let message = std::env::var("MESSAGE").expect("Missing MESSAGE env var");
    let connection = SocketConnection::open(&config.socket_url);
    let session = WarSession::mount(
        war_id(),
        SessionDeps {
            config: config.clone(),
            backend: Arc::new(RestClient::new(&config.api_url)),
            confirmer: Arc::new(RpcConfirmer::new(&config.rpc_url)),
            auth: Arc::new(FileTokenStore::default_location()?),
            socket: connection.handle(),
            wallet: wallet(),
        },
    );

    let result = session.send_chat(&message).await;
    session.shutdown().await;
    connection.close().await;
    let sent = result?;
    println!("Sent {}", sent.id.as_deref().unwrap_or("(no id)"));
    Ok(())
}

fn login() -> Result<(), anyhow::Error> {
    let token = std::env::var("TOKEN").expect("Missing TOKEN env var");
    let store = FileTokenStore::default_location()?;
    store.set_token(&token)?;
    println!("Token saved to {}", store.path().display());
    Ok(())
}

fn logout() -> Result<(), anyhow::Error> {
    let store = FileTokenStore::default_location()?;
    store.clear()?;
    println!("Token removed");
    Ok(())
}

fn log_address() -> Result<(), anyhow::Error> {
    let war_id = war_id();
    let wallet = wallet().expect("Missing WALLET env var");
    let address = user_state_address(&war_id, &wallet)?;
    println!("User state");
    println!("  war: {}", war_id);
    println!("  authority: {}", wallet);
    println!("  address: {}", address);
    Ok(())
}

async fn confirm(config: &ClientConfig) -> Result<(), anyhow::Error> {
    let signature = std::env::var("SIGNATURE").expect("Missing SIGNATURE env var");
    let confirmer = RpcConfirmer::new(&config.rpc_url);
    let status = wait_for_confirmation(
        &confirmer,
        &signature,
        config.confirm_poll,
        config.confirm_timeout,
    )
    .await?;
    match status {
        SignatureStatus::Confirmed => println!("Confirmed"),
        SignatureStatus::Failed(reason) => println!("Failed: {}", reason),
        SignatureStatus::Pending => println!(
            "Not confirmed after {}s",
            config.confirm_timeout.as_secs()
        ),
    }
    Ok(())
}
