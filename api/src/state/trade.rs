use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    #[default]
    Deposit,
    Withdraw,
    RiskFreeDeposit,
    Penalty,
    Winnings,
    EndWar,
}

impl EventType {
    /// Parse the backend's event name. Kebab, snake and camel spellings are
    /// all accepted.
    pub fn from_wire(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "deposit" => Some(EventType::Deposit),
            "withdraw" | "withdrawal" => Some(EventType::Withdraw),
            "riskfreedeposit" | "riskfree" => Some(EventType::RiskFreeDeposit),
            "penalty" => Some(EventType::Penalty),
            "winnings" | "winning" => Some(EventType::Winnings),
            "endwar" => Some(EventType::EndWar),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventType::Deposit => "Deposit",
            EventType::Withdraw => "Withdraw",
            EventType::RiskFreeDeposit => "Risk-free deposit",
            EventType::Penalty => "Penalty",
            EventType::Winnings => "Winnings",
            EventType::EndWar => "War ended",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub event_type: EventType,

    /// Mint of the side this event touched.
    pub mint_address: String,

    /// Amount in base units of the mint.
    pub amount: u64,

    /// Value of `amount` in the base currency, when the backend priced it.
    pub amount_in_base_currency: Option<f64>,

    pub wallet_address: String,

    /// Epoch seconds.
    pub event_timestamp: i64,

    pub transaction_signature: Option<String>,
}

impl TradeEvent {
    /// Identity used for de-duplication.
    pub fn key(&self) -> TradeKey {
        match self.transaction_signature.as_deref() {
            Some(signature) if !signature.is_empty() => TradeKey::Signature(signature.to_string()),
            _ => TradeKey::WalletTime {
                wallet: self.wallet_address.clone(),
                timestamp: self.event_timestamp,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TradeKey {
    Signature(String),
    WalletTime { wallet: String, timestamp: i64 },
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKey::Signature(signature) => f.write_str(signature),
            TradeKey::WalletTime { wallet, timestamp } => write!(f, "{}-{}", wallet, timestamp),
        }
    }
}
