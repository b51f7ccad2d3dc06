use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

use crate::{consts::SIDES, error::WarError};

/// Address of one war instance. Compared as an opaque string so that events
/// carrying malformed identifiers simply never match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarId(String);

impl WarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the identifier as an on-chain address.
    pub fn pubkey(&self) -> Result<Pubkey, WarError> {
        if self.0.is_empty() {
            return Err(WarError::EmptyWarId);
        }
        Pubkey::from_str(&self.0).map_err(|_| WarError::InvalidAddress(self.0.clone()))
    }
}

impl fmt::Display for WarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WarId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WarId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One of the two competing pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub const ALL: [Side; SIDES] = [Side::One, Side::Two];

    pub fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenSide {
    /// Mint of the token backing this side.
    pub mint: String,

    /// Ticker shown in the UI.
    pub symbol: String,

    /// Decimals of the mint.
    pub decimals: u8,

    /// Price of one whole token in the base currency.
    pub price: f64,

    /// Total amount deposited, in base units.
    pub total_deposits: u64,

    /// Total amount withdrawn, in base units.
    pub total_withdrawals: u64,

    /// Total penalties charged on early withdrawals.
    pub total_penalties: u64,

    /// Total amount pledged through risk-free deposits.
    pub total_risk_free_deposits: u64,
}

impl TokenSide {
    /// Amount currently locked in the pool, in base units.
    pub fn net_pledged(&self) -> u64 {
        self.total_deposits
            .saturating_add(self.total_risk_free_deposits)
            .saturating_sub(self.total_withdrawals)
    }

    /// Convert base units of this mint into whole tokens.
    pub fn ui_amount(&self, amount: u64) -> f64 {
        amount as f64 / 10f64.powi(self.decimals as i32)
    }

    /// Value of the locked pool in the base currency.
    pub fn pledged_value(&self) -> f64 {
        self.ui_amount(self.net_pledged()) * self.price
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarSnapshot {
    pub war_id: WarId,

    pub sides: [TokenSide; SIDES],

    /// Epoch seconds at which pledging closes.
    #[serde(default)]
    pub end_time: i64,

    #[serde(default)]
    pub ended: bool,

    #[serde(default)]
    pub winner: Option<Side>,
}

impl WarSnapshot {
    pub fn side(&self, side: Side) -> &TokenSide {
        &self.sides[side.index()]
    }

    /// Which side a mint belongs to, if any.
    pub fn side_of_mint(&self, mint: &str) -> Option<Side> {
        Side::ALL
            .into_iter()
            .find(|side| !mint.is_empty() && self.side(*side).mint == mint)
    }

    /// Combined value of both pools in the base currency.
    pub fn total_value(&self) -> f64 {
        self.sides.iter().map(TokenSide::pledged_value).sum()
    }

    /// Share of the combined pool value held by `side`, as a percentage.
    /// An empty war splits evenly.
    pub fn pool_share(&self, side: Side) -> f64 {
        let total = self.total_value();
        if total <= 0.0 {
            return 50.0;
        }
        self.side(side).pledged_value() / total * 100.0
    }

    /// The side currently ahead by pool value, or the declared winner once
    /// the war has ended.
    pub fn leader(&self) -> Option<Side> {
        if self.ended {
            return self.winner;
        }
        let one = self.side(Side::One).pledged_value();
        let two = self.side(Side::Two).pledged_value();
        if one > two {
            Some(Side::One)
        } else if two > one {
            Some(Side::Two)
        } else {
            None
        }
    }

    pub fn seconds_remaining(&self, now: i64) -> u64 {
        if self.ended {
            return 0;
        }
        self.end_time.saturating_sub(now).max(0) as u64
    }

    pub fn is_over(&self, now: i64) -> bool {
        self.ended || now >= self.end_time
    }
}
