use serde::{Deserialize, Serialize};

use super::Side;
use crate::consts::SIDES;

/// A wallet's pledges inside one war, read from its derived user-state account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserState {
    pub authority: String,

    /// Amount currently deposited on each side, in base units.
    pub deposits: [u64; SIDES],

    /// Amount deposited risk-free on each side, in base units.
    pub risk_free_deposits: [u64; SIDES],

    /// Whether winnings have been claimed after the war ended.
    pub claimed: bool,
}

impl UserState {
    pub fn pledged(&self, side: Side) -> u64 {
        self.deposits[side.index()].saturating_add(self.risk_free_deposits[side.index()])
    }

    pub fn has_position(&self) -> bool {
        Side::ALL.into_iter().any(|side| self.pledged(side) > 0)
    }
}
