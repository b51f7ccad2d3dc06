mod chat;
mod trade;
mod user;
mod war;

pub use chat::*;
pub use trade::*;
pub use user::*;
pub use war::*;

use std::str::FromStr;

use solana_program::pubkey::Pubkey;

use crate::{consts::*, error::WarError};

/// Address of the war state account for a pair of competing mints.
///
/// The mints are sorted first so both orderings derive the same war.
pub fn war_pda(mint_a: Pubkey, mint_b: Pubkey) -> (Pubkey, u8) {
    let (first, second) = if mint_a.to_bytes() <= mint_b.to_bytes() {
        (mint_a, mint_b)
    } else {
        (mint_b, mint_a)
    };
    Pubkey::find_program_address(&[WAR, &first.to_bytes(), &second.to_bytes()], &crate::ID)
}

/// Address of a user's pledge account inside one war.
pub fn user_state_pda(war: Pubkey, authority: Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[USER_STATE, &war.to_bytes(), &authority.to_bytes()],
        &crate::ID,
    )
}

/// The user-state address a wallet polls for in a war.
pub fn user_state_address(war_id: &WarId, wallet: &str) -> Result<Pubkey, WarError> {
    let war = war_id.pubkey()?;
    let authority = Pubkey::from_str(wallet).map_err(|_| WarError::InvalidAddress(wallet.to_string()))?;
    Ok(user_state_pda(war, authority).0)
}
