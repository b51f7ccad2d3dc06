pub mod consts;
pub mod error;
pub mod format;
pub mod state;
pub mod wire;

pub mod prelude {
    pub use crate::consts::*;
    pub use crate::error::*;
    pub use crate::format::*;
    pub use crate::state::*;
    pub use crate::wire::*;
}

use solana_program::declare_id;

declare_id!("GJeEhzuogkgKqKt88TWYAiLQAciCTh5NuhQckMR39g9Z");
