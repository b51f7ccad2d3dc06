pub mod auth;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod rest;
pub mod rpc;
pub mod session;
pub mod socket;

pub use auth::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use reconciler::{DisplayState, Reconciler, RequestTicket, Snapshot};
pub use rest::{RestClient, WarBackend};
pub use rpc::{RpcConfirmer, SignatureConfirmer, SignatureStatus};
pub use session::{Notice, NoticeLevel, SessionDeps, SessionHandle, SessionState, SubscriptionState, WarSession};
pub use socket::{ConnectionStatus, InboundEvent, RoomSubscription, SocketConnection, SocketHandle, SocketIo};
