mod connection;
pub mod frame;
mod rooms;

pub use connection::*;
pub use rooms::{RoomRegistry, RoomSubscription};
