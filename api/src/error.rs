use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WarError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("war identifier is empty")]
    EmptyWarId,
}
