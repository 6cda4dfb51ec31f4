use crate::cip::ClaimError;
use crate::client::ClientError;
use crate::placeholders::PlaceholderError;
use crate::token::TokenError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnforcerError {
    #[error("Authorization server error: {0}")]
    Client(#[from] ClientError),

    #[error("Claim resolution failed: {0}")]
    Claims(#[from] ClaimError),

    #[error("Placeholder error: {0}")]
    Placeholder(#[from] PlaceholderError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
