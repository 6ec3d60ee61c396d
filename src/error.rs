//! Error taxonomy for the screening core.
//!
//! Only `PoolExhausted` is actionable by the end caller (supply new
//! credentials). `Cancelled` signals cooperative shutdown. Everything else
//! is recovered inside the client by tagging the affected batch `Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("all credentials are dead: the pool is exhausted")]
    PoolExhausted,

    #[error("no credentials configured")]
    NoCredentials,

    #[error("run cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Upstream(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),
}

impl ScreenError {
    /// Errors that end the whole run rather than a single batch.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::Cancelled)
    }
}
