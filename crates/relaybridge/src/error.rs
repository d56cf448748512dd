use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Account not linked: {0}")]
    AccountNotLinked(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that were already reported to the originating conversation as a
    /// status notice.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Error::ChannelNotFound(_) | Error::SendFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
