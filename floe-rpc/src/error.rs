use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request to {receiver} timed out after {timeout_ms}ms")]
    Timeout { receiver: String, timeout_ms: u64 },

    #[error("no mailbox registered for {0}")]
    NoSuchMailbox(String),

    #[error("mailbox {0} is closed")]
    MailboxClosed(String),

    #[error("tag mismatch: expected {expected}, got {got}")]
    TagMismatch { expected: String, got: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("remote error: {0}")]
    Remote(String),
}
