use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("compare-and-swap conflict on {key}: expected version {expected:?}, found {found:?}")]
    CasConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("key {0} already exists")]
    AlreadyInserted(String),

    #[error("no value found for key {0}")]
    ErrZeroValues(String),

    #[error("multiple values found for prefix {0}, expected one")]
    MultipleValues(String),

    #[error("watch stream closed")]
    WatchClosed,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid wanted state: {0}")]
    InvalidWanted(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
