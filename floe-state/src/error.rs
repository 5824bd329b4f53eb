use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("mutator failed: {0}")]
    Mutator(String),
    #[error(transparent)]
    Span(#[from] floe_window::SpanError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("span {span:?} mixes value types: first was {expected}, got {actual}")]
    TypeMismatch {
        span: Vec<u8>,
        expected: String,
        actual: String,
    },
    #[error("corrupt envelope in file driver: {0}")]
    CorruptEnvelope(String),
    #[error("unknown conn name: {0}")]
    UnknownConn(String),
}
