use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("source error: {0}")]
    Source(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    State(#[from] floe_state::StateError),

    #[error(transparent)]
    Window(#[from] floe_window::WindowError),

    #[error("trigger signal failed: {0}")]
    Trigger(String),

    #[error("no graph definition registered for type {0}")]
    UnknownGraphType(String),

    #[error("graph type {0} is already registered")]
    DuplicateGraphType(String),

    #[error("nil graph definition")]
    NilGraph,

    #[error("invalid graph config: {0}")]
    Config(String),
}
