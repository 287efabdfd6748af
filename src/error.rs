use crate::env::Phase;

#[derive(Debug, thiserror::Error)]
pub enum TbError {
    /// A command was observed but no result was buffered for it.
    #[error("Missing result for command ({a}, {b}, {op})")]
    MissingResult { a: u8, b: u8, op: &'static str },

    #[error("port {0} is not connected")]
    Unconnected(&'static str),

    #[error("export of {0} is already connected")]
    ExportTaken(&'static str),

    #[error("{requested} phase requested while environment is {current}")]
    PhaseOrder { requested: Phase, current: Phase },

    #[error("relay queue closed")]
    RelayClosed,

    #[error("component task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = TbError> = std::result::Result<T, E>;
