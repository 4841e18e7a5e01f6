use aegis_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("match batch not persisted: {0}")]
    Store(#[from] StoreError),
}
