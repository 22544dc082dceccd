use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error encoding cache: {0}")]
    Encode(#[source] bincode::Error),

    #[error("error decoding cache: {0}")]
    Decode(#[source] bincode::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cowardly refusing to tweet empty text, or only spaces")]
    EmptyPost,
}
