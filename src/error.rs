use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Bad upload: {0}")]
    BadUpload(String),

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
