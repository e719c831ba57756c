use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoyaltyError>;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("invalid order number format")]
    InvalidFormat,
    #[error("invalid order number checksum")]
    InvalidChecksum,
    #[error("order {0} already belongs to another user")]
    OwnedByAnotherUser(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
    #[error("accrual worker is not running")]
    WorkerStopped,
}

impl LoyaltyError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(Box::new(std::io::Error::other(message.into())))
    }

    /// The boundary outcome this error is reported as.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::InvalidFormat => Outcome::FormatInvalid,
            Self::InvalidChecksum => Outcome::ChecksumInvalid,
            Self::OwnedByAnotherUser(_) => Outcome::ConflictOwnedByOther,
            Self::InsufficientFunds => Outcome::InsufficientFunds,
            Self::NotFound(_) => Outcome::NotFound,
            // A malformed request body is a format problem at the boundary.
            Self::ValidationError(_) | Self::CsvError(_) => Outcome::FormatInvalid,
            Self::IoError(_) | Self::Storage(_) | Self::WorkerStopped => Outcome::InternalFailure,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LoyaltyError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

impl From<serde_json::Error> for LoyaltyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

/// Outcome of a core operation as seen by whatever boundary sits in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new order was taken and queued for accrual.
    Accepted,
    Success,
    AlreadyAdmitted,
    FormatInvalid,
    ChecksumInvalid,
    ConflictOwnedByOther,
    InsufficientFunds,
    NotFound,
    InternalFailure,
}

impl Outcome {
    /// HTTP status code a REST boundary answers with.
    pub fn http_status(self) -> u16 {
        match self {
            Outcome::Accepted => 202,
            Outcome::Success | Outcome::AlreadyAdmitted => 200,
            Outcome::FormatInvalid => 400,
            Outcome::ChecksumInvalid => 422,
            Outcome::ConflictOwnedByOther => 409,
            Outcome::InsufficientFunds => 402,
            Outcome::NotFound => 404,
            Outcome::InternalFailure => 500,
        }
    }
}
