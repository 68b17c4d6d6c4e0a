use bigdecimal::BigDecimal;
use thiserror::Error;

use super::status::TransitionError;

/// How the caller is expected to react to an [`OrderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any read or write.
    Validation,
    /// The input was well formed but a business rule refused it.
    BusinessRule,
    /// The row changed between read and write; refresh and retry.
    Concurrency,
    NotFound,
    /// Store unreachable, transaction failure, corrupt row.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("product invalid: {0}")]
    ProductInvalid(String),

    #[error("order amount invalid, refresh the order and submit again")]
    AmountInvalid,

    #[error("pay amount mismatch, expected {expected}")]
    PayAmountMismatch { expected: BigDecimal },

    #[error("order does not belong to this user")]
    OwnerMismatch,

    #[error("order is not assigned to this courier")]
    CourierMismatch,

    #[error("order already has a courier")]
    CourierExists,

    #[error("sub-order does not belong to the order")]
    SubOrderMismatch,

    #[error("sub-orders are not all ready, order cannot advance to be shipped")]
    CannotAdvanceToBeShipped,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{entity} status already changed, refresh and retry")]
    StatusChanged { entity: &'static str },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("store error: {0}")]
    Store(String),
}

impl OrderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::ProductInvalid(_)
            | OrderError::AmountInvalid
            | OrderError::PayAmountMismatch { .. }
            | OrderError::OwnerMismatch
            | OrderError::CourierMismatch
            | OrderError::CourierExists
            | OrderError::SubOrderMismatch
            | OrderError::CannotAdvanceToBeShipped
            | OrderError::Transition(_) => ErrorKind::BusinessRule,
            OrderError::StatusChanged { .. } => ErrorKind::Concurrency,
            OrderError::NotFound(_) => ErrorKind::NotFound,
            OrderError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable category reported next to the message.
    pub fn category(&self) -> &'static str {
        match self {
            OrderError::Store(_) => "store",
            OrderError::NotFound("commission") => "order-commission",
            _ => "order",
        }
    }
}
