//! The module contains the error the engine can throw.
//!
//! Errors fall in a few classes (see [`ErrorClass`]):
//!
//! - validation: [`InvalidQuantity`], [`InvalidPrice`], [`InvalidAmount`]
//! - tenancy: [`TenantMismatch`], [`NoTenantAssociation`]
//! - conflicts: [`AlreadyPosted`], [`ExistingKey`]
//! - [`NotFound`]: missing, or not visible from the caller's tenant
//! - internal: [`ConsistencyFault`], [`Database`]
//!
//!  [`InvalidQuantity`]: EngineError::InvalidQuantity
//!  [`InvalidPrice`]: EngineError::InvalidPrice
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`TenantMismatch`]: EngineError::TenantMismatch
//!  [`NoTenantAssociation`]: EngineError::NoTenantAssociation
//!  [`AlreadyPosted`]: EngineError::AlreadyPosted
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`NotFound`]: EngineError::NotFound
//!  [`ConsistencyFault`]: EngineError::ConsistencyFault
//!  [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Tenant mismatch: {0}")]
    TenantMismatch(String),
    #[error("No tenant association for \"{0}\"")]
    NoTenantAssociation(String),
    #[error("\"{0}\" already posted!")]
    AlreadyPosted(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Coarse classification used by outer layers to pick a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Tenant,
    Conflict,
    NotFound,
    Internal,
}

impl EngineError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidQuantity(_) | Self::InvalidPrice(_) | Self::InvalidAmount(_) => {
                ErrorClass::Validation
            }
            Self::TenantMismatch(_) | Self::NoTenantAssociation(_) => ErrorClass::Tenant,
            Self::AlreadyPosted(_) | Self::ExistingKey(_) => ErrorClass::Conflict,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::ConsistencyFault(_) | Self::Database(_) => ErrorClass::Internal,
        }
    }

    /// `true` when the caller can fix the request (4xx), `false` for faults on
    /// our side (5xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.class() != ErrorClass::Internal
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidQuantity(a), Self::InvalidQuantity(b)) => a == b,
            (Self::InvalidPrice(a), Self::InvalidPrice(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::TenantMismatch(a), Self::TenantMismatch(b)) => a == b,
            (Self::NoTenantAssociation(a), Self::NoTenantAssociation(b)) => a == b,
            (Self::AlreadyPosted(a), Self::AlreadyPosted(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::ConsistencyFault(a), Self::ConsistencyFault(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
