//! The module contains the errors the shift engine can throw.
//!
//! Business rejections carry the message shown to the end user (the product
//! speaks Portuguese); they are raised before any row is written, so a
//! rejected operation leaves no partial state. [`Database`] aborts the
//! enclosing transaction and rolls everything back.
//!
//! [`Database`]: ShiftError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Shift engine custom errors.
#[derive(Error, Debug)]
pub enum ShiftError {
    /// The driver already has an open shift. Carries the driver id.
    #[error("Motorista já possui um turno aberto.")]
    DriverShiftOpen(String),
    /// The vehicle is already bound to another open shift. Carries the
    /// vehicle id.
    #[error("Este veículo já está em uso em outro turno.")]
    VehicleInUse(String),
    /// An odometer reading would move backwards. The message explains which
    /// reading was rejected and why.
    #[error("KM inválido! {0}")]
    OdometerRegression(String),
    #[error("{0} não encontrado")]
    NotFound(String),
    /// The shift already went through `finish`/`admin_close`. Carries the
    /// shift id.
    #[error("Turno já finalizado")]
    AlreadyFinalized(String),
    #[error("Campo inválido: {0}")]
    InvalidField(String),
    #[error("snapshot não serializável: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for ShiftError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DriverShiftOpen(a), Self::DriverShiftOpen(b)) => a == b,
            (Self::VehicleInUse(a), Self::VehicleInUse(b)) => a == b,
            (Self::OdometerRegression(a), Self::OdometerRegression(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::AlreadyFinalized(a), Self::AlreadyFinalized(b)) => a == b,
            (Self::InvalidField(a), Self::InvalidField(b)) => a == b,
            (Self::Snapshot(a), Self::Snapshot(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
