//! Ride rows recorded against a shift.
//!
//! Rides are written by the ride-recording flow, not by this engine; the
//! engine only reads them back when settling a shift. The channel split is
//! driven by the free-text `tipo` label the apps have historically written.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ShiftError;

/// Revenue channel of a ride, derived from its recorded label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RideChannel {
    /// Dispatched through the ride-hailing app ("APP"/"APLICATIVO").
    App,
    /// Everything else: street hails, private bookings.
    Particular,
}

impl RideChannel {
    /// Classifies a label case-insensitively: `APP` and `APLICATIVO` are
    /// app-channel, any other label (including empty) is private-channel.
    pub fn classify(tipo: &str) -> Self {
        match tipo.trim().to_uppercase().as_str() {
            "APP" | "APLICATIVO" => Self::App,
            _ => Self::Particular,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub shift_id: Uuid,
    pub tipo: String,
    /// Fare in centavos.
    pub valor: i64,
    pub hora: DateTime<Utc>,
}

impl Ride {
    pub fn new(shift_id: Uuid, tipo: String, valor: i64, hora: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shift_id,
            tipo,
            valor,
            hora,
        }
    }

    pub fn channel(&self) -> RideChannel {
        RideChannel::classify(&self.tipo)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rides")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub shift_id: String,
    pub tipo: String,
    pub valor: i64,
    pub hora: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Ride> for ActiveModel {
    fn from(ride: &Ride) -> Self {
        Self {
            id: ActiveValue::Set(ride.id.to_string()),
            shift_id: ActiveValue::Set(ride.shift_id.to_string()),
            tipo: ActiveValue::Set(ride.tipo.clone()),
            valor: ActiveValue::Set(ride.valor),
            hora: ActiveValue::Set(ride.hora),
        }
    }
}

impl TryFrom<Model> for Ride {
    type Error = ShiftError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| ShiftError::NotFound("corrida".to_string()))?,
            shift_id: Uuid::parse_str(&model.shift_id)
                .map_err(|_| ShiftError::NotFound("turno".to_string()))?,
            tipo: model.tipo,
            valor: model.valor,
            hora: model.hora,
        })
    }
}
