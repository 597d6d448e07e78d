//! Vehicle rows, as seen by the shift engine.
//!
//! The registry that creates and edits vehicles lives outside this crate.
//! Here a vehicle is only a plate, an active flag and its accepted odometer
//! reading, which every shift must keep moving forward.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub plate: String,
    pub modelo: String,
    pub is_active: bool,
    /// Last accepted odometer reading, in km. New shifts must start at or
    /// above it.
    pub km_inicial: i64,
    /// Kept equal to `km_inicial` on every advance; legacy reporting reads
    /// this column.
    pub current_km: i64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "vehicles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub plate: String,
    pub modelo: String,
    pub is_active: bool,
    pub km_inicial: i64,
    pub current_km: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Vehicle> for ActiveModel {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: ActiveValue::Set(vehicle.id.clone()),
            plate: ActiveValue::Set(vehicle.plate.clone()),
            modelo: ActiveValue::Set(vehicle.modelo.clone()),
            is_active: ActiveValue::Set(vehicle.is_active),
            km_inicial: ActiveValue::Set(vehicle.km_inicial),
            current_km: ActiveValue::Set(vehicle.current_km),
        }
    }
}

impl From<Model> for Vehicle {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            plate: model.plate,
            modelo: model.modelo,
            is_active: model.is_active,
            km_inicial: model.km_inicial,
            current_km: model.current_km,
        }
    }
}
