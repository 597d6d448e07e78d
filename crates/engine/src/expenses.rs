//! Expense rows recorded against a shift.
//!
//! Like rides, expenses are written elsewhere and only read here at
//! settlement time. Two flags steer the split: `is_particular` marks a
//! driver-personal cost (tracked, kept out of the shared pool) and
//! `is_split_cost` marks a cost shared between company and driver.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ShiftError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub shift_id: Uuid,
    pub cost_type_id: String,
    /// Cost in centavos.
    pub value: i64,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_particular: bool,
    pub is_split_cost: bool,
}

impl Expense {
    pub fn new(
        shift_id: Uuid,
        cost_type_id: String,
        value: i64,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shift_id,
            cost_type_id,
            value,
            date,
            notes: None,
            is_particular: false,
            is_split_cost: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub shift_id: String,
    pub cost_type_id: String,
    #[sea_orm(column_name = "valor")]
    pub value: i64,
    pub date: DateTimeUtc,
    pub notes: Option<String>,
    pub is_particular: bool,
    pub is_split_cost: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            shift_id: ActiveValue::Set(expense.shift_id.to_string()),
            cost_type_id: ActiveValue::Set(expense.cost_type_id.clone()),
            value: ActiveValue::Set(expense.value),
            date: ActiveValue::Set(expense.date),
            notes: ActiveValue::Set(expense.notes.clone()),
            is_particular: ActiveValue::Set(expense.is_particular),
            is_split_cost: ActiveValue::Set(expense.is_split_cost),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = ShiftError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| ShiftError::NotFound("custo".to_string()))?,
            shift_id: Uuid::parse_str(&model.shift_id)
                .map_err(|_| ShiftError::NotFound("turno".to_string()))?,
            cost_type_id: model.cost_type_id,
            value: model.value,
            date: model.date,
            notes: model.notes,
            is_particular: model.is_particular,
            is_split_cost: model.is_split_cost,
        })
    }
}
