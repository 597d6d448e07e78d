//! Shift primitives.
//!
//! A `Shift` is one driver's bounded work session against one vehicle, from
//! start odometer/time to end odometer/time. The settlement fields are
//! derived from the shift's rides and expenses and are recomputable at any
//! time; downstream reporting reads them straight from the table, so their
//! names are a stable contract.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ShiftError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Finalized,
}

impl ShiftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "em_andamento",
            Self::Finalized => "finalizado",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl TryFrom<&str> for ShiftStatus {
    type Error = ShiftError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            // "aberto" is the legacy label still present in old rows; the
            // engine only ever writes "em_andamento".
            "em_andamento" | "aberto" => Ok(Self::Open),
            "finalizado" => Ok(Self::Finalized),
            other => Err(ShiftError::InvalidField(format!(
                "status de turno desconhecido: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub driver_id: String,
    pub vehicle_id: String,
    pub inicio: DateTime<Utc>,
    pub fim: Option<DateTime<Utc>>,
    pub km_inicial: i64,
    pub km_final: Option<i64>,
    pub status: ShiftStatus,
    pub total_app: i64,
    pub total_particular: i64,
    pub total_bruto: i64,
    pub total_corridas: i32,
    pub total_corridas_app: i32,
    pub total_corridas_particular: i32,
    pub total_custos: i64,
    pub total_custos_particular: i64,
    pub liquido: i64,
    pub repasse_empresa: i64,
    pub repasse_motorista: i64,
    pub discount_company: i64,
    pub discount_driver: i64,
    pub duracao_min: i64,
}

impl Shift {
    /// A freshly opened shift: no end reading, every derived field zeroed
    /// until the first settlement runs.
    pub fn new(
        driver_id: String,
        vehicle_id: String,
        km_inicial: i64,
        inicio: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            vehicle_id,
            inicio,
            fim: None,
            km_inicial,
            km_final: None,
            status: ShiftStatus::Open,
            total_app: 0,
            total_particular: 0,
            total_bruto: 0,
            total_corridas: 0,
            total_corridas_app: 0,
            total_corridas_particular: 0,
            total_custos: 0,
            total_custos_particular: 0,
            liquido: 0,
            repasse_empresa: 0,
            repasse_motorista: 0,
            discount_company: 0,
            discount_driver: 0,
            duracao_min: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "shifts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub inicio: DateTimeUtc,
    pub fim: Option<DateTimeUtc>,
    pub km_inicial: i64,
    pub km_final: Option<i64>,
    pub status: String,
    pub total_app: i64,
    pub total_particular: i64,
    pub total_bruto: i64,
    pub total_corridas: i32,
    pub total_corridas_app: i32,
    pub total_corridas_particular: i32,
    pub total_custos: i64,
    pub total_custos_particular: i64,
    pub liquido: i64,
    pub repasse_empresa: i64,
    pub repasse_motorista: i64,
    pub discount_company: i64,
    pub discount_driver: i64,
    pub duracao_min: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Shift> for ActiveModel {
    fn from(shift: &Shift) -> Self {
        Self {
            id: ActiveValue::Set(shift.id.to_string()),
            driver_id: ActiveValue::Set(shift.driver_id.clone()),
            vehicle_id: ActiveValue::Set(shift.vehicle_id.clone()),
            inicio: ActiveValue::Set(shift.inicio),
            fim: ActiveValue::Set(shift.fim),
            km_inicial: ActiveValue::Set(shift.km_inicial),
            km_final: ActiveValue::Set(shift.km_final),
            status: ActiveValue::Set(shift.status.as_str().to_string()),
            total_app: ActiveValue::Set(shift.total_app),
            total_particular: ActiveValue::Set(shift.total_particular),
            total_bruto: ActiveValue::Set(shift.total_bruto),
            total_corridas: ActiveValue::Set(shift.total_corridas),
            total_corridas_app: ActiveValue::Set(shift.total_corridas_app),
            total_corridas_particular: ActiveValue::Set(shift.total_corridas_particular),
            total_custos: ActiveValue::Set(shift.total_custos),
            total_custos_particular: ActiveValue::Set(shift.total_custos_particular),
            liquido: ActiveValue::Set(shift.liquido),
            repasse_empresa: ActiveValue::Set(shift.repasse_empresa),
            repasse_motorista: ActiveValue::Set(shift.repasse_motorista),
            discount_company: ActiveValue::Set(shift.discount_company),
            discount_driver: ActiveValue::Set(shift.discount_driver),
            duracao_min: ActiveValue::Set(shift.duracao_min),
        }
    }
}

impl TryFrom<Model> for Shift {
    type Error = ShiftError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| ShiftError::NotFound("turno".to_string()))?,
            driver_id: model.driver_id,
            vehicle_id: model.vehicle_id,
            inicio: model.inicio,
            fim: model.fim,
            km_inicial: model.km_inicial,
            km_final: model.km_final,
            status: ShiftStatus::try_from(model.status.as_str())?,
            total_app: model.total_app,
            total_particular: model.total_particular,
            total_bruto: model.total_bruto,
            total_corridas: model.total_corridas,
            total_corridas_app: model.total_corridas_app,
            total_corridas_particular: model.total_corridas_particular,
            total_custos: model.total_custos,
            total_custos_particular: model.total_custos_particular,
            liquido: model.liquido,
            repasse_empresa: model.repasse_empresa,
            repasse_motorista: model.repasse_motorista,
            discount_company: model.discount_company,
            discount_driver: model.discount_driver,
            duracao_min: model.duracao_min,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_legacy_alias() {
        assert_eq!(ShiftStatus::try_from("em_andamento"), Ok(ShiftStatus::Open));
        assert_eq!(ShiftStatus::try_from("aberto"), Ok(ShiftStatus::Open));
        assert_eq!(
            ShiftStatus::try_from("finalizado"),
            Ok(ShiftStatus::Finalized)
        );
        assert!(ShiftStatus::try_from("pausado").is_err());
    }

    #[test]
    fn status_never_writes_the_alias() {
        assert_eq!(ShiftStatus::Open.as_str(), "em_andamento");
        assert_eq!(ShiftStatus::Finalized.as_str(), "finalizado");
    }
}
