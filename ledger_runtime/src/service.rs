//! Callable operations for admin tooling and scheduled jobs.
//!
//! Requests arrive as loosely typed camelCase JSON. `validate()` turns
//! each one into typed parameters and rejects it synchronously when a
//! field is missing or malformed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use ledger_kernel::consistency::ConsistencyReport;
use ledger_kernel::domain::{FiscalPeriod, LedgerType};
use ledger_kernel::fixes::{LedgerFix, OrderFix};
use ledger_kernel::rebuild::LedgerKey;

use crate::config::EngineConfig;
use crate::consistency::{self, FixSelection, RepairReport};
use crate::error::ServiceError;
use crate::order_trips;
use crate::rebuild::{self, RebuildAllReport, RebuildReport};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRequest {
    pub ledger_type: Option<String>,
    #[serde(alias = "ledgerId")]
    pub entity_id: Option<String>,
    pub organization_id: Option<String>,
    #[serde(alias = "financialYear")]
    pub fiscal_period: Option<String>,
}

pub type RebuildRequest = LedgerRequest;
pub type ConsistencyRequest = LedgerRequest;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    #[serde(flatten)]
    pub ledger: LedgerRequest,
    #[serde(default)]
    pub auto_fix: bool,
    /// Fix type names to apply. Empty applies every fix found.
    #[serde(default)]
    pub fix_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildAllRequest {
    pub organization_id: Option<String>,
    pub ledger_type: Option<String>,
    #[serde(alias = "financialYear")]
    pub fiscal_period: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub order_id: Option<String>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRepairRequest {
    #[serde(flatten)]
    pub order: OrderRequest,
    #[serde(default)]
    pub auto_fix: bool,
    #[serde(default)]
    pub fix_types: Vec<String>,
}

/// Validated order target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTarget {
    pub organization_id: String,
    pub order_id: String,
}

impl LedgerRequest {
    pub fn validate(&self) -> Result<LedgerKey, ServiceError> {
        Ok(LedgerKey {
            ledger_type: ledger_type(&self.ledger_type)?,
            organization_id: required("organizationId", &self.organization_id)?.to_string(),
            entity_id: required("entityId", &self.entity_id)?.to_string(),
            fiscal_period: fiscal_period(&self.fiscal_period)?,
        })
    }
}

impl RepairRequest {
    pub fn validate(&self) -> Result<(LedgerKey, FixSelection), ServiceError> {
        let key = self.ledger.validate()?;
        let selection = FixSelection::from_kinds(&self.fix_types, &LedgerFix::KINDS)?;
        Ok((key, selection))
    }
}

impl RebuildAllRequest {
    pub fn validate(&self) -> Result<(String, LedgerType, FiscalPeriod), ServiceError> {
        Ok((
            required("organizationId", &self.organization_id)?.to_string(),
            ledger_type(&self.ledger_type)?,
            fiscal_period(&self.fiscal_period)?,
        ))
    }
}

impl OrderRequest {
    pub fn validate(&self) -> Result<OrderTarget, ServiceError> {
        Ok(OrderTarget {
            organization_id: required("organizationId", &self.organization_id)?.to_string(),
            order_id: required("orderId", &self.order_id)?.to_string(),
        })
    }
}

impl OrderRepairRequest {
    pub fn validate(&self) -> Result<(OrderTarget, FixSelection), ServiceError> {
        let target = self.order.validate()?;
        let selection = FixSelection::from_kinds(&self.fix_types, &OrderFix::KINDS)?;
        Ok((target, selection))
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, ServiceError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::Validation(format!("{field} is required"))),
    }
}

fn ledger_type(value: &Option<String>) -> Result<LedgerType, ServiceError> {
    required("ledgerType", value)?
        .parse()
        .map_err(|e| ServiceError::Validation(format!("{e}")))
}

fn fiscal_period(value: &Option<String>) -> Result<FiscalPeriod, ServiceError> {
    required("fiscalPeriod", value)?
        .parse()
        .map_err(|e| ServiceError::Validation(format!("{e}")))
}

/// The callable surface over one store.
pub struct LedgerService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: DocumentStore + ?Sized> LedgerService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rebuild_ledger(&self, request: &RebuildRequest) -> Result<RebuildReport, ServiceError> {
        let key = request.validate()?;
        info!(ledger_id = %key.ledger_id(), ledger_type = %key.ledger_type, "Rebuilding ledger");
        rebuild::rebuild_ledger(self.store.as_ref(), &self.config, &key)
    }

    pub fn rebuild_all(&self, request: &RebuildAllRequest) -> Result<RebuildAllReport, ServiceError> {
        let (organization_id, ledger_type, period) = request.validate()?;
        rebuild::rebuild_all(self.store.as_ref(), &self.config, &organization_id, ledger_type, &period)
    }

    pub fn check_consistency(
        &self,
        request: &ConsistencyRequest,
    ) -> Result<ConsistencyReport<LedgerFix>, ServiceError> {
        let key = request.validate()?;
        consistency::check_consistency(self.store.as_ref(), &self.config, &key)
    }

    pub fn repair(&self, request: &RepairRequest) -> Result<RepairReport<LedgerFix>, ServiceError> {
        let (key, selection) = request.validate()?;
        consistency::repair(self.store.as_ref(), &self.config, &key, &selection, request.auto_fix)
    }

    pub fn check_order_trip_consistency(
        &self,
        request: &OrderRequest,
    ) -> Result<ConsistencyReport<OrderFix>, ServiceError> {
        let target = request.validate()?;
        order_trips::check_order_trip_consistency(self.store.as_ref(), &target.organization_id, &target.order_id)
    }

    pub fn repair_order(&self, request: &OrderRepairRequest) -> Result<RepairReport<OrderFix>, ServiceError> {
        let (target, selection) = request.validate()?;
        order_trips::repair_order(
            self.store.as_ref(),
            &self.config,
            &target.organization_id,
            &target.order_id,
            &selection,
            request.auto_fix,
        )
    }
}
