//! OpenAPI components for every wire type the operations backend and the
//! situation log exchange with clients. Printed by `bridgewatch schema`.

use utoipa::OpenApi;

use crate::audit::{ActionExecutionRecord, EntityRef};
use crate::error::ApiError;
use crate::evidence::{Evidence, EvidenceSignal};
use crate::nudge::NudgeType;
use crate::permissions::{
    Capabilities, FaultCapabilities, HandoverCapabilities, InventoryCapabilities,
    ReceivingCapabilities, WorkOrderCapabilities,
};
use crate::recurrence::{RecurrenceQuery, RecurrenceResult, SymptomReport};
use crate::registry::{ActionCluster, ActionDomain, ActionName, SideEffect};
use crate::roles::Role;
use crate::situation::{
    DeviceType, EntityType, Phase, SituationDomain, SituationIdentity, SituationKey,
    SituationRecord, SituationState,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bridgewatch wire types",
        description = "Payloads exchanged with the yacht operations backend"
    ),
    components(schemas(
        ApiError,
        ActionExecutionRecord,
        EntityRef,
        Evidence,
        EvidenceSignal,
        NudgeType,
        Capabilities,
        FaultCapabilities,
        WorkOrderCapabilities,
        HandoverCapabilities,
        InventoryCapabilities,
        ReceivingCapabilities,
        RecurrenceQuery,
        RecurrenceResult,
        SymptomReport,
        ActionCluster,
        ActionDomain,
        ActionName,
        SideEffect,
        Role,
        DeviceType,
        EntityType,
        Phase,
        SituationDomain,
        SituationIdentity,
        SituationKey,
        SituationRecord,
        SituationState,
    ))
)]
pub struct WireSchemas;

pub fn document() -> utoipa::openapi::OpenApi {
    WireSchemas::openapi()
}
