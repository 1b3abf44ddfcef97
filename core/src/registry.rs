//! Static catalog of every action the orchestration core can dispatch.
//!
//! The catalog is a closed enum with a total `match` in
//! [`ActionName::descriptor`], so adding an action without describing it is a
//! compile error rather than a runtime lookup miss.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::roles::{
    ENGINEER_PLUS, HANDOVER_EXPORTERS, HOD_PLUS, RECEIVING_APPROVERS, Role, WORK_ORDER_ASSIGNERS,
};

/// How much an action changes backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadOnly,
    MutationLight,
    MutationHeavy,
}

impl SideEffect {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::MutationLight => "mutation_light",
            Self::MutationHeavy => "mutation_heavy",
        }
    }

    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// Operator intent an action serves. Used to group actions in menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionCluster {
    FixSomething,
    DoMaintenance,
    ManageEquipment,
    ControlInventory,
    CommunicateStatus,
    ComplyAudit,
    ProcureSuppliers,
}

impl ActionCluster {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FixSomething => "fix_something",
            Self::DoMaintenance => "do_maintenance",
            Self::ManageEquipment => "manage_equipment",
            Self::ControlInventory => "control_inventory",
            Self::CommunicateStatus => "communicate_status",
            Self::ComplyAudit => "comply_audit",
            Self::ProcureSuppliers => "procure_suppliers",
        }
    }
}

/// Entity family an action targets. Capability sets are grouped the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionDomain {
    Fault,
    WorkOrder,
    Equipment,
    Handover,
    Inventory,
    Receiving,
}

impl ActionDomain {
    pub const ALL: [ActionDomain; 6] = [
        ActionDomain::Fault,
        ActionDomain::WorkOrder,
        ActionDomain::Equipment,
        ActionDomain::Handover,
        ActionDomain::Inventory,
        ActionDomain::Receiving,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fault => "fault",
            Self::WorkOrder => "work_order",
            Self::Equipment => "equipment",
            Self::Handover => "handover",
            Self::Inventory => "inventory",
            Self::Receiving => "receiving",
        }
    }

    /// Name of the identifier field the backend expects for this domain,
    /// in both the envelope context and the payload.
    pub const fn entity_key(self) -> &'static str {
        match self {
            Self::Fault => "fault_id",
            Self::WorkOrder => "work_order_id",
            Self::Equipment => "equipment_id",
            Self::Handover => "handover_id",
            Self::Inventory => "part_id",
            Self::Receiving => "receiving_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown domain '{0}'")]
pub struct UnknownDomain(pub String);

impl FromStr for ActionDomain {
    type Err = UnknownDomain;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace('-', "_");
        ActionDomain::ALL
            .into_iter()
            .find(|domain| domain.as_str() == normalized)
            .ok_or_else(|| UnknownDomain(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    AcknowledgeFault,
    DiagnoseFault,
    CloseFault,
    ReopenFault,
    MarkFaultFalseAlarm,
    AddFaultNote,
    ViewFaultHistory,
    CreateWorkOrderFromFault,
    StartWorkOrder,
    CompleteWorkOrder,
    AssignWorkOrder,
    AddWorkOrderNote,
    ViewWorkOrderChecklist,
    ShowManualSection,
    AddToHandover,
    EditHandoverItem,
    FinalizeHandover,
    SignOutgoing,
    SignIncoming,
    ExportHandover,
    ViewPartStock,
    AdjustStockQuantity,
    OrderPart,
    AcceptReceiving,
    RejectReceiving,
}

/// Registry entry. Immutable; produced by [`ActionName::descriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    pub name: ActionName,
    pub label: &'static str,
    pub cluster: ActionCluster,
    pub domain: ActionDomain,
    pub side_effect: SideEffect,
    pub requires_confirmation: bool,
    pub requires_reason: bool,
    pub requires_signature: bool,
    /// `None` means any authenticated role.
    pub allowed_roles: Option<&'static [Role]>,
}

impl ActionDescriptor {
    const fn new(
        name: ActionName,
        label: &'static str,
        cluster: ActionCluster,
        domain: ActionDomain,
        side_effect: SideEffect,
    ) -> Self {
        Self {
            name,
            label,
            cluster,
            domain,
            side_effect,
            requires_confirmation: false,
            requires_reason: false,
            requires_signature: false,
            allowed_roles: None,
        }
    }

    const fn roles(mut self, roles: &'static [Role]) -> Self {
        self.allowed_roles = Some(roles);
        self
    }

    const fn confirm(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    const fn reason(mut self) -> Self {
        self.requires_reason = true;
        self
    }

    const fn signature(mut self) -> Self {
        self.requires_signature = true;
        self
    }

    pub fn allows(&self, role: Role) -> bool {
        match self.allowed_roles {
            Some(roles) => roles.contains(&role),
            None => true,
        }
    }
}

impl ActionName {
    pub const ALL: [ActionName; 25] = [
        ActionName::AcknowledgeFault,
        ActionName::DiagnoseFault,
        ActionName::CloseFault,
        ActionName::ReopenFault,
        ActionName::MarkFaultFalseAlarm,
        ActionName::AddFaultNote,
        ActionName::ViewFaultHistory,
        ActionName::CreateWorkOrderFromFault,
        ActionName::StartWorkOrder,
        ActionName::CompleteWorkOrder,
        ActionName::AssignWorkOrder,
        ActionName::AddWorkOrderNote,
        ActionName::ViewWorkOrderChecklist,
        ActionName::ShowManualSection,
        ActionName::AddToHandover,
        ActionName::EditHandoverItem,
        ActionName::FinalizeHandover,
        ActionName::SignOutgoing,
        ActionName::SignIncoming,
        ActionName::ExportHandover,
        ActionName::ViewPartStock,
        ActionName::AdjustStockQuantity,
        ActionName::OrderPart,
        ActionName::AcceptReceiving,
        ActionName::RejectReceiving,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcknowledgeFault => "acknowledge_fault",
            Self::DiagnoseFault => "diagnose_fault",
            Self::CloseFault => "close_fault",
            Self::ReopenFault => "reopen_fault",
            Self::MarkFaultFalseAlarm => "mark_fault_false_alarm",
            Self::AddFaultNote => "add_fault_note",
            Self::ViewFaultHistory => "view_fault_history",
            Self::CreateWorkOrderFromFault => "create_work_order_from_fault",
            Self::StartWorkOrder => "start_work_order",
            Self::CompleteWorkOrder => "complete_work_order",
            Self::AssignWorkOrder => "assign_work_order",
            Self::AddWorkOrderNote => "add_work_order_note",
            Self::ViewWorkOrderChecklist => "view_work_order_checklist",
            Self::ShowManualSection => "show_manual_section",
            Self::AddToHandover => "add_to_handover",
            Self::EditHandoverItem => "edit_handover_item",
            Self::FinalizeHandover => "finalize_handover",
            Self::SignOutgoing => "sign_outgoing",
            Self::SignIncoming => "sign_incoming",
            Self::ExportHandover => "export_handover",
            Self::ViewPartStock => "view_part_stock",
            Self::AdjustStockQuantity => "adjust_stock_quantity",
            Self::OrderPart => "order_part",
            Self::AcceptReceiving => "accept_receiving",
            Self::RejectReceiving => "reject_receiving",
        }
    }

    pub fn descriptor(self) -> ActionDescriptor {
        use ActionCluster::*;
        use ActionDomain as D;
        use SideEffect::*;

        let d = ActionDescriptor::new;
        match self {
            Self::AcknowledgeFault => d(self, "Acknowledge fault", FixSomething, D::Fault, MutationLight)
                .roles(ENGINEER_PLUS),
            Self::DiagnoseFault => d(self, "Diagnose fault", FixSomething, D::Fault, MutationLight)
                .roles(ENGINEER_PLUS),
            Self::CloseFault => d(self, "Close fault", FixSomething, D::Fault, MutationHeavy)
                .roles(HOD_PLUS)
                .confirm(),
            Self::ReopenFault => d(self, "Reopen fault", FixSomething, D::Fault, MutationHeavy)
                .roles(HOD_PLUS)
                .reason(),
            Self::MarkFaultFalseAlarm => {
                d(self, "Mark as false alarm", FixSomething, D::Fault, MutationHeavy)
                    .roles(ENGINEER_PLUS)
                    .confirm()
                    .reason()
            }
            Self::AddFaultNote => d(self, "Add note", FixSomething, D::Fault, MutationLight),
            Self::ViewFaultHistory => d(self, "View history", FixSomething, D::Fault, ReadOnly),
            Self::CreateWorkOrderFromFault => {
                d(self, "Create work order", DoMaintenance, D::Fault, MutationHeavy)
                    .roles(ENGINEER_PLUS)
            }
            Self::StartWorkOrder => d(self, "Start work order", DoMaintenance, D::WorkOrder, MutationLight)
                .roles(ENGINEER_PLUS),
            Self::CompleteWorkOrder => {
                d(self, "Complete work order", DoMaintenance, D::WorkOrder, MutationHeavy)
                    .roles(ENGINEER_PLUS)
                    .confirm()
                    .signature()
            }
            Self::AssignWorkOrder => d(self, "Assign work order", DoMaintenance, D::WorkOrder, MutationLight)
                .roles(WORK_ORDER_ASSIGNERS),
            Self::AddWorkOrderNote => d(self, "Add note", DoMaintenance, D::WorkOrder, MutationLight),
            Self::ViewWorkOrderChecklist => {
                d(self, "View checklist", DoMaintenance, D::WorkOrder, ReadOnly)
            }
            Self::ShowManualSection => d(self, "Show manual", ManageEquipment, D::Equipment, ReadOnly),
            Self::AddToHandover => d(self, "Add to handover", CommunicateStatus, D::Handover, MutationLight),
            Self::EditHandoverItem => {
                d(self, "Edit handover item", CommunicateStatus, D::Handover, MutationLight)
            }
            Self::FinalizeHandover => {
                d(self, "Finalize handover", CommunicateStatus, D::Handover, MutationHeavy)
                    .roles(HOD_PLUS)
                    .confirm()
            }
            Self::SignOutgoing => d(self, "Sign outgoing", CommunicateStatus, D::Handover, MutationHeavy)
                .roles(HOD_PLUS)
                .signature(),
            Self::SignIncoming => d(self, "Sign incoming", CommunicateStatus, D::Handover, MutationHeavy)
                .roles(HOD_PLUS)
                .signature(),
            Self::ExportHandover => d(self, "Export handover", ComplyAudit, D::Handover, ReadOnly)
                .roles(HANDOVER_EXPORTERS),
            Self::ViewPartStock => d(self, "View stock", ControlInventory, D::Inventory, ReadOnly),
            Self::AdjustStockQuantity => {
                d(self, "Adjust stock", ControlInventory, D::Inventory, MutationHeavy)
                    .roles(ENGINEER_PLUS)
                    .reason()
            }
            Self::OrderPart => d(self, "Order part", ProcureSuppliers, D::Inventory, MutationLight)
                .roles(ENGINEER_PLUS),
            Self::AcceptReceiving => d(self, "Accept delivery", ProcureSuppliers, D::Receiving, MutationHeavy)
                .roles(RECEIVING_APPROVERS)
                .confirm()
                .signature(),
            Self::RejectReceiving => d(self, "Reject delivery", ProcureSuppliers, D::Receiving, MutationHeavy)
                .roles(RECEIVING_APPROVERS)
                .reason(),
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ActionName {
    type Err = UnknownAction;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim();
        ActionName::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| UnknownAction(raw.to_string()))
    }
}

/// All descriptors, in catalog order.
pub fn descriptors() -> impl Iterator<Item = ActionDescriptor> {
    ActionName::ALL.into_iter().map(ActionName::descriptor)
}
