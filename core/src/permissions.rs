//! Permission resolver.
//!
//! Capabilities are derived from the registry allow-lists and nothing else,
//! so what a role is offered and what the dispatcher re-validates at
//! execution time cannot drift apart. Denied actions are hidden: they never
//! appear in the offered set at all.

use serde::Serialize;
use utoipa::ToSchema;

use crate::registry::{ActionDescriptor, ActionDomain, ActionName, descriptors};
use crate::roles::Role;

fn can(role: Role, action: ActionName) -> bool {
    action.descriptor().allows(role)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct FaultCapabilities {
    pub can_view_history: bool,
    pub can_add_note: bool,
    pub can_acknowledge: bool,
    pub can_diagnose: bool,
    pub can_close: bool,
    pub can_reopen: bool,
    pub can_mark_false_alarm: bool,
    pub can_create_work_order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct WorkOrderCapabilities {
    pub can_view_checklist: bool,
    pub can_add_note: bool,
    pub can_start: bool,
    pub can_complete: bool,
    pub can_assign: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct HandoverCapabilities {
    pub can_add: bool,
    pub can_edit: bool,
    pub can_finalize: bool,
    pub can_sign_outgoing: bool,
    pub can_sign_incoming: bool,
    pub can_export: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct InventoryCapabilities {
    pub can_view_stock: bool,
    pub can_adjust_stock: bool,
    pub can_order: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReceivingCapabilities {
    pub can_accept: bool,
    pub can_reject: bool,
}

/// Everything a role may do, grouped by domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Capabilities {
    pub role: Role,
    pub fault: FaultCapabilities,
    pub work_order: WorkOrderCapabilities,
    pub handover: HandoverCapabilities,
    pub inventory: InventoryCapabilities,
    pub receiving: ReceivingCapabilities,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            fault: FaultCapabilities {
                can_view_history: can(role, ActionName::ViewFaultHistory),
                can_add_note: can(role, ActionName::AddFaultNote),
                can_acknowledge: can(role, ActionName::AcknowledgeFault),
                can_diagnose: can(role, ActionName::DiagnoseFault),
                can_close: can(role, ActionName::CloseFault),
                can_reopen: can(role, ActionName::ReopenFault),
                can_mark_false_alarm: can(role, ActionName::MarkFaultFalseAlarm),
                can_create_work_order: can(role, ActionName::CreateWorkOrderFromFault),
            },
            work_order: WorkOrderCapabilities {
                can_view_checklist: can(role, ActionName::ViewWorkOrderChecklist),
                can_add_note: can(role, ActionName::AddWorkOrderNote),
                can_start: can(role, ActionName::StartWorkOrder),
                can_complete: can(role, ActionName::CompleteWorkOrder),
                can_assign: can(role, ActionName::AssignWorkOrder),
            },
            handover: HandoverCapabilities {
                can_add: can(role, ActionName::AddToHandover),
                can_edit: can(role, ActionName::EditHandoverItem),
                can_finalize: can(role, ActionName::FinalizeHandover),
                can_sign_outgoing: can(role, ActionName::SignOutgoing),
                can_sign_incoming: can(role, ActionName::SignIncoming),
                can_export: can(role, ActionName::ExportHandover),
            },
            inventory: InventoryCapabilities {
                can_view_stock: can(role, ActionName::ViewPartStock),
                can_adjust_stock: can(role, ActionName::AdjustStockQuantity),
                can_order: can(role, ActionName::OrderPart),
            },
            receiving: ReceivingCapabilities {
                can_accept: can(role, ActionName::AcceptReceiving),
                can_reject: can(role, ActionName::RejectReceiving),
            },
        }
    }
}

/// Actions to render for `role`, optionally narrowed to one domain.
pub fn offered_actions(role: Role, domain: Option<ActionDomain>) -> Vec<ActionDescriptor> {
    descriptors()
        .filter(|descriptor| domain.is_none_or(|d| descriptor.domain == d))
        .filter(|descriptor| descriptor.allows(role))
        .collect()
}

pub fn is_offered(role: Role, action: ActionName) -> bool {
    can(role, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offered_set_never_contains_a_denied_action() {
        for role in Role::ALL {
            let offered = offered_actions(role, None);
            for action in ActionName::ALL {
                let listed = offered.iter().any(|d| d.name == action);
                assert_eq!(
                    listed,
                    action.descriptor().allows(role),
                    "{role} / {action}"
                );
            }
        }
    }

    #[test]
    fn crew_is_not_offered_acknowledge() {
        let offered = offered_actions(Role::Crew, Some(ActionDomain::Fault));
        assert!(offered.iter().all(|d| d.name != ActionName::AcknowledgeFault));
        assert!(offered.iter().any(|d| d.name == ActionName::AddFaultNote));
        assert!(!Capabilities::for_role(Role::Crew).fault.can_acknowledge);
    }

    #[test]
    fn assign_is_non_contiguous() {
        assert!(Capabilities::for_role(Role::ChiefOfficer).work_order.can_assign);
        assert!(!Capabilities::for_role(Role::ChiefSteward).work_order.can_assign);
        assert!(!Capabilities::for_role(Role::Eto).work_order.can_assign);
        assert!(Capabilities::for_role(Role::Manager).work_order.can_assign);
    }

    #[test]
    fn hod_can_finalize_but_only_some_export() {
        let purser = Capabilities::for_role(Role::Purser).handover;
        assert!(purser.can_finalize);
        assert!(!purser.can_export);
        assert!(Capabilities::for_role(Role::ChiefEngineer).handover.can_export);
    }

    #[test]
    fn domain_filter_narrows_results() {
        let receiving = offered_actions(Role::Captain, Some(ActionDomain::Receiving));
        let names: Vec<_> = receiving.iter().map(|d| d.name).collect();
        assert_eq!(names, vec![ActionName::AcceptReceiving, ActionName::RejectReceiving]);
        assert!(offered_actions(Role::ChiefOfficer, Some(ActionDomain::Receiving)).is_empty());
    }
}
