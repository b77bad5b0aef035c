use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use hearth_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hearth_core::errors::{EngineError, Severity, ViolationCategory};

use crate::collaborators::{CrmClient, EventBus, Notification};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    /// At least one delivery channel confirmed the handoff.
    Escalated,
    /// Every channel failed; the ticket waits for asynchronous pickup.
    Queued,
    /// Channels worked but the audit write did not, so the action is not
    /// provably logged.
    Degraded,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Escalated => "escalated",
            Self::Queued => "queued",
            Self::Degraded => "escalation_degraded",
        }
    }
}

/// Record of a case handed to a human operator. Created whenever automated
/// handling is exhausted; never silently dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub id: String,
    pub subject_id: String,
    pub reason: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub crm_tagged: bool,
    pub note_added: bool,
    pub event_published: bool,
    pub status: EscalationStatus,
}

const HUMAN_ESCALATION_TAG: &str = "needs_human";
const COMPLIANCE_HOLD_TAG: &str = "compliance_hold";

/// Escalate an unrecoverable stage failure to a human. The CRM tag and the
/// status event are attempted independently; one success is enough to mark
/// the ticket escalated, and both failing parks it as queued.
pub async fn escalate_to_human(
    crm: &dyn CrmClient,
    bus: &dyn EventBus,
    subject_id: &str,
    reason: &str,
) -> EscalationTicket {
    let mut ticket = EscalationTicket {
        id: Uuid::new_v4().to_string(),
        subject_id: subject_id.to_string(),
        reason: reason.to_string(),
        severity: Severity::High,
        created_at: Utc::now(),
        crm_tagged: false,
        note_added: false,
        event_published: false,
        status: EscalationStatus::Queued,
    };

    match crm.add_tags(subject_id, &[HUMAN_ESCALATION_TAG.to_string()]).await {
        Ok(()) => ticket.crm_tagged = true,
        Err(error) => warn!(subject_id, %error, "human escalation crm tag failed"),
    }
    match crm.add_note(subject_id, &format!("Automated handling exhausted: {reason}")).await {
        Ok(()) => ticket.note_added = true,
        Err(error) => warn!(subject_id, %error, "human escalation crm note failed"),
    }
    match bus
        .publish(Notification::Escalation {
            conversation_id: subject_id.to_string(),
            reason: reason.to_string(),
            severity: ticket.severity.as_str().to_string(),
        })
        .await
    {
        Ok(()) => ticket.event_published = true,
        Err(error) => warn!(subject_id, %error, "human escalation event publish failed"),
    }

    if ticket.crm_tagged || ticket.event_published {
        ticket.status = EscalationStatus::Escalated;
    } else {
        error!(subject_id, reason, "all escalation channels failed, ticket queued");
        ticket.status = EscalationStatus::Queued;
    }
    ticket
}

/// Fallible audit log for compliance events. Unlike the general purpose
/// sink this write must be provable, so failure is surfaced instead of
/// swallowed.
pub trait ComplianceLog: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), EngineError>;
}

#[derive(Default)]
pub struct InMemoryComplianceLog {
    events: std::sync::Mutex<Vec<AuditEvent>>,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryComplianceLog {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ComplianceLog for InMemoryComplianceLog {
    fn record(&self, event: AuditEvent) -> Result<(), EngineError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(EngineError::upstream("compliance_log", "audit store unavailable"));
        }
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        Ok(())
    }
}

/// Outcome of a compliance escalation, consumed by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComplianceOutcome {
    pub ticket: EscalationTicket,
    pub category: ViolationCategory,
    pub bot_paused: bool,
    pub crm_flagged: bool,
    pub audit_logged: bool,
}

/// Higher priority escalation for detected policy violations.
///
/// Always writes an audit record and flags the party in the CRM; critical
/// and high severity additionally notify immediately and pause automated
/// contact. A failed audit write degrades the ticket status because the
/// action happened but cannot be proven from the log.
pub async fn escalate_compliance(
    log: &dyn ComplianceLog,
    crm: &dyn CrmClient,
    bus: &dyn EventBus,
    subject_id: &str,
    category: ViolationCategory,
    detail: &str,
) -> ComplianceOutcome {
    let severity = category.severity();
    let mut ticket = EscalationTicket {
        id: Uuid::new_v4().to_string(),
        subject_id: subject_id.to_string(),
        reason: format!("{} violation: {detail}", category.as_str()),
        severity,
        created_at: Utc::now(),
        crm_tagged: false,
        note_added: false,
        event_published: false,
        status: EscalationStatus::Queued,
    };

    let audit_event = AuditEvent::new(
        Some(subject_id.to_string()),
        ticket.id.clone(),
        "compliance.violation_detected",
        AuditCategory::Compliance,
        "compliance_escalator",
        AuditOutcome::Rejected,
    )
    .with_metadata("category", category.as_str())
    .with_metadata("severity", severity.as_str())
    .with_metadata("detail", detail);

    let audit_logged = match log.record(audit_event) {
        Ok(()) => true,
        Err(audit_error) => {
            error!(subject_id, %audit_error, "compliance audit write failed");
            false
        }
    };

    let crm_flagged = match crm
        .add_tags(
            subject_id,
            &[COMPLIANCE_HOLD_TAG.to_string(), category.as_str().to_string()],
        )
        .await
    {
        Ok(()) => {
            ticket.crm_tagged = true;
            true
        }
        Err(crm_error) => {
            warn!(subject_id, %crm_error, "compliance crm flag failed");
            false
        }
    };

    let bot_paused = severity.pauses_automation();
    if bot_paused {
        match bus
            .publish(Notification::Escalation {
                conversation_id: subject_id.to_string(),
                reason: ticket.reason.clone(),
                severity: severity.as_str().to_string(),
            })
            .await
        {
            Ok(()) => ticket.event_published = true,
            Err(bus_error) => {
                warn!(subject_id, %bus_error, "compliance notification failed")
            }
        }
    }

    ticket.status = if !audit_logged {
        EscalationStatus::Degraded
    } else if ticket.crm_tagged || ticket.event_published {
        EscalationStatus::Escalated
    } else {
        EscalationStatus::Queued
    };

    ComplianceOutcome { ticket, category, bot_paused, crm_flagged, audit_logged }
}
