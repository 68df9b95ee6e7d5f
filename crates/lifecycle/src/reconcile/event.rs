//! Inbound lifecycle events from the patient and organization services.
//!
//! Payloads look like `{"event_type": "...", "data": {...}}`. When
//! `event_type` is absent or empty the routing key is used instead.
//! Decoding never fails: anything that cannot be acted on becomes
//! [`ReconcileAction::Ignore`] so the delivery is acknowledged.

use std::fmt;

use nfc_persistence::types::PatientId;
use serde::Deserialize;

/// A new patient was created. Nothing to do.
pub const PATIENT_CREATED: &str = "patient.created";
/// A patient was deleted.
pub const PATIENT_DELETED: &str = "patient.deleted";
/// A patient's status changed.
pub const PATIENT_STATUS_CHANGED: &str = "patient.status_changed";
/// An organization was deleted.
pub const ORGANIZATION_DELETED: &str = "organization.deleted";
/// An organization's status changed.
pub const ORGANIZATION_STATUS_CHANGED: &str = "organization.status_changed";

/// Every routing key the listener subscribes to.
pub const ROUTING_KEYS: [&str; 5] = [
    PATIENT_CREATED,
    PATIENT_DELETED,
    PATIENT_STATUS_CHANGED,
    ORGANIZATION_DELETED,
    ORGANIZATION_STATUS_CHANGED,
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    new_status: Option<String>,
    #[serde(default)]
    schema_name: Option<String>,
}

/// What an inbound event asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Deactivate every active tag of one patient.
    DeactivatePatient {
        /// Tenant of the patient.
        organization_id: String,
        /// Optional tenant hint from the producer.
        schema_name: Option<String>,
        /// The patient.
        patient_id: PatientId,
    },
    /// Deactivate every active tag of one tenant.
    DeactivateOrganization {
        /// The tenant.
        organization_id: String,
        /// Optional tenant hint from the producer.
        schema_name: Option<String>,
    },
    /// Acknowledge without acting.
    Ignore(IgnoreReason),
}

/// Why an event was acknowledged without action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The body was not a JSON event envelope.
    Malformed(String),
    /// `patient.created` needs no tag changes.
    PatientCreated,
    /// The new status is `active`.
    StillActive,
    /// A required id was missing or empty.
    MissingIdentifiers,
    /// Not one of the subscribed event types.
    UnknownEventType(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Malformed(reason) => write!(f, "malformed payload: {}", reason),
            IgnoreReason::PatientCreated => f.write_str("patient created"),
            IgnoreReason::StillActive => f.write_str("new status is active"),
            IgnoreReason::MissingIdentifiers => f.write_str("missing identifiers"),
            IgnoreReason::UnknownEventType(t) => write!(f, "unknown event type {}", t),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Decodes one delivery into the action it requires.
///
/// ```
/// use nfc_lifecycle::reconcile::{ReconcileAction, decode};
///
/// let body = br#"{"data": {"organization_id": "org-1", "new_status": "suspended"}}"#;
/// let action = decode("organization.status_changed", body);
///
/// assert_eq!(
///     action,
///     ReconcileAction::DeactivateOrganization {
///         organization_id: "org-1".to_string(),
///         schema_name: None,
///     }
/// );
/// ```
pub fn decode(routing_key: &str, body: &[u8]) -> ReconcileAction {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => return ReconcileAction::Ignore(IgnoreReason::Malformed(e.to_string())),
    };

    let event_type = non_empty(envelope.event_type).unwrap_or_else(|| routing_key.to_string());
    let data = envelope.data.unwrap_or_default();
    let organization_id = non_empty(data.organization_id);
    let patient_id = non_empty(data.patient_id);
    let schema_name = non_empty(data.schema_name);
    let still_active = data.new_status.as_deref() == Some("active");

    match event_type.as_str() {
        PATIENT_CREATED => ReconcileAction::Ignore(IgnoreReason::PatientCreated),
        PATIENT_DELETED | PATIENT_STATUS_CHANGED => {
            let (Some(organization_id), Some(patient_id)) = (organization_id, patient_id) else {
                return ReconcileAction::Ignore(IgnoreReason::MissingIdentifiers);
            };
            if event_type == PATIENT_STATUS_CHANGED && still_active {
                return ReconcileAction::Ignore(IgnoreReason::StillActive);
            }
            ReconcileAction::DeactivatePatient {
                organization_id,
                schema_name,
                patient_id: PatientId::new(patient_id),
            }
        }
        ORGANIZATION_DELETED | ORGANIZATION_STATUS_CHANGED => {
            let Some(organization_id) = organization_id else {
                return ReconcileAction::Ignore(IgnoreReason::MissingIdentifiers);
            };
            if event_type == ORGANIZATION_STATUS_CHANGED && still_active {
                return ReconcileAction::Ignore(IgnoreReason::StillActive);
            }
            ReconcileAction::DeactivateOrganization {
                organization_id,
                schema_name,
            }
        }
        other => ReconcileAction::Ignore(IgnoreReason::UnknownEventType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_deleted() {
        let body = br#"{"event_type": "patient.deleted", "data": {"patient_id": "p-1", "organization_id": "org-1", "schema_name": "org_1"}}"#;
        assert_eq!(
            decode("ignored", body),
            ReconcileAction::DeactivatePatient {
                organization_id: "org-1".to_string(),
                schema_name: Some("org_1".to_string()),
                patient_id: PatientId::new("p-1"),
            }
        );
    }

    #[test]
    fn test_event_type_falls_back_to_routing_key() {
        let body = br#"{"event_type": "", "data": {"patient_id": "p-1", "organization_id": "org-1"}}"#;
        assert!(matches!(
            decode(PATIENT_DELETED, body),
            ReconcileAction::DeactivatePatient { .. }
        ));
    }

    #[test]
    fn test_status_changed_to_active_is_ignored() {
        let body = br#"{"data": {"patient_id": "p-1", "organization_id": "org-1", "new_status": "active"}}"#;
        assert_eq!(
            decode(PATIENT_STATUS_CHANGED, body),
            ReconcileAction::Ignore(IgnoreReason::StillActive)
        );
        assert_eq!(
            decode(ORGANIZATION_STATUS_CHANGED, body),
            ReconcileAction::Ignore(IgnoreReason::StillActive)
        );
    }

    #[test]
    fn test_status_changed_without_status_acts() {
        let body = br#"{"data": {"patient_id": "p-1", "organization_id": "org-1"}}"#;
        assert!(matches!(
            decode(PATIENT_STATUS_CHANGED, body),
            ReconcileAction::DeactivatePatient { .. }
        ));
    }

    #[test]
    fn test_patient_created_is_noop() {
        let body = br#"{"data": {"patient_id": "p-1", "organization_id": "org-1"}}"#;
        assert_eq!(
            decode(PATIENT_CREATED, body),
            ReconcileAction::Ignore(IgnoreReason::PatientCreated)
        );
    }

    #[test]
    fn test_missing_identifiers() {
        let body = br#"{"data": {"organization_id": "org-1"}}"#;
        assert_eq!(
            decode(PATIENT_DELETED, body),
            ReconcileAction::Ignore(IgnoreReason::MissingIdentifiers)
        );

        let body = br#"{"data": null}"#;
        assert_eq!(
            decode(ORGANIZATION_DELETED, body),
            ReconcileAction::Ignore(IgnoreReason::MissingIdentifiers)
        );
    }

    #[test]
    fn test_malformed_payloads() {
        for body in [&b"not json"[..], b"[1, 2]", b"", b"{\"data\": 5}"] {
            assert!(matches!(
                decode(PATIENT_DELETED, body),
                ReconcileAction::Ignore(IgnoreReason::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_unknown_event_type() {
        assert_eq!(
            decode("invoice.paid", b"{}"),
            ReconcileAction::Ignore(IgnoreReason::UnknownEventType("invoice.paid".to_string()))
        );
    }
}
