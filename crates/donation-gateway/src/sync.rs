//! Donation sync to the CRM and marketing platforms.
//!
//! A completed donation must never look failed to the donor because a
//! downstream integration is down: integration failures degrade the outcome
//! to a warning instead of an error, and the route layer still confirms.

use serde_json::json;

use crate::client::ApiClient;
use crate::models::DonationRecord;

/// Outcome of syncing one donation to the external systems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every integration accepted the record.
    Synced,

    /// The donation is confirmed to the donor, but at least one
    /// integration failed; the reason is for operators, not the donor.
    SyncedWithWarning(String),

    /// Nothing could even be attempted (no backend accepted our
    /// credentials); the route layer surfaces this as a gateway error.
    Failed(String),
}

impl SyncOutcome {
    /// True for any outcome the donor should see as a confirmation.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Synced | Self::SyncedWithWarning(_))
    }

    /// The operator-facing warning, if any.
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::SyncedWithWarning(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Pushes completed donations into the CRM and the marketing platform.
#[derive(Debug, Clone)]
pub struct DonationSyncService {
    crm: ApiClient,
    marketing: ApiClient,
}

impl DonationSyncService {
    /// Create the service over the two backend clients.
    #[must_use]
    pub fn new(crm: ApiClient, marketing: ApiClient) -> Self {
        Self { crm, marketing }
    }

    /// Sync one donation: upsert the donor contact in the CRM, then report
    /// a conversion event to the marketing platform.
    ///
    /// Each integration failure is logged and folded into the outcome as a
    /// warning; the donation itself is already complete at this point.
    pub async fn record_donation(&self, donation: &DonationRecord) -> SyncOutcome {
        let mut warnings = Vec::new();
        let mut auth_failures = 0;

        let contact = json!({
            "fullname": donation.donor.name,
            "emailaddress1": donation.donor.email,
            "telephone1": donation.donor.phone,
            "address1_postalcode": donation.donor.postal_code,
            "new_document": donation.donor.document,
        });
        let crm_response = self.crm.post("/contacts/upsert", contact, None).await;
        if !crm_response.success {
            tracing::warn!(
                status = crm_response.status,
                error = crm_response.error.as_deref().unwrap_or(""),
                "CRM donation sync failed, confirming to donor anyway"
            );
            warnings.push(format!("CRM sync failed ({})", crm_response.status));
            if is_auth_failure(&crm_response) {
                auth_failures += 1;
            }
        }

        let event = json!({
            "event_type": "CONVERSION",
            "event_family": "CDP",
            "payload": {
                "conversion_identifier": donation.conversion_identifier(),
                "email": donation.donor.email,
                "name": donation.donor.name,
                "value": donation.amount_cents as f64 / 100.0,
                "currency": donation.currency,
                "campaign": donation.campaign,
            }
        });
        let marketing_response = self.marketing.post("/platform/events", event, None).await;
        if !marketing_response.success {
            tracing::warn!(
                status = marketing_response.status,
                error = marketing_response.error.as_deref().unwrap_or(""),
                "conversion tracking failed, confirming to donor anyway"
            );
            warnings.push(format!("conversion tracking failed ({})", marketing_response.status));
            if is_auth_failure(&marketing_response) {
                auth_failures += 1;
            }
        }

        if auth_failures == 2 {
            return SyncOutcome::Failed("no backend accepted the configured credentials".into());
        }
        if warnings.is_empty() {
            SyncOutcome::Synced
        } else {
            SyncOutcome::SyncedWithWarning(warnings.join("; "))
        }
    }
}

/// Service backends never report `needs_login`; a 401/403 that survived the
/// retry loop means our configured credentials were not accepted.
fn is_auth_failure(response: &crate::client::ResponseEnvelope) -> bool {
    response.needs_login || matches!(response.status, 401 | 403)
}
