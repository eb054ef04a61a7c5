//! Donation and donor shapes accepted by the gateway's routes.

use serde::{Deserialize, Serialize};

/// The person making a donation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
    /// Full name.
    pub name: String,

    /// Contact email, the CRM's dedup key.
    pub email: String,

    /// National taxpayer document (CPF), digits only.
    #[serde(default)]
    pub document: Option<String>,

    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,

    /// Postal code of the donor's address.
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// A completed donation to be synced to the external systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRecord {
    /// Who donated.
    pub donor: Donor,

    /// Amount in cents to avoid float money.
    pub amount_cents: i64,

    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Campaign this donation is attributed to.
    #[serde(default)]
    pub campaign: Option<String>,

    /// Whether this is a recurring (monthly) commitment.
    #[serde(default)]
    pub recurring: bool,
}

fn default_currency() -> String {
    "BRL".to_string()
}

impl DonationRecord {
    /// Conversion identifier reported to the marketing platform.
    #[must_use]
    pub fn conversion_identifier(&self) -> &str {
        if self.recurring { "donation-recurring" } else { "donation-single" }
    }
}
