//! Address shape returned by the public postal-code lookup service.

use serde::{Deserialize, Serialize};

/// A resolved postal address.
///
/// Field names follow the lookup service's Portuguese schema on the wire;
/// the struct exposes them under neutral names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Postal code, formatted as returned by the service.
    #[serde(rename(deserialize = "cep"))]
    pub postal_code: String,

    /// Street name.
    #[serde(rename(deserialize = "logradouro"), default)]
    pub street: String,

    /// Address complement (apartment, block).
    #[serde(rename(deserialize = "complemento"), default)]
    pub complement: String,

    /// District / neighborhood.
    #[serde(rename(deserialize = "bairro"), default)]
    pub district: String,

    /// City.
    #[serde(rename(deserialize = "localidade"), default)]
    pub city: String,

    /// Two-letter state code.
    #[serde(rename(deserialize = "uf"), default)]
    pub state: String,
}
