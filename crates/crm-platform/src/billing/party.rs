//! Issuer and client details frozen into a document when it is created, so
//! that later profile edits do not rewrite issued quotes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::client::entity::Client;
use crate::user::entity::CompanyProfile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_siret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_tva: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entreprise_logo: Option<String>,
}

impl From<&CompanyProfile> for IssuerSnapshot {
    fn from(p: &CompanyProfile) -> Self {
        Self {
            entreprise_name: p.company_name.clone(),
            entreprise_address: p.company_address.clone(),
            entreprise_postal_code: p.company_postal_code.clone(),
            entreprise_city: p.company_city.clone(),
            entreprise_phone: p.company_phone.clone(),
            entreprise_email: p.company_email.clone(),
            entreprise_siret: p.siret.clone(),
            entreprise_tva: p.tva_number.clone(),
            entreprise_logo: p.logo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_city: Option<String>,
}

impl From<&Client> for ClientSnapshot {
    fn from(c: &Client) -> Self {
        Self {
            client_name: c.name.clone(),
            client_email: c.email.clone(),
            client_phone: c.phone.clone(),
            client_company: c.company.clone(),
            client_address: c.address.clone(),
            client_postal_code: c.postal_code.clone(),
            client_city: c.city.clone(),
        }
    }
}
