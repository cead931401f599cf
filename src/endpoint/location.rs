//! Account topology and regional endpoint entries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::ClientResult;

/// Region as reported by the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLocation {
    pub name: String,
    pub database_account_endpoint: String,
}

/// Account topology
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAccount {
    #[serde(default)]
    pub writable_locations: Vec<AccountLocation>,
    #[serde(default)]
    pub readable_locations: Vec<AccountLocation>,
    #[serde(default, rename = "enableMultipleWriteLocations")]
    pub enable_multiple_writable_locations: bool,
}

/// Reads account topology from a given endpoint.
#[async_trait]
pub trait AccountReader: Send + Sync {
    async fn read_database_account(&self, endpoint: &str) -> ClientResult<DatabaseAccount>;
}

/// Tracked endpoint entry
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub endpoint: String,
    pub unavailable: bool,
    pub last_unavailable_at: Option<Instant>,
}

impl From<&AccountLocation> for Location {
    fn from(loc: &AccountLocation) -> Self {
        Self {
            name: loc.name.clone(),
            endpoint: loc.database_account_endpoint.clone(),
            unavailable: false,
            last_unavailable_at: None,
        }
    }
}

/// Region names compare without spaces and case.
pub fn normalize_location(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Regional form of a global endpoint:
/// `https://acct.example.com:443/` + `West US` gives
/// `https://acct-westus.example.com:443/`.
pub fn locational_endpoint(default_endpoint: &str, location: &str) -> Option<String> {
    let (scheme, rest) = default_endpoint.split_once("://")?;
    let host_end = rest.find(|c| c == ':' || c == '/').unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);
    let (account, domain) = host.split_once('.')?;
    if account.is_empty() {
        return None;
    }
    Some(format!(
        "{}://{}-{}.{}{}",
        scheme,
        account.to_lowercase(),
        normalize_location(location),
        domain.to_lowercase(),
        tail
    ))
}
