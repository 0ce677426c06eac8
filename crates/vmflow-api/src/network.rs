//! Virtual network lookup

use crate::client::{ApiClient, QueryOptions, decode};
use crate::error::Result;
use crate::wire::string_or_number;
use serde::{Deserialize, Serialize};

const VNETS: &str = "vnets";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSummary {
    #[serde(rename = "$key", deserialize_with = "string_or_number")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkApi {
    client: ApiClient,
}

impl NetworkApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// List virtual networks, optionally filtered by exact name and type
    pub async fn list(&self, name: Option<&str>, kind: Option<&str>) -> Result<Vec<NetworkSummary>> {
        let opts = QueryOptions::fields("description,name,$key");
        let opts = match network_filter(name, kind) {
            Some(filter) => opts.with_filter(filter),
            None => opts,
        };
        let response = self.client.get(VNETS, &opts).await?;
        decode(response, VNETS).await
    }
}

fn network_filter(name: Option<&str>, kind: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(name) = name {
        parts.push(format!("name eq '{}'", name));
    }
    if let Some(kind) = kind {
        parts.push(format!("type eq '{}'", kind));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_filter() {
        assert_eq!(network_filter(None, None), None);
        assert_eq!(
            network_filter(Some("External"), None).as_deref(),
            Some("name eq 'External'")
        );
        assert_eq!(
            network_filter(Some("lan"), Some("internal")).as_deref(),
            Some("name eq 'lan' and type eq 'internal'")
        );
    }
}
