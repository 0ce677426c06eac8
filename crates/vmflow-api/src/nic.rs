//! Machine NIC endpoints

use crate::client::{ApiClient, decode, expect_status};
use crate::error::{ApiError, Result};
use crate::model::{MachineId, NicKey, NicSpec};
use crate::wire::{CreatedResponse, NicCreateBody};
use reqwest::StatusCode;

const NICS: &str = "machine_nics";

#[derive(Debug, Clone)]
pub struct NicApi {
    client: ApiClient,
}

impl NicApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, machine: MachineId, nic: &NicSpec) -> Result<NicKey> {
        tracing::info!("Creating NIC {} on machine {}", nic.name, machine);
        let response = self
            .client
            .post(NICS, &NicCreateBody::new(machine, nic))
            .await?;
        expect_status(&response, &[StatusCode::CREATED], NICS)?;

        let created: CreatedResponse = decode(response, NICS).await?;
        if created.key.is_empty() {
            return Err(ApiError::invalid_response(NICS, "empty $key"));
        }
        Ok(NicKey::new(created.key))
    }
}
