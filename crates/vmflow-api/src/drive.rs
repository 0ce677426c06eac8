//! Machine drive endpoints

use crate::client::{ApiClient, QueryOptions, decode, expect_status};
use crate::error::{ApiError, Result};
use crate::model::{BYTES_PER_GB, DiskKey, DiskSpec, MachineId, gb_to_bytes};
use crate::wire::{CreatedResponse, DiskCreateBody, DiskRecord, DiskResizeBody, DiskStatusBody};
use reqwest::StatusCode;

const DRIVES: &str = "machine_drives";

/// Observed state of a drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub size_bytes: u64,
    pub media: Option<String>,
    pub interface: Option<String>,
}

impl DiskInfo {
    /// Size in whole GB (bytes / 1024^3)
    pub fn size_gb(&self) -> u64 {
        self.size_bytes / BYTES_PER_GB
    }
}

/// Import progress of a drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Importing,
    /// Any other reported status; the raw value is kept for diagnostics
    Terminal(String),
}

impl ImportStatus {
    pub fn from_wire(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("importing") {
            ImportStatus::Importing
        } else {
            ImportStatus::Terminal(raw.to_string())
        }
    }

    pub fn is_importing(&self) -> bool {
        matches!(self, ImportStatus::Importing)
    }

    /// Statuses that look like a failed import
    pub fn looks_failed(&self) -> bool {
        match self {
            ImportStatus::Importing => false,
            ImportStatus::Terminal(raw) => {
                let raw = raw.to_lowercase();
                raw.contains("error") || raw.contains("fail")
            }
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportStatus::Importing => f.write_str("importing"),
            ImportStatus::Terminal(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriveApi {
    client: ApiClient,
}

impl DriveApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, machine: MachineId, disk: &DiskSpec) -> Result<DiskKey> {
        tracing::info!("Creating disk {} ({}) on machine {}", disk.name, disk.media, machine);
        let response = self
            .client
            .post(DRIVES, &DiskCreateBody::new(machine, disk)?)
            .await?;
        expect_status(&response, &[StatusCode::CREATED], DRIVES)?;

        let created: CreatedResponse = decode(response, DRIVES).await?;
        if created.key.is_empty() {
            return Err(ApiError::invalid_response(DRIVES, "empty $key"));
        }
        Ok(DiskKey::new(created.key))
    }

    pub async fn read(&self, key: &DiskKey) -> Result<DiskInfo> {
        let path = format!("{}/{}", DRIVES, key);
        let response = self
            .client
            .get(&path, &QueryOptions::fields("name,disksize,media,interface"))
            .await?;
        let record: DiskRecord = decode(response, &path).await?;
        Ok(DiskInfo {
            name: record.name.unwrap_or_default(),
            size_bytes: record.disk_size.unwrap_or(0),
            media: record.media,
            interface: record.interface,
        })
    }

    /// Set the drive size; the API takes bytes and answers 200
    pub async fn resize(&self, key: &DiskKey, size_gb: u64) -> Result<()> {
        let disksize = gb_to_bytes(size_gb).ok_or(ApiError::SizeOutOfRange { size_gb })?;
        tracing::info!("Resizing disk {} to {}GB", key, size_gb);
        let path = format!("{}/{}", DRIVES, key);
        let body = DiskResizeBody { disksize };
        let response = self.client.put(&path, &body).await?;
        expect_status(&response, &[StatusCode::OK], &path)
    }

    pub async fn import_status(&self, key: &DiskKey) -> Result<ImportStatus> {
        let path = format!("{}/{}", DRIVES, key);
        let response = self
            .client
            .get(&path, &QueryOptions::fields("status#status as powerState"))
            .await?;
        let body: DiskStatusBody = decode(response, &path).await?;
        let raw = body
            .powerstate
            .ok_or_else(|| ApiError::invalid_response(&path, "missing drive status"))?;
        Ok(ImportStatus::from_wire(&raw))
    }
}
