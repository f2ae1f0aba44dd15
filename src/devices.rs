//! Device registry for push-capable endpoints.
//!
//! One row per device UUID. Re-registering overwrites the push token and
//! force-activates the device, which absorbs token rotation without
//! creating duplicates. Devices are deactivated, never deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::{parse_datetime, DbPool};
use crate::error::{NotifierError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub device_uuid: Uuid,
    pub push_token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DeviceRow {
    device_uuid: String,
    push_token: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DeviceRow> for Device {
    type Error = NotifierError;

    fn try_from(row: DeviceRow) -> Result<Device> {
        let device_uuid = row
            .device_uuid
            .parse::<Uuid>()
            .map_err(|_| NotifierError::Database(format!("bad device uuid: {}", row.device_uuid)))?;
        Ok(Device {
            device_uuid,
            push_token: row.push_token,
            is_active: row.is_active,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

pub struct DeviceRegistry<'a> {
    pool: &'a DbPool,
}

impl<'a> DeviceRegistry<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Register a device, or update an existing one's token.
    ///
    /// Upsert semantics: an existing UUID gets its token overwritten and is
    /// reactivated; a new UUID is created active.
    pub async fn register(&self, device_uuid: Uuid, push_token: &str) -> Result<Device> {
        sqlx::query(
            r#"
            INSERT INTO devices (device_uuid, push_token)
            VALUES ($1, $2)
            ON CONFLICT(device_uuid) DO UPDATE SET
                push_token = excluded.push_token,
                is_active  = 1,
                updated_at = datetime('now')
            "#,
        )
        .bind(device_uuid.to_string())
        .bind(push_token)
        .execute(self.pool)
        .await?;

        info!(%device_uuid, "registered device");
        self.get(device_uuid)
            .await?
            .ok_or_else(|| NotifierError::NotFound("device".to_string()))
    }

    pub async fn get(&self, device_uuid: Uuid) -> Result<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_uuid, push_token, is_active, created_at, updated_at
            FROM devices
            WHERE device_uuid = $1
            "#,
        )
        .bind(device_uuid.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(Device::try_from).transpose()
    }

    /// Set `is_active = false`. Returns whether a matching device existed.
    pub async fn deactivate(&self, device_uuid: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = 0, updated_at = datetime('now') WHERE device_uuid = $1",
        )
        .bind(device_uuid.to_string())
        .execute(self.pool)
        .await?;

        let existed = result.rows_affected() > 0;
        if existed {
            info!(%device_uuid, "deactivated device");
        }
        Ok(existed)
    }

    pub async fn list_active(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_uuid, push_token, is_active, created_at, updated_at
            FROM devices
            WHERE is_active = 1
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Device::try_from).collect()
    }

    /// Flat token projection used by the notification fan-out.
    pub async fn tokens(&self, active_only: bool) -> Result<Vec<String>> {
        let sql = if active_only {
            "SELECT push_token FROM devices WHERE is_active = 1"
        } else {
            "SELECT push_token FROM devices"
        };
        let tokens: Vec<String> = sqlx::query_scalar(sql).fetch_all(self.pool).await?;
        Ok(tokens)
    }
}
