//! The device API boundary.
//!
//! The logger exposes a GET-only HTTP API (it runs on an ESP-class board and
//! keeps its web server minimal). Everything the session needs from it sits
//! behind [`DeviceApi`] so tests can substitute a fake with controlled
//! response timing; [`HttpDevice`] is the real transport.

use crate::error::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Logging state as reported by `/api/status`, `/api/start`, `/api/stop`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default, deserialize_with = "truthy")]
    pub logging: bool,
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListReply {
    #[serde(default)]
    pub files: Vec<String>,
}

/// Reply to a settings write; `ack` carries the device's short confirmation
/// text when the firmware chose to send one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetReply {
    #[serde(default)]
    pub ack: Option<String>,
}

/// One `/api/live` reading. Every field is optional: older firmware omits
/// fields it does not compute, and the poll simply leaves those alone.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LiveReading {
    #[serde(default, deserialize_with = "truthy")]
    pub ok: bool,
    #[serde(default)]
    pub hb_left_avg: Option<f64>,
    #[serde(default)]
    pub hb_right_avg: Option<f64>,
    #[serde(default)]
    pub hb_left_absavg: Option<f64>,
    #[serde(default)]
    pub hb_right_absavg: Option<f64>,
    #[serde(default)]
    pub age_ms: Option<u64>,
}

// The firmware has emitted booleans as true/false, 0/1, and "1" across
// versions; accept any of them.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0" || s == "false"),
        _ => false,
    })
}

/// Everything the session and the settings synchronizer ask of the device.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Raw newline-delimited text for one window of a log file.
    async fn fetch_chunk(&self, name: &str, offset: u64, limit: u64)
    -> Result<String, DeviceError>;
    /// Flat key/value settings payload; keys may be canonical or legacy.
    async fn read_settings(&self) -> Result<Map<String, Value>, DeviceError>;
    /// Applies one setting under its canonical wire key.
    async fn write_setting(&self, key: &str, value: &str) -> Result<SetReply, DeviceError>;
    async fn read_live(&self) -> Result<LiveReading, DeviceError>;
    async fn status(&self) -> Result<StatusReply, DeviceError>;
    async fn list_logs(&self) -> Result<Vec<String>, DeviceError>;
    async fn start_logging(&self) -> Result<StatusReply, DeviceError>;
    async fn stop_logging(&self) -> Result<StatusReply, DeviceError>;
    async fn delete_log(&self, name: &str) -> Result<(), DeviceError>;
    /// Persists the current settings to the device's SD card.
    async fn save_settings(&self) -> Result<(), DeviceError>;
    /// Re-reads settings from the SD card and applies them on the device.
    async fn reload_settings(&self) -> Result<(), DeviceError>;
}

/// reqwest-backed implementation against the device's `/api/*` endpoints.
pub struct HttpDevice {
    http: reqwest::Client,
    base: String,
}

impl HttpDevice {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, DeviceError> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base))
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DeviceError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, DeviceError>
    where
        T: serde::de::DeserializeOwned,
    {
        let text = self.get_text(path, query).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl DeviceApi for HttpDevice {
    async fn fetch_chunk(
        &self,
        name: &str,
        offset: u64,
        limit: u64,
    ) -> Result<String, DeviceError> {
        self.get_text(
            "/api/chunk",
            &[
                ("name", name),
                ("offset", &offset.to_string()),
                ("limit", &limit.to_string()),
            ],
        )
        .await
    }

    async fn read_settings(&self) -> Result<Map<String, Value>, DeviceError> {
        self.get_json("/api/settings/get", &[]).await
    }

    async fn write_setting(&self, key: &str, value: &str) -> Result<SetReply, DeviceError> {
        self.get_json("/api/settings/set", &[("key", key), ("value", value)])
            .await
    }

    async fn read_live(&self) -> Result<LiveReading, DeviceError> {
        self.get_json("/api/live", &[]).await
    }

    async fn status(&self) -> Result<StatusReply, DeviceError> {
        self.get_json("/api/status", &[]).await
    }

    async fn list_logs(&self) -> Result<Vec<String>, DeviceError> {
        let reply: ListReply = self.get_json("/api/list", &[]).await?;
        Ok(reply.files)
    }

    async fn start_logging(&self) -> Result<StatusReply, DeviceError> {
        self.get_json("/api/start", &[]).await
    }

    async fn stop_logging(&self) -> Result<StatusReply, DeviceError> {
        self.get_json("/api/stop", &[]).await
    }

    async fn delete_log(&self, name: &str) -> Result<(), DeviceError> {
        self.get_text("/api/delete", &[("name", name)]).await?;
        Ok(())
    }

    async fn save_settings(&self) -> Result<(), DeviceError> {
        self.get_text("/api/settings/save", &[]).await?;
        Ok(())
    }

    async fn reload_settings(&self) -> Result<(), DeviceError> {
        self.get_text("/api/settings/reload", &[]).await?;
        Ok(())
    }
}
