//! Device Registry Client：加载两个独立的设备池

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::TransportError;
use crate::core::types::{Device, DeviceKind};
use crate::remote::DeviceDirectory;

/// 注册表上游失败时返回的占位条目名称，其 identifier 是异常文本
const UPSTREAM_ERROR_NAME: &str = "[Error fetching devices]";

#[derive(Clone)]
pub struct DeviceRegistry {
    directory: Arc<dyn DeviceDirectory>,
}

impl DeviceRegistry {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self { directory }
    }

    /// 按注册表顺序返回设备；丢弃没有 identifier 的条目与重复的 identifier（保留第一次出现）
    pub async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, TransportError> {
        let devices = self.directory.list_devices(kind).await?;
        if let Some(placeholder) = devices
            .iter()
            .find(|d| d.display_name == UPSTREAM_ERROR_NAME)
        {
            tracing::warn!(?kind, error = %placeholder.identifier, "device registry reported an upstream failure");
            return Err(TransportError::Remote(placeholder.identifier.clone()));
        }
        let total = devices.len();
        let mut seen = HashSet::new();
        let devices: Vec<Device> = devices
            .into_iter()
            .filter(|d| !d.identifier.trim().is_empty())
            .filter(|d| seen.insert(d.identifier.clone()))
            .collect();
        if devices.len() != total {
            tracing::warn!(
                ?kind,
                dropped = total - devices.len(),
                "ignored device entries without a unique identifier"
            );
        }
        tracing::debug!(?kind, count = devices.len(), "devices loaded");
        Ok(devices)
    }
}
