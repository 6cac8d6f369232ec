//! BLE transport for consumer pulse oximeters
//!
//! Implements [`OximeterTransport`] over btleplug. Discovery accepts any
//! device advertising the standard Pulse Oximeter service plus a list of
//! name prefixes covering the common consumer brands, since most vendor
//! devices advertise only their proprietary services.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use vitalscan_core::wire::PLX_SERVICE_UUID;

use crate::oximeter::{ConnectionError, NotificationStream, OximeterTransport};

/// Advertised-name prefixes of known consumer oximeters.
pub const NAME_PREFIXES: [&str; 10] = [
    "BerryMed", "PC-60", "Viatom", "Wellue", "OxySmart", "Contec", "CMS50", "Pulse", "Oxi", "SpO2",
];

/// A device seen during a scan.
#[derive(Clone, Debug)]
pub struct DiscoveredOximeter {
    /// Platform device address
    pub address: String,
    /// Advertised name, if any
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: Option<i16>,
    /// Whether it advertises the standard Pulse Oximeter service
    pub has_plx_service: bool,
}

fn looks_like_oximeter(name: Option<&str>, services: &[Uuid]) -> bool {
    if services.contains(&PLX_SERVICE_UUID) {
        return true;
    }
    name.is_some_and(|n| NAME_PREFIXES.iter().any(|prefix| n.starts_with(prefix)))
}

fn transport_err(e: btleplug::Error) -> ConnectionError {
    ConnectionError::Transport(e.to_string())
}

/// btleplug-backed oximeter link.
pub struct BleTransport {
    adapter: Adapter,
    peripheral: Option<Peripheral>,
    scan_duration: Duration,
}

impl BleTransport {
    /// Open the first Bluetooth adapter on this host.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AdapterUnavailable`] if there is none.
    pub async fn new() -> Result<Self, ConnectionError> {
        let manager = Manager::new().await.map_err(transport_err)?;
        let adapters = manager.adapters().await.map_err(transport_err)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(ConnectionError::AdapterUnavailable)?;

        Ok(Self {
            adapter,
            peripheral: None,
            scan_duration: Duration::from_secs(5),
        })
    }

    /// Set how long discovery scans run.
    pub fn set_scan_duration(&mut self, duration: Duration) {
        self.scan_duration = duration;
    }

    /// Scan for nearby devices that look like oximeters.
    pub async fn scan(&self) -> Result<Vec<DiscoveredOximeter>, ConnectionError> {
        info!("scanning for oximeters...");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport_err)?;
        tokio::time::sleep(self.scan_duration).await;
        self.adapter.stop_scan().await.map_err(transport_err)?;

        let mut devices = Vec::new();
        for peripheral in self.adapter.peripherals().await.map_err(transport_err)? {
            let Some(properties) = peripheral.properties().await.map_err(transport_err)? else {
                continue;
            };

            if !looks_like_oximeter(properties.local_name.as_deref(), &properties.services) {
                continue;
            }

            devices.push(DiscoveredOximeter {
                address: peripheral.address().to_string(),
                name: properties.local_name,
                rssi: properties.rssi,
                has_plx_service: properties.services.contains(&PLX_SERVICE_UUID),
            });
        }

        info!("scan complete: {} candidate(s)", devices.len());
        Ok(devices)
    }

    async fn find_candidate(&self) -> Result<Peripheral, ConnectionError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport_err)?;
        tokio::time::sleep(self.scan_duration).await;
        self.adapter.stop_scan().await.map_err(transport_err)?;

        for peripheral in self.adapter.peripherals().await.map_err(transport_err)? {
            if let Some(properties) = peripheral.properties().await.map_err(transport_err)? {
                if looks_like_oximeter(properties.local_name.as_deref(), &properties.services) {
                    return Ok(peripheral);
                }
            }
        }

        Err(ConnectionError::NoDeviceFound)
    }
}

#[async_trait]
impl OximeterTransport for BleTransport {
    async fn connect(&mut self) -> Result<Option<String>, ConnectionError> {
        let peripheral = self.find_candidate().await?;

        peripheral.connect().await.map_err(transport_err)?;
        peripheral
            .discover_services()
            .await
            .map_err(transport_err)?;

        let name = peripheral
            .properties()
            .await
            .map_err(transport_err)?
            .and_then(|p| p.local_name);

        info!(name = name.as_deref().unwrap_or("<unnamed>"), "connected");
        self.peripheral = Some(peripheral);
        Ok(name)
    }

    async fn subscribe(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<NotificationStream, ConnectionError> {
        let peripheral = self
            .peripheral
            .as_ref()
            .ok_or_else(|| ConnectionError::Transport("not connected".to_string()))?;

        let target = peripheral
            .services()
            .iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == characteristic)
            .cloned()
            .ok_or_else(|| {
                ConnectionError::Transport(format!("characteristic {characteristic} not offered"))
            })?;

        peripheral.subscribe(&target).await.map_err(transport_err)?;
        debug!(characteristic = %characteristic, "subscribed");

        // btleplug delivers all subscribed characteristics on one stream
        let stream = peripheral
            .notifications()
            .await
            .map_err(transport_err)?
            .filter(move |n| futures::future::ready(n.uuid == characteristic))
            .map(|n| n.value)
            .boxed();

        Ok(stream)
    }

    async fn disconnect(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            // Best effort; the link may already be gone
            let _ = peripheral.disconnect().await;
            info!("disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plx_service_is_always_a_candidate() {
        assert!(looks_like_oximeter(None, &[PLX_SERVICE_UUID]));
        assert!(looks_like_oximeter(Some("Unbranded"), &[PLX_SERVICE_UUID]));
    }

    #[test]
    fn test_name_prefix_matching() {
        assert!(looks_like_oximeter(Some("BerryMed BM1000C"), &[]));
        assert!(looks_like_oximeter(Some("PC-60FW"), &[]));
        assert!(!looks_like_oximeter(Some("Fitness Tracker"), &[]));
        assert!(!looks_like_oximeter(None, &[]));
    }
}
