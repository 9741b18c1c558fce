//! Device discovery.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use devicerun_core::DeviceId;
use thiserror::Error;
use tracing::debug;

/// Default location of the tunnel manifest.
pub const DEFAULT_TUNNEL_MANIFEST: &str = "infra/adb_tunnels.txt";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tunnel manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("Failed to read tunnel manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the device pool.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn discover(&self) -> Result<Vec<DeviceId>, RegistryError>;
}

/// Devices listed in a tunnel manifest.
///
/// Each line is whitespace separated; the second field is the forwarded
/// `localhost:<port>` address, possibly wrapped in quotes or trailed by a comma.
#[derive(Debug, Clone)]
pub struct TunnelManifest {
    path: PathBuf,
}

impl TunnelManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Extract device addresses from manifest text.
    pub fn parse(text: &str) -> Vec<DeviceId> {
        text.lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                parts.next()?;
                let host_port = parts.next()?.trim_matches(|c| c == '"' || c == ',');
                host_port
                    .contains("localhost:")
                    .then(|| DeviceId::new(host_port))
            })
            .collect()
    }
}

impl Default for TunnelManifest {
    fn default() -> Self {
        Self::new(DEFAULT_TUNNEL_MANIFEST)
    }
}

#[async_trait]
impl DeviceRegistry for TunnelManifest {
    async fn discover(&self) -> Result<Vec<DeviceId>, RegistryError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => RegistryError::ManifestMissing(self.path.clone()),
                _ => RegistryError::Read {
                    path: self.path.clone(),
                    source,
                },
            })?;
        let devices = Self::parse(&text);
        debug!(path = %self.path.display(), count = devices.len(), "Read tunnel manifest");
        Ok(devices)
    }
}

/// A fixed device list, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    devices: Vec<DeviceId>,
}

impl StaticRegistry {
    pub fn new<I, D>(devices: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn discover(&self) -> Result<Vec<DeviceId>, RegistryError> {
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let text = "\
emu-1 localhost:5555 -> 10.0.0.4:5555
emu-2 \"localhost:5556\",
emu-3 10.0.0.9:5555

lonely
emu-4   localhost:5557
";
        let devices = TunnelManifest::parse(text);
        assert_eq!(
            devices,
            vec![
                DeviceId::new("localhost:5555"),
                DeviceId::new("localhost:5556"),
                DeviceId::new("localhost:5557"),
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adb_tunnels.txt");
        std::fs::write(&path, "a localhost:6000\nb localhost:6001\n").unwrap();

        let devices = TunnelManifest::new(&path).discover().await.unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = TunnelManifest::new(dir.path().join("nope.txt"))
            .discover()
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ManifestMissing(_)));
    }

    #[tokio::test]
    async fn test_static_registry() {
        let registry = StaticRegistry::new(["localhost:5555", "localhost:5556"]);
        assert_eq!(registry.discover().await.unwrap().len(), 2);
    }
}
