//! Port allocation and relay address discovery.
//!
//! The relay needs two loopback ports (HTTP and WebSocket) picked from disjoint
//! ranges at startup. The chosen pair is persisted once to `server_ports.json`
//! so collaborating processes (the load driver, the browser dashboard) can find
//! the relay without any other coordination.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

/// Default scan range for the HTTP port.
pub const DEFAULT_HTTP_RANGE: Range<u16> = 8000..8100;
/// Default scan range for the WebSocket port. Disjoint from the HTTP range so
/// the two allocations can never collide.
pub const DEFAULT_WS_RANGE: Range<u16> = 8101..8200;

/// Well-known discovery file name, written to the relay's working directory.
pub const DISCOVERY_FILE: &str = "server_ports.json";

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no free port in range {start}..{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("failed to write discovery file {path}: {source}")]
    WriteDiscovery {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to encode discovery file {path}: {source}")]
    EncodeDiscovery {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to read discovery file {path}: {source}")]
    ReadDiscovery {
        path: String,
        source: std::io::Error,
    },

    #[error("discovery file {path} is not valid JSON: {source}")]
    ParseDiscovery {
        path: String,
        source: serde_json::Error,
    },
}

/// The HTTP/WebSocket port pair allocated at relay startup.
///
/// Written once, read many times; never mutated after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    pub http_port: u16,
    pub ws_port: u16,
}

impl PortAssignment {
    /// Persist the assignment to `path` as JSON. Pretty-printed so the file is
    /// readable when poked at by hand.
    pub fn write_to(&self, path: &Path) -> Result<(), PortError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| PortError::EncodeDiscovery {
            path: path.display().to_string(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| PortError::WriteDiscovery {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Read a previously written assignment back from `path`.
    pub fn read_from(path: &Path) -> Result<Self, PortError> {
        let contents = std::fs::read_to_string(path).map_err(|e| PortError::ReadDiscovery {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| PortError::ParseDiscovery {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Scan `range` ascending and return the first port that accepts an exclusive
/// loopback bind. The probe listener is dropped before returning so the caller
/// can rebind the port for real use.
pub fn find_free_port(range: Range<u16>) -> Result<u16, PortError> {
    let (start, end) = (range.start, range.end);
    for port in range {
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        if TcpListener::bind(addr).is_ok() {
            return Ok(port);
        }
    }
    Err(PortError::NoFreePort { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port_returns_bindable_port() {
        let port = find_free_port(DEFAULT_HTTP_RANGE).unwrap();
        assert!(DEFAULT_HTTP_RANGE.contains(&port));

        // The probe socket was released, so we can rebind it.
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        TcpListener::bind(addr).unwrap();
    }

    #[test]
    fn test_find_free_port_skips_occupied_ports() {
        // Occupy the head of a private range, then ask for a port in it.
        let base = find_free_port(21000..21100).unwrap();
        let _held = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, base)).unwrap();

        let next = find_free_port(base..base + 100).unwrap();
        assert!(next > base);
    }

    #[test]
    fn test_find_free_port_exhausted_range() {
        let base = find_free_port(22000..22100).unwrap();
        let _held = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, base)).unwrap();

        // A one-port range covering only the occupied port must fail.
        let err = find_free_port(base..base + 1).unwrap_err();
        assert!(matches!(
            err,
            PortError::NoFreePort { start, end } if start == base && end == base + 1
        ));
    }

    #[test]
    fn test_empty_range_is_exhausted() {
        assert!(matches!(
            find_free_port(9000..9000),
            Err(PortError::NoFreePort { .. })
        ));
    }

    #[test]
    fn test_port_assignment_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DISCOVERY_FILE);

        let assignment = PortAssignment {
            http_port: 8042,
            ws_port: 8142,
        };
        assignment.write_to(&path).unwrap();

        let loaded = PortAssignment::read_from(&path).unwrap();
        assert_eq!(loaded, assignment);

        // On-disk shape matches the HTTP discovery response.
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["http_port"], 8042);
        assert_eq!(raw["ws_port"], 8142);
    }

    #[test]
    fn test_read_corrupt_discovery_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DISCOVERY_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let err = PortAssignment::read_from(&path).unwrap_err();
        assert!(matches!(err, PortError::ParseDiscovery { .. }));
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_read_missing_discovery_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PortAssignment::read_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PortError::ReadDiscovery { .. }));
    }
}
