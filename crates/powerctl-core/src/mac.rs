use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Sentinel used in inventories for hosts whose NIC address is not recorded yet.
pub const UNKNOWN_SENTINEL: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacParseError {
    #[error("expected 6 octets separated by ':' or '-', got {0} in '{1}'")]
    OctetCount(usize, String),
    #[error("invalid hex octet '{0}' in '{1}'")]
    InvalidOctet(String, String),
}

/// A 48-bit hardware address, as used by Wake-on-LAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(MacParseError::OctetCount(parts.len(), trimmed.to_string()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(MacParseError::InvalidOctet(
                    part.to_string(),
                    trimmed.to_string(),
                ));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| {
                MacParseError::InvalidOctet(part.to_string(), trimmed.to_string())
            })?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Wake address registered for a host: either a usable MAC or the
/// `unknown` sentinel (host cannot be woken remotely).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAddress {
    Known(MacAddress),
    Unknown,
}

impl WakeAddress {
    pub fn mac(&self) -> Option<MacAddress> {
        match self {
            Self::Known(mac) => Some(*mac),
            Self::Unknown => None,
        }
    }
}

impl FromStr for WakeAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_SENTINEL) {
            return Ok(Self::Unknown);
        }
        trimmed.parse().map(Self::Known)
    }
}

impl fmt::Display for WakeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(mac) => mac.fmt(f),
            Self::Unknown => f.write_str(UNKNOWN_SENTINEL),
        }
    }
}

impl Serialize for WakeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WakeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
