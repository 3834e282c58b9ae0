//! Domain primitive types used across the ecsynth workspace.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

/// Smallest subnet the provider accepts.
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// Template-unique key of a resource, parameter, or output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical id from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Reference to a container image in a public registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates an image reference resolved from the default registry.
    #[must_use]
    pub fn from_registry(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A TCP/UDP port number. Zero is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// The well-known HTTP port, 80.
    pub const HTTP: Self = Self(80);

    /// The alternate HTTP port, 8080.
    pub const HTTP_ALT: Self = Self(8080);

    /// Creates a port.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is zero.
    pub fn new(value: u16) -> Result<Self> {
        if value == 0 {
            return Err(StackError::config("port numbers must be positive"));
        }
        Ok(Self(value))
    }

    /// Returns the numeric port.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = StackError;

    fn try_from(value: u16) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// EC2 instance type written as `<class>.<size>`, e.g. `t3a.large`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceType {
    class: String,
    size: String,
}

impl InstanceType {
    /// Builds an instance type from its class and size.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty or not lowercase alphanumeric.
    pub fn of(class: impl Into<String>, size: impl Into<String>) -> Result<Self> {
        let class = class.into();
        let size = size.into();
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        };
        if !valid(&class) || !valid(&size) {
            return Err(StackError::config(format!(
                "invalid instance type \"{class}.{size}\""
            )));
        }
        Ok(Self { class, size })
    }

    /// Builds an instance type from trusted literals without validation.
    pub(crate) fn literal(class: &str, size: &str) -> Self {
        Self {
            class: class.to_string(),
            size: size.to_string(),
        }
    }

    /// Instance class, e.g. `t3a`.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Instance size, e.g. `large`.
    #[must_use]
    pub fn size(&self) -> &str {
        &self.size
    }
}

impl FromStr for InstanceType {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let (class, size) = s
            .split_once('.')
            .ok_or_else(|| StackError::config(format!("invalid instance type \"{s}\"")))?;
        Self::of(class, size)
    }
}

impl TryFrom<String> for InstanceType {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InstanceType> for String {
    fn from(value: InstanceType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.size)
    }
}

/// An IPv4 network block in CIDR notation.
///
/// Host bits below the prefix must be zero, so `10.101.0.0/16` is accepted
/// and `10.101.0.1/16` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Creates a CIDR block from a network address and prefix length.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exceeds 32 or host bits are set.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(StackError::InvalidCidr {
                cidr: format!("{network}/{prefix}"),
                reason: "prefix length must be 0-32".into(),
            });
        }
        let host_mask = u32::MAX.checked_shr(u32::from(prefix)).unwrap_or(0);
        if u32::from(network) & host_mask != 0 {
            return Err(StackError::InvalidCidr {
                cidr: format!("{network}/{prefix}"),
                reason: "host bits must be zero".into(),
            });
        }
        Ok(Self { network, prefix })
    }

    /// Builds a block from a literal address, clearing any host bits.
    #[must_use]
    pub const fn masked(network: Ipv4Addr, prefix: u8) -> Self {
        let prefix = if prefix > 32 { 32 } else { prefix };
        let mask = match u32::MAX.checked_shl(32 - prefix as u32) {
            Some(mask) => mask,
            None => 0,
        };
        Self {
            network: Ipv4Addr::from_bits(network.to_bits() & mask),
            prefix,
        }
    }

    /// Network address of the block.
    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length of the block.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    #[must_use]
    pub const fn size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    /// Carves the block into `count` equal subnets.
    ///
    /// The subnet size is the largest power of two that fits `count` blocks,
    /// and subnets are returned in address order starting at the network
    /// address. A `/16` split four ways yields four `/18` blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting subnets would be smaller than
    /// [`MAX_SUBNET_PREFIX`].
    pub fn split(&self, count: usize) -> Result<Vec<Self>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let extra_bits = count.next_power_of_two().trailing_zeros();
        let prefix = u32::from(self.prefix) + extra_bits;
        if prefix > u32::from(MAX_SUBNET_PREFIX) {
            return Err(StackError::InvalidCidr {
                cidr: self.to_string(),
                reason: format!("cannot fit {count} subnets of at least /{MAX_SUBNET_PREFIX}"),
            });
        }
        let prefix = u8::try_from(prefix).map_err(|_| StackError::InvalidCidr {
            cidr: self.to_string(),
            reason: "prefix overflow".into(),
        })?;
        let block = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(u32::from(self.network));

        (0..count as u64)
            .map(|i| {
                let addr = u32::try_from(base + i * block).map_err(|_| StackError::InvalidCidr {
                    cidr: self.to_string(),
                    reason: "subnet address overflow".into(),
                })?;
                Self::new(Ipv4Addr::from(addr), prefix)
            })
            .collect()
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| StackError::InvalidCidr {
            cidr: s.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| invalid("missing prefix length"))?;
        let network: Ipv4Addr = addr.parse().map_err(|_| invalid("invalid IPv4 address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("invalid prefix length"))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_parses_and_displays() {
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("valid cidr");
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 101, 0, 0));
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.size(), 65_536);
        assert_eq!(cidr.to_string(), "10.101.0.0/16");
    }

    #[test]
    fn masked_clears_host_bits() {
        let cidr = Ipv4Cidr::masked(Ipv4Addr::new(10, 101, 3, 7), 16);
        assert_eq!(cidr.to_string(), "10.101.0.0/16");
        assert_eq!(Ipv4Cidr::masked(Ipv4Addr::new(1, 2, 3, 4), 0).to_string(), "0.0.0.0/0");
    }

    #[test]
    fn cidr_rejects_host_bits() {
        let err = "10.101.0.1/16".parse::<Ipv4Cidr>().unwrap_err();
        assert!(err.to_string().contains("host bits"), "got: {err}");
    }

    #[test]
    fn cidr_rejects_missing_prefix_and_large_prefix() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn split_sixteen_four_ways_yields_eighteens() {
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("valid cidr");
        let subnets: Vec<String> = cidr
            .split(4)
            .expect("should split")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            subnets,
            vec![
                "10.101.0.0/18",
                "10.101.64.0/18",
                "10.101.128.0/18",
                "10.101.192.0/18",
            ]
        );
    }

    #[test]
    fn split_rounds_up_to_power_of_two() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().expect("valid cidr");
        let subnets = cidr.split(3).expect("should split");
        assert_eq!(subnets.len(), 3);
        assert!(subnets.iter().all(|s| s.prefix() == 18));
    }

    #[test]
    fn split_too_small_fails() {
        let cidr: Ipv4Cidr = "10.0.0.0/27".parse().expect("valid cidr");
        assert!(cidr.split(4).is_err());
    }

    #[test]
    fn split_zero_is_empty() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().expect("valid cidr");
        assert!(cidr.split(0).expect("should split").is_empty());
    }

    #[test]
    fn port_rejects_zero() {
        assert!(Port::new(0).is_err());
        assert_eq!(Port::new(8080).expect("valid port").get(), 8080);
    }

    #[test]
    fn port_deserialization_rejects_zero() {
        assert!(serde_json::from_str::<Port>("0").is_err());
        let port: Port = serde_json::from_str("80").expect("valid port");
        assert_eq!(port.get(), 80);
    }

    #[test]
    fn instance_type_roundtrip() {
        let it: InstanceType = "t3a.large".parse().expect("valid instance type");
        assert_eq!(it.class(), "t3a");
        assert_eq!(it.size(), "large");
        assert_eq!(it.to_string(), "t3a.large");
        assert!("t3a".parse::<InstanceType>().is_err());
        assert!("T3A.large".parse::<InstanceType>().is_err());
    }

    #[test]
    fn cidr_serializes_as_string() {
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("valid cidr");
        let json = serde_json::to_string(&cidr).expect("serialize");
        assert_eq!(json, "\"10.101.0.0/16\"");
    }
}
