//! Security groups and the rules between them.

use ecsynth_common::error::Result;
use ecsynth_common::types::{LogicalId, Port};
use serde::Serialize;
use serde_json::Value;

use super::display_path;
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;

/// Resource type of security groups.
pub const SECURITY_GROUP_TYPE: &str = "AWS::EC2::SecurityGroup";

/// Resource type of standalone ingress rules.
pub const INGRESS_TYPE: &str = "AWS::EC2::SecurityGroupIngress";

/// Resource type of standalone egress rules.
pub const EGRESS_TYPE: &str = "AWS::EC2::SecurityGroupEgress";

/// Every IPv4 address.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Lower bound of the ephemeral host-port range used by dynamic mappings.
pub const EPHEMERAL_PORT_START: u16 = 32768;

/// Upper bound of the ephemeral host-port range.
pub const EPHEMERAL_PORT_END: u16 = 65535;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EgressEntry {
    cidr_ip: &'static str,
    description: &'static str,
    ip_protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_port: Option<u16>,
}

impl EgressEntry {
    const ALLOW_ALL: Self = Self {
        cidr_ip: ANY_IPV4,
        description: "Allow all outbound traffic by default",
        ip_protocol: "-1",
        from_port: None,
        to_port: None,
    };

    // Matches nothing: an ICMP type/code pair that does not exist.
    const DENY_ALL: Self = Self {
        cidr_ip: "255.255.255.255/32",
        description: "Disallow all traffic",
        ip_protocol: "icmp",
        from_port: Some(252),
        to_port: Some(86),
    };
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupProps {
    group_description: String,
    security_group_egress: [EgressEntry; 1],
    vpc_id: Value,
}

/// A declared security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    id: LogicalId,
}

impl SecurityGroup {
    /// Declares a security group in the network `vpc_id`.
    ///
    /// Without `allow_all_outbound` the group starts with a rule that matches
    /// no traffic, so only explicitly added egress rules apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already taken.
    pub fn new(
        stack: &mut StackBuilder,
        path: &[&str],
        description: Option<&str>,
        vpc_id: &LogicalId,
        allow_all_outbound: bool,
    ) -> Result<Self> {
        let props = SecurityGroupProps {
            group_description: description
                .map_or_else(|| display_path(stack.stack_name(), path), ToString::to_string),
            security_group_egress: [if allow_all_outbound {
                EgressEntry::ALLOW_ALL
            } else {
                EgressEntry::DENY_ALL
            }],
            vpc_id: intrinsic::ref_to(vpc_id),
        };
        let id = stack.add_resource(path, Resource::new(SECURITY_GROUP_TYPE, &props)?)?;
        Ok(Self { id })
    }

    /// Refers to a group declared elsewhere in the stack.
    #[must_use]
    pub fn existing(id: LogicalId) -> Self {
        Self { id }
    }

    /// Logical id of the group.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// `Fn::GetAtt` of the group id.
    #[must_use]
    pub fn group_id(&self) -> Value {
        intrinsic::get_att(&self.id, "GroupId")
    }
}

/// A contiguous TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    /// First port of the range.
    pub from: u16,
    /// Last port of the range.
    pub to: u16,
}

impl PortRange {
    /// A single port.
    #[must_use]
    pub const fn single(port: Port) -> Self {
        Self {
            from: port.get(),
            to: port.get(),
        }
    }

    /// The ephemeral range used when the host port is assigned dynamically.
    #[must_use]
    pub const fn ephemeral() -> Self {
        Self {
            from: EPHEMERAL_PORT_START,
            to: EPHEMERAL_PORT_END,
        }
    }

    /// Short label used in rule paths, e.g. `80` or `32768-65535`.
    #[must_use]
    pub fn label(self) -> String {
        if self.from == self.to {
            self.from.to_string()
        } else {
            format!("{}-{}", self.from, self.to)
        }
    }
}

/// Where traffic allowed by a rule comes from or goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// Any IPv4 address.
    AnyIpv4,
    /// Members of another security group.
    Group(LogicalId),
}

impl Peer {
    /// Short label used in rule paths.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::AnyIpv4 => ANY_IPV4.to_string(),
            Self::Group(id) => id.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct IngressProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    cidr_ip: Option<&'static str>,
    description: String,
    from_port: u16,
    group_id: Value,
    ip_protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_security_group_id: Option<Value>,
    to_port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EgressProps {
    description: String,
    destination_security_group_id: Value,
    from_port: u16,
    group_id: Value,
    ip_protocol: &'static str,
    to_port: u16,
}

/// Allows TCP traffic from `peer` into `group` on `ports`.
///
/// # Errors
///
/// Returns an error if the rule path is already taken.
pub fn allow_ingress(
    stack: &mut StackBuilder,
    path: &[&str],
    group: &SecurityGroup,
    peer: &Peer,
    ports: PortRange,
    description: &str,
) -> Result<LogicalId> {
    let (cidr_ip, source_security_group_id) = match peer {
        Peer::AnyIpv4 => (Some(ANY_IPV4), None),
        Peer::Group(source) => (None, Some(intrinsic::get_att(source, "GroupId"))),
    };
    let props = IngressProps {
        cidr_ip,
        description: description.to_string(),
        from_port: ports.from,
        group_id: group.group_id(),
        ip_protocol: "tcp",
        source_security_group_id,
        to_port: ports.to,
    };
    stack.add_resource(path, Resource::new(INGRESS_TYPE, &props)?)
}

/// Allows TCP traffic from `group` to members of `destination` on `ports`.
///
/// # Errors
///
/// Returns an error if the rule path is already taken.
pub fn allow_egress(
    stack: &mut StackBuilder,
    path: &[&str],
    group: &SecurityGroup,
    destination: &LogicalId,
    ports: PortRange,
    description: &str,
) -> Result<LogicalId> {
    let props = EgressProps {
        description: description.to_string(),
        destination_security_group_id: intrinsic::get_att(destination, "GroupId"),
        from_port: ports.from,
        group_id: group.group_id(),
        ip_protocol: "tcp",
        to_port: ports.to,
    };
    stack.add_resource(path, Resource::new(EGRESS_TYPE, &props)?)
}
