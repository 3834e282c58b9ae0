//! Virtual network with public and private subnets per availability zone.
//!
//! The address block is carved into `2 * max_azs` equal blocks: public
//! subnets take the first half in zone order, private subnets the second.
//! Public subnets route through an internet gateway; each private subnet
//! routes through the NAT gateway placed in the public subnet of its zone.

use ecsynth_common::error::Result;
use ecsynth_common::types::{Ipv4Cidr, LogicalId};
use serde::Serialize;
use serde_json::Value;

use super::Tag;
use super::security_group::ANY_IPV4;
use crate::builder::StackBuilder;
use crate::intrinsic;
use crate::template::Resource;

/// Parameters of a [`Vpc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpcProps {
    /// Address block of the network.
    pub cidr: Ipv4Cidr,
    /// Number of availability zones.
    pub max_azs: u8,
}

/// One declared subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    /// Logical id of the subnet resource.
    pub id: LogicalId,
    /// Address block of the subnet.
    pub cidr: Ipv4Cidr,
    /// Zero-based availability zone index.
    pub zone: usize,
    /// Logical id of the subnet's default route.
    pub default_route: LogicalId,
}

/// A declared virtual network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    id: LogicalId,
    cidr: Ipv4Cidr,
    public_subnets: Vec<Subnet>,
    private_subnets: Vec<Subnet>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VpcResourceProps {
    cidr_block: Ipv4Cidr,
    enable_dns_hostnames: bool,
    enable_dns_support: bool,
    instance_tenancy: &'static str,
    tags: Vec<Tag>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetProps {
    availability_zone: Value,
    cidr_block: Ipv4Cidr,
    map_public_ip_on_launch: bool,
    tags: Vec<Tag>,
    vpc_id: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RouteProps {
    destination_cidr_block: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nat_gateway_id: Option<Value>,
    route_table_id: Value,
}

/// Where a subnet's default route leads.
enum Egress<'a> {
    Internet { gateway: &'a LogicalId, attachment: &'a LogicalId },
    Nat(&'a LogicalId),
}

impl Vpc {
    /// Declares the network and every subnet, gateway, and route under
    /// `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address block cannot be carved into
    /// `2 * max_azs` subnets or a path is already taken.
    pub fn new(stack: &mut StackBuilder, name: &str, props: VpcProps) -> Result<Self> {
        let zones = usize::from(props.max_azs);
        let blocks = props.cidr.split(zones * 2)?;
        tracing::info!(vpc = name, cidr = %props.cidr, zones, "declaring network");

        let stack_name = stack.stack_name().to_string();
        let vpc_path = [name];
        let id = stack.add_resource(
            &[name, "Resource"],
            Resource::new(
                "AWS::EC2::VPC",
                &VpcResourceProps {
                    cidr_block: props.cidr,
                    enable_dns_hostnames: true,
                    enable_dns_support: true,
                    instance_tenancy: "default",
                    tags: vec![Tag::name(&stack_name, &vpc_path)],
                },
            )?,
        )?;

        let gateway = stack.add_resource(
            &[name, "IGW"],
            Resource::new(
                "AWS::EC2::InternetGateway",
                &serde_json::json!({ "Tags": [Tag::name(&stack_name, &vpc_path)] }),
            )?,
        )?;
        let attachment = stack.add_resource(
            &[name, "VPCGW"],
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                &serde_json::json!({
                    "InternetGatewayId": intrinsic::ref_to(&gateway),
                    "VpcId": intrinsic::ref_to(&id),
                }),
            )?,
        )?;

        let mut vpc = Self {
            id,
            cidr: props.cidr,
            public_subnets: Vec::with_capacity(zones),
            private_subnets: Vec::with_capacity(zones),
        };

        let mut nat_gateways = Vec::with_capacity(zones);
        for (zone, cidr) in blocks.iter().take(zones).enumerate() {
            let subnet_name = format!("PublicSubnet{}", zone + 1);
            let subnet = vpc.add_subnet(
                stack,
                [name, subnet_name.as_str()],
                zone,
                *cidr,
                &Egress::Internet {
                    gateway: &gateway,
                    attachment: &attachment,
                },
            )?;
            nat_gateways.push(add_nat_gateway(stack, [name, subnet_name.as_str()], &subnet)?);
            vpc.public_subnets.push(subnet);
        }
        for (zone, (cidr, nat)) in blocks.iter().skip(zones).zip(&nat_gateways).enumerate() {
            let subnet_name = format!("PrivateSubnet{}", zone + 1);
            let subnet = vpc.add_subnet(stack, [name, subnet_name.as_str()], zone, *cidr, &Egress::Nat(nat))?;
            vpc.private_subnets.push(subnet);
        }
        Ok(vpc)
    }

    fn add_subnet(
        &self,
        stack: &mut StackBuilder,
        scope: [&str; 2],
        zone: usize,
        cidr: Ipv4Cidr,
        egress: &Egress<'_>,
    ) -> Result<Subnet> {
        let stack_name = stack.stack_name().to_string();
        let public = matches!(egress, Egress::Internet { .. });
        let path = |leaf: &'static str| [scope[0], scope[1], leaf];

        let id = stack.add_resource(
            &path("Subnet"),
            Resource::new(
                "AWS::EC2::Subnet",
                &SubnetProps {
                    availability_zone: intrinsic::availability_zone(zone),
                    cidr_block: cidr,
                    map_public_ip_on_launch: public,
                    tags: vec![Tag::name(&stack_name, &scope)],
                    vpc_id: intrinsic::ref_to(&self.id),
                },
            )?,
        )?;
        let route_table = stack.add_resource(
            &path("RouteTable"),
            Resource::new(
                "AWS::EC2::RouteTable",
                &serde_json::json!({
                    "Tags": [Tag::name(&stack_name, &scope)],
                    "VpcId": intrinsic::ref_to(&self.id),
                }),
            )?,
        )?;
        let _ = stack.add_resource(
            &path("RouteTableAssociation"),
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                &serde_json::json!({
                    "RouteTableId": intrinsic::ref_to(&route_table),
                    "SubnetId": intrinsic::ref_to(&id),
                }),
            )?,
        )?;

        let (gateway_id, nat_gateway_id, depends_on) = match egress {
            Egress::Internet { gateway, attachment } => {
                (Some(intrinsic::ref_to(gateway)), None, Some((*attachment).clone()))
            }
            Egress::Nat(nat) => (None, Some(intrinsic::ref_to(nat)), None),
        };
        let mut route = Resource::new(
            "AWS::EC2::Route",
            &RouteProps {
                destination_cidr_block: ANY_IPV4,
                gateway_id,
                nat_gateway_id,
                route_table_id: intrinsic::ref_to(&route_table),
            },
        )?;
        if let Some(attachment) = depends_on {
            route.add_dependency(attachment);
        }
        let default_route = stack.add_resource(&path("DefaultRoute"), route)?;

        tracing::debug!(subnet = %id, %cidr, zone, public, "declared subnet");
        Ok(Subnet {
            id,
            cidr,
            zone,
            default_route,
        })
    }

    /// Logical id of the network.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Address block of the network.
    #[must_use]
    pub const fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    /// Public subnets in zone order.
    #[must_use]
    pub fn public_subnets(&self) -> &[Subnet] {
        &self.public_subnets
    }

    /// Private subnets in zone order.
    #[must_use]
    pub fn private_subnets(&self) -> &[Subnet] {
        &self.private_subnets
    }
}

fn add_nat_gateway(stack: &mut StackBuilder, scope: [&str; 2], subnet: &Subnet) -> Result<LogicalId> {
    let stack_name = stack.stack_name().to_string();
    let eip = stack.add_resource(
        &[scope[0], scope[1], "EIP"],
        Resource::new(
            "AWS::EC2::EIP",
            &serde_json::json!({
                "Domain": "vpc",
                "Tags": [Tag::name(&stack_name, &scope)],
            }),
        )?,
    )?;
    let nat = Resource::new(
        "AWS::EC2::NatGateway",
        &serde_json::json!({
            "AllocationId": intrinsic::get_att(&eip, "AllocationId"),
            "SubnetId": intrinsic::ref_to(&subnet.id),
            "Tags": [Tag::name(&stack_name, &scope)],
        }),
    )?
    .depends_on(subnet.default_route.clone());
    stack.add_resource(&[scope[0], scope[1], "NATGateway"], nat)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn declare(max_azs: u8) -> (StackBuilder, Vpc) {
        let mut stack = StackBuilder::new("Stack");
        let cidr: Ipv4Cidr = "10.101.0.0/16".parse().expect("cidr");
        let vpc = Vpc::new(&mut stack, "MyVpc", VpcProps { cidr, max_azs }).expect("vpc");
        (stack, vpc)
    }

    #[test]
    fn two_zones_yield_two_public_and_two_private_subnets() {
        let (_, vpc) = declare(2);
        let public: Vec<String> = vpc.public_subnets().iter().map(|s| s.cidr.to_string()).collect();
        let private: Vec<String> = vpc.private_subnets().iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(public, vec!["10.101.0.0/18", "10.101.64.0/18"]);
        assert_eq!(private, vec!["10.101.128.0/18", "10.101.192.0/18"]);
    }

    #[test]
    fn resource_count_matches_layout() {
        let (stack, _) = declare(2);
        // vpc + igw + attachment, 4 subnets x 4, 2 x (eip + nat)
        assert_eq!(stack.len(), 3 + 16 + 4);
    }

    #[test]
    fn private_route_uses_nat_of_same_zone() {
        let (mut stack, vpc) = declare(2);
        let private = vpc.private_subnets()[1].clone();
        let route = stack.resource_mut(&private.default_route).expect("route").clone();
        let nat = route.property("NatGatewayId").expect("nat route");
        let nat_id = crate::intrinsic::references(nat).remove(0);
        assert!(nat_id.starts_with("MyVpcPublicSubnet2NATGateway"), "got: {nat_id}");
    }

    #[test]
    fn public_route_waits_for_gateway_attachment() {
        let (mut stack, vpc) = declare(1);
        let route_id = vpc.public_subnets()[0].default_route.clone();
        let route = stack.resource_mut(&route_id).expect("route");
        assert_eq!(route.property("DestinationCidrBlock"), Some(&json!("0.0.0.0/0")));
        assert_eq!(route.depends_on.len(), 1);
        assert!(route.depends_on[0].as_str().starts_with("MyVpcVPCGW"));
    }

    #[test]
    fn too_many_zones_fail() {
        let mut stack = StackBuilder::new("Stack");
        let cidr: Ipv4Cidr = "10.0.0.0/26".parse().expect("cidr");
        assert!(Vpc::new(&mut stack, "MyVpc", VpcProps { cidr, max_azs: 4 }).is_err());
    }
}
