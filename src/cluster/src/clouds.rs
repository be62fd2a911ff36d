//! Cloud provider names and the tag keys stamped on created resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Tag attached to every machine so cluster-wide deletes can enumerate them.
pub const CLUSTER_ID_TAG: &str = "cluster-id";

/// Default OS user configured on provisioned machines.
pub const OS_USER: &str = "kubeuser";

/// Keys of the cloud specific settings map persisted on the cluster record.
pub const AWS_AZ: &str = "aws-az";
pub const AWS_VPC_CIDR: &str = "aws-vpc-cidr";
pub const AWS_VPC_ID: &str = "aws-vpc-id";
pub const AWS_KEYPAIR_NAME: &str = "aws-keypair-name";
pub const AWS_SUBNET_ID: &str = "aws-subnet-id";
pub const AWS_MASTERS_SECGROUP_ID: &str = "aws-masters-secgroup-id";
pub const AWS_NODES_SECGROUP_ID: &str = "aws-nodes-secgroup-id";
pub const AWS_ROUTE_TABLE_ID: &str = "aws-route-table-id";
pub const AWS_INTERNET_GATEWAY_ID: &str = "aws-internet-gateway-id";
pub const AWS_MASTER_INSTANCE_PROFILE: &str = "aws-master-instance-profile";
pub const AWS_NODE_INSTANCE_PROFILE: &str = "aws-node-instance-profile";
pub const AWS_IMAGE_ID: &str = "aws-image-id";
pub const DO_KEY_FINGERPRINT: &str = "do-key-fingerprint";
pub const SSH_BOOTSTRAP_PRIVATE_KEY: &str = "ssh-bootstrap-private-key";
pub const SSH_USER_PROVIDED_PUBLIC_KEY: &str = "ssh-user-provided-public-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    DigitalOcean,
    Aws,
    Gce,
    Azure,
    OpenStack,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudProvider::DigitalOcean => "digitalocean",
            CloudProvider::Aws => "aws",
            CloudProvider::Gce => "gce",
            CloudProvider::Azure => "azure",
            CloudProvider::OpenStack => "openstack",
        };
        f.write_str(name)
    }
}

impl FromStr for CloudProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "digitalocean" => Ok(CloudProvider::DigitalOcean),
            "aws" => Ok(CloudProvider::Aws),
            "gce" => Ok(CloudProvider::Gce),
            "azure" => Ok(CloudProvider::Azure),
            "openstack" => Ok(CloudProvider::OpenStack),
            other => Err(Error::InvalidArguments(format!(
                "unknown cloud provider {}",
                other
            ))),
        }
    }
}

impl Default for CloudProvider {
    fn default() -> Self {
        CloudProvider::DigitalOcean
    }
}
