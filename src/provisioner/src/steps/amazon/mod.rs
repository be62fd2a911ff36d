//! AWS steps and the narrow EC2/IAM interface they consume.
//!
//! Every pre-provision step is idempotent on its output field: when the
//! field is already set on the config the step returns without touching
//! the API, which is what makes reruns after a restart safe.

pub mod create_instance_profiles;
pub mod create_internet_gateway;
pub mod create_machine;
pub mod create_route_table;
pub mod create_security_groups;
pub mod create_subnets;
pub mod create_vpc;
pub mod delete_cluster_machines;
pub mod delete_machine;
pub mod find_image;
pub mod import_key_pair;

use async_trait::async_trait;
use std::sync::Arc;

use cluster::clouds::CLUSTER_ID_TAG;
use cluster::{Error, Result};

use crate::config::{AwsConfig, Config};

pub const DEFAULT_VPC_CIDR: &str = "10.2.0.0/16";

/// Ubuntu image owner and name filter used by the AMI lookup.
pub const IMAGE_OWNER: &str = "099720109477";
pub const IMAGE_NAME_FILTER: &str = "ubuntu/images/hvm-ssd/ubuntu-xenial-16.04-amd64-server-*";

#[derive(Debug, Clone, Default)]
pub struct AwsInstance {
    pub id: String,
    pub state: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

impl AwsInstance {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunInstanceRequest {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub instance_profile: String,
    pub key_name: String,
    pub tags: Vec<(String, String)>,
}

/// The EC2 surface the steps depend on. The SDK-backed implementation is
/// wired by the embedding process; tests install mocks.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn create_vpc(&self, cidr: &str) -> Result<String>;
    async fn describe_availability_zones(&self) -> Result<Vec<String>>;
    async fn create_subnet(&self, vpc_id: &str, az: &str, cidr: &str) -> Result<String>;
    async fn create_internet_gateway(&self) -> Result<String>;
    async fn attach_internet_gateway(&self, igw_id: &str, vpc_id: &str) -> Result<()>;
    async fn create_route_table(&self, vpc_id: &str) -> Result<String>;
    async fn create_default_route(&self, route_table_id: &str, igw_id: &str) -> Result<()>;
    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()>;
    async fn create_security_group(&self, vpc_id: &str, name: &str) -> Result<String>;
    async fn authorize_ingress(
        &self,
        group_id: &str,
        from_port: u16,
        to_port: u16,
        cidr: &str,
    ) -> Result<()>;
    async fn create_instance_profile(&self, name: &str) -> Result<String>;
    async fn find_image(&self, owner: &str, name_filter: &str) -> Result<String>;
    async fn import_key_pair(&self, name: &str, public_key: &str) -> Result<String>;
    async fn run_instance(&self, req: &RunInstanceRequest) -> Result<AwsInstance>;
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<AwsInstance>>;
    async fn describe_instances_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<AwsInstance>>;
    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<Vec<String>>;
    async fn create_tags(&self, resource_id: &str, tags: &[(String, String)]) -> Result<()>;
}

pub type GetEc2Fn = Arc<dyn Fn(&AwsConfig) -> Result<Arc<dyn Ec2Api>> + Send + Sync>;

/// Placeholder factory for processes that never touch AWS.
pub fn unconfigured_ec2_fn() -> GetEc2Fn {
    Arc::new(|_| {
        Err(Error::InvalidArguments(
            "no EC2 client wired, supply one via ProviderClients".to_string(),
        ))
    })
}

/// Standard tags for resources belonging to one cluster.
pub(crate) fn resource_tags(config: &Config, name: &str) -> Vec<(String, String)> {
    vec![
        ("Name".to_string(), name.to_string()),
        (CLUSTER_ID_TAG.to_string(), config.cluster_id.clone()),
    ]
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Counting EC2 mock with deterministic ids and optional per-method
    /// failures.
    #[derive(Default)]
    pub struct MockEc2 {
        calls: Mutex<HashMap<&'static str, usize>>,
        failures: Mutex<HashMap<&'static str, String>>,
        pub instances: Mutex<Vec<AwsInstance>>,
    }

    impl MockEc2 {
        pub fn calls(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .get(method)
                .copied()
                .unwrap_or(0)
        }

        pub fn fail_with(&self, method: &'static str, message: &str) {
            self.failures
                .lock()
                .unwrap()
                .insert(method, message.to_string());
        }

        fn enter(&self, method: &'static str) -> Result<()> {
            *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
            if let Some(message) = self.failures.lock().unwrap().get(method) {
                return Err(Error::provider("aws", message.clone()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Ec2Api for MockEc2 {
        async fn create_vpc(&self, _cidr: &str) -> Result<String> {
            self.enter("create_vpc")?;
            Ok("vpc-1".to_string())
        }

        async fn describe_availability_zones(&self) -> Result<Vec<String>> {
            self.enter("describe_availability_zones")?;
            Ok(vec!["us-east-1a".to_string(), "us-east-1b".to_string()])
        }

        async fn create_subnet(&self, _vpc: &str, az: &str, _cidr: &str) -> Result<String> {
            self.enter("create_subnet")?;
            Ok(format!("subnet-{}", az))
        }

        async fn create_internet_gateway(&self) -> Result<String> {
            self.enter("create_internet_gateway")?;
            Ok("igw-1".to_string())
        }

        async fn attach_internet_gateway(&self, _igw: &str, _vpc: &str) -> Result<()> {
            self.enter("attach_internet_gateway")
        }

        async fn create_route_table(&self, _vpc: &str) -> Result<String> {
            self.enter("create_route_table")?;
            Ok("rtb-1".to_string())
        }

        async fn create_default_route(&self, _rt: &str, _igw: &str) -> Result<()> {
            self.enter("create_default_route")
        }

        async fn associate_route_table(&self, _rt: &str, _subnet: &str) -> Result<()> {
            self.enter("associate_route_table")
        }

        async fn create_security_group(&self, _vpc: &str, name: &str) -> Result<String> {
            self.enter("create_security_group")?;
            Ok(format!("sg-{}", name))
        }

        async fn authorize_ingress(
            &self,
            _group: &str,
            _from: u16,
            _to: u16,
            _cidr: &str,
        ) -> Result<()> {
            self.enter("authorize_ingress")
        }

        async fn create_instance_profile(&self, name: &str) -> Result<String> {
            self.enter("create_instance_profile")?;
            Ok(name.to_string())
        }

        async fn find_image(&self, _owner: &str, _filter: &str) -> Result<String> {
            self.enter("find_image")?;
            Ok("ami-1".to_string())
        }

        async fn import_key_pair(&self, name: &str, _public_key: &str) -> Result<String> {
            self.enter("import_key_pair")?;
            Ok(name.to_string())
        }

        async fn run_instance(&self, req: &RunInstanceRequest) -> Result<AwsInstance> {
            self.enter("run_instance")?;
            let instance = AwsInstance {
                id: format!("i-{}", req.name),
                state: "pending".to_string(),
                public_ip: None,
                private_ip: None,
            };
            self.instances.lock().unwrap().push(instance.clone());
            Ok(instance)
        }

        async fn describe_instance(&self, instance_id: &str) -> Result<Option<AwsInstance>> {
            self.enter("describe_instance")?;
            Ok(Some(AwsInstance {
                id: instance_id.to_string(),
                state: "running".to_string(),
                public_ip: Some("203.0.113.5".to_string()),
                private_ip: Some("10.2.1.5".to_string()),
            }))
        }

        async fn describe_instances_by_tag(
            &self,
            _key: &str,
            _value: &str,
        ) -> Result<Vec<AwsInstance>> {
            self.enter("describe_instances_by_tag")?;
            Ok(self.instances.lock().unwrap().clone())
        }

        async fn terminate_instances(&self, instance_ids: &[String]) -> Result<Vec<String>> {
            self.enter("terminate_instances")?;
            Ok(instance_ids.to_vec())
        }

        async fn create_tags(&self, _resource: &str, _tags: &[(String, String)]) -> Result<()> {
            self.enter("create_tags")
        }
    }
}
