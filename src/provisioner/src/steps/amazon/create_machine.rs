//! Runs one EC2 instance and polls it to the running state.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::{make_name, CloudProvider, Error, Machine, MachineState, Result, Role};

use crate::config::Config;
use crate::workflow::Step;

use super::{resource_tags, GetEc2Fn, RunInstanceRequest};

pub const STEP_NAME: &str = "aws_create_machine";

pub struct CreateMachineStep {
    get_ec2: GetEc2Fn,
    check_period: Duration,
    timeout: Duration,
}

impl CreateMachineStep {
    pub fn new(get_ec2: GetEc2Fn, check_period: Duration, timeout: Duration) -> Self {
        CreateMachineStep {
            get_ec2,
            check_period,
            timeout,
        }
    }
}

#[async_trait]
impl Step for CreateMachineStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let ec2 = (self.get_ec2)(&config.aws)?;
        let name = make_name(&config.cluster_name, &config.task_id, config.is_master);
        let role = if config.is_master {
            Role::Master
        } else {
            Role::Node
        };

        let (security_group, instance_profile) = if config.is_master {
            (
                config.aws.masters_security_group_id.clone(),
                config.aws.masters_instance_profile.clone(),
            )
        } else {
            (
                config.aws.nodes_security_group_id.clone(),
                config.aws.nodes_instance_profile.clone(),
            )
        };

        let mut tags = resource_tags(config, &name);
        tags.push(("Role".to_string(), role.to_string()));
        let request = RunInstanceRequest {
            name: name.clone(),
            image_id: config.aws.image_id.clone(),
            instance_type: config.aws.instance_type.clone(),
            subnet_id: config.aws.subnet_id.clone(),
            security_group_id: security_group,
            instance_profile,
            key_name: config.aws.keypair_name.clone(),
            tags,
        };

        let instance = ec2.run_instance(&request).await?;
        let _ = writeln!(out, "instance {} launched as {}", instance.id, name);

        let mut machine = Machine {
            id: instance.id.clone(),
            name: name.clone(),
            role,
            created_at: Utc::now(),
            provider: CloudProvider::Aws,
            region: config.aws.region.clone(),
            size: config.aws.instance_type.clone(),
            public_ip: String::new(),
            private_ip: String::new(),
            state: MachineState::Building,
        };
        config.node = machine.clone();
        config.push_node(machine.clone()).await;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.check_period) => {}
            }
            if tokio::time::Instant::now() > deadline {
                return Err(Error::TimeoutExceeded);
            }

            let described = match ec2.describe_instance(&instance.id).await {
                Ok(described) => described,
                Err(err) => {
                    tracing::debug!("[{}] describe instance: {}", STEP_NAME, err);
                    continue;
                }
            };

            let Some(described) = described else { continue };
            if !described.is_running() {
                continue;
            }
            let (Some(public_ip), Some(private_ip)) =
                (described.public_ip.clone(), described.private_ip.clone())
            else {
                continue;
            };

            machine.public_ip = public_ip;
            machine.private_ip = private_ip;
            machine.state = MachineState::Active;
            config.node = machine.clone();
            config.push_node(machine.clone()).await;
            if config.is_master {
                config.add_master(&machine);
            } else {
                config.add_node(&machine);
            }
            let _ = writeln!(out, "instance {} is running", name);
            return Ok(());
        }
    }

    /// Terminate the instance this run launched.
    async fn rollback(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if config.node.id.is_empty() {
            return Ok(());
        }
        let ec2 = (self.get_ec2)(&config.aws)?;
        if let Err(err) = ec2.terminate_instances(&[config.node.id.clone()]).await {
            tracing::warn!(
                "[{}] rollback terminate {}: {}",
                STEP_NAME,
                config.node.id,
                err
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "launches an EC2 instance and waits until it is running"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![super::find_image::STEP_NAME, super::import_key_pair::STEP_NAME]
    }
}
