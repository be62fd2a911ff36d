//! Inserts a compute instance and polls it to RUNNING.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::{make_name, CloudProvider, Error, Machine, MachineState, Result, Role};

use crate::config::Config;
use crate::workflow::Step;

use super::{GetComputeFn, InsertInstanceRequest};

pub const STEP_NAME: &str = "gce_create_instance";

pub struct CreateInstanceStep {
    get_compute: GetComputeFn,
    check_period: Duration,
    timeout: Duration,
}

impl CreateInstanceStep {
    pub fn new(get_compute: GetComputeFn, check_period: Duration, timeout: Duration) -> Self {
        CreateInstanceStep {
            get_compute,
            check_period,
            timeout,
        }
    }
}

#[async_trait]
impl Step for CreateInstanceStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let compute = (self.get_compute)(&config.gce)?;
        // Instance names must be lowercase, which make_name guarantees.
        let name = make_name(&config.cluster_name, &config.task_id, config.is_master);
        let role = if config.is_master {
            Role::Master
        } else {
            Role::Node
        };
        let zone = config.gce.availability_zone.clone();

        let request = InsertInstanceRequest {
            name: name.clone(),
            machine_type: config.gce.size.clone(),
            image_family: config.gce.image_family.clone(),
            ssh_public_key: format!(
                "{}:{}",
                config.ssh.user, config.ssh.bootstrap_public_key
            ),
            role: role.to_string(),
            cluster_id: config.cluster_id.clone(),
        };
        compute.insert_instance(&zone, &request).await?;
        let _ = writeln!(out, "instance {} inserted in {}", name, zone);

        let mut machine = Machine {
            id: String::new(),
            name: name.clone(),
            role,
            created_at: Utc::now(),
            provider: CloudProvider::Gce,
            // The availability zone rides in the region field, deletes
            // need it and the record has no zone of its own.
            region: zone.clone(),
            size: config.gce.size.clone(),
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

            let instance = match compute.get_instance(&zone, &name).await {
                Ok(Some(instance)) => instance,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!("[{}] get instance: {}", STEP_NAME, err);
                    continue;
                }
            };

            if !instance.is_running() {
                continue;
            }
            let (Some(public_ip), Some(private_ip)) =
                (instance.public_ip.clone(), instance.private_ip.clone())
            else {
                continue;
            };

            machine.id = instance.id.clone();
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

    /// Delete the instance this run inserted.
    async fn rollback(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if config.node.name.is_empty() {
            return Ok(());
        }
        let compute = (self.get_compute)(&config.gce)?;
        if let Err(err) = compute
            .delete_instance(&config.node.region, &config.node.name)
            .await
        {
            tracing::warn!(
                "[{}] rollback delete {}: {}",
                STEP_NAME,
                config.node.name,
                err
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "inserts a compute instance and waits until it is running"
    }
}
