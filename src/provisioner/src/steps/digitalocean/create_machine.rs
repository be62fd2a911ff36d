//! Creates one droplet and polls it to the active state.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::{make_name, CloudProvider, Error, Machine, MachineState, Result, Role};

use crate::config::Config;
use crate::workflow::Step;

use super::{cluster_tag, DropletCreateRequest, GetDropletFn};

pub const STEP_NAME: &str = "digitalocean_create_machine";

pub struct CreateMachineStep {
    get_service: GetDropletFn,
    check_period: Duration,
    timeout: Duration,
}

impl CreateMachineStep {
    pub fn new(get_service: GetDropletFn, check_period: Duration, timeout: Duration) -> Self {
        CreateMachineStep {
            get_service,
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
        let service = (self.get_service)(&config.digitalocean)?;
        let name = make_name(&config.cluster_name, &config.task_id, config.is_master);
        let role = if config.is_master {
            Role::Master
        } else {
            Role::Node
        };

        // The bootstrap key registered by the register-key step is what
        // lets the ssh step reach the droplet afterwards.
        let mut ssh_keys = Vec::new();
        if !config.digitalocean.key_fingerprint.is_empty() {
            ssh_keys.push(config.digitalocean.key_fingerprint.clone());
        }

        let request = DropletCreateRequest {
            name: name.clone(),
            region: config.digitalocean.region.clone(),
            size: config.digitalocean.size.clone(),
            image: config.digitalocean.image.clone(),
            tags: vec![cluster_tag(&config.cluster_id)],
            ssh_keys,
            user_data: String::new(),
        };

        let droplet = service
            .create(&request)
            .await
            .map_err(|err| Error::provider("digitalocean", format!("{}: {}", STEP_NAME, err)))?;
        let _ = writeln!(out, "droplet {} created as {}", droplet.id, name);

        let mut machine = Machine {
            id: droplet.id.to_string(),
            name: name.clone(),
            role,
            created_at: Utc::now(),
            provider: CloudProvider::DigitalOcean,
            region: config.digitalocean.region.clone(),
            size: config.digitalocean.size.clone(),
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
                // Partial state stays on the config for rollback.
                return Err(Error::TimeoutExceeded);
            }

            let droplet = match service.get(droplet.id).await {
                Ok(droplet) => droplet,
                Err(err) => {
                    tracing::debug!("[{}] describe droplet: {}", STEP_NAME, err);
                    continue;
                }
            };

            if droplet.is_active() {
                let (Some(public_ip), Some(private_ip)) =
                    (droplet.public_ip(), droplet.private_ip())
                else {
                    continue;
                };

                machine.public_ip = public_ip.to_string();
                machine.private_ip = private_ip.to_string();
                machine.state = MachineState::Active;
                config.node = machine.clone();
                config.push_node(machine.clone()).await;

                if config.is_master {
                    config.add_master(&machine);
                } else {
                    config.add_node(&machine);
                }
                let _ = writeln!(out, "droplet {} is active at {}", name, public_ip);
                return Ok(());
            }
        }
    }

    /// Remove the droplet the run got as far as creating.
    async fn rollback(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let Ok(id) = config.node.id.parse::<u64>() else {
            return Ok(());
        };
        let service = (self.get_service)(&config.digitalocean)?;
        match service.delete(id).await {
            Ok(()) | Err(Error::NotFound(_)) => Ok(()),
            Err(err) => {
                tracing::warn!("[{}] rollback delete droplet {}: {}", STEP_NAME, id, err);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates a droplet and waits until it is active"
    }
}
