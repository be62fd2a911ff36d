//! Cluster state monitor.
//!
//! The single reader of the config channels. Every cluster state change
//! during provisioning goes through here; updates are applied in receive
//! order with whole-record read-modify-write, last writer wins.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cluster::{ClusterService, KubeState, Machine, Role};

use crate::config::MonitorReceivers;

use super::settings::update_cloud_specific_data;

pub(crate) async fn monitor_cluster_state(
    ctx: CancellationToken,
    cluster_id: String,
    mut receivers: MonitorReceivers,
    kube_service: Arc<dyn ClusterService>,
) {
    tracing::debug!("[Monitor] watching cluster {}", cluster_id);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                tracing::debug!("[Monitor] cluster {} monitor stopped", cluster_id);
                return;
            }
            machine = receivers.node_rx.recv() => {
                let Some(machine) = machine else { return };
                apply_machine(&cluster_id, machine, kube_service.as_ref()).await;
            }
            state = receivers.state_rx.recv() => {
                let Some(state) = state else { return };
                apply_state(&cluster_id, state, kube_service.as_ref()).await;
            }
            config = receivers.config_rx.recv() => {
                let Some(config) = config else { return };
                tracing::debug!("[Monitor] update kube {} with config", cluster_id);
                let mut kube = match kube_service.get(&cluster_id).await {
                    Ok(kube) => kube,
                    Err(err) => {
                        tracing::error!("[Monitor] get kube {}: {}", cluster_id, err);
                        continue;
                    }
                };
                update_cloud_specific_data(&mut kube, &config);
                if let Err(err) = kube_service.create(&kube).await {
                    tracing::error!("[Monitor] update kube {}: {}", cluster_id, err);
                }
            }
        }
    }
}

async fn apply_machine(cluster_id: &str, machine: Machine, service: &dyn ClusterService) {
    let mut kube = match service.get(cluster_id).await {
        Ok(kube) => kube,
        Err(err) => {
            tracing::error!("[Monitor] get kube {}: {}", cluster_id, err);
            return;
        }
    };

    match machine.role {
        Role::Master => {
            kube.masters.insert(machine.name.clone(), machine);
        }
        Role::Node => {
            kube.nodes.insert(machine.name.clone(), machine);
        }
    }

    if let Err(err) = service.create(&kube).await {
        tracing::error!("[Monitor] update kube {}: {}", cluster_id, err);
    }
}

async fn apply_state(cluster_id: &str, state: KubeState, service: &dyn ClusterService) {
    tracing::debug!("[Monitor] update kube {} with state {}", cluster_id, state);
    let mut kube = match service.get(cluster_id).await {
        Ok(kube) => kube,
        Err(err) => {
            tracing::error!("[Monitor] get kube {}: {}", cluster_id, err);
            return;
        }
    };
    kube.state = state;
    if let Err(err) = service.create(&kube).await {
        tracing::error!("[Monitor] update kube {}: {}", cluster_id, err);
    }
}
