//! Registers the bootstrap public key as an account SSH key.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::GetDropletFn;

pub const STEP_NAME: &str = "digitalocean_register_key";

/// Idempotent on `digitalocean.key_fingerprint`: once the fingerprint is
/// known, droplet creation references it and no API call is made.
pub struct RegisterKeyStep {
    get_service: GetDropletFn,
}

impl RegisterKeyStep {
    pub fn new(get_service: GetDropletFn) -> Self {
        RegisterKeyStep { get_service }
    }
}

#[async_trait]
impl Step for RegisterKeyStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.digitalocean.key_fingerprint.is_empty() {
            tracing::info!(
                "[{}] key {} already registered, skipping",
                STEP_NAME,
                config.digitalocean.key_fingerprint
            );
            return Ok(());
        }
        if config.ssh.bootstrap_public_key.is_empty() {
            return Err(Error::InvalidArguments(
                "digitalocean_register_key needs the bootstrap public key".to_string(),
            ));
        }

        let service = (self.get_service)(&config.digitalocean)?;
        let name = format!("{}-{}-key", config.cluster_name, config.cluster_id);
        let key = service
            .register_key(&name, &config.ssh.bootstrap_public_key)
            .await
            .map_err(|err| Error::provider("digitalocean", format!("{}: {}", STEP_NAME, err)))?;

        config.digitalocean.key_fingerprint = key.fingerprint;
        let _ = writeln!(
            out,
            "ssh key {} registered as {}",
            config.digitalocean.key_fingerprint, name
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "registers the bootstrap public key for droplet access"
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        Droplet, DropletCreateRequest, DropletService, SshKey,
    };
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeKeys {
        registrations: AtomicUsize,
    }

    #[async_trait]
    impl DropletService for FakeKeys {
        async fn create(&self, _req: &DropletCreateRequest) -> Result<Droplet> {
            unreachable!("register key step never creates droplets")
        }

        async fn get(&self, _id: u64) -> Result<Droplet> {
            Err(Error::NotFound("droplet".to_string()))
        }

        async fn list_by_tag(&self, _tag: &str) -> Result<Vec<Droplet>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _id: u64) -> Result<()> {
            Ok(())
        }

        async fn delete_by_tag(&self, _tag: &str) -> Result<()> {
            Ok(())
        }

        async fn register_key(&self, _name: &str, _public_key: &str) -> Result<SshKey> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(SshKey {
                id: 7,
                fingerprint: "aa:bb:cc".to_string(),
                public_key: String::new(),
            })
        }
    }

    fn step_with(service: Arc<FakeKeys>) -> RegisterKeyStep {
        RegisterKeyStep::new(Arc::new(move |_| {
            Ok(service.clone() as Arc<dyn DropletService>)
        }))
    }

    #[tokio::test]
    async fn registers_and_stores_the_fingerprint() {
        let fake = Arc::new(FakeKeys::default());
        let step = step_with(fake.clone());

        let mut config = Config::default();
        config.cluster_name = "prod".to_string();
        config.cluster_id = "abcd1234".to_string();
        config.ssh.bootstrap_public_key = "rsa-public-pem".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(config.digitalocean.key_fingerprint, "aa:bb:cc");
        assert_eq!(fake.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn known_fingerprint_short_circuits() {
        let fake = Arc::new(FakeKeys::default());
        let step = step_with(fake.clone());

        let mut config = Config::default();
        config.digitalocean.key_fingerprint = "dd:ee:ff".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();
        assert_eq!(fake.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_bootstrap_key_is_invalid_arguments() {
        let fake = Arc::new(FakeKeys::default());
        let step = step_with(fake.clone());

        let mut config = Config::default();
        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        let err = step.run(&ctx, &mut sink, &mut config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}
