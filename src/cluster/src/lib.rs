//! Cluster domain model shared by the provisioning engine.
//!
//! Holds the persisted records (cluster, machine, profile), the KV storage
//! interface with its in-memory and file-backed implementations, and the
//! PKI bootstrap helpers used before any machine is created.

pub mod clouds;
pub mod error;
pub mod kube;
pub mod machine;
pub mod pki;
pub mod profile;
pub mod storage;

pub use clouds::CloudProvider;
pub use error::{Error, Result};
pub use kube::{Auth, ClusterService, Kube, KubeService, KubeState, Networking, KUBES_PREFIX};
pub use machine::{make_name, Machine, MachineState, Role};
pub use pki::{new_admin_pair, new_bootstrap_key_pair, new_ca_pair, CertPair, KeyPairPem};
pub use profile::{NodeProfile, Profile};
pub use storage::{FileStorage, MemoryStorage, Storage};
