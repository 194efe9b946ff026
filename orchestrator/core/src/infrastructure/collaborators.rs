// SPDX-License-Identifier: Apache-2.0
//! Interface-only ports for the concrete collaborators a backup-automation
//! deployment would inject (IPMI power control, SSH, the Proxmox VE and PBS
//! REST APIs, metrics push). No implementation lives in this crate: wiring
//! concrete adapters behind these traits, and the concrete activities that
//! consume them (power-on/backup/power-off), is the application built on top
//! of this orchestrator, not the orchestrator itself.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Out-of-band power control over a single host's baseboard management controller.
#[async_trait]
pub trait IpmiController: Send + Sync {
    async fn power_on(&self, host: &str) -> Result<(), CollaboratorError>;
    async fn power_off(&self, host: &str) -> Result<(), CollaboratorError>;
    async fn is_powered_on(&self, host: &str) -> Result<bool, CollaboratorError>;
}

/// Remote command execution, used to drive filesystem-level backup steps on a
/// remote host.
#[async_trait]
pub trait SshClient: Send + Sync {
    async fn run(&self, host: &str, command: &str) -> Result<String, CollaboratorError>;
}

/// The subset of the Proxmox VE REST API a VM backup activity needs.
#[async_trait]
pub trait ProxmoxClient: Send + Sync {
    async fn list_vms(&self, node: &str) -> Result<Vec<String>, CollaboratorError>;
    async fn start_backup(&self, node: &str, vmid: &str) -> Result<String, CollaboratorError>;
    async fn backup_status(&self, node: &str, task_id: &str) -> Result<String, CollaboratorError>;
}

/// The subset of the Proxmox Backup Server REST API a directory backup
/// activity needs.
#[async_trait]
pub trait PbsClient: Send + Sync {
    async fn list_snapshots(&self, datastore: &str) -> Result<Vec<String>, CollaboratorError>;
    async fn prune(&self, datastore: &str, keep_last: u32) -> Result<(), CollaboratorError>;
}

/// Pushes point-in-time metrics to an external collector (e.g. a Pushgateway).
#[async_trait]
pub trait MetricsPushClient: Send + Sync {
    async fn push(&self, job: &str, metrics: &str) -> Result<(), CollaboratorError>;
}
