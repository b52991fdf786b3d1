//! Wire representations of the Docker Engine API payloads.
use std::collections::HashMap;

use crate::container::{self, ContainerID, ContainerSnapshot, ContainerSummary};

use super::RuntimeInfo;

#[derive(Debug, serde::Deserialize)]
pub(super) struct WireActor {
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub(super) struct WireEvent {
    pub status: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Action")]
    pub action: Option<String>,
    #[serde(rename = "Actor")]
    pub actor: Option<WireActor>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct WireSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
}

impl TryFrom<WireSummary> for ContainerSummary {
    type Error = container::Error;

    fn try_from(wire: WireSummary) -> Result<Self, Self::Error> {
        Ok(ContainerSummary {
            id: ContainerID::new(&wire.id)?,
            names: wire.names,
            image: wire.image,
            state: wire.state,
        })
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct WireState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: u32,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct WireConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct WireContainer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub state: WireState,
    #[serde(default)]
    pub config: WireConfig,
}

impl TryFrom<WireContainer> for ContainerSnapshot {
    type Error = container::Error;

    fn try_from(wire: WireContainer) -> Result<Self, Self::Error> {
        Ok(ContainerSnapshot {
            id: ContainerID::new(&wire.id)?,
            name: wire.name.trim_start_matches('/').to_owned(),
            image: wire.config.image,
            created: wire.created,
            running: wire.state.running,
            pid: wire.state.pid,
            labels: wire.config.labels.unwrap_or_default(),
        })
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct WireInfo {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub docker_root_dir: String,
    #[serde(default)]
    pub server_version: String,
}

impl From<WireInfo> for RuntimeInfo {
    fn from(wire: WireInfo) -> Self {
        RuntimeInfo {
            driver: wire.driver,
            docker_root_dir: wire.docker_root_dir,
            server_version: wire.server_version,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub(super) struct WireErrorMessage {
    pub message: String,
}
