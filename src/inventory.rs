//! The test bed: which nodes exist, what they do and where their bricks live.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::paths::ClusterPaths;
use crate::GlusterError;

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub hostname: String,
    pub role: Role,
}

/// Storage a server offers to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Every brick mount lives under this directory
    pub brick_root: String,
    /// Block devices owned by this server, in the order they should be used
    #[serde(default)]
    pub devices: Vec<String>,
}

/// The on-disk shape of an inventory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub servers: Vec<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    pub servers_info: BTreeMap<String, ServerInfo>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub ssh_options: Vec<String>,
    #[serde(default)]
    pub paths: ClusterPaths,
}

fn default_user() -> String {
    "root".to_string()
}

#[derive(Debug, Clone)]
pub struct Inventory {
    servers: Vec<String>,
    clients: Vec<String>,
    servers_info: BTreeMap<String, ServerInfo>,
    user: String,
    ssh_options: Vec<String>,
    paths: ClusterPaths,
}

impl Inventory {
    /// Validate `config` and build the inventory from it.  Every server needs a `ServerInfo`
    /// with an absolute brick root.
    pub fn new(config: InventoryConfig) -> Result<Inventory, GlusterError> {
        if config.servers.is_empty() {
            return Err(GlusterError::PreconditionViolation(
                "inventory lists no servers".to_string(),
            ));
        }
        for server in &config.servers {
            let info = config.servers_info.get(server).ok_or_else(|| {
                GlusterError::PreconditionViolation(format!(
                    "server {} has no servers_info entry",
                    server
                ))
            })?;
            if !ClusterPaths::is_absolute(&info.brick_root) {
                return Err(GlusterError::PreconditionViolation(format!(
                    "brick_root {} of {} is not absolute",
                    info.brick_root, server
                )));
            }
        }
        for (server, info) in &config.servers_info {
            let mut devices = info.devices.clone();
            devices.sort();
            devices.dedup();
            if devices.len() != info.devices.len() {
                return Err(GlusterError::PreconditionViolation(format!(
                    "server {} lists a device more than once",
                    server
                )));
            }
        }
        debug!(
            "Loaded inventory with {} servers and {} clients",
            config.servers.len(),
            config.clients.len()
        );
        Ok(Inventory {
            servers: config.servers,
            clients: config.clients,
            servers_info: config.servers_info,
            user: config.user,
            ssh_options: config.ssh_options,
            paths: config.paths,
        })
    }

    pub fn from_json(json: &str) -> Result<Inventory, GlusterError> {
        let config: InventoryConfig = serde_json::from_str(json)?;
        Inventory::new(config)
    }

    pub fn from_file(path: &Path) -> Result<Inventory, GlusterError> {
        let json = fs::read_to_string(path)?;
        Inventory::from_json(&json)
    }

    /// Servers in inventory order.  The planner's round robin depends on this order.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }

    pub fn server_info(&self, node: &str) -> Option<&ServerInfo> {
        self.servers_info.get(node)
    }

    pub fn servers_info(&self) -> &BTreeMap<String, ServerInfo> {
        &self.servers_info
    }

    /// The management node every cluster wide command is serialised through
    pub fn mnode(&self) -> &str {
        &self.servers[0]
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn ssh_options(&self) -> &[String] {
        &self.ssh_options
    }

    pub fn paths(&self) -> &ClusterPaths {
        &self.paths
    }

    /// Every node once, servers first.  A host listed as both server and client gets
    /// `Role::Both`.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = Vec::new();
        for server in &self.servers {
            let role = if self.clients.contains(server) {
                Role::Both
            } else {
                Role::Server
            };
            nodes.push(Node {
                hostname: server.clone(),
                role,
            });
        }
        for client in &self.clients {
            if !self.servers.contains(client) {
                nodes.push(Node {
                    hostname: client.clone(),
                    role: Role::Client,
                });
            }
        }
        nodes
    }

    pub fn all_hostnames(&self) -> Vec<String> {
        self.nodes().into_iter().map(|n| n.hostname).collect()
    }
}
