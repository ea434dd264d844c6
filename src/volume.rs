//! Volume lifecycle commands and the parsers for `volume info`, `volume status` and
//! `volume get`.
use std::collections::BTreeMap;
use std::fmt;

use crate::executor::{CommandOutput, RemoteExecutor};
use crate::{run_command, GlusterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Rdma,
    TcpAndRdma,
}

impl Transport {
    pub fn new(name: &str) -> Transport {
        match name.trim() {
            "tcp" | "0" => Transport::Tcp,
            "rdma" | "1" => Transport::Rdma,
            "tcp,rdma" | "2" => Transport::TcpAndRdma,
            _ => Transport::Tcp,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Transport::Tcp => "tcp",
            Transport::Rdma => "rdma",
            Transport::TcpAndRdma => "tcp,rdma",
        };
        write!(f, "{}", s)
    }
}

/// The CLI keywords that shape a volume at create time, in the order the CLI expects them
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum VolumeTranslator {
    Replica,
    Arbiter,
    Disperse,
    Redundancy,
}

impl fmt::Display for VolumeTranslator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            VolumeTranslator::Replica => "replica",
            VolumeTranslator::Arbiter => "arbiter",
            VolumeTranslator::Disperse => "disperse",
            VolumeTranslator::Redundancy => "redundancy",
        };
        write!(f, "{}", s)
    }
}

/// Volume type as reported in `typeStr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
    Distribute,
    Stripe,
    Replicate,
    Disperse,
    Tier,
    DistributedAndStripe,
    DistributedAndReplicate,
    DistributedAndDisperse,
    Unknown,
}

impl VolumeType {
    pub fn new(name: &str) -> VolumeType {
        match name.trim() {
            "Distribute" => VolumeType::Distribute,
            "Stripe" => VolumeType::Stripe,
            "Replicate" => VolumeType::Replicate,
            "Disperse" => VolumeType::Disperse,
            "Tier" => VolumeType::Tier,
            "Distributed-Stripe" => VolumeType::DistributedAndStripe,
            "Distributed-Replicate" => VolumeType::DistributedAndReplicate,
            "Distributed-Disperse" => VolumeType::DistributedAndDisperse,
            _ => VolumeType::Unknown,
        }
    }

    pub fn is_replicated(self) -> bool {
        self == VolumeType::Replicate || self == VolumeType::DistributedAndReplicate
    }

    pub fn is_dispersed(self) -> bool {
        self == VolumeType::Disperse || self == VolumeType::DistributedAndDisperse
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            VolumeType::Distribute => "Distribute",
            VolumeType::Stripe => "Stripe",
            VolumeType::Replicate => "Replicate",
            VolumeType::Disperse => "Disperse",
            VolumeType::Tier => "Tier",
            VolumeType::DistributedAndStripe => "Distributed-Stripe",
            VolumeType::DistributedAndReplicate => "Distributed-Replicate",
            VolumeType::DistributedAndDisperse => "Distributed-Disperse",
            VolumeType::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// The shape of a volume as a test asks for it.
///
/// `kind` is one of `distributed`, `replicated`, `distributed-replicated`, `arbiter`,
/// `distributed-arbiter`, `dispersed` or `distributed-dispersed`.  For arbiter volumes
/// `replica_count` includes the arbiter brick, so `replica 3 arbiter 1` is
/// `replica_count: 3, arbiter_count: 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub dist_count: Option<usize>,
    #[serde(default)]
    pub replica_count: Option<usize>,
    #[serde(default)]
    pub arbiter_count: Option<usize>,
    #[serde(default)]
    pub disperse_count: Option<usize>,
    #[serde(default)]
    pub redundancy_count: Option<usize>,
    #[serde(default)]
    pub transport: Option<String>,
}

impl Geometry {
    pub fn distributed(dist_count: usize) -> Geometry {
        Geometry {
            kind: "distributed".to_string(),
            dist_count: Some(dist_count),
            ..Default::default()
        }
    }

    pub fn replicated(replica_count: usize) -> Geometry {
        Geometry {
            kind: "replicated".to_string(),
            replica_count: Some(replica_count),
            ..Default::default()
        }
    }

    pub fn distributed_replicated(dist_count: usize, replica_count: usize) -> Geometry {
        Geometry {
            kind: "distributed-replicated".to_string(),
            dist_count: Some(dist_count),
            replica_count: Some(replica_count),
            ..Default::default()
        }
    }

    pub fn arbiter(dist_count: usize, replica_count: usize, arbiter_count: usize) -> Geometry {
        Geometry {
            kind: if dist_count > 1 {
                "distributed-arbiter".to_string()
            } else {
                "arbiter".to_string()
            },
            dist_count: Some(dist_count),
            replica_count: Some(replica_count),
            arbiter_count: Some(arbiter_count),
            ..Default::default()
        }
    }

    pub fn dispersed(dist_count: usize, disperse_count: usize, redundancy_count: usize) -> Geometry {
        Geometry {
            kind: if dist_count > 1 {
                "distributed-dispersed".to_string()
            } else {
                "dispersed".to_string()
            },
            dist_count: Some(dist_count),
            disperse_count: Some(disperse_count),
            redundancy_count: Some(redundancy_count),
            ..Default::default()
        }
    }

    fn require(&self, value: Option<usize>, what: &str) -> Result<usize, GlusterError> {
        match value {
            Some(v) if v > 0 => Ok(v),
            _ => Err(GlusterError::PreconditionViolation(format!(
                "{} volumes need a non-zero {}",
                self.kind, what
            ))),
        }
    }

    /// Bricks needed: dist_count x (replica_count or disperse_count)
    pub fn brick_count(&self) -> Result<usize, GlusterError> {
        let dist = self.dist_count.unwrap_or(1);
        match self.kind.as_str() {
            "distributed" => self.require(self.dist_count, "dist_count"),
            "replicated" | "arbiter" => self.require(self.replica_count, "replica_count"),
            "distributed-replicated" | "distributed-arbiter" => {
                Ok(dist * self.require(self.replica_count, "replica_count")?)
            }
            "dispersed" => self.require(self.disperse_count, "disperse_count"),
            "distributed-dispersed" => {
                Ok(dist * self.require(self.disperse_count, "disperse_count")?)
            }
            other => Err(GlusterError::PreconditionViolation(format!(
                "unknown volume type {}",
                other
            ))),
        }
    }

    /// Size of one subvolume
    pub fn subvol_size(&self) -> usize {
        match self.kind.as_str() {
            "dispersed" | "distributed-dispersed" => self.disperse_count.unwrap_or(1),
            "distributed" => 1,
            _ => self.replica_count.unwrap_or(1),
        }
    }

    /// Translator keywords for `volume create`, always in replica, arbiter, disperse,
    /// redundancy order.
    pub fn translators(&self) -> Vec<(VolumeTranslator, usize)> {
        let mut translators = Vec::new();
        match self.kind.as_str() {
            "replicated" | "distributed-replicated" | "arbiter" | "distributed-arbiter" => {
                if let Some(r) = self.replica_count {
                    translators.push((VolumeTranslator::Replica, r));
                }
                if let Some(a) = self.arbiter_count {
                    if a > 0 {
                        translators.push((VolumeTranslator::Arbiter, a));
                    }
                }
            }
            "dispersed" | "distributed-dispersed" => {
                if let Some(d) = self.disperse_count {
                    translators.push((VolumeTranslator::Disperse, d));
                }
                if let Some(r) = self.redundancy_count {
                    translators.push((VolumeTranslator::Redundancy, r));
                }
            }
            _ => {}
        }
        translators
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrickEntry {
    /// `host:/path`
    pub name: String,
    pub host_uuid: String,
    pub is_arbiter: bool,
}

/// Bricks of one tier of a tiered volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierBricks {
    pub brick_type: String,
    pub number_of_bricks: String,
    pub replica_count: String,
    pub arbiter_count: String,
    pub disperse_count: String,
    pub redundancy_count: String,
    pub bricks: Vec<BrickEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrickLayout {
    pub bricks: Vec<BrickEntry>,
    pub hot: Option<TierBricks>,
    pub cold: Option<TierBricks>,
}

/// One volume out of `gluster volume info --xml`.  Values are kept as the CLI printed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub id: String,
    pub status: String,
    pub status_str: String,
    pub snapshot_count: String,
    pub brick_count: String,
    pub dist_count: String,
    pub stripe_count: String,
    pub replica_count: String,
    pub arbiter_count: String,
    pub disperse_count: String,
    pub redundancy_count: String,
    pub vol_type: String,
    pub type_str: String,
    pub transport: String,
    pub options: BTreeMap<String, String>,
    pub bricks: BrickLayout,
}

impl VolumeInfo {
    pub fn volume_type(&self) -> VolumeType {
        VolumeType::new(&self.type_str)
    }

    pub fn is_tiered(&self) -> bool {
        self.bricks.hot.is_some() || self.bricks.cold.is_some()
    }

    /// Every brick of the volume, hot tier first for tiered volumes
    pub fn all_bricks(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        if let Some(ref hot) = self.bricks.hot {
            all.extend(hot.bricks.iter().map(|b| b.name.clone()));
        }
        if let Some(ref cold) = self.bricks.cold {
            all.extend(cold.bricks.iter().map(|b| b.name.clone()));
        }
        all.extend(self.bricks.bricks.iter().map(|b| b.name.clone()));
        all
    }
}

fn count(value: &str) -> usize {
    value.trim().parse::<usize>().unwrap_or(0)
}

pub(crate) fn as_count(value: &str) -> usize {
    count(value)
}

#[derive(Debug, Deserialize)]
struct XmlInfoOutput {
    #[serde(rename = "opRet")]
    op_ret: String,
    #[serde(rename = "volInfo", default)]
    vol_info: Option<XmlVolInfo>,
}

#[derive(Debug, Deserialize)]
struct XmlVolInfo {
    volumes: XmlVolumes,
}

#[derive(Debug, Deserialize)]
struct XmlVolumes {
    #[serde(rename = "volume", default)]
    volume: Vec<XmlVolume>,
}

#[derive(Debug, Deserialize)]
struct XmlVolume {
    name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "statusStr", default)]
    status_str: String,
    #[serde(rename = "snapshotCount", default)]
    snapshot_count: String,
    #[serde(rename = "brickCount", default)]
    brick_count: String,
    #[serde(rename = "distCount", default)]
    dist_count: String,
    #[serde(rename = "stripeCount", default)]
    stripe_count: String,
    #[serde(rename = "replicaCount", default)]
    replica_count: String,
    #[serde(rename = "arbiterCount", default)]
    arbiter_count: String,
    #[serde(rename = "disperseCount", default)]
    disperse_count: String,
    #[serde(rename = "redundancyCount", default)]
    redundancy_count: String,
    #[serde(rename = "type", default)]
    vol_type: String,
    #[serde(rename = "typeStr", default)]
    type_str: String,
    #[serde(default)]
    transport: String,
    #[serde(default)]
    bricks: Option<XmlBricks>,
    #[serde(default)]
    options: Option<XmlOptions>,
}

#[derive(Debug, Deserialize)]
struct XmlBricks {
    #[serde(rename = "hotBricks", default)]
    hot_bricks: Option<XmlTier>,
    #[serde(rename = "coldBricks", default)]
    cold_bricks: Option<XmlTier>,
    #[serde(rename = "brick", default)]
    brick: Vec<XmlBrick>,
}

#[derive(Debug, Deserialize)]
struct XmlTier {
    #[serde(rename = "hotBrickType", default)]
    hot_brick_type: Option<String>,
    #[serde(rename = "coldBrickType", default)]
    cold_brick_type: Option<String>,
    #[serde(rename = "numberOfBricks", default)]
    number_of_bricks: Option<String>,
    #[serde(rename = "hotreplicaCount", default)]
    hot_replica_count: Option<String>,
    #[serde(rename = "coldreplicaCount", default)]
    cold_replica_count: Option<String>,
    #[serde(rename = "coldarbiterCount", default)]
    cold_arbiter_count: Option<String>,
    #[serde(rename = "colddisperseCount", default)]
    cold_disperse_count: Option<String>,
    #[serde(rename = "coldredundancyCount", default)]
    cold_redundancy_count: Option<String>,
    #[serde(rename = "brick", default)]
    brick: Vec<XmlBrick>,
}

#[derive(Debug, Deserialize)]
struct XmlBrick {
    #[serde(default)]
    name: String,
    #[serde(rename = "hostUuid", default)]
    host_uuid: String,
    #[serde(rename = "isArbiter", default)]
    is_arbiter: String,
}

#[derive(Debug, Deserialize)]
struct XmlOptions {
    #[serde(rename = "option", default)]
    option: Vec<XmlOption>,
}

#[derive(Debug, Deserialize)]
struct XmlOption {
    name: String,
    #[serde(default)]
    value: String,
}

fn convert_bricks(bricks: Vec<XmlBrick>) -> Vec<BrickEntry> {
    bricks
        .into_iter()
        .filter(|b| !b.name.is_empty())
        .map(|b| BrickEntry {
            name: b.name,
            host_uuid: b.host_uuid,
            is_arbiter: b.is_arbiter.trim() == "1",
        })
        .collect()
}

fn convert_tier(tier: XmlTier) -> TierBricks {
    let unset = || "0".to_string();
    TierBricks {
        brick_type: tier
            .hot_brick_type
            .or(tier.cold_brick_type)
            .unwrap_or_default(),
        number_of_bricks: tier.number_of_bricks.unwrap_or_default(),
        replica_count: tier
            .hot_replica_count
            .or(tier.cold_replica_count)
            .unwrap_or_else(unset),
        arbiter_count: tier.cold_arbiter_count.unwrap_or_else(unset),
        disperse_count: tier.cold_disperse_count.unwrap_or_else(unset),
        redundancy_count: tier.cold_redundancy_count.unwrap_or_else(unset),
        bricks: convert_bricks(tier.brick),
    }
}

/// Parse `gluster volume info --xml`.  Returns `None` when the CLI reported a failure or the
/// output is not the expected XML.
pub fn parse_volume_info_xml(xml: &str) -> Option<BTreeMap<String, VolumeInfo>> {
    let parsed: XmlInfoOutput = match serde_xml_rs::from_str(xml) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to parse volume info xml: {}", e);
            return None;
        }
    };
    if parsed.op_ret.trim() != "0" {
        error!("volume info reported opRet {}", parsed.op_ret.trim());
        return None;
    }
    let mut volumes = BTreeMap::new();
    let xml_volumes = match parsed.vol_info {
        Some(info) => info.volumes.volume,
        None => Vec::new(),
    };
    for vol in xml_volumes {
        let mut layout = BrickLayout::default();
        if let Some(bricks) = vol.bricks {
            layout.bricks = convert_bricks(bricks.brick);
            layout.hot = bricks.hot_bricks.map(convert_tier);
            layout.cold = bricks.cold_bricks.map(convert_tier);
        }
        let options = vol
            .options
            .map(|o| o.option.into_iter().map(|opt| (opt.name, opt.value)).collect())
            .unwrap_or_default();
        volumes.insert(
            vol.name.clone(),
            VolumeInfo {
                name: vol.name,
                id: vol.id,
                status: vol.status,
                status_str: vol.status_str,
                snapshot_count: vol.snapshot_count,
                brick_count: vol.brick_count,
                dist_count: vol.dist_count,
                stripe_count: vol.stripe_count,
                replica_count: vol.replica_count,
                arbiter_count: vol.arbiter_count,
                disperse_count: vol.disperse_count,
                redundancy_count: vol.redundancy_count,
                vol_type: vol.vol_type,
                type_str: vol.type_str,
                transport: vol.transport,
                options,
                bricks: layout,
            },
        );
    }
    Some(volumes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ports {
    pub tcp: String,
    pub rdma: String,
}

/// One brick or daemon line of `volume status`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStatus {
    pub status: String,
    pub pid: String,
    pub port: String,
    pub ports: Ports,
    pub peerid: String,
    pub bricktype: Option<String>,
}

impl EndpointStatus {
    pub fn is_online(&self) -> bool {
        self.status.trim() == "1" && self.pid.trim().parse::<i64>().map(|p| p > 0).unwrap_or(false)
    }
}

/// endpoint (brick path or daemon name) -> status
pub type EndpointMap = BTreeMap<String, EndpointStatus>;
/// node -> endpoints
pub type NodeMap = BTreeMap<String, EndpointMap>;
/// volume -> nodes
pub type VolumeStatus = BTreeMap<String, NodeMap>;

#[derive(Debug, Deserialize)]
struct XmlStatusOutput {
    #[serde(rename = "opRet")]
    op_ret: String,
    #[serde(rename = "volStatus", default)]
    vol_status: Option<XmlVolStatus>,
}

#[derive(Debug, Deserialize)]
struct XmlVolStatus {
    volumes: XmlStatusVolumes,
}

#[derive(Debug, Deserialize)]
struct XmlStatusVolumes {
    #[serde(rename = "volume", default)]
    volume: Vec<XmlStatusVolume>,
}

#[derive(Debug, Deserialize)]
struct XmlStatusVolume {
    #[serde(rename = "volName")]
    vol_name: String,
    #[serde(rename = "node", default)]
    node: Vec<XmlStatusNode>,
}

#[derive(Debug, Deserialize)]
struct XmlStatusNode {
    hostname: String,
    path: String,
    #[serde(default)]
    peerid: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    port: String,
    #[serde(default)]
    ports: Option<XmlPorts>,
    #[serde(default)]
    pid: String,
    #[serde(default)]
    bricktype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(default)]
    tcp: String,
    #[serde(default)]
    rdma: String,
}

/// Parse `gluster volume status --xml`.
///
/// Bricks are keyed `node -> brick path`.  Daemons (NFS Server, Self-heal Daemon, Quota
/// Daemon, ...) report the node in `path` and their own name in `hostname`; they are keyed
/// `node -> daemon name`.  `localhost` is replaced with `mnode`.
pub fn parse_volume_status_xml(xml: &str, mnode: &str) -> Option<VolumeStatus> {
    let parsed: XmlStatusOutput = match serde_xml_rs::from_str(xml) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to parse volume status xml: {}", e);
            return None;
        }
    };
    if parsed.op_ret.trim() != "0" {
        error!("volume status reported opRet {}", parsed.op_ret.trim());
        return None;
    }
    let mut status = VolumeStatus::new();
    let volumes = match parsed.vol_status {
        Some(s) => s.volumes.volume,
        None => Vec::new(),
    };
    for vol in volumes {
        let nodes = status.entry(vol.vol_name).or_insert_with(NodeMap::new);
        for node in vol.node {
            let (host, endpoint) = if node.path.starts_with('/') {
                (node.hostname, node.path)
            } else {
                (node.path, node.hostname)
            };
            let host = if host == "localhost" {
                mnode.to_string()
            } else {
                host
            };
            let ports = node
                .ports
                .map(|p| Ports {
                    tcp: p.tcp,
                    rdma: p.rdma,
                })
                .unwrap_or_default();
            nodes.entry(host).or_insert_with(EndpointMap::new).insert(
                endpoint,
                EndpointStatus {
                    status: node.status,
                    pid: node.pid,
                    port: node.port,
                    ports,
                    peerid: node.peerid,
                    bricktype: node.bricktype,
                },
            );
        }
    }
    Some(status)
}

/// Look up `host:/path` in a parsed status
pub fn brick_status<'a>(
    status: &'a VolumeStatus,
    volname: &str,
    brick: &str,
) -> Option<&'a EndpointStatus> {
    let (host, path) = split_brick(brick)?;
    status.get(volname)?.get(host)?.get(path)
}

/// Split `host:/path` at the first colon
pub fn split_brick(brick: &str) -> Option<(&str, &str)> {
    let idx = brick.find(':')?;
    let (host, path) = (&brick[..idx], &brick[idx + 1..]);
    if host.is_empty() || !path.starts_with('/') {
        return None;
    }
    Some((host, path))
}

/// Parse the text table printed by `gluster volume get <vol> <opt|all>`
pub fn parse_volume_options(output: &str) -> Option<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    let mut seen_header = false;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("Option") && line.contains("Value") {
            seen_header = true;
            continue;
        }
        if line.starts_with('-') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = match parts.next() {
            Some(k) => k,
            None => continue,
        };
        let value: Vec<&str> = parts.collect();
        options.insert(key.to_string(), value.join(" "));
    }
    if !seen_header {
        return None;
    }
    Some(options)
}

/// `gluster volume create`
pub fn volume_create(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    bricks: &[String],
    geometry: &Geometry,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    if bricks.is_empty() {
        return Err(GlusterError::PreconditionViolation(
            "The brick list is empty. Not creating volume".to_string(),
        ));
    }
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("create".to_string());
    arg_list.push(volname.to_string());

    for (translator, value) in geometry.translators() {
        arg_list.push(translator.to_string());
        arg_list.push(value.to_string());
    }
    if let Some(ref transport) = geometry.transport {
        arg_list.push("transport".to_string());
        arg_list.push(transport.clone());
    }
    for brick in bricks {
        arg_list.push(brick.clone());
    }
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

fn simple_volume_op(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    op: &str,
    volname: &str,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push(op.to_string());
    arg_list.push(volname.to_string());
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn volume_start(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    simple_volume_op(executor, mnode, "start", volname, force)
}

pub fn volume_stop(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    simple_volume_op(executor, mnode, "stop", volname, force)
}

pub fn volume_delete(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    simple_volume_op(executor, mnode, "delete", volname, false)
}

/// Reset one option, or every option when `option` is `None`
pub fn volume_reset(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    option: Option<&str>,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("reset".to_string());
    arg_list.push(volname.to_string());
    arg_list.push(option.unwrap_or("all").to_string());
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

/// Sync volume definitions from `hostname`; every volume when `volname` is `None`
pub fn volume_sync(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    hostname: &str,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("sync".to_string());
    arg_list.push(hostname.to_string());
    arg_list.push(volname.unwrap_or("all").to_string());
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn volume_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
) -> Result<CommandOutput, GlusterError> {
    let arg_list = vec!["volume".to_string(), "list".to_string()];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

/// Names of every volume in the pool
pub fn get_volume_list(executor: &dyn RemoteExecutor, mnode: &str) -> Option<Vec<String>> {
    let output = match volume_list(executor, mnode) {
        Ok(o) => o,
        Err(e) => {
            error!("volume list could not be run on {}: {}", mnode, e);
            return None;
        }
    };
    if !output.success() {
        output.log_failure(mnode, "gluster volume list");
        return None;
    }
    if output.stdout.trim().starts_with("No volumes present") {
        return Some(Vec::new());
    }
    Some(
        output
            .stdout
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect(),
    )
}

pub fn volume_exists(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    match get_volume_list(executor, mnode) {
        Some(list) => list.iter().any(|v| v == volname),
        None => false,
    }
}

/// `gluster volume info [vol] --xml`
pub fn volume_info(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("info".to_string());
    if let Some(v) = volname {
        arg_list.push(v.to_string());
    }
    arg_list.push("--xml".to_string());
    run_command(executor, mnode, "gluster", &arg_list, false)
}

/// Parsed volume info for `volname`, or every volume
pub fn get_volume_info(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Option<BTreeMap<String, VolumeInfo>> {
    let output = match volume_info(executor, mnode, volname) {
        Ok(o) => o,
        Err(e) => {
            error!("volume info could not be run on {}: {}", mnode, e);
            return None;
        }
    };
    if !output.success() {
        debug!("Volume info get command failed on {}", mnode);
        output.log_failure(mnode, "gluster volume info");
        return None;
    }
    parse_volume_info_xml(&output.stdout)
}

/// Parsed volume info of a single volume
pub fn get_volume(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> Option<VolumeInfo> {
    get_volume_info(executor, mnode, Some(volname))?.remove(volname)
}

/// `gluster volume status [vol] [service] [options] --xml`
pub fn volume_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
    service: Option<&str>,
    options: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("volume".to_string());
    arg_list.push("status".to_string());
    arg_list.push(volname.unwrap_or("all").to_string());
    if let Some(s) = service {
        arg_list.push(s.to_string());
    }
    if let Some(o) = options {
        arg_list.push(o.to_string());
    }
    arg_list.push("--xml".to_string());
    run_command(executor, mnode, "gluster", &arg_list, false)
}

pub fn get_volume_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
    service: Option<&str>,
) -> Option<VolumeStatus> {
    let output = match volume_status(executor, mnode, volname, service, None) {
        Ok(o) => o,
        Err(e) => {
            error!("volume status could not be run on {}: {}", mnode, e);
            return None;
        }
    };
    if !output.success() {
        output.log_failure(mnode, "gluster volume status");
        return None;
    }
    parse_volume_status_xml(&output.stdout, mnode)
}

/// Apply `options`.  A `group` key names a preset bundle and is applied before the rest.
/// Returns true only when every option was accepted.
pub fn set_volume_options(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    options: &BTreeMap<String, String>,
) -> bool {
    let mut ordered: Vec<(&String, &String)> = Vec::new();
    if let Some((k, v)) = options.get_key_value("group") {
        ordered.push((k, v));
    }
    ordered.extend(options.iter().filter(|(k, _)| k.as_str() != "group"));

    let mut all_ok = true;
    for (key, value) in ordered {
        let arg_list = vec![
            "volume".to_string(),
            "set".to_string(),
            volname.to_string(),
            key.clone(),
            value.clone(),
        ];
        match run_command(executor, mnode, "gluster", &arg_list, true) {
            Ok(ref output) if output.success() => {
                info!("Set {}={} on volume {}", key, value, volname);
            }
            Ok(output) => {
                output.log_failure(mnode, &format!("gluster volume set {} {} {}", volname, key, value));
                all_ok = false;
            }
            Err(e) => {
                error!("volume set {} could not be run on {}: {}", key, mnode, e);
                all_ok = false;
            }
        }
    }
    all_ok
}

pub fn set_volume_option(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    key: &str,
    value: &str,
) -> bool {
    let mut options = BTreeMap::new();
    options.insert(key.to_string(), value.to_string());
    set_volume_options(executor, mnode, volname, &options)
}

/// `gluster volume get <vol> <option|all>` as a flat map
pub fn get_volume_options(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    option: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    let arg_list = vec![
        "volume".to_string(),
        "get".to_string(),
        volname.to_string(),
        option.unwrap_or("all").to_string(),
    ];
    let output = match run_command(executor, mnode, "gluster", &arg_list, false) {
        Ok(o) => o,
        Err(e) => {
            error!("volume get could not be run on {}: {}", mnode, e);
            return None;
        }
    };
    if !output.success() {
        output.log_failure(mnode, "gluster volume get");
        return None;
    }
    parse_volume_options(&output.stdout)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const VOLUME_INFO_2X3: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <volInfo>
    <volumes>
      <volume>
        <name>v1</name>
        <id>3f2b8c1e-55a2-4f43-9a36-1a4a3c1f0e11</id>
        <status>1</status>
        <statusStr>Started</statusStr>
        <snapshotCount>0</snapshotCount>
        <brickCount>6</brickCount>
        <distCount>3</distCount>
        <stripeCount>1</stripeCount>
        <replicaCount>3</replicaCount>
        <arbiterCount>0</arbiterCount>
        <disperseCount>0</disperseCount>
        <redundancyCount>0</redundancyCount>
        <type>7</type>
        <typeStr>Distributed-Replicate</typeStr>
        <transport>0</transport>
        <bricks>
          <brick uuid="a1">srv1:/bricks/brick0/v1_brick0<name>srv1:/bricks/brick0/v1_brick0</name><hostUuid>a1</hostUuid><isArbiter>0</isArbiter></brick>
          <brick uuid="a2">srv2:/bricks/brick0/v1_brick1<name>srv2:/bricks/brick0/v1_brick1</name><hostUuid>a2</hostUuid><isArbiter>0</isArbiter></brick>
          <brick uuid="a3">srv3:/bricks/brick0/v1_brick2<name>srv3:/bricks/brick0/v1_brick2</name><hostUuid>a3</hostUuid><isArbiter>0</isArbiter></brick>
          <brick uuid="a4">srv4:/bricks/brick0/v1_brick3<name>srv4:/bricks/brick0/v1_brick3</name><hostUuid>a4</hostUuid><isArbiter>0</isArbiter></brick>
          <brick uuid="a5">srv5:/bricks/brick0/v1_brick4<name>srv5:/bricks/brick0/v1_brick4</name><hostUuid>a5</hostUuid><isArbiter>0</isArbiter></brick>
          <brick uuid="a6">srv6:/bricks/brick0/v1_brick5<name>srv6:/bricks/brick0/v1_brick5</name><hostUuid>a6</hostUuid><isArbiter>0</isArbiter></brick>
        </bricks>
        <optCount>2</optCount>
        <options>
          <option>
            <name>cluster.quorum-type</name>
            <value>auto</value>
          </option>
          <option>
            <name>transport.address-family</name>
            <value>inet</value>
          </option>
        </options>
      </volume>
      <count>1</count>
    </volumes>
  </volInfo>
</cliOutput>"#;

    const VOLUME_STATUS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <volStatus>
    <volumes>
      <volume>
        <volName>v1</volName>
        <nodeCount>3</nodeCount>
        <node>
          <hostname>srv1</hostname>
          <path>/bricks/brick0/v1_brick0</path>
          <peerid>a1</peerid>
          <status>1</status>
          <port>49152</port>
          <ports>
            <tcp>49152</tcp>
            <rdma>N/A</rdma>
          </ports>
          <pid>2211</pid>
        </node>
        <node>
          <hostname>srv2</hostname>
          <path>/bricks/brick0/v1_brick1</path>
          <peerid>a2</peerid>
          <status>0</status>
          <port>N/A</port>
          <ports>
            <tcp>N/A</tcp>
            <rdma>N/A</rdma>
          </ports>
          <pid>-1</pid>
        </node>
        <node>
          <hostname>Self-heal Daemon</hostname>
          <path>localhost</path>
          <peerid>a1</peerid>
          <status>1</status>
          <port>N/A</port>
          <ports>
            <tcp>N/A</tcp>
            <rdma>N/A</rdma>
          </ports>
          <pid>2300</pid>
        </node>
        <tasks/>
      </volume>
    </volumes>
  </volStatus>
</cliOutput>"#;

    #[test]
    fn test_parse_volume_info() {
        let info = parse_volume_info_xml(VOLUME_INFO_2X3).unwrap();
        let v1 = &info["v1"];
        assert_eq!(v1.replica_count, "3");
        assert_eq!(v1.brick_count, "6");
        assert_eq!(v1.status_str, "Started");
        assert_eq!(v1.volume_type(), VolumeType::DistributedAndReplicate);
        assert_eq!(v1.bricks.bricks.len(), 6);
        assert_eq!(v1.bricks.bricks[0].name, "srv1:/bricks/brick0/v1_brick0");
        assert!(!v1.bricks.bricks[0].is_arbiter);
        assert_eq!(v1.options["cluster.quorum-type"], "auto");
        assert!(!v1.is_tiered());
        assert_eq!(v1.all_bricks().len(), 6);
    }

    #[test]
    fn test_parse_volume_info_failure() {
        let failed = r#"<cliOutput><opRet>-1</opRet><opErrno>30800</opErrno><opErrstr>Volume v9 does not exist</opErrstr></cliOutput>"#;
        assert!(parse_volume_info_xml(failed).is_none());
        assert!(parse_volume_info_xml("Connection failed. Please check if gluster daemon is operational.").is_none());
    }

    #[test]
    fn test_parse_volume_status() {
        let status = parse_volume_status_xml(VOLUME_STATUS, "srv1").unwrap();
        let brick0 = brick_status(&status, "v1", "srv1:/bricks/brick0/v1_brick0").unwrap();
        assert!(brick0.is_online());
        assert_eq!(brick0.ports.tcp, "49152");
        let brick1 = brick_status(&status, "v1", "srv2:/bricks/brick0/v1_brick1").unwrap();
        assert!(!brick1.is_online());
        let shd = &status["v1"]["srv1"]["Self-heal Daemon"];
        assert_eq!(shd.pid, "2300");
        assert!(brick_status(&status, "v1", "srv3:/nope").is_none());
    }

    #[test]
    fn test_parse_volume_options() {
        let output = "Option                                  Value                                   \n\
                      ------                                  -----                                   \n\
                      cluster.lookup-unhashed                 on                                      \n\
                      cluster.quorum-type                     auto                                    \n\
                      diagnostics.client-log-format           with-msg-id                             \n\
                      performance.cache-size                  32MB\n";
        let options = parse_volume_options(output).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options["cluster.quorum-type"], "auto");
        assert_eq!(options["performance.cache-size"], "32MB");
        assert!(parse_volume_options("volume get option failed").is_none());
    }

    #[test]
    fn test_geometry() {
        let g = Geometry::distributed_replicated(2, 3);
        assert_eq!(g.brick_count().unwrap(), 6);
        assert_eq!(g.translators(), vec![(VolumeTranslator::Replica, 3)]);
        let a = Geometry::arbiter(2, 3, 1);
        assert_eq!(a.kind, "distributed-arbiter");
        assert_eq!(a.brick_count().unwrap(), 6);
        assert_eq!(
            a.translators(),
            vec![(VolumeTranslator::Replica, 3), (VolumeTranslator::Arbiter, 1)]
        );
        let d = Geometry::dispersed(1, 6, 2);
        assert_eq!(d.brick_count().unwrap(), 6);
        assert_eq!(d.subvol_size(), 6);
        assert_eq!(Geometry::distributed(4).brick_count().unwrap(), 4);
        assert!(Geometry::replicated(0).brick_count().is_err());
    }

    #[test]
    fn test_split_brick() {
        assert_eq!(
            split_brick("srv1:/bricks/b0"),
            Some(("srv1", "/bricks/b0"))
        );
        assert_eq!(split_brick("srv1/bricks"), None);
        assert_eq!(split_brick(":/bricks"), None);
    }
}
