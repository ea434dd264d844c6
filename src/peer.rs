use std::cmp::Ord;
use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use uuid::Uuid;

use crate::executor::{CommandOutput, RemoteExecutor};
use crate::{run_command, GlusterError};

/// Peer membership or connection state as glusterd prints it
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum State {
    Connected,
    Disconnected,
    Unknown,

    EstablishingConnection,
    ProbeSentToPeer,
    ProbeReceivedFromPeer,
    PeerInCluster,
    AcceptedPeerRequest,
    SentAndReceivedPeerRequest,
    PeerRejected,
    PeerDetachInProgress,
    ConnectedToPeer,
    PeerIsConnectedAndAccepted,
    InvalidState,
}

impl State {
    pub fn new(name: &str) -> State {
        match name.trim().to_ascii_lowercase().as_ref() {
            "connected" => State::Connected,
            "disconnected" => State::Disconnected,
            "establishing connection" => State::EstablishingConnection,
            "probe sent to peer" => State::ProbeSentToPeer,
            "probe received from peer" => State::ProbeReceivedFromPeer,
            "peer in cluster" => State::PeerInCluster,
            "accepted peer request" => State::AcceptedPeerRequest,
            "sent and received peer request" => State::SentAndReceivedPeerRequest,
            "peer rejected" => State::PeerRejected,
            "peer detach in progress" => State::PeerDetachInProgress,
            "connected to peer" => State::ConnectedToPeer,
            "peer is connected and accepted" => State::PeerIsConnectedAndAccepted,
            "invalid state" => State::InvalidState,
            _ => State::Unknown,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            State::Connected => "Connected",
            State::Disconnected => "Disconnected",
            State::Unknown => "Unknown",
            State::EstablishingConnection => "Establishing Connection",
            State::ProbeSentToPeer => "Probe Sent to Peer",
            State::ProbeReceivedFromPeer => "Probe Received from Peer",
            State::PeerInCluster => "Peer in Cluster",
            State::AcceptedPeerRequest => "Accepted peer request",
            State::SentAndReceivedPeerRequest => "Sent and Received peer request",
            State::PeerRejected => "Peer Rejected",
            State::PeerDetachInProgress => "Peer detach in progress",
            State::ConnectedToPeer => "Connected to Peer",
            State::PeerIsConnectedAndAccepted => "Peer is connected and Accepted",
            State::InvalidState => "Invalid State",
        };
        write!(f, "{}", s)
    }
}

/// One member of the trusted storage pool
#[derive(Clone, Eq, PartialEq)]
pub struct Peer {
    pub uuid: Uuid,
    /// The hostname as glusterd knows it.  `pool list` reports the local node as `localhost`.
    pub hostname: String,
    /// Membership state, e.g. `Peer in Cluster`
    pub status: State,
    /// `Connected` or `Disconnected`
    pub connection: State,
}

impl Peer {
    pub fn is_connected(&self) -> bool {
        self.connection == State::Connected
    }
}

impl Ord for Peer {
    fn cmp(&self, other: &Peer) -> Ordering {
        self.uuid.cmp(&other.uuid)
    }
}
impl PartialOrd for Peer {
    fn partial_cmp(&self, other: &Peer) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "UUID: {} Hostname: {} Status: {} ({})",
            self.uuid.to_hyphenated(),
            self.hostname,
            self.status,
            self.connection
        )
    }
}

/// Parse the text printed by `gluster peer status`:
///
/// ```text
/// Number of Peers: 1
///
/// Hostname: srv2
/// Uuid: afbd338e-881b-4557-8764-52e259885ca3
/// State: Peer in Cluster (Connected)
/// Other names:
/// 10.0.3.208
/// ```
pub fn parse_peer_status(output: &str) -> Result<Vec<Peer>, GlusterError> {
    let mut peers: Vec<Peer> = Vec::new();

    let regex_str = r#"Hostname:\s+(?P<hostname>[a-zA-Z0-9.:_-]+)\s+
Uuid:\s+(?P<uuid>\w+-\w+-\w+-\w+-\w+)\s+
State:\s+(?P<state_detail>[a-zA-Z ]+?)\s+\((?P<state>\w+)\)"#;
    let peer_regex = Regex::new(&regex_str.replace("\n", ""))?;
    for cap in peer_regex.captures_iter(output) {
        let hostname = cap
            .name("hostname")
            .ok_or_else(|| GlusterError::ParseError(format!("Invalid hostname for peer: {}", output)))?;
        let uuid = cap
            .name("uuid")
            .ok_or_else(|| GlusterError::ParseError(format!("Invalid uuid for peer: {}", output)))?;
        let uuid_parsed = Uuid::parse_str(uuid.as_str())?;
        let state_details = cap
            .name("state_detail")
            .ok_or_else(|| GlusterError::ParseError(format!("Invalid state for peer: {}", output)))?;
        let state = cap
            .name("state")
            .ok_or_else(|| GlusterError::ParseError(format!("Invalid state for peer: {}", output)))?;

        peers.push(Peer {
            uuid: uuid_parsed,
            hostname: hostname.as_str().to_string(),
            status: State::new(state_details.as_str()),
            connection: State::new(state.as_str()),
        });
    }
    Ok(peers)
}

/// Parse the tab separated table printed by `gluster pool list`
pub fn parse_pool_list(output: &str) -> Result<Vec<Peer>, GlusterError> {
    let mut peers: Vec<Peer> = Vec::new();
    for line in output.lines() {
        if line.contains("State") || line.trim().is_empty() {
            continue;
        }
        let v: Vec<&str> = line.split_whitespace().collect();
        if v.len() < 3 {
            return Err(GlusterError::ParseError(format!(
                "Unexpected pool list line: {}",
                line
            )));
        }
        let uuid = Uuid::parse_str(v[0])?;
        let hostname = v[1].trim().to_string();
        debug!("hostname from pool list command is {:?}", &hostname);
        peers.push(Peer {
            uuid,
            hostname,
            status: State::PeerInCluster,
            connection: State::new(v[2]),
        });
    }
    Ok(peers)
}

/// Runs gluster peer status on `mnode` and returns every other peer of the pool
pub fn peer_status(executor: &dyn RemoteExecutor, mnode: &str) -> Result<Vec<Peer>, GlusterError> {
    let arg_list = vec!["peer".to_string(), "status".to_string()];
    let output = run_command(executor, mnode, "gluster", &arg_list, false)?
        .checked(mnode, "gluster peer status")?;
    parse_peer_status(&output.stdout)
}

/// Runs gluster pool list.  Unlike peer_status() this includes `mnode` itself, as
/// `localhost`.
pub fn pool_list(executor: &dyn RemoteExecutor, mnode: &str) -> Result<Vec<Peer>, GlusterError> {
    let arg_list = vec!["pool".to_string(), "list".to_string()];
    let output = run_command(executor, mnode, "gluster", &arg_list, false)?
        .checked(mnode, "gluster pool list")?;
    parse_pool_list(&output.stdout)
}

/// Adds `hostname` to the pool.  Probing a host that is already a member is a no-op.
pub fn peer_probe(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    hostname: &str,
) -> Result<CommandOutput, GlusterError> {
    if hostname == mnode {
        return Ok(CommandOutput::ok("peer probe: Probe on localhost not needed"));
    }
    let current_peers = pool_list(executor, mnode)?;
    if current_peers.iter().any(|p| p.hostname == hostname) {
        debug!("{} is already part of the pool", hostname);
        return Ok(CommandOutput::ok(&format!(
            "peer probe: Host {} port 24007 already in peer list",
            hostname
        )));
    }
    let arg_list = vec![
        "peer".to_string(),
        "probe".to_string(),
        hostname.to_string(),
    ];
    run_command(executor, mnode, "gluster", &arg_list, true)
}

pub fn peer_detach(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    hostname: &str,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list = vec!["peer".to_string(), "detach".to_string(), hostname.to_string()];
    if force {
        arg_list.push("force".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, true)
}

/// Probe every server from `mnode`.  Stops at the first failure.
pub fn peer_probe_servers(executor: &dyn RemoteExecutor, mnode: &str, servers: &[String]) -> bool {
    for server in servers {
        match peer_probe(executor, mnode, server) {
            Ok(ref output) if output.success() => info!("Probed {} from {}", server, mnode),
            Ok(output) => {
                output.log_failure(mnode, &format!("gluster peer probe {}", server));
                return false;
            }
            Err(e) => {
                error!("peer probe {} could not be run on {}: {}", server, mnode, e);
                return false;
            }
        }
    }
    true
}

/// True when every server in `servers` other than `mnode` is a connected member of the pool
pub fn is_peer_connected(executor: &dyn RemoteExecutor, mnode: &str, servers: &[String]) -> bool {
    let peers = match pool_list(executor, mnode) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to get the pool list from {}: {}", mnode, e);
            return false;
        }
    };
    for server in servers.iter().filter(|s| s.as_str() != mnode) {
        match peers.iter().find(|p| &p.hostname == server) {
            Some(peer) if peer.is_connected() => {}
            Some(peer) => {
                error!("Peer {} is {} as seen from {}", server, peer.connection, mnode);
                return false;
            }
            None => {
                error!("{} is not part of the pool of {}", server, mnode);
                return false;
            }
        }
    }
    info!("All of {:?} are connected to {}", servers, mnode);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;

    #[test]
    fn test_parse_peer_status() {
        let output = "Number of Peers: 3\n\n\
                      Hostname: srv2\nUuid: 1d6a4a30-5f0e-4c5b-9e47-3f0a8e2b7c11\n\
                      State: Peer in Cluster (Connected)\n\n\
                      Hostname: srv3\nUuid: 7c2e9f14-0b3d-4a8e-8d61-52a4c9e0f3b2\n\
                      State: Peer in Cluster (Connected)\n\n\
                      Hostname: srv4\nUuid: c3f8b6d2-94e1-4f27-a0c5-6e1d2b7a8f93\n\
                      State: Peer Rejected (Disconnected)\n";
        let peers = parse_peer_status(output).unwrap();
        let summary: Vec<(&str, State, bool)> = peers
            .iter()
            .map(|p| (p.hostname.as_str(), p.status, p.is_connected()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("srv2", State::PeerInCluster, true),
                ("srv3", State::PeerInCluster, true),
                ("srv4", State::PeerRejected, false),
            ]
        );
        assert_eq!(
            peers[2].uuid,
            Uuid::parse_str("c3f8b6d2-94e1-4f27-a0c5-6e1d2b7a8f93").unwrap()
        );
        assert!(parse_peer_status("Number of Peers: 0\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_peer_status_other_names() {
        let output = "Number of Peers: 1\n\nHostname: gluster-srv-2\nUuid: 5f45e89a-23c1-41dd-b0cd-fd9cf37f1520\nState: Peer in Cluster (Connected)\nOther names:\n10.0.3.208\n";
        let peers = parse_peer_status(output).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].hostname, "gluster-srv-2");
        assert!(peers[0].is_connected());
    }

    #[test]
    fn test_parse_pool_list() {
        let output = "UUID\t\t\t\t\tHostname \tState\n\
                      afbd338e-881b-4557-8764-52e259885ca3\tsrv2     \tConnected \n\
                      fa3b031a-c4ef-43c5-892d-4b909bc5cd5d\tlocalhost\tConnected \n";
        let peers = parse_pool_list(output).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].hostname, "srv2");
        assert_eq!(peers[1].hostname, "localhost");
        assert!(parse_pool_list("garbage line").is_err());
    }

    #[test]
    fn test_peer_probe_skips_members() {
        let mock = MockExecutor::new();
        mock.on(
            "gluster pool list",
            CommandOutput::ok(
                "UUID\tHostname\tState\nafbd338e-881b-4557-8764-52e259885ca3\tsrv2\tConnected\n",
            ),
        );
        assert!(peer_probe(&mock, "srv1", "srv2").unwrap().success());
        assert_eq!(mock.count("peer probe"), 0);
        assert!(peer_probe(&mock, "srv1", "srv3").unwrap().success());
        assert_eq!(mock.count("gluster peer probe srv3 --mode=script"), 1);
        assert!(is_peer_connected(
            &mock,
            "srv1",
            &["srv1".to_string(), "srv2".to_string()]
        ));
        assert!(!is_peer_connected(&mock, "srv1", &["srv3".to_string()]));
    }
}
