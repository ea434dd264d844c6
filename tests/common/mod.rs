#![allow(dead_code)]

use gluster_harness::inventory::Inventory;
use gluster_harness::mock::MockExecutor;
use gluster_harness::mount::{Mount, Protocol};
use gluster_harness::CommandOutput;

pub const NO_VOLUMES: &str =
    "<cliOutput><opRet>0</opRet><volInfo><volumes><count>0</count></volumes></volInfo></cliOutput>";

pub const NO_SNAPS: &str =
    "<cliOutput><opRet>0</opRet><snapList><count>0</count></snapList></cliOutput>";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn servers(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("srv{}", i)).collect()
}

/// `n` servers with their bricks under `/bricks`, plus `cli1`
pub fn inventory(n: usize) -> Inventory {
    let info: Vec<String> = servers(n)
        .iter()
        .map(|s| format!(r#""{}": {{"brick_root": "/bricks"}}"#, s))
        .collect();
    let json = format!(
        r#"{{"servers": {:?}, "clients": ["cli1"], "servers_info": {{{}}}}}"#,
        servers(n),
        info.join(", ")
    );
    Inventory::from_json(&json).unwrap()
}

/// `/proc/mounts` of a server with `count` brick filesystems
pub fn brick_mounts(count: usize) -> String {
    (0..count)
        .map(|i| format!("/dev/mapper/vg_bricks-brick{i} /bricks/brick{i} xfs rw,noatime 0 0\n", i = i))
        .collect()
}

/// `srvN:/bricks/brick<dir>/<vol>_brick<N>` for bricks `start..start + count`, one per server
/// round robin
pub fn brick_names(volname: &str, servers: usize, start: usize, count: usize) -> Vec<String> {
    (start..start + count)
        .map(|i| {
            format!(
                "srv{}:/bricks/brick{}/{}_brick{}",
                i % servers + 1,
                i / servers,
                volname,
                i
            )
        })
        .collect()
}

pub fn volume_info_xml(
    volname: &str,
    type_str: &str,
    replica: usize,
    bricks: &[String],
    options: &[(&str, &str)],
) -> String {
    let brick_xml: String = bricks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            format!(
                "<brick><name>{}</name><hostUuid>u{}</hostUuid><isArbiter>0</isArbiter></brick>",
                b, i
            )
        })
        .collect();
    let option_xml: String = options
        .iter()
        .map(|(k, v)| format!("<option><name>{}</name><value>{}</value></option>", k, v))
        .collect();
    format!(
        "<cliOutput><opRet>0</opRet><opErrno>0</opErrno><volInfo><volumes><volume>\
         <name>{name}</name><id>0b7c3f5e-4f36-4e0c-9a57-1e1c2f3a4b5c</id><status>1</status>\
         <statusStr>Started</statusStr><snapshotCount>0</snapshotCount>\
         <brickCount>{count}</brickCount><distCount>{dist}</distCount>\
         <replicaCount>{replica}</replicaCount><arbiterCount>0</arbiterCount>\
         <disperseCount>0</disperseCount><redundancyCount>0</redundancyCount>\
         <type>7</type><typeStr>{type_str}</typeStr><transport>0</transport>\
         <bricks>{bricks}</bricks><optCount>{opt_count}</optCount><options>{options}</options>\
         </volume><count>1</count></volumes></volInfo></cliOutput>",
        name = volname,
        count = bricks.len(),
        dist = bricks.len() / replica.max(1),
        replica = replica,
        type_str = type_str,
        bricks = brick_xml,
        opt_count = options.len(),
        options = option_xml
    )
}

/// Volume status with a brick process per entry.  A pid of 0 marks the brick offline.
pub fn volume_status_xml(volname: &str, bricks: &[(String, u32)]) -> String {
    let nodes: String = bricks
        .iter()
        .enumerate()
        .map(|(i, (brick, pid))| {
            let mut parts = brick.splitn(2, ':');
            let host = parts.next().unwrap_or_default();
            let path = parts.next().unwrap_or_default();
            let (status, port, pid) = if *pid > 0 {
                ("1", format!("{}", 49152 + i), pid.to_string())
            } else {
                ("0", "N/A".to_string(), "-1".to_string())
            };
            format!(
                "<node><hostname>{}</hostname><path>{}</path><peerid>p{}</peerid>\
                 <status>{}</status><port>{}</port><pid>{}</pid></node>",
                host, path, i, status, port, pid
            )
        })
        .collect();
    format!(
        "<cliOutput><opRet>0</opRet><volStatus><volumes><volume><volName>{}</volName>{}\
         </volume></volumes></volStatus></cliOutput>",
        volname, nodes
    )
}

/// Every brick online with a distinct pid
pub fn all_online(bricks: &[String]) -> Vec<(String, u32)> {
    bricks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.clone(), 2000 + i as u32))
        .collect()
}

pub fn heal_info_xml(bricks: &[String], pending: usize) -> String {
    let entries: String = bricks
        .iter()
        .map(|b| {
            format!(
                "<brick hostUuid=\"u\"><name>{}</name><status>Connected</status>\
                 <numberOfEntries>{}</numberOfEntries></brick>",
                b, pending
            )
        })
        .collect();
    format!(
        "<cliOutput><healInfo><bricks>{}</bricks></healInfo><opRet>0</opRet></cliOutput>",
        entries
    )
}

pub fn rebalance_xml(status_str: &str) -> String {
    let status = if status_str == "completed" { 3 } else { 1 };
    let node = |name: &str| {
        format!(
            "<node><nodeName>{}</nodeName><id>x</id><files>10</files><size>1024</size>\
             <lookups>20</lookups><failures>0</failures><skipped>0</skipped>\
             <status>{}</status><statusStr>{}</statusStr><runtime>1.00</runtime></node>",
            name, status, status_str
        )
    };
    format!(
        "<cliOutput><opRet>0</opRet><volRebalance><nodeCount>2</nodeCount>{}{}\
         <aggregate><files>20</files><size>2048</size><lookups>40</lookups><failures>0</failures>\
         <skipped>0</skipped><status>{}</status><statusStr>{}</statusStr><runtime>1.00</runtime>\
         </aggregate></volRebalance></cliOutput>",
        node("localhost"),
        node("srv2"),
        status,
        status_str
    )
}

/// Client volfile of a distributed-replicated volume with `subvols`
pub fn client_volfile(volname: &str, subvols: &[Vec<String>]) -> String {
    let mut text = String::new();
    let mut client = 0;
    let mut replicas = Vec::new();
    for (idx, subvol) in subvols.iter().enumerate() {
        let mut children = Vec::new();
        for brick in subvol {
            let mut parts = brick.splitn(2, ':');
            let host = parts.next().unwrap_or_default();
            let path = parts.next().unwrap_or_default();
            text.push_str(&format!(
                "volume {v}-client-{c}\n    type protocol/client\n    option remote-host {h}\n    \
                 option remote-subvolume {p}\nend-volume\n\n",
                v = volname,
                c = client,
                h = host,
                p = path
            ));
            children.push(format!("{}-client-{}", volname, client));
            client += 1;
        }
        text.push_str(&format!(
            "volume {v}-replicate-{i}\n    type cluster/replicate\n    subvolumes {s}\nend-volume\n\n",
            v = volname,
            i = idx,
            s = children.join(" ")
        ));
        replicas.push(format!("{}-replicate-{}", volname, idx));
    }
    text.push_str(&format!(
        "volume {v}-dht\n    type cluster/distribute\n    subvolumes {s}\nend-volume\n",
        v = volname,
        s = replicas.join(" ")
    ));
    text
}

/// `getfattr` output for a directory whose layout on this brick is `start..=stop`
pub fn layout_getfattr(path: &str, start: u32, stop: u32) -> String {
    format!(
        "# file: {}\ntrusted.glusterfs.dht=0x0000000100000000{:08x}{:08x}\n",
        path, start, stop
    )
}

/// Hex encoding of a NUL terminated xattr text value
pub fn hex_text(value: &str) -> String {
    let mut hex = String::from("0x");
    for b in value.bytes() {
        hex.push_str(&format!("{:02x}", b));
    }
    hex.push_str("00");
    hex
}

/// A cluster without volumes whose servers each have `bricks` free brick filesystems
pub fn empty_cluster(bricks: usize) -> MockExecutor {
    let mock = MockExecutor::new();
    mock.on("gluster volume info --xml", CommandOutput::ok(NO_VOLUMES));
    mock.on("cat /proc/mounts", CommandOutput::ok(&brick_mounts(bricks)));
    mock.on("gluster snapshot list", CommandOutput::ok(NO_SNAPS));
    mock
}

pub fn fuse_mount(client: &str, volname: &str) -> Mount {
    Mount {
        client: client.to_string(),
        mountpoint: format!("/mnt/{}", volname),
        server: "srv1".to_string(),
        volname: volname.to_string(),
        protocol: Protocol::Glusterfs,
        options: None,
    }
}
