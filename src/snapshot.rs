//! Snapshot lifecycle and the parsers for `gluster snapshot {list,info,status,config} --xml`.
use std::collections::BTreeMap;

use crate::executor::{CommandOutput, RemoteExecutor};
use crate::volume::{volume_start, volume_stop};
use crate::{run_command, stdout_of, succeeded, GlusterError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginVolume {
    pub name: String,
    pub snap_count: String,
    pub snap_remaining: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapVolume {
    pub name: String,
    /// `Started` or `Stopped`
    pub status: String,
    pub origin_volume: Option<OriginVolume>,
}

/// One snapshot out of `gluster snapshot info`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapInfo {
    pub name: String,
    pub snapshot_id: String,
    pub create_time: String,
    pub description: String,
    pub snap_volume: SnapVolume,
}

impl SnapInfo {
    pub fn is_activated(&self) -> bool {
        self.snap_volume.status.trim() == "Started"
    }

    pub fn origin(&self) -> Option<&str> {
        self.snap_volume
            .origin_volume
            .as_ref()
            .map(|o| o.name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapBrickStatus {
    pub path: String,
    pub volume_group: String,
    pub brick_running: String,
    /// `N/A` when the brick is not running
    pub pid: String,
    pub data_percentage: String,
    pub lv_size: String,
}

impl SnapBrickStatus {
    pub fn has_pid(&self) -> bool {
        self.pid.trim().parse::<u32>().map(|p| p > 0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapVolumeStatus {
    pub brick_count: String,
    pub bricks: Vec<SnapBrickStatus>,
}

/// One snapshot out of `gluster snapshot status`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapStatus {
    pub name: String,
    pub uuid: String,
    pub vol_count: String,
    pub volumes: Vec<SnapVolumeStatus>,
}

impl SnapStatus {
    pub fn bricks(&self) -> impl Iterator<Item = &SnapBrickStatus> {
        self.volumes.iter().flat_map(|v| v.bricks.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSnapConfig {
    pub hard_limit: String,
    pub soft_limit: String,
    pub auto_delete: String,
    pub activate_on_create: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSnapConfig {
    pub name: String,
    pub hard_limit: String,
    pub effective_hard_limit: String,
    pub soft_limit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapConfig {
    pub system: SystemSnapConfig,
    pub volumes: Vec<VolumeSnapConfig>,
}

impl SnapConfig {
    pub fn activate_on_create(&self) -> bool {
        self.system.activate_on_create.trim() == "enable"
    }
}

#[derive(Debug, Deserialize)]
struct XmlSnapOutput {
    #[serde(rename = "opRet")]
    op_ret: String,
    #[serde(rename = "snapList", default)]
    snap_list: Option<XmlSnapList>,
    #[serde(rename = "snapInfo", default)]
    snap_info: Option<XmlSnapInfo>,
    #[serde(rename = "snapStatus", default)]
    snap_status: Option<XmlSnapStatus>,
    #[serde(rename = "snapConfig", default)]
    snap_config: Option<XmlSnapConfig>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapList {
    #[serde(rename = "snapshot", default)]
    snapshot: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapInfo {
    #[serde(default)]
    snapshots: Option<XmlSnapInfoList>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapInfoList {
    #[serde(rename = "snapshot", default)]
    snapshot: Vec<XmlSnapInfoEntry>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapInfoEntry {
    name: String,
    #[serde(rename = "snapshotId", default)]
    snapshot_id: String,
    #[serde(rename = "createTime", default)]
    create_time: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "snapVolume", default)]
    snap_volume: Option<XmlSnapVolume>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapVolume {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "originVolume", default)]
    origin_volume: Option<XmlOriginVolume>,
}

#[derive(Debug, Deserialize)]
struct XmlOriginVolume {
    #[serde(default)]
    name: String,
    #[serde(rename = "snapCount", default)]
    snap_count: String,
    #[serde(rename = "snapRemaining", default)]
    snap_remaining: String,
}

#[derive(Debug, Deserialize)]
struct XmlSnapStatus {
    #[serde(default)]
    snapshots: Option<XmlSnapStatusList>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapStatusList {
    #[serde(rename = "snapshot", default)]
    snapshot: Vec<XmlSnapStatusEntry>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapStatusEntry {
    name: String,
    #[serde(default)]
    uuid: String,
    #[serde(rename = "volCount", default)]
    vol_count: String,
    #[serde(rename = "volume", default)]
    volume: Vec<XmlSnapStatusVolume>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapStatusVolume {
    #[serde(rename = "brickCount", default)]
    brick_count: String,
    #[serde(rename = "brick", default)]
    brick: Vec<XmlSnapBrick>,
}

#[derive(Debug, Deserialize)]
struct XmlSnapBrick {
    #[serde(default)]
    path: String,
    #[serde(rename = "volumeGroup", default)]
    volume_group: String,
    #[serde(default)]
    brick_running: String,
    #[serde(default)]
    pid: String,
    #[serde(default)]
    data_percentage: String,
    #[serde(rename = "lvSize", default)]
    lv_size: String,
}

#[derive(Debug, Deserialize)]
struct XmlSnapConfig {
    #[serde(rename = "systemConfig", default)]
    system_config: Option<XmlSystemConfig>,
    #[serde(rename = "volumeConfig", default)]
    volume_config: Option<XmlVolumeConfigList>,
}

#[derive(Debug, Deserialize)]
struct XmlSystemConfig {
    #[serde(rename = "hardLimit", default)]
    hard_limit: String,
    #[serde(rename = "softLimit", default)]
    soft_limit: String,
    #[serde(rename = "autoDelete", default)]
    auto_delete: String,
    #[serde(rename = "activateOnCreate", default)]
    activate_on_create: String,
}

#[derive(Debug, Deserialize)]
struct XmlVolumeConfigList {
    #[serde(rename = "volume", default)]
    volume: Vec<XmlVolumeConfig>,
}

#[derive(Debug, Deserialize)]
struct XmlVolumeConfig {
    #[serde(default)]
    name: String,
    #[serde(rename = "hardLimit", default)]
    hard_limit: String,
    #[serde(rename = "effectiveHardLimit", default)]
    effective_hard_limit: String,
    #[serde(rename = "softLimit", default)]
    soft_limit: String,
}

fn parse_snap_xml(xml: &str, what: &str) -> Option<XmlSnapOutput> {
    let parsed: XmlSnapOutput = match serde_xml_rs::from_str(xml) {
        Ok(p) => p,
        Err(e) => {
            error!("Unable to parse snapshot {} xml: {}", what, e);
            return None;
        }
    };
    if parsed.op_ret.trim() != "0" {
        error!("snapshot {} reported opRet {}", what, parsed.op_ret.trim());
        return None;
    }
    Some(parsed)
}

/// Snapshot names out of `gluster snapshot list --xml`
pub fn parse_snap_list_xml(xml: &str) -> Option<Vec<String>> {
    let parsed = parse_snap_xml(xml, "list")?;
    Some(
        parsed
            .snap_list
            .map(|l| l.snapshot.into_iter().map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
    )
}

pub fn parse_snap_info_xml(xml: &str) -> Option<Vec<SnapInfo>> {
    let parsed = parse_snap_xml(xml, "info")?;
    let entries = match parsed.snap_info.and_then(|i| i.snapshots) {
        Some(list) => list.snapshot,
        None => Vec::new(),
    };
    Some(
        entries
            .into_iter()
            .map(|s| SnapInfo {
                name: s.name,
                snapshot_id: s.snapshot_id,
                create_time: s.create_time,
                description: s.description,
                snap_volume: s
                    .snap_volume
                    .map(|v| SnapVolume {
                        name: v.name,
                        status: v.status,
                        origin_volume: v.origin_volume.map(|o| OriginVolume {
                            name: o.name,
                            snap_count: o.snap_count,
                            snap_remaining: o.snap_remaining,
                        }),
                    })
                    .unwrap_or_default(),
            })
            .collect(),
    )
}

pub fn parse_snap_status_xml(xml: &str) -> Option<Vec<SnapStatus>> {
    let parsed = parse_snap_xml(xml, "status")?;
    let entries = match parsed.snap_status.and_then(|s| s.snapshots) {
        Some(list) => list.snapshot,
        None => Vec::new(),
    };
    Some(
        entries
            .into_iter()
            .map(|s| SnapStatus {
                name: s.name,
                uuid: s.uuid,
                vol_count: s.vol_count,
                volumes: s
                    .volume
                    .into_iter()
                    .map(|v| SnapVolumeStatus {
                        brick_count: v.brick_count,
                        bricks: v
                            .brick
                            .into_iter()
                            .map(|b| SnapBrickStatus {
                                path: b.path,
                                volume_group: b.volume_group,
                                brick_running: b.brick_running,
                                pid: b.pid,
                                data_percentage: b.data_percentage,
                                lv_size: b.lv_size,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    )
}

pub fn parse_snap_config_xml(xml: &str) -> Option<SnapConfig> {
    let parsed = parse_snap_xml(xml, "config")?;
    let config = parsed.snap_config?;
    let system = config
        .system_config
        .map(|s| SystemSnapConfig {
            hard_limit: s.hard_limit,
            soft_limit: s.soft_limit,
            auto_delete: s.auto_delete,
            activate_on_create: s.activate_on_create,
        })
        .unwrap_or_default();
    let volumes = config
        .volume_config
        .map(|l| {
            l.volume
                .into_iter()
                .map(|v| VolumeSnapConfig {
                    name: v.name,
                    hard_limit: v.hard_limit,
                    effective_hard_limit: v.effective_hard_limit,
                    soft_limit: v.soft_limit,
                })
                .collect()
        })
        .unwrap_or_default();
    Some(SnapConfig { system, volumes })
}

fn snapshot_command(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    args: &[&str],
    xml: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut arg_list: Vec<String> = Vec::new();
    arg_list.push("snapshot".to_string());
    arg_list.extend(args.iter().map(|a| a.to_string()));
    if xml {
        arg_list.push("--xml".to_string());
    }
    run_command(executor, mnode, "gluster", &arg_list, !xml)
}

/// `gluster snapshot create`.  Without `timestamp` the snapshot keeps exactly `snapname`.
pub fn snap_create(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    snapname: &str,
    timestamp: bool,
    description: Option<&str>,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    let mut args: Vec<&str> = vec!["create", snapname, volname];
    if !timestamp {
        args.push("no-timestamp");
    }
    if let Some(d) = description {
        args.push("description");
        args.push(d);
    }
    if force {
        args.push("force");
    }
    snapshot_command(executor, mnode, &args, false)
}

pub fn snap_clone(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
    clonename: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["clone", clonename, snapname], false)
}

/// The origin volume must be stopped first
pub fn snap_restore(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["restore", snapname], false)
}

/// Stop `volname`, restore `snapname` over it and start it again
pub fn snap_restore_complete(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    snapname: &str,
) -> bool {
    if !succeeded(
        volume_stop(executor, mnode, volname, false),
        mnode,
        &format!("volume stop {}", volname),
    ) {
        return false;
    }
    if !succeeded(
        snap_restore(executor, mnode, snapname),
        mnode,
        &format!("snapshot restore {}", snapname),
    ) {
        return false;
    }
    succeeded(
        volume_start(executor, mnode, volname, false),
        mnode,
        &format!("volume start {}", volname),
    )
}

pub fn snap_activate(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
    force: bool,
) -> Result<CommandOutput, GlusterError> {
    if force {
        snapshot_command(executor, mnode, &["activate", snapname, "force"], false)
    } else {
        snapshot_command(executor, mnode, &["activate", snapname], false)
    }
}

pub fn snap_deactivate(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["deactivate", snapname], false)
}

pub fn snap_delete(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["delete", snapname], false)
}

/// Delete every snapshot taken of `volname`
pub fn snap_delete_by_volumename(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["delete", "volume", volname], false)
}

pub fn snap_delete_all(
    executor: &dyn RemoteExecutor,
    mnode: &str,
) -> Result<CommandOutput, GlusterError> {
    snapshot_command(executor, mnode, &["delete", "all"], false)
}

pub fn snap_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    match volname {
        Some(v) => snapshot_command(executor, mnode, &["list", v], true),
        None => snapshot_command(executor, mnode, &["list"], true),
    }
}

pub fn snap_info(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: Option<&str>,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    match (snapname, volname) {
        (Some(s), _) => snapshot_command(executor, mnode, &["info", s], true),
        (None, Some(v)) => snapshot_command(executor, mnode, &["info", "volume", v], true),
        (None, None) => snapshot_command(executor, mnode, &["info"], true),
    }
}

pub fn snap_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: Option<&str>,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    match (snapname, volname) {
        (Some(s), _) => snapshot_command(executor, mnode, &["status", s], true),
        (None, Some(v)) => snapshot_command(executor, mnode, &["status", "volume", v], true),
        (None, None) => snapshot_command(executor, mnode, &["status"], true),
    }
}

pub fn snap_config(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Result<CommandOutput, GlusterError> {
    match volname {
        Some(v) => snapshot_command(executor, mnode, &["config", v], true),
        None => snapshot_command(executor, mnode, &["config"], true),
    }
}

/// Apply snapshot config keys (`snap-max-hard-limit`, `snap-max-soft-limit`, `auto-delete`,
/// `activate-on-create`), for one volume or the whole cluster.  True when every key took.
pub fn set_snap_config(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    options: &BTreeMap<String, String>,
    volname: Option<&str>,
) -> bool {
    let mut ok = true;
    for (key, value) in options {
        let mut args: Vec<&str> = vec!["config"];
        if let Some(v) = volname {
            args.push(v);
        }
        args.push(key);
        args.push(value);
        ok &= succeeded(
            snapshot_command(executor, mnode, &args, false),
            mnode,
            &format!("snapshot config {} {}", key, value),
        );
    }
    ok
}

pub fn get_snap_list(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Option<Vec<String>> {
    let xml = stdout_of(snap_list(executor, mnode, volname), mnode, "gluster snapshot list")?;
    parse_snap_list_xml(&xml)
}

pub fn get_snap_info(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Option<Vec<SnapInfo>> {
    let xml = stdout_of(
        snap_info(executor, mnode, None, volname),
        mnode,
        "gluster snapshot info",
    )?;
    parse_snap_info_xml(&xml)
}

pub fn get_snap_info_by_snapname(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
) -> Option<SnapInfo> {
    let xml = stdout_of(
        snap_info(executor, mnode, Some(snapname), None),
        mnode,
        "gluster snapshot info",
    )?;
    let found = parse_snap_info_xml(&xml)?.into_iter().find(|s| s.name == snapname);
    if found.is_none() {
        error!("Snapshot {} is not in snapshot info", snapname);
    }
    found
}

pub fn get_snap_status(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Option<Vec<SnapStatus>> {
    let xml = stdout_of(
        snap_status(executor, mnode, None, volname),
        mnode,
        "gluster snapshot status",
    )?;
    parse_snap_status_xml(&xml)
}

pub fn get_snap_status_by_snapname(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    snapname: &str,
) -> Option<SnapStatus> {
    let xml = stdout_of(
        snap_status(executor, mnode, Some(snapname), None),
        mnode,
        "gluster snapshot status",
    )?;
    let found = parse_snap_status_xml(&xml)?
        .into_iter()
        .find(|s| s.name == snapname);
    if found.is_none() {
        error!("Snapshot {} is not in snapshot status", snapname);
    }
    found
}

pub fn get_snap_config(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: Option<&str>,
) -> Option<SnapConfig> {
    let xml = stdout_of(
        snap_config(executor, mnode, volname),
        mnode,
        "gluster snapshot config",
    )?;
    parse_snap_config_xml(&xml)
}

/// Delete every snapshot of `volname`, one by one.  A volume without snapshots is fine.
pub fn delete_all_snaps_of_volume(executor: &dyn RemoteExecutor, mnode: &str, volname: &str) -> bool {
    let snaps = match get_snap_list(executor, mnode, Some(volname)) {
        Some(s) => s,
        None => return false,
    };
    let mut ok = true;
    for snap in snaps {
        ok &= succeeded(
            snap_delete(executor, mnode, &snap),
            mnode,
            &format!("snapshot delete {}", snap),
        );
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;

    const INFO: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <snapInfo>
    <count>2</count>
    <snapshots>
      <snapshot>
        <name>snap_default</name>
        <snapshotId>3a8d02e4-7b9c-4d1f-8b06-6f3a1c0f2e11</snapshotId>
        <createTime>2017-06-21 10:12:45</createTime>
        <snapVolume>
          <name>a5cdb6a2e0e94c4c8c2b8c9c7c3e4d11</name>
          <status>Stopped</status>
          <originVolume>
            <name>v1</name>
            <snapCount>2</snapCount>
            <snapRemaining>254</snapRemaining>
          </originVolume>
        </snapVolume>
      </snapshot>
      <snapshot>
        <name>snap_1</name>
        <snapshotId>9b1f1c22-52a4-4b54-a0f4-1f7d2c5b6a90</snapshotId>
        <createTime>2017-06-21 10:13:02</createTime>
        <description>after enable</description>
        <snapVolume>
          <name>0f2b7c1de1cc4e3c9b9d1f4f6a1b2c3d</name>
          <status>Started</status>
          <originVolume>
            <name>v1</name>
            <snapCount>2</snapCount>
            <snapRemaining>254</snapRemaining>
          </originVolume>
        </snapVolume>
      </snapshot>
    </snapshots>
  </snapInfo>
</cliOutput>"#;

    const STATUS: &str = r#"<cliOutput>
  <opRet>0</opRet>
  <snapStatus>
    <snapshots>
      <snapshot>
        <name>snap_1</name>
        <uuid>9b1f1c22-52a4-4b54-a0f4-1f7d2c5b6a90</uuid>
        <volCount>1</volCount>
        <volume>
          <brickCount>2</brickCount>
          <brick>
            <path>srv1:/run/gluster/snaps/0f2b7c1d/brick1/v1_brick0</path>
            <volumeGroup>RHS_vg0</volumeGroup>
            <brick_running>Yes</brick_running>
            <pid>11203</pid>
            <data_percentage>0.12</data_percentage>
            <lvSize>9.95g</lvSize>
          </brick>
          <brick>
            <path>srv2:/run/gluster/snaps/0f2b7c1d/brick2/v1_brick1</path>
            <volumeGroup>RHS_vg0</volumeGroup>
            <brick_running>No</brick_running>
            <pid>N/A</pid>
            <data_percentage>0.12</data_percentage>
            <lvSize>9.95g</lvSize>
          </brick>
        </volume>
      </snapshot>
    </snapshots>
  </snapStatus>
</cliOutput>"#;

    #[test]
    fn test_parse_snap_info() {
        let snaps = parse_snap_info_xml(INFO).unwrap();
        assert_eq!(snaps.len(), 2);
        assert!(!snaps[0].is_activated());
        assert!(snaps[1].is_activated());
        assert_eq!(snaps[1].description, "after enable");
        assert_eq!(snaps[0].origin(), Some("v1"));
        assert_eq!(snaps[0].snap_volume.origin_volume.as_ref().unwrap().snap_remaining, "254");
    }

    #[test]
    fn test_parse_snap_status() {
        let status = parse_snap_status_xml(STATUS).unwrap();
        assert_eq!(status[0].name, "snap_1");
        let pids: Vec<bool> = status[0].bricks().map(|b| b.has_pid()).collect();
        assert_eq!(pids, vec![true, false]);
    }

    #[test]
    fn test_parse_snap_list_and_config() {
        let list = "<cliOutput><opRet>0</opRet><snapList><count>2</count>\
                    <snapshot>snap_default</snapshot><snapshot>snap_1</snapshot></snapList></cliOutput>";
        assert_eq!(parse_snap_list_xml(list).unwrap(), vec!["snap_default", "snap_1"]);
        let empty = "<cliOutput><opRet>0</opRet><snapList><count>0</count></snapList></cliOutput>";
        assert!(parse_snap_list_xml(empty).unwrap().is_empty());

        let config = "<cliOutput><opRet>0</opRet><snapConfig><systemConfig>\
                      <hardLimit>256</hardLimit><softLimit>90%</softLimit>\
                      <autoDelete>disable</autoDelete><activateOnCreate>enable</activateOnCreate>\
                      </systemConfig><volumeConfig><volume><name>v1</name><hardLimit>256</hardLimit>\
                      <effectiveHardLimit>256</effectiveHardLimit><softLimit>230</softLimit>\
                      </volume></volumeConfig></snapConfig></cliOutput>";
        let parsed = parse_snap_config_xml(config).unwrap();
        assert!(parsed.activate_on_create());
        assert_eq!(parsed.volumes[0].soft_limit, "230");
        assert!(parse_snap_config_xml("<cliOutput><opRet>-1</opRet></cliOutput>").is_none());
    }

    #[test]
    fn test_snapshot_commands() {
        let mock = MockExecutor::new();
        snap_create(&mock, "srv1", "v1", "snap_1", false, Some("first snap"), false).unwrap();
        let mut options = BTreeMap::new();
        options.insert("activate-on-create".to_string(), "enable".to_string());
        assert!(set_snap_config(&mock, "srv1", &options, None));
        snap_info(&mock, "srv1", None, Some("v1")).unwrap();
        let cmds = mock.commands();
        assert_eq!(
            cmds[0],
            "gluster snapshot create snap_1 v1 no-timestamp description 'first snap' --mode=script"
        );
        assert_eq!(
            cmds[1],
            "gluster snapshot config activate-on-create enable --mode=script"
        );
        assert_eq!(cmds[2], "gluster snapshot info volume v1 --xml");
    }

    #[test]
    fn test_lookup_by_snapname() {
        let mock = MockExecutor::new();
        mock.on("gluster snapshot info snap_1", CommandOutput::ok(INFO));
        let snap = get_snap_info_by_snapname(&mock, "srv1", "snap_1").unwrap();
        assert!(snap.is_activated());
        assert!(get_snap_info_by_snapname(&mock, "srv1", "snap_9").is_none());
    }
}
