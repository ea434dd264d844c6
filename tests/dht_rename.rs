extern crate gluster_harness;

mod common;

use gluster_harness::dht::{
    find_cached_subvol, find_hashed_subvol, find_new_hashed, find_specific_hashed, get_dht_linkto_xattr,
    is_linkto_file, verify_linkto_target, BrickDir,
};
use gluster_harness::fs::{file_exists, move_file};
use gluster_harness::mock::MockExecutor;
use gluster_harness::planner::get_subvols;
use gluster_harness::{ClusterPaths, CommandOutput, RemoteExecutor};

use common::*;

const QUARTER: u32 = 0x4000_0000;

fn on_brick(k: usize, name: &str) -> String {
    format!("/bricks/brick0/v1_brick{}/dir/{}", 2 * k, name)
}

fn host(k: usize) -> String {
    format!("srv{}", 2 * k + 1)
}

fn stat_line(path: &str, size: u64, mode: &str) -> String {
    let kind = if size == 0 { "regular empty file" } else { "regular file" };
    format!("{}|{}|{}|root|root|0|0|{}|1|1|1|2|4711\n", path, size, mode, kind)
}

fn linkto_getfattr(path: &str, subvol: &str) -> String {
    format!("# file: {}\ntrusted.glusterfs.dht.linkto={}\n", path, hex_text(subvol))
}

/// A file whose name hashes to subvolume 1 but whose data sits on subvolume 2 is replaced by
/// a rename; the linkto left on subvolume 1 has to follow the new data.
#[test]
fn rename_onto_linked_destination() {
    init_logging();
    let bricks = brick_names("v1", 8, 0, 8);
    let paths = ClusterPaths::default();
    let mock = MockExecutor::new();
    mock.on(
        "gluster volume info v1",
        CommandOutput::ok(&volume_info_xml("v1", "Distributed-Replicate", 2, &bricks, &[])),
    );
    for k in 0..4 {
        let start = k as u32 * QUARTER;
        mock.on_node(
            &host(k),
            "-n trusted.glusterfs.dht -e hex",
            CommandOutput::ok(&layout_getfattr(&on_brick(k, ""), start, start + (QUARTER - 1))),
        );
    }

    let subvols = get_subvols(&mock, "srv1", "v1").unwrap().all();
    assert_eq!(subvols.len(), 4);
    assert_eq!(subvols[2], vec![bricks[4].clone(), bricks[5].clone()]);

    // source: hashed and cached on subvolume 0
    let (src_dir, src_idx) = find_hashed_subvol(&mock, &subvols, "/dir", "src_file").unwrap();
    assert_eq!(src_idx, 0);
    assert_eq!(src_dir.host, "srv1");
    assert!(mock.run("cli1", "touch /mnt/v1/dir/src_file").unwrap().success());
    assert_eq!(find_cached_subvol(&mock, &subvols, "/dir", "src_file"), Some(0));

    // renamed source hashes to subvolume 3, data stays on 0 behind a linkto
    let renamed = find_new_hashed(&mock, &subvols, "/dir", "src_file").unwrap();
    assert_eq!(renamed.name, "2");
    assert_eq!(renamed.subvol_index, 3);
    assert!(move_file(&mock, "cli1", "/mnt/v1/dir/src_file", "/mnt/v1/dir/2"));

    let src_linkto = on_brick(3, "2");
    mock.on_node("srv7", &format!("test -e {}", src_linkto), CommandOutput::ok(""))
        .on_node("srv7", &format!("test -e {}", src_linkto), CommandOutput::fail(1, ""));
    mock.on_node("srv7", &src_linkto, CommandOutput::ok(&stat_line(&src_linkto, 0, "1000")));
    mock.on_node(
        "srv7",
        &format!("trusted.glusterfs.dht.linkto -e hex {}", src_linkto),
        CommandOutput::ok(&linkto_getfattr(&src_linkto, "v1-replicate-0")),
    );
    assert!(file_exists(&mock, "srv7", &src_linkto));
    assert!(is_linkto_file(&mock, "srv7", &src_linkto));

    // destination: created where it hashes on 2, renamed to a name hashing to 1
    assert_eq!(renamed.brickdir.host, "srv7");
    let first = find_specific_hashed(&mock, &subvols, "/dir", &brickdir_at(&subvols, 2), None).unwrap();
    assert_eq!(first.name, "4");
    let dst = find_specific_hashed(&mock, &subvols, "/dir", &brickdir_at(&subvols, 1), Some(&first.name)).unwrap();
    assert_eq!(dst.name, "7");
    assert_eq!(dst.brickdir.host, "srv3");
    assert!(mock.run("cli1", "touch /mnt/v1/dir/4").unwrap().success());
    assert!(move_file(&mock, "cli1", "/mnt/v1/dir/4", "/mnt/v1/dir/7"));

    let dst_data = on_brick(2, "7");
    let dst_linkto = on_brick(1, "7");
    let new_data = on_brick(0, "7");
    mock.on_node("srv5", &format!("test -e {}", dst_data), CommandOutput::ok(""))
        .on_node("srv5", &format!("test -e {}", dst_data), CommandOutput::fail(1, ""));
    mock.on_node("srv5", &dst_data, CommandOutput::ok(&stat_line(&dst_data, 1024, "644")));
    mock.on_node("srv3", &dst_linkto, CommandOutput::ok(&stat_line(&dst_linkto, 0, "1000")));
    let linkto_read = format!("trusted.glusterfs.dht.linkto -e hex {}", dst_linkto);
    mock.on_node("srv3", &linkto_read, CommandOutput::ok(&linkto_getfattr(&dst_linkto, "v1-replicate-2")))
        .on_node("srv3", &linkto_read, CommandOutput::ok(&linkto_getfattr(&dst_linkto, "v1-replicate-2")))
        .on_node("srv3", &linkto_read, CommandOutput::ok(&linkto_getfattr(&dst_linkto, "v1-replicate-0")));
    mock.on_node("srv1", &format!("test -e {}", new_data), CommandOutput::fail(1, ""))
        .on_node("srv1", &format!("test -e {}", new_data), CommandOutput::ok(""));

    assert_eq!(get_dht_linkto_xattr(&mock, "srv3", &dst_linkto).unwrap(), "v1-replicate-2");
    assert_eq!(find_cached_subvol(&mock, &subvols, "/dir", "7"), Some(2));

    assert!(move_file(&mock, "cli1", "/mnt/v1/dir/2", "/mnt/v1/dir/7"));

    // the old destination data and the source linkto are gone
    assert!(!file_exists(&mock, "srv5", &dst_data));
    assert!(!file_exists(&mock, "srv7", &src_linkto));
    // the destination linkto now leads to the renamed source data on subvolume 0
    assert!(is_linkto_file(&mock, "srv3", &dst_linkto));
    mock.on_node(
        "srv1",
        "cat /var/lib/glusterd/vols/v1/v1.tcp-fuse.vol",
        CommandOutput::ok(&client_volfile("v1", &subvols)),
    );
    assert!(verify_linkto_target(&mock, "srv1", "v1", "srv3", &dst_linkto, "dir/7", &paths));
    assert_eq!(find_cached_subvol(&mock, &subvols, "/dir", "7"), Some(0));

    let client_cmds = mock.commands_on("cli1");
    assert_eq!(
        client_cmds,
        vec![
            "touch /mnt/v1/dir/src_file",
            "mv /mnt/v1/dir/src_file /mnt/v1/dir/2",
            "touch /mnt/v1/dir/4",
            "mv /mnt/v1/dir/4 /mnt/v1/dir/7",
            "mv /mnt/v1/dir/2 /mnt/v1/dir/7",
        ]
    );
}

fn brickdir_at(subvols: &[Vec<String>], k: usize) -> BrickDir {
    BrickDir::new(&subvols[k][0], "/dir").unwrap()
}
