//! Parsers for the small POSIX tools the harness inspects nodes with, and the wrappers
//! that run them.
use std::collections::BTreeMap;

use regex::Regex;

use crate::executor::RemoteExecutor;
use crate::{run_and_check, shell_quote};

/// One line of `/proc/mounts` or of `mount` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: Vec<String>,
}

/// `stat -c` fields the harness asks for, see [`STAT_FORMAT`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    /// Octal permission bits as printed by `%a`, e.g. `1000` or `644`
    pub mode: String,
    pub user: String,
    pub group: String,
    pub uid: u32,
    pub gid: u32,
    pub file_type: String,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub links: u64,
    pub inode: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStat {
    pub file: String,
    pub fs_type: String,
    pub block_size: u64,
    pub blocks_total: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
}

/// One row of `df -h`.  Sizes are left human readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfEntry {
    pub filesystem: String,
    pub size: String,
    pub used: String,
    pub available: String,
    pub use_percent: u32,
    pub mounted_on: String,
}

pub const STAT_FORMAT: &str = "%n|%s|%a|%U|%G|%u|%g|%F|%X|%Y|%Z|%h|%i";

fn unescape_mount_field(field: &str) -> String {
    // /proc/mounts octal-escapes space, tab, newline and backslash
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

pub fn parse_proc_mounts(output: &str) -> Vec<MountEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(MountEntry {
                device: unescape_mount_field(fields[0]),
                mountpoint: unescape_mount_field(fields[1]),
                fstype: fields[2].to_string(),
                options: fields[3].split(',').map(|o| o.to_string()).collect(),
            })
        })
        .collect()
}

/// Parse `mount` output: `srv1:/v1 on /mnt/v1 type fuse.glusterfs (rw,relatime)`
pub fn parse_mount_output(output: &str) -> Vec<MountEntry> {
    let re = match Regex::new(r"^(?P<dev>\S+) on (?P<mnt>.+) type (?P<fs>\S+) \((?P<opts>[^)]*)\)$") {
        Ok(r) => r,
        Err(e) => {
            error!("Bad mount pattern: {}", e);
            return Vec::new();
        }
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            Some(MountEntry {
                device: caps["dev"].to_string(),
                mountpoint: caps["mnt"].to_string(),
                fstype: caps["fs"].to_string(),
                options: caps["opts"].split(',').map(|o| o.to_string()).collect(),
            })
        })
        .collect()
}

/// Parse `getfattr -d -m . -e hex` output for a single file.  Quoted text values lose their
/// quotes; hex values are kept as printed, `0x` prefix included.
pub fn parse_getfattr(output: &str) -> Option<BTreeMap<String, String>> {
    let mut xattrs = BTreeMap::new();
    let mut saw_file = false;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("# file:") {
            saw_file = true;
            continue;
        }
        let idx = match line.find('=') {
            Some(i) => i,
            None => continue,
        };
        let key = &line[..idx];
        let value = line[idx + 1..].trim_matches('"');
        xattrs.insert(key.to_string(), value.to_string());
    }
    if !saw_file && xattrs.is_empty() {
        return None;
    }
    Some(xattrs)
}

/// Parse one line of `stat -c` printed with [`STAT_FORMAT`]
pub fn parse_stat(output: &str) -> Option<FileStat> {
    let line = output.lines().next()?.trim_end();
    // The name may itself contain the separator, so split from the right
    let mut fields: Vec<&str> = line.rsplitn(13, '|').collect();
    if fields.len() != 13 {
        return None;
    }
    fields.reverse();
    Some(FileStat {
        name: fields[0].to_string(),
        size: fields[1].parse().ok()?,
        mode: fields[2].to_string(),
        user: fields[3].to_string(),
        group: fields[4].to_string(),
        uid: fields[5].parse().ok()?,
        gid: fields[6].parse().ok()?,
        file_type: fields[7].to_string(),
        atime: fields[8].parse().ok()?,
        mtime: fields[9].parse().ok()?,
        ctime: fields[10].parse().ok()?,
        links: fields[11].parse().ok()?,
        inode: fields[12].parse().ok()?,
    })
}

fn capture_u64(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Parse the default output of `stat -f <path>`
pub fn parse_stat_fs(output: &str) -> Option<FsStat> {
    let file = Regex::new(r#"File: "?([^"\n]+)"?"#).ok()?;
    let fs_type = Regex::new(r"Type: (\S+)").ok()?;
    let block_size = Regex::new(r"Block size: (\d+)").ok()?;
    let blocks = Regex::new(r"Blocks: Total: (\d+)\s+Free: (\d+)\s+Available: (\d+)").ok()?;
    let inodes = Regex::new(r"Inodes: Total: (\d+)\s+Free: (\d+)").ok()?;

    let block_caps = blocks.captures(output)?;
    let inode_caps = inodes.captures(output)?;
    Some(FsStat {
        file: file.captures(output)?.get(1)?.as_str().trim().to_string(),
        fs_type: fs_type.captures(output)?.get(1)?.as_str().to_string(),
        block_size: capture_u64(&block_size, output)?,
        blocks_total: block_caps[1].parse().ok()?,
        blocks_free: block_caps[2].parse().ok()?,
        blocks_available: block_caps[3].parse().ok()?,
        inodes_total: inode_caps[1].parse().ok()?,
        inodes_free: inode_caps[2].parse().ok()?,
    })
}

/// Parse `df -h`.  A long filesystem name pushes the rest of its row onto the next line.
pub fn parse_df(output: &str) -> Option<Vec<DfEntry>> {
    let mut lines = output.lines();
    let header = lines.next()?;
    if !header.starts_with("Filesystem") {
        return None;
    }
    let mut entries = Vec::new();
    let mut pending: Option<String> = None;
    for line in lines {
        let mut fields: Vec<String> = line.split_whitespace().map(|f| f.to_string()).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() == 1 {
            pending = Some(fields.remove(0));
            continue;
        }
        if let Some(fs) = pending.take() {
            fields.insert(0, fs);
        }
        if fields.len() < 6 {
            return None;
        }
        let use_percent = fields[4].trim_end_matches('%').parse::<u32>().ok()?;
        entries.push(DfEntry {
            filesystem: fields[0].clone(),
            size: fields[1].clone(),
            used: fields[2].clone(),
            available: fields[3].clone(),
            use_percent,
            mounted_on: fields[5..].join(" "),
        });
    }
    Some(entries)
}

fn run_for_stdout(executor: &dyn RemoteExecutor, host: &str, cmd: &str) -> Option<String> {
    match executor.run(host, cmd) {
        Ok(output) => {
            if output.success() {
                Some(output.stdout)
            } else {
                output.log_failure(host, cmd);
                None
            }
        }
        Err(e) => {
            error!("'{}' could not be run on {}: {}", cmd, host, e);
            None
        }
    }
}

/// Every extended attribute of `path`, or just `name` when given
pub fn get_fattr(
    executor: &dyn RemoteExecutor,
    host: &str,
    path: &str,
    name: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    let cmd = match name {
        Some(n) => format!(
            "getfattr --absolute-names -n {} -e hex {}",
            shell_quote(n),
            shell_quote(path)
        ),
        None => format!("getfattr --absolute-names -d -m . -e hex {}", shell_quote(path)),
    };
    parse_getfattr(&run_for_stdout(executor, host, &cmd)?)
}

pub fn get_file_stat(executor: &dyn RemoteExecutor, host: &str, path: &str) -> Option<FileStat> {
    let cmd = format!("stat -c {} {}", shell_quote(STAT_FORMAT), shell_quote(path));
    parse_stat(&run_for_stdout(executor, host, &cmd)?)
}

pub fn get_fs_stat(executor: &dyn RemoteExecutor, host: &str, path: &str) -> Option<FsStat> {
    let cmd = format!("stat -f {}", shell_quote(path));
    parse_stat_fs(&run_for_stdout(executor, host, &cmd)?)
}

/// `df -h` of the filesystem holding `path`
pub fn get_disk_usage(executor: &dyn RemoteExecutor, host: &str, path: &str) -> Option<DfEntry> {
    let cmd = format!("df -h {}", shell_quote(path));
    parse_df(&run_for_stdout(executor, host, &cmd)?)?.into_iter().next()
}

pub fn get_mounts(executor: &dyn RemoteExecutor, host: &str) -> Option<Vec<MountEntry>> {
    Some(parse_proc_mounts(&run_for_stdout(
        executor,
        host,
        "cat /proc/mounts",
    )?))
}

pub fn file_exists(executor: &dyn RemoteExecutor, host: &str, path: &str) -> bool {
    match executor.run(host, &format!("test -e {}", shell_quote(path))) {
        Ok(output) => output.success(),
        Err(e) => {
            error!("Unable to check {} on {}: {}", path, host, e);
            false
        }
    }
}

/// `mv src dst` on `host`
pub fn move_file(executor: &dyn RemoteExecutor, host: &str, src: &str, dst: &str) -> bool {
    run_and_check(
        executor,
        host,
        &format!("mv {} {}", shell_quote(src), shell_quote(dst)),
    )
}

/// Regular files below `path`
pub fn list_files(executor: &dyn RemoteExecutor, host: &str, path: &str) -> Option<Vec<String>> {
    let cmd = format!("find {} -type f", shell_quote(path));
    Some(
        run_for_stdout(executor, host, &cmd)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_mounts() {
        let output = "/dev/vdb1 /bricks/brick0 xfs rw,seclabel,noatime 0 0\n\
                      srv1:/v1 /mnt/my\\040mount fuse.glusterfs rw,relatime 0 0\n\
                      short line\n";
        let mounts = parse_proc_mounts(output);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mountpoint, "/bricks/brick0");
        assert_eq!(mounts[0].options, vec!["rw", "seclabel", "noatime"]);
        assert_eq!(mounts[1].mountpoint, "/mnt/my mount");
    }

    #[test]
    fn test_parse_mount_output() {
        let output = "srv1:/v1 on /mnt/v1 type fuse.glusterfs (rw,relatime,user_id=0)\n\
                      proc on /proc type proc (rw,nosuid)\n";
        let mounts = parse_mount_output(output);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].device, "srv1:/v1");
        assert_eq!(mounts[0].fstype, "fuse.glusterfs");
    }

    #[test]
    fn test_parse_getfattr() {
        let output = "# file: /bricks/brick0/v1_brick0/dir\n\
                      security.selinux=0x73797374656d5f753a6f626a6563745f723a676c7573746572645f627269636b5f743a733000\n\
                      trusted.gfid=0x8d7b6e59e4a24a4ca1a40e0b2f1dc47a\n\
                      trusted.glusterfs.dht=0x000000010000000000000000ffffffff\n\
                      user.note=\"hello\"\n";
        let xattrs = parse_getfattr(output).unwrap();
        assert_eq!(
            xattrs["trusted.glusterfs.dht"],
            "0x000000010000000000000000ffffffff"
        );
        assert_eq!(xattrs["user.note"], "hello");
        assert!(parse_getfattr("").is_none());
    }

    #[test]
    fn test_parse_stat() {
        let stat = parse_stat("/bricks/b0/file|0|1000|root|root|0|0|regular empty file|1|2|3|2|1234\n").unwrap();
        assert_eq!(stat.size, 0);
        assert_eq!(stat.mode, "1000");
        assert_eq!(stat.file_type, "regular empty file");
        assert_eq!(stat.inode, 1234);
        let piped = parse_stat("/mnt/a|b|10|644|qa|qa|1000|1000|regular file|1|2|3|1|99").unwrap();
        assert_eq!(piped.name, "/mnt/a|b");
        assert!(parse_stat("stat: cannot stat '/x': No such file or directory").is_none());
    }

    #[test]
    fn test_parse_stat_fs() {
        let output = r#"  File: "/mnt/v1"
    ID: 0        Namelen: 255     Type: fuseblk
Block size: 4096       Fundamental block size: 4096
Blocks: Total: 2618880    Free: 2583000    Available: 2582000
Inodes: Total: 5242368    Free: 5242000
"#;
        let fs = parse_stat_fs(output).unwrap();
        assert_eq!(fs.file, "/mnt/v1");
        assert_eq!(fs.fs_type, "fuseblk");
        assert_eq!(fs.block_size, 4096);
        assert_eq!(fs.blocks_available, 2582000);
        assert_eq!(fs.inodes_free, 5242000);
    }

    #[test]
    fn test_parse_df() {
        let output = "Filesystem      Size  Used Avail Use% Mounted on\n\
                      srv1.example.com:/a-very-long-volume-name\n\
                      \x20                20G  1.2G   19G   6% /mnt/v1\n\
                      /dev/vdb1        10G   10G     0 100% /bricks/brick0\n";
        let entries = parse_df(output).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filesystem, "srv1.example.com:/a-very-long-volume-name");
        assert_eq!(entries[0].use_percent, 6);
        assert_eq!(entries[0].mounted_on, "/mnt/v1");
        assert_eq!(entries[1].use_percent, 100);
        assert!(parse_df("df: /nope: No such file or directory").is_none());
    }
}
