//! Where DHT places names: the layout hash, per-brick directory ranges and linkto files.
//!
//! Every directory of a distributed volume carries a `trusted.glusterfs.dht` xattr on each
//! brick assigning that brick a slice of the 32-bit hash space.  A name lives on the subvolume
//! whose slice holds the hash of the name; when a rename leaves data elsewhere, the hashed
//! subvolume gets a zero byte sticky linkto file naming the subvolume that caches it.
use crate::brick::Brick;
use crate::executor::RemoteExecutor;
use crate::fs::{file_exists, get_fattr, get_file_stat};
use crate::paths::ClusterPaths;
use crate::volfile::{read_volfile, resolve_subvolume};

pub const LAYOUT_XATTR: &str = "trusted.glusterfs.dht";
pub const LINKTO_XATTR: &str = "trusted.glusterfs.dht.linkto";

/// Names tried when searching for one that hashes to a given subvolume
const MAX_CANDIDATES: usize = 5000;

const DM_DELTA: u32 = 0x9E37_79B9;
const DM_FULLROUNDS: usize = 10;
const DM_PARTROUNDS: usize = 6;

fn dm_round(rounds: usize, array: &[u32; 4], h0: &mut u32, h1: &mut u32) {
    let mut sum: u32 = 0;
    let mut b0 = *h0;
    let mut b1 = *h1;
    for _ in 0..rounds {
        sum = sum.wrapping_add(DM_DELTA);
        b0 = b0.wrapping_add(
            (b1 << 4).wrapping_add(array[0])
                ^ b1.wrapping_add(sum)
                ^ (b1 >> 5).wrapping_add(array[1]),
        );
        b1 = b1.wrapping_add(
            (b0 << 4).wrapping_add(array[2])
                ^ b0.wrapping_add(sum)
                ^ (b0 >> 5).wrapping_add(array[3]),
        );
    }
    *h0 = h0.wrapping_add(b0);
    *h1 = h1.wrapping_add(b1);
}

/// The Davies-Meyer hash DHT computes over a file name
pub fn gf_dm_hashfn(msg: &[u8]) -> u32 {
    let mut h0: u32 = 0x9464_a485;
    let mut h1: u32 = 0x542e_1a94;
    let len = msg.len() as u32;
    let mut pad = len | (len << 8);
    pad |= pad << 16;

    let word = |i: usize| u32::from_le_bytes([msg[i], msg[i + 1], msg[i + 2], msg[i + 3]]);
    let mut pos = 0;
    let mut full_words = msg.len() / 4;
    let mut full_bytes = msg.len();

    for _ in 0..msg.len() / 16 {
        let mut array = [0u32; 4];
        for slot in array.iter_mut() {
            *slot = word(pos);
            pos += 4;
            full_words -= 1;
            full_bytes -= 4;
        }
        dm_round(DM_PARTROUNDS, &array, &mut h0, &mut h1);
    }

    let mut array = [0u32; 4];
    for slot in array.iter_mut() {
        if full_words > 0 {
            *slot = word(pos);
            pos += 4;
            full_words -= 1;
            full_bytes -= 4;
        } else {
            *slot = pad;
            while full_bytes > 0 {
                *slot <<= 8;
                // Tail bytes are sign extended
                *slot |= msg[msg.len() - full_bytes] as i8 as i32 as u32;
                full_bytes -= 1;
            }
        }
    }
    dm_round(DM_FULLROUNDS, &array, &mut h0, &mut h1);

    h0 ^ h1
}

pub fn hash_name(name: &str) -> u32 {
    gf_dm_hashfn(name.as_bytes())
}

/// `(start, stop)` out of a hex encoded layout xattr, `0x` + count + type + start + stop
pub fn parse_dht_range(value: &str) -> Option<(u32, u32)> {
    if !value.starts_with("0x") || value.len() < 34 {
        return None;
    }
    let start = u32::from_str_radix(value.get(18..26)?, 16).ok()?;
    let stop = u32::from_str_radix(value.get(26..34)?, 16).ok()?;
    Some((start, stop))
}

/// One directory on one brick, with the hash range the layout gives it there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickDir {
    pub host: String,
    pub brick_path: String,
    /// Directory below the brick root, `/` for the root itself
    pub dir_path: String,
    pub hash_range: Option<(u32, u32)>,
}

impl BrickDir {
    pub fn new(brick: &str, dir_path: &str) -> Option<BrickDir> {
        let parsed = Brick::parse(brick)?;
        Some(BrickDir {
            host: parsed.host,
            brick_path: parsed.path,
            dir_path: dir_path.to_string(),
            hash_range: None,
        })
    }

    /// Absolute path of the directory on the brick
    pub fn fqpath(&self) -> String {
        let dir = self.dir_path.trim_matches('/');
        if dir.is_empty() {
            self.brick_path.clone()
        } else {
            format!("{}/{}", self.brick_path.trim_end_matches('/'), dir)
        }
    }

    /// Path of `name` inside this directory on the brick
    pub fn child(&self, name: &str) -> String {
        format!("{}/{}", self.fqpath(), name)
    }

    /// Read the layout xattr.  False when the directory carries no layout.
    pub fn load_hash_range(&mut self, executor: &dyn RemoteExecutor) -> bool {
        let path = self.fqpath();
        self.hash_range = get_fattr(executor, &self.host, &path, Some(LAYOUT_XATTR))
            .and_then(|xattrs| xattrs.get(LAYOUT_XATTR).and_then(|v| parse_dht_range(v)));
        if self.hash_range.is_none() {
            warn!("{}:{} has no dht layout", self.host, path);
        }
        self.hash_range.is_some()
    }

    pub fn contains_hash(&self, hash: u32) -> bool {
        match self.hash_range {
            Some((start, stop)) => start <= hash && hash <= stop,
            None => false,
        }
    }

    fn same_dir(&self, other: &BrickDir) -> bool {
        self.host == other.host && self.fqpath() == other.fqpath()
    }
}

/// A name found to hash to a particular subvolume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHashed {
    pub name: String,
    pub brickdir: BrickDir,
    pub subvol_index: usize,
}

/// Directory `dir_path` on the first brick of every subvolume, with its layout loaded
pub fn brickdirs_for(
    executor: &dyn RemoteExecutor,
    subvols: &[Vec<String>],
    dir_path: &str,
) -> Option<Vec<BrickDir>> {
    let mut dirs = Vec::with_capacity(subvols.len());
    for subvol in subvols {
        let first = match subvol.first() {
            Some(b) => b,
            None => {
                error!("Empty subvolume in {:?}", subvols);
                return None;
            }
        };
        let mut dir = match BrickDir::new(first, dir_path) {
            Some(d) => d,
            None => {
                error!("{} is not a host:/path brick", first);
                return None;
            }
        };
        dir.load_hash_range(executor);
        dirs.push(dir);
    }
    Some(dirs)
}

/// Index of the directory whose range holds the hash of `name`
pub fn hashed_index(dirs: &[BrickDir], name: &str) -> Option<usize> {
    let hash = hash_name(name);
    dirs.iter().position(|d| d.contains_hash(hash))
}

/// First candidate name hashing somewhere other than `oldname` does
pub fn new_hashed_name(dirs: &[BrickDir], oldname: &str) -> Option<NewHashed> {
    let old = hashed_index(dirs, oldname)?;
    (1..MAX_CANDIDATES).find_map(|i| {
        let name = i.to_string();
        match hashed_index(dirs, &name) {
            Some(idx) if idx != old => Some(NewHashed {
                name,
                brickdir: dirs[idx].clone(),
                subvol_index: idx,
            }),
            _ => None,
        }
    })
}

/// First candidate name hashing to `target`, skipping `avoid`
pub fn specific_hashed_name(dirs: &[BrickDir], target: &BrickDir, avoid: Option<&str>) -> Option<NewHashed> {
    (1..MAX_CANDIDATES).find_map(|i| {
        let name = i.to_string();
        if Some(name.as_str()) == avoid {
            return None;
        }
        let idx = hashed_index(dirs, &name)?;
        if dirs[idx].same_dir(target) {
            Some(NewHashed {
                name,
                brickdir: dirs[idx].clone(),
                subvol_index: idx,
            })
        } else {
            None
        }
    })
}

/// The directory `name` hashes to and the index of its subvolume
pub fn find_hashed_subvol(
    executor: &dyn RemoteExecutor,
    subvols: &[Vec<String>],
    dir_path: &str,
    name: &str,
) -> Option<(BrickDir, usize)> {
    let dirs = brickdirs_for(executor, subvols, dir_path)?;
    match hashed_index(&dirs, name) {
        Some(idx) => Some((dirs[idx].clone(), idx)),
        None => {
            error!("No subvolume's layout of {} covers {}", dir_path, name);
            None
        }
    }
}

pub fn find_new_hashed(
    executor: &dyn RemoteExecutor,
    subvols: &[Vec<String>],
    dir_path: &str,
    oldname: &str,
) -> Option<NewHashed> {
    let dirs = brickdirs_for(executor, subvols, dir_path)?;
    let found = new_hashed_name(&dirs, oldname);
    if found.is_none() {
        error!("No name in {} hashes away from {}", dir_path, oldname);
    }
    found
}

pub fn find_specific_hashed(
    executor: &dyn RemoteExecutor,
    subvols: &[Vec<String>],
    dir_path: &str,
    target: &BrickDir,
    avoid: Option<&str>,
) -> Option<NewHashed> {
    let dirs = brickdirs_for(executor, subvols, dir_path)?;
    let found = specific_hashed_name(&dirs, target, avoid);
    if found.is_none() {
        error!("No name in {} hashes to {}:{}", dir_path, target.host, target.fqpath());
    }
    found
}

/// Index of the first subvolume holding the data of `name`, linkto files skipped
pub fn find_cached_subvol(
    executor: &dyn RemoteExecutor,
    subvols: &[Vec<String>],
    dir_path: &str,
    name: &str,
) -> Option<usize> {
    for (idx, subvol) in subvols.iter().enumerate() {
        let dir = match subvol.first().and_then(|b| BrickDir::new(b, dir_path)) {
            Some(d) => d,
            None => continue,
        };
        let path = dir.child(name);
        if file_exists(executor, &dir.host, &path) && !is_linkto_file(executor, &dir.host, &path) {
            return Some(idx);
        }
    }
    None
}

/// Text of an xattr value: hex values are decoded and lose their trailing NUL
pub fn decode_xattr_text(value: &str) -> Option<String> {
    if !value.starts_with("0x") {
        return Some(value.to_string());
    }
    let hex = &value[2..];
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        bytes.push(u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()?);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8(bytes).ok()
}

/// Zero bytes, mode exactly `1000` and a linkto xattr
pub fn is_linkto_file(executor: &dyn RemoteExecutor, host: &str, path: &str) -> bool {
    let stat = match get_file_stat(executor, host, path) {
        Some(s) => s,
        None => return false,
    };
    if stat.size != 0 || stat.mode != "1000" {
        return false;
    }
    get_dht_linkto_xattr(executor, host, path).is_some()
}

/// Subvolume name a linkto file points at
pub fn get_dht_linkto_xattr(executor: &dyn RemoteExecutor, host: &str, path: &str) -> Option<String> {
    let xattrs = get_fattr(executor, host, path, Some(LINKTO_XATTR))?;
    decode_xattr_text(xattrs.get(LINKTO_XATTR)?)
}

/// Follow the linkto file at `path` on `host` through the client volfile of `volname` and
/// check the data file `rel_path` exists on a brick of the subvolume it names.
pub fn verify_linkto_target(
    executor: &dyn RemoteExecutor,
    mnode: &str,
    volname: &str,
    host: &str,
    path: &str,
    rel_path: &str,
    paths: &ClusterPaths,
) -> bool {
    let linkto = match get_dht_linkto_xattr(executor, host, path) {
        Some(l) => l,
        None => {
            error!("{}:{} is not a linkto file", host, path);
            return false;
        }
    };
    let xlators = match read_volfile(executor, mnode, &paths.client_volfile(volname)) {
        Some(x) => x,
        None => return false,
    };
    let targets = resolve_subvolume(&xlators, &linkto);
    if targets.is_empty() {
        error!("linkto {} of {}:{} names no subvolume of {}", linkto, host, path, volname);
        return false;
    }
    let rel = rel_path.trim_start_matches('/');
    let found = targets.iter().any(|(target_host, brick)| {
        let data = format!("{}/{}", brick.trim_end_matches('/'), rel);
        file_exists(executor, target_host, &data) && !is_linkto_file(executor, target_host, &data)
    });
    if found {
        info!("linkto {}:{} resolves to data on {}", host, path, linkto);
    } else {
        error!("No brick of {} ({:?}) holds {}", linkto, targets, rel);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::mock::MockExecutor;
    use crate::volfile::tests::CLIENT_VOLFILE;

    fn halves() -> Vec<BrickDir> {
        let mut a = BrickDir::new("srv1:/bricks/brick0/v1_brick0", "/dir").unwrap();
        let mut b = BrickDir::new("srv3:/bricks/brick0/v1_brick2", "/dir").unwrap();
        a.hash_range = Some((0, 0x7fff_fffe));
        b.hash_range = Some((0x7fff_ffff, 0xffff_ffff));
        vec![a, b]
    }

    #[test]
    fn test_hashfn() {
        assert_eq!(gf_dm_hashfn(b""), 0x8847_74a2);
        assert_eq!(hash_name("a"), 0x3a17_e4e6);
        assert_eq!(hash_name("file1"), 0xa787_fa82);
        assert_eq!(hash_name("abcdefghijklmnopqrstuvwxyz"), 0x34b8_4a16);
        // Non-ascii tail bytes
        assert_eq!(hash_name("café"), 0x9e08_9967);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_dht_range("0x000000010000000000000000 7ffffffe".replace(' ', "").as_str()),
            Some((0, 0x7fff_fffe))
        );
        assert_eq!(
            parse_dht_range("0x00000001000000007fffffffffffffff"),
            Some((0x7fff_ffff, 0xffff_ffff))
        );
        assert_eq!(parse_dht_range("0x0000"), None);
        assert_eq!(parse_dht_range("v1-replicate-0"), None);
    }

    #[test]
    fn test_hashed_index() {
        let dirs = halves();
        // 0xa787fa82 is in the upper half
        assert_eq!(hashed_index(&dirs, "file1"), Some(1));
        assert_eq!(hashed_index(&dirs, "a"), Some(0));
        assert_eq!(dirs[0].fqpath(), "/bricks/brick0/v1_brick0/dir");
        assert_eq!(dirs[1].child("f"), "/bricks/brick0/v1_brick2/dir/f");
    }

    #[test]
    fn test_candidate_names() {
        let dirs = halves();
        // "1" hashes to 0x10b35a6f, "2" to 0xcda55988
        let moved = new_hashed_name(&dirs, "file1").unwrap();
        assert_eq!(moved.name, "1");
        assert_eq!(moved.subvol_index, 0);
        let moved = new_hashed_name(&dirs, "a").unwrap();
        assert_eq!(moved.name, "2");
        assert_eq!(moved.subvol_index, 1);

        let upper = dirs[1].clone();
        assert_eq!(specific_hashed_name(&dirs, &upper, None).unwrap().name, "2");
        assert_eq!(specific_hashed_name(&dirs, &upper, Some("2")).unwrap().name, "3");
    }

    #[test]
    fn test_decode_xattr_text() {
        assert_eq!(
            decode_xattr_text("0x76312d7265706c69636174652d3100").unwrap(),
            "v1-replicate-1"
        );
        assert_eq!(decode_xattr_text("v1-client-0").unwrap(), "v1-client-0");
        assert_eq!(decode_xattr_text("0x7"), None);
    }

    #[test]
    fn test_find_hashed_subvol_reads_layouts() {
        let mock = MockExecutor::new();
        mock.on_node(
            "srv1",
            "getfattr",
            CommandOutput::ok("# file: /bricks/brick0/v1_brick0/dir\ntrusted.glusterfs.dht=0x0000000100000000000000007ffffffe\n"),
        );
        mock.on_node(
            "srv3",
            "getfattr",
            CommandOutput::ok("# file: /bricks/brick0/v1_brick2/dir\ntrusted.glusterfs.dht=0x00000001000000007fffffffffffffff\n"),
        );
        let subvols = vec![
            vec!["srv1:/bricks/brick0/v1_brick0".to_string(), "srv2:/bricks/brick0/v1_brick1".to_string()],
            vec!["srv3:/bricks/brick0/v1_brick2".to_string(), "srv4:/bricks/brick0/v1_brick3".to_string()],
        ];
        let (dir, idx) = find_hashed_subvol(&mock, &subvols, "/dir", "file1").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(dir.host, "srv3");
        assert_eq!(
            mock.commands_on("srv1")[0],
            "getfattr --absolute-names -n trusted.glusterfs.dht -e hex /bricks/brick0/v1_brick0/dir"
        );
    }

    #[test]
    fn test_linkto_detection_and_resolution() {
        let mock = MockExecutor::new();
        mock.on(
            "stat -c",
            CommandOutput::ok("/bricks/brick0/v1_brick0/dir/f|0|1000|root|root|0|0|regular empty file|1|1|1|2|99\n"),
        );
        mock.on(
            "getfattr --absolute-names -n trusted.glusterfs.dht.linkto",
            CommandOutput::ok("# file: /bricks/brick0/v1_brick0/dir/f\ntrusted.glusterfs.dht.linkto=0x76312d7265706c69636174652d3100\n"),
        );
        assert!(is_linkto_file(&mock, "srv1", "/bricks/brick0/v1_brick0/dir/f"));

        // The data file on the target is a regular file with contents
        mock.on_node(
            "srv3",
            "stat -c",
            CommandOutput::ok("/bricks/brick0/v1_brick2/dir/f|4096|644|root|root|0|0|regular file|1|1|1|2|100\n"),
        );
        mock.on("v1.tcp-fuse.vol", CommandOutput::ok(CLIENT_VOLFILE));
        assert!(verify_linkto_target(
            &mock,
            "srv1",
            "v1",
            "srv1",
            "/bricks/brick0/v1_brick0/dir/f",
            "dir/f",
            &ClusterPaths::default()
        ));
        assert!(mock
            .commands_on("srv3")
            .contains(&"test -e /bricks/brick0/v1_brick2/dir/f".to_string()));
    }
}
