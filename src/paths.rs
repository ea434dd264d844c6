use std::path::Path;

/// Where the cluster keeps the files the harness reads and edits.  `Default` is the stock
/// layout of a packaged Gluster install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterPaths {
    pub glusterd_workdir: String,
    pub run_dir: String,
    pub log_dir: String,
    pub shared_storage: String,
    pub scripts_dir: String,
    pub ganesha_libexec: String,
    pub samba_conf: String,
    /// Directory the telemetry sampler writes its csv files into
    pub sampler_output_dir: String,
}

impl Default for ClusterPaths {
    fn default() -> Self {
        ClusterPaths {
            glusterd_workdir: "/var/lib/glusterd".to_string(),
            run_dir: "/var/run/gluster".to_string(),
            log_dir: "/var/log/glusterfs".to_string(),
            shared_storage: "/var/run/gluster/shared_storage".to_string(),
            scripts_dir: "/usr/share/glustolibs/io/scripts".to_string(),
            ganesha_libexec: "/usr/libexec/ganesha".to_string(),
            samba_conf: "/etc/samba/smb.conf".to_string(),
            sampler_output_dir: "/root".to_string(),
        }
    }
}

impl ClusterPaths {
    pub fn shd_volfile(&self) -> String {
        format!("{}/glustershd/glustershd-server.vol", self.glusterd_workdir)
    }

    /// The volfile fuse clients are served for `volname`
    pub fn client_volfile(&self, volname: &str) -> String {
        format!(
            "{}/vols/{}/{}.tcp-fuse.vol",
            self.glusterd_workdir, volname, volname
        )
    }

    pub fn ganesha_dir(&self) -> String {
        format!("{}/nfs-ganesha", self.shared_storage)
    }

    pub fn ganesha_ha_conf(&self) -> String {
        format!("{}/ganesha-ha.conf", self.ganesha_dir())
    }

    pub fn ganesha_ha_script(&self) -> String {
        format!("{}/ganesha-ha.sh", self.ganesha_libexec)
    }

    pub fn ganesha_export_conf(&self, volname: &str) -> String {
        format!("{}/exports/export.{}.conf", self.ganesha_dir(), volname)
    }

    pub fn script(&self, name: &str) -> String {
        format!("{}/{}", self.scripts_dir, name)
    }

    /// csv written by the sampler for one process class
    pub fn sampler_csv(&self, process: &str) -> String {
        format!("{}/{}.csv", self.sampler_output_dir, process)
    }

    /// Bricks log to a file named after their path with the separators turned into dashes:
    /// `/bricks/brick0/v1` logs to `bricks/bricks-brick0-v1.log`.
    pub fn brick_log(&self, brick_path: &str) -> String {
        let name = brick_path.trim_start_matches('/').replace('/', "-");
        format!("{}/bricks/{}.log", self.log_dir, name)
    }

    /// Log file of the fuse client mounted at `mountpoint`
    pub fn mount_log(&self, mountpoint: &str) -> String {
        let name = mountpoint.trim_start_matches('/').replace('/', "-");
        format!("{}/{}.log", self.log_dir, name)
    }

    pub fn is_absolute(path: &str) -> bool {
        Path::new(path).is_absolute()
    }
}
