use std::path::PathBuf;

use structopt::StructOpt;

/// Recognized broker configuration: `listen_host`, `listen_port`,
/// `logger_dir`, plus a `humantime::Duration` reaper interval, exposed
/// rather than hard-coded.
#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "gpu-broker")]
pub struct CliArgs {
    /// Host to listen on.
    #[structopt(long, default_value = "localhost")]
    pub listen_host: String,

    /// Port to listen on.
    #[structopt(long, default_value = "13105")]
    pub listen_port: u16,

    /// Directory the broker's log file (`hashpwd.log`) is written under.
    /// Created if it does not already exist.
    #[structopt(long, default_value = "/var/log/hashpwd")]
    pub logger_dir: PathBuf,

    /// How often the reaper scans for dead holders.
    #[structopt(long, default_value = "5s")]
    pub reaper_interval: humantime::Duration,

    /// Path to the `gpu-holder` binary the supervisor spawns. Defaults to
    /// a sibling of the running executable, as produced by `cargo build`.
    #[structopt(long)]
    pub holder_binary: Option<PathBuf>,
}

/// Runtime configuration derived from `CliArgs`, with the holder binary
/// path resolved.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub logger_dir: PathBuf,
    pub reaper_interval: std::time::Duration,
    pub holder_binary: PathBuf,
}

impl From<CliArgs> for BrokerConfig {
    fn from(args: CliArgs) -> Self {
        let holder_binary = args.holder_binary.unwrap_or_else(default_holder_binary);
        Self {
            listen_host: args.listen_host,
            listen_port: args.listen_port,
            logger_dir: args.logger_dir,
            reaper_interval: args.reaper_interval.into(),
            holder_binary,
        }
    }
}

fn default_holder_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("broker"));
    path.pop();
    path.push(if cfg!(windows) { "gpu-holder.exe" } else { "gpu-holder" });
    path
}
