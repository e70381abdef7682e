//! A stand-in for `gpu-holder` used only by this crate's test suite, so
//! integration tests can exercise spawn/stop/reap without real GPU
//! hardware. Speaks the same one-line-status/`STOP`-on-stdin protocol as
//! the real holder.

use std::io::{self, BufRead, Write};

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct CliArgs {
    #[structopt(long)]
    index: u32,

    #[structopt(long)]
    exclusive: bool,

    /// Test hook: report an attach failure instead of succeeding, but
    /// only for this one device index — lets a single
    /// `HolderSupervisor` configuration fail exactly one spawn among
    /// several, the shape an allocate-rollback test needs.
    #[structopt(long)]
    fail_attach_index: Option<u32>,

    /// Test hook: exit immediately after attaching, to simulate the
    /// reaper's "holder terminated unexpectedly" path, again scoped to
    /// one device index.
    #[structopt(long)]
    die_after_attach_index: Option<u32>,
}

fn main() {
    let args = CliArgs::from_args();

    if args.fail_attach_index == Some(args.index) {
        println!("ERR simulated attach failure");
        let _ = io::stdout().flush();
        std::process::exit(1);
    }

    println!("OK");
    let _ = io::stdout().flush();

    if args.die_after_attach_index == Some(args.index) {
        std::process::exit(0);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if line.trim() == "STOP" {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
