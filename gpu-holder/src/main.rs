//! The holder: a tiny standalone process that keeps one GPU occupied for
//! the lifetime of a reservation, spawned by `holder-supervisor`.
//!
//! Protocol with the parent: write one status line to stdout (`OK` or
//! `ERR <message>`) before blocking, then wait for a `STOP` line (or EOF)
//! on stdin before exiting.

use std::io::{self, BufRead, Write};

use structopt::StructOpt;

/// Fraction of currently-free memory a non-exclusive holder allocates to
/// squat on the device.
const ALLOC_FRACTION: f64 = 0.7;

#[derive(Debug, StructOpt)]
#[structopt(name = "gpu-holder")]
struct CliArgs {
    /// Device index to attach to.
    #[structopt(long)]
    index: u32,

    /// Exclusive reservations rely on the allocator's compute-mode flip
    /// for exclusivity, so the holder itself skips the memory squat.
    #[structopt(long)]
    exclusive: bool,
}

fn report_ok() {
    println!("OK");
    let _ = io::stdout().flush();
}

fn report_err(message: &str) -> ! {
    println!("ERR {}", message);
    let _ = io::stdout().flush();
    std::process::exit(1);
}

/// Allocate `ALLOC_FRACTION` of the device's currently-free memory and
/// leak it for the life of the process — the non-exclusive holder's whole
/// job is to keep that memory unavailable to anyone else.
fn occupy_non_exclusive(index: u32) -> Result<(), String> {
    let nvml = nvml_wrapper::Nvml::init().map_err(|e| e.to_string())?;
    let device = nvml.device_by_index(index).map_err(|e| e.to_string())?;
    let mem_info = device.memory_info().map_err(|e| e.to_string())?;
    let alloc_bytes = (mem_info.free as f64 * ALLOC_FRACTION) as usize;

    let cuda_device =
        cudarc::driver::CudaDevice::new(index as usize).map_err(|e| e.to_string())?;
    let buffer = cuda_device
        .alloc_zeros::<u8>(alloc_bytes)
        .map_err(|e| e.to_string())?;
    // Leaked for the process lifetime: this is the occupation.
    std::mem::forget(buffer);
    Ok(())
}

/// Exclusive holders rely on the compute-mode flip performed by the
/// allocator before spawn; this process only needs to confirm the device
/// exists and is reachable, then block.
fn attach_exclusive(index: u32) -> Result<(), String> {
    let nvml = nvml_wrapper::Nvml::init().map_err(|e| e.to_string())?;
    nvml.device_by_index(index).map_err(|e| e.to_string())?;
    Ok(())
}

fn wait_for_shutdown() {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // parent closed stdin (or died): exit
            Ok(_) => {
                if line.trim() == "STOP" {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn main() {
    let args = CliArgs::from_args();

    let result = if args.exclusive {
        attach_exclusive(args.index)
    } else {
        occupy_non_exclusive(args.index)
    };

    match result {
        Ok(()) => report_ok(),
        Err(message) => report_err(&message),
    }

    wait_for_shutdown();
}
