#![forbid(unsafe_code)]

//! `chardev-client` — line echo client for the `chardev` device.
//!
//! Opens the device once, then for a fixed number of lines writes each line
//! from standard input and immediately reads the device back, printing the
//! text and its reported letter count.

use std::io;

use clap::Parser;

use chardev::client::{run_echo_loop, DeviceClient, DEFAULT_ITERATIONS};
use chardev::device::DEVICE_NAME;

#[derive(Debug, Parser)]
#[command(
    name = "chardev-client",
    about = "Write lines to the chardev device and print what it echoes",
    version,
    long_about = None
)]
struct Cli {
    /// Name the device is published under (must match the host's `device_name`).
    #[arg(long, default_value = DEVICE_NAME)]
    device_name: String,

    /// Number of write/read rounds before closing the device.
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
}

fn main() {
    let args = Cli::parse();
    let device_path = format!("/dev/{}", args.device_name);

    let mut device = match DeviceClient::open(&args.device_name) {
        Ok(device) => device,
        Err(err) => {
            eprintln!("open {device_path}: {err}");
            eprintln!("Is chardev running with device_name '{}'?", args.device_name);
            std::process::exit(1);
        }
    };

    println!("Writing to {device_path}: ");

    let result = run_echo_loop(
        &mut device,
        &device_path,
        io::stdin().lock(),
        io::stdout().lock(),
        io::stderr().lock(),
        args.iterations,
    );

    if let Err(err) = result {
        eprintln!("{device_path}: {err}");
        std::process::exit(1);
    }

    if let Err(err) = device.close() {
        eprintln!("close {device_path}: {err}");
        std::process::exit(1);
    }
}
