//! Flash example: push firmware binaries to a device over YMODEM
//!
//! The device must already be in listening mode (blinking blue) or waiting
//! for a YMODEM transfer. Each file is sent in order as one batch.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example flash -- --port /dev/ttyACM0 system-part1.bin tinker.bin
//! ```
//!
//! With 1024-byte blocks and the legacy `binary` header name:
//! ```bash
//! cargo run --example flash -- --port /dev/ttyACM0 --block 1024 --name binary tinker.bin
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use ferriflash::transport::{FLASH_BAUD_RATE, SerialConfig, SerialTransport};
use ferriflash::{YModem, YModemConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=trace to see every control byte)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.files.is_empty() {
        eprintln!("Error: no files to flash");
        std::process::exit(1);
    }

    println!("Opening {} at {} baud...", args.port, args.baud);
    let port = SerialTransport::open(&SerialConfig::new(&args.port).baud_rate(args.baud))?;

    let mut config = YModemConfig::new().block_len(args.block);
    if let Some(name) = &args.name {
        config = config.header_name(name);
    }

    let mut ymodem = YModem::new(port, config)?;
    let started = Instant::now();

    match ymodem.send(&args.files).await {
        Ok(()) => {
            println!("Flash success! ({:?})", started.elapsed());
            Ok(())
        }
        Err(e) if e.is_timeout() => {
            eprintln!("{}", e);
            eprintln!("Serial timed out, please reconnect the device.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    port: String,
    baud: u32,
    block: usize,
    name: Option<String>,
    files: Vec<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut port = "/dev/ttyACM0".to_string();
        let mut baud = FLASH_BAUD_RATE;
        let mut block = 128usize;
        let mut name = None;
        let mut files = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].clone();
                    }
                }
                "--baud" | "-b" => {
                    i += 1;
                    if i < args.len() {
                        baud = args[i].parse().unwrap_or(FLASH_BAUD_RATE);
                    }
                }
                "--block" => {
                    i += 1;
                    if i < args.len() {
                        block = args[i].parse().unwrap_or(128);
                    }
                }
                "--name" | "-n" => {
                    i += 1;
                    if i < args.len() {
                        name = Some(args[i].clone());
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown argument: {}", other);
                }
                file => files.push(PathBuf::from(file)),
            }
            i += 1;
        }

        Self {
            port,
            baud,
            block,
            name,
            files,
        }
    }

    fn print_help() {
        println!(
            r#"ferriflash flash example

USAGE:
    cargo run --example flash -- [OPTIONS] <FILE>...

OPTIONS:
    -p, --port <PATH>        Serial device [default: /dev/ttyACM0]
    -b, --baud <RATE>        Baud rate [default: 28800]
    --block <LEN>            Block length, 128 or 1024 [default: 128]
    -n, --name <NAME>        Header name announced for every file
    --help                   Print this help message
"#
        );
    }
}
