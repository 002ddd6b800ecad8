//! Device info example: query a listening-mode device
//!
//! Prints the device id, system firmware version and MAC address, and
//! reports whether the firmware accepts claim codes.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example device_info -- /dev/ttyACM0
//! ```

use std::env;

use ferriflash::DeviceConsole;
use ferriflash::transport::{SerialConfig, SerialTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = env::args().nth(1).unwrap_or_else(|| "/dev/ttyACM0".to_string());

    let port = SerialTransport::open(&SerialConfig::new(&path))?;
    let mut console = DeviceConsole::new(port);

    let identity = console.device_id().await?;
    println!("Your device id is {}", identity.id);
    if let Some(imei) = &identity.imei {
        println!("Your IMEI is {}", imei);
    }
    if let Some(iccid) = &identity.iccid {
        println!("Your ICCID is {}", iccid);
    }

    match console.system_firmware_version().await {
        Ok(version) => println!("System firmware version: {}", version),
        Err(e) => eprintln!("Could not read firmware version: {}", e),
    }

    match console.mac_address().await {
        Ok(mac) => println!("Your device MAC address is {}", mac),
        Err(e) => eprintln!("Could not read MAC address: {}", e),
    }

    let claimable = console.supports_claim_code().await?;
    println!("Claim codes supported: {}", claimable);

    Ok(())
}
