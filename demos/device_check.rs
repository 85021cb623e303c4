// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Check an outlet by switching it off and on again.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example device_check -- tasmota <address> [<username> <password>]
//! cargo run --example device_check -- tuya <address> <device_id> <local_key> [<version>]
//! ```
//!
//! # Example
//!
//! ```bash
//! RUST_LOG=psucontrol_outlet=debug \
//!     cargo run --example device_check -- tuya 192.168.1.60 bf0123456789abcdefgh 0123456789abcdef 3.4
//! ```

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use psucontrol_outlet::types::ProtocolParams;
use psucontrol_outlet::{Device, PowerSwitch};
use tracing_subscriber::EnvFilter;

const SETTLE_TIME: Duration = Duration::from_secs(2);

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {program} tasmota <address> [<username> <password>]");
    eprintln!("  {program} tuya <address> <device_id> <local_key> [<version>]");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  cargo run --example device_check -- tasmota 192.168.1.50 admin secret");
}

fn parse_args(args: &[String]) -> Option<(String, String, ProtocolParams)> {
    let protocol = args.get(1)?.to_lowercase();
    let address = args.get(2)?.clone();
    let rest = &args[3..];

    let params = match (protocol.as_str(), rest) {
        ("tasmota", []) => ProtocolParams::default(),
        ("tasmota", [username, password]) => ProtocolParams {
            username: username.clone(),
            password: password.clone(),
            ..ProtocolParams::default()
        },
        ("tuya", [device_id, local_key]) => ProtocolParams {
            device_id: device_id.clone(),
            local_key: local_key.clone(),
            ..ProtocolParams::default()
        },
        ("tuya", [device_id, local_key, version]) => ProtocolParams {
            device_id: device_id.clone(),
            local_key: local_key.clone(),
            version: version.clone(),
            ..ProtocolParams::default()
        },
        _ => return None,
    };
    Some((protocol, address, params))
}

fn state_name(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

async fn switch_and_verify(device: &mut Device, on: bool) -> psucontrol_outlet::Result<()> {
    println!("Turning {}...", state_name(on));
    device.set_status(on).await?;
    tokio::time::sleep(SETTLE_TIME).await;

    let actual = device.get_status().await?;
    if actual == on {
        println!("  verified: outlet is {}", state_name(actual));
    } else {
        println!(
            "  WARNING: expected {}, outlet reports {}",
            state_name(on),
            state_name(actual)
        );
    }
    Ok(())
}

async fn run(protocol: &str, address: &str, params: &ProtocolParams) -> psucontrol_outlet::Result<()> {
    println!("Connecting to {protocol} outlet at {address}...");
    let mut device = Device::construct(protocol, address, params).await?;
    println!("Connected ({})", device.protocol());

    let initial = device.get_status().await?;
    println!("Current state: {}", state_name(initial));

    switch_and_verify(&mut device, false).await?;
    switch_and_verify(&mut device, true).await?;
    Ok(())
}

fn troubleshooting(protocol: &str) {
    eprintln!();
    eprintln!("Troubleshooting:");
    eprintln!("  1. Check the outlet is powered and on the same network");
    eprintln!("  2. Check the address (ping it)");
    if protocol == "tuya" {
        eprintln!("  3. Check the device id and the 16-character local key");
        eprintln!("  4. Try another protocol version (3.1, 3.3, 3.4 or 3.5)");
        eprintln!("  5. Close the vendor app, some outlets accept a single local client");
    } else {
        eprintln!("  3. Open http://<address>/ in a browser and check the web UI answers");
        eprintln!("  4. Check the web admin username and password, if one is set");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let Some((protocol, address, params)) = parse_args(&args) else {
        usage(args.first().map_or("device_check", String::as_str));
        return ExitCode::FAILURE;
    };

    match run(&protocol, &address, &params).await {
        Ok(()) => {
            println!();
            println!("Outlet check passed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!();
            eprintln!("Outlet check failed: {e}");
            troubleshooting(&protocol);
            ExitCode::FAILURE
        }
    }
}
