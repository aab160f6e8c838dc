//! Command-line device listing and event monitor

use anyhow::{Context, Result};
use colored::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use humidi::{Device, DeviceRegistry, MidiFacade};

/// Print the registry as colored, human-readable sections
pub fn print_registry(registry: &DeviceRegistry) {
    println!("\n{}", "=== MIDI Devices ===".bold().cyan());
    print_section("Input Ports:", &registry.inputs);
    print_section("Output Ports:", &registry.outputs);
    println!();
}

/// Print the registry as pretty JSON
pub fn print_registry_json(registry: &DeviceRegistry) -> Result<()> {
    let json =
        serde_json::to_string_pretty(registry).context("Failed to serialize device registry")?;
    println!("{}", json);
    Ok(())
}

fn print_section(title: &str, devices: &[Device]) {
    println!("\n{}", title.bold());
    if devices.is_empty() {
        println!("  {}", "No ports found".dimmed());
        return;
    }

    for device in devices {
        println!("  {}", describe_device(device));
    }
}

fn describe_device(device: &Device) -> String {
    let marker = if device.is_open() {
        "[OPEN]  ".green()
    } else {
        "[CLOSED]".dimmed()
    };

    match &device.manufacturer {
        Some(manufacturer) => format!(
            "{} {} ({}) {}",
            marker,
            device.display_name(),
            manufacturer,
            device.id.dimmed()
        ),
        None => format!("{} {} {}", marker, device.display_name(), device.id.dimmed()),
    }
}

fn timestamp(start: Instant) -> ColoredString {
    format!("[{:>8}ms]", start.elapsed().as_millis()).dimmed()
}

fn format_note_on(key: i16, velocity: u8) -> String {
    format!(
        "{} key {} velocity {}",
        "NOTE ON ".green(),
        key.to_string().bright_white(),
        velocity.to_string().yellow()
    )
}

fn format_note_off(key: i16) -> String {
    format!("{} key {}", "NOTE OFF".red(), key.to_string().bright_white())
}

fn format_device_change(registry: &DeviceRegistry) -> String {
    format!(
        "{} {} inputs, {} outputs",
        "DEVICES ".cyan(),
        registry.inputs.len(),
        registry.outputs.len()
    )
}

/// Print note and device events until `shutdown` resolves
pub async fn run(facade: &MidiFacade, shutdown: impl Future<Output = ()>) {
    print_registry(&facade.device_registry());

    println!("{}", "Monitoring MIDI notes and devices...".green());
    println!("{}", "Press Ctrl+C to exit".dimmed());
    println!("{}\n", "─".repeat(60).dimmed());

    let start = Instant::now();
    let subscriptions = [
        facade.on_note_on(Arc::new(move |key, velocity| {
            println!("{} {}", timestamp(start), format_note_on(key, velocity));
        })),
        facade.on_note_off(Arc::new(move |key| {
            println!("{} {}", timestamp(start), format_note_off(key));
        })),
        facade.on_device_change(Arc::new(move |registry| {
            println!("{} {}", timestamp(start), format_device_change(&registry));
            for device in registry.inputs.iter().chain(registry.outputs.iter()) {
                println!("             {}", describe_device(device));
            }
        })),
    ];

    shutdown.await;

    for subscription in subscriptions {
        facade.unsubscribe(subscription);
    }
}
