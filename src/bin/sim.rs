//! Cabin simulation - publishes scripted vision pipeline messages
//!
//! Drives the monitor without cameras or models by publishing synthetic
//! frame/behaviour/object/weapon messages over MQTT. Passenger embeddings
//! are deterministic one-hot vectors, so the matching enrollment file (see
//! --write-enrollment) makes the boarding phases resolve to real identities.
//!
//! Phases:
//! 1. empty    - nobody aboard
//! 2. boarding - every passenger in their assigned seat
//! 3. swap     - the first two passengers switch seats
//! 4. intruder - an unenrolled face appears in the last seat
//!
//! Usage:
//!   cargo run --bin cabin-sim -- --write-enrollment config/passengers.json
//!   cargo run --bin cabin-sim

use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use std::time::Duration;

const EMBEDDING_DIM: usize = 128;

/// Simulated passengers: (name, assigned seat)
const PASSENGERS: [(&str, &str); 4] =
    [("Asha", "A1"), ("Bram", "A2"), ("Chloe", "B1"), ("Dev", "B2")];

#[derive(Parser, Debug)]
#[command(name = "cabin-sim")]
#[command(about = "Cabin simulator publishing synthetic vision messages")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Topic the monitor subscribes to
    #[arg(long, default_value = "cabin/vision")]
    topic: String,

    /// Milliseconds between cycles
    #[arg(long, default_value = "200")]
    cycle_ms: u64,

    /// Cycles per scenario phase
    #[arg(long, default_value = "15")]
    phase_cycles: u64,

    /// Write the matching enrollment file and exit
    #[arg(long)]
    write_enrollment: Option<String>,
}

/// Deterministic one-hot embedding for passenger `index`
fn embedding_for(index: usize) -> Vec<f64> {
    let mut embedding = vec![0.0; EMBEDDING_DIM];
    embedding[index % EMBEDDING_DIM] = 1.0;
    embedding
}

/// An embedding no enrolled passenger is near
fn intruder_embedding() -> Vec<f64> {
    let mut embedding = vec![0.0; EMBEDDING_DIM];
    embedding[EMBEDDING_DIM - 1] = 1.0;
    embedding
}

fn write_enrollment(path: &str) -> std::io::Result<()> {
    let records: Vec<serde_json::Value> = PASSENGERS
        .iter()
        .enumerate()
        .map(|(i, (name, seat))| {
            json!({ "name": name, "seat": seat, "embedding": embedding_for(i) })
        })
        .collect();

    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    println!("enrollment written to {}", path);
    Ok(())
}

/// Seat -> embeddings for one phase of the scenario
fn seats_for_phase(phase: usize) -> serde_json::Value {
    match phase {
        // Phase 1: empty cabin
        0 => json!({
            "A1": {"embeddings": []},
            "A2": {"embeddings": []},
            "B1": {"embeddings": []},
            "B2": {"embeddings": []},
        }),
        // Phase 2: everyone seated correctly
        1 => json!({
            "A1": {"embeddings": [embedding_for(0)]},
            "A2": {"embeddings": [embedding_for(1)]},
            "B1": {"embeddings": [embedding_for(2)]},
            "B2": {"embeddings": [embedding_for(3)]},
        }),
        // Phase 3: first two passengers swapped
        2 => json!({
            "A1": {"embeddings": [embedding_for(1)]},
            "A2": {"embeddings": [embedding_for(0)]},
            "B1": {"embeddings": [embedding_for(2)]},
            "B2": {"embeddings": [embedding_for(3)]},
        }),
        // Phase 4: intruder in the last seat
        _ => json!({
            "A1": {"embeddings": [embedding_for(0)]},
            "A2": {"embeddings": [embedding_for(1)]},
            "B1": {"embeddings": [embedding_for(2)]},
            "B2": {"embeddings": [intruder_embedding()]},
        }),
    }
}

fn phase_name(phase: usize) -> &'static str {
    match phase {
        0 => "empty",
        1 => "boarding",
        2 => "swap",
        _ => "intruder",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.write_enrollment {
        write_enrollment(&path)?;
        return Ok(());
    }

    let mut mqttoptions =
        MqttOptions::new("cabin-sim", args.mqtt_host.clone(), args.mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

    // Drive the MQTT eventloop in the background
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                eprintln!("mqtt error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    println!(
        "publishing to {}:{} topic {} ({} cycles per phase, {}ms apart)",
        args.mqtt_host, args.mqtt_port, args.topic, args.phase_cycles, args.cycle_ms
    );

    let mut interval = tokio::time::interval(Duration::from_millis(args.cycle_ms));
    let mut cycle: u64 = 0;

    for phase in 0..4 {
        println!("phase: {}", phase_name(phase));

        for _ in 0..args.phase_cycles {
            interval.tick().await;
            cycle += 1;

            let frame = json!({
                "type": "frame",
                "cycle": cycle,
                "seats": seats_for_phase(phase),
            });
            client.publish(&args.topic, QoS::AtMostOnce, false, frame.to_string()).await?;

            // Sprinkle channel observations the way the detector models would
            if cycle % 3 == 0 {
                let behaviour = json!({
                    "type": "behaviour",
                    "seat": "A1",
                    "label": if phase == 3 { "Aggressive" } else { "Non-Aggressive" },
                });
                client
                    .publish(&args.topic, QoS::AtMostOnce, false, behaviour.to_string())
                    .await?;
            }

            if cycle % 5 == 0 {
                let objects = json!({
                    "type": "objects",
                    "channel": "B1",
                    "labels": if phase >= 2 { vec!["bottle", "laptop"] } else { vec!["bottle"] },
                });
                client
                    .publish(&args.topic, QoS::AtMostOnce, false, objects.to_string())
                    .await?;

                let weapon = json!({ "type": "weapon", "present": phase == 3 });
                client
                    .publish(&args.topic, QoS::AtMostOnce, false, weapon.to_string())
                    .await?;
            }
        }
    }

    // Let the eventloop flush outstanding publishes
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("scenario complete ({} cycles)", cycle);

    Ok(())
}
