// =============================================================================
// Ingest load test tool
// =============================================================================
// Sends JSON telemetry samples to the ingest server's /v1/telemetry endpoint
// at a configurable rate and reports acceptance/rejection counts.
// =============================================================================

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "ingest-loadtest")]
#[command(about = "Load test tool for the telemetry ingest server")]
struct Args {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Samples per second
    #[arg(long, default_value_t = 100)]
    rate: u32,

    /// Duration in seconds
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Number of distinct simulated devices
    #[arg(long, default_value_t = 10)]
    devices: usize,

    /// Center latitude
    #[arg(long, default_value_t = 41.0)]
    lat: f64,

    /// Center longitude
    #[arg(long, default_value_t = 29.0)]
    lon: f64,
}

struct Counters {
    sent: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    rate_limited: AtomicU64,
    queue_full: AtomicU64,
    network_error: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            network_error: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryPayload {
    device_id: String,
    latitude: f64,
    longitude: f64,
    timestamp: chrono::DateTime<Utc>,
}

fn build_sample(rng: &mut impl Rng, device_id: &str, lat: f64, lon: f64) -> TelemetryPayload {
    TelemetryPayload {
        device_id: device_id.to_string(),
        latitude: lat + rng.gen_range(-0.01..0.01),
        longitude: lon + rng.gen_range(-0.01..0.01),
        timestamp: Utc::now(),
    }
}

fn main() {
    let args = Args::parse();

    println!("=== Ingest Load Test ===");
    println!("Target:   {}/v1/telemetry", args.url);
    println!("Rate:     {} samples/s", args.rate);
    println!("Duration: {}s", args.duration);
    println!("Devices:  {}", args.devices);
    println!("Center:   lat={} lon={}", args.lat, args.lon);
    println!();

    let device_ids: Vec<String> = (0..args.devices).map(|i| format!("loadtest-{i}")).collect();

    let health_url = format!("{}/health", args.url);
    match reqwest::blocking::get(&health_url) {
        Ok(r) if r.status().is_success() => println!("Server health: OK"),
        Ok(r) => {
            eprintln!("Server health check failed: {}", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Cannot reach server: {}", e);
            std::process::exit(1);
        }
    }

    let counters = Arc::new(Counters::new());
    let ingest_url = format!("{}/v1/telemetry", args.url);

    let interval = Duration::from_micros(1_000_000 / args.rate as u64);
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    println!("\nSending...\n");
    let start = Instant::now();

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let mut rng = rand::thread_rng();
    let mut tick = 0u64;

    while Instant::now() < deadline {
        let device_idx = (tick as usize) % device_ids.len();
        let payload = build_sample(&mut rng, &device_ids[device_idx], args.lat, args.lon);

        let req_start = Instant::now();
        counters.sent.fetch_add(1, Ordering::Relaxed);

        match client.post(&ingest_url).json(&payload).send() {
            Ok(resp) => {
                let lat = req_start.elapsed().as_micros() as u64;
                counters.latency_sum_us.fetch_add(lat, Ordering::Relaxed);

                match resp.status().as_u16() {
                    200 | 201 | 202 => {
                        counters.accepted.fetch_add(1, Ordering::Relaxed);
                    }
                    400 => {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    429 => {
                        counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                    }
                    503 => {
                        counters.queue_full.fetch_add(1, Ordering::Relaxed);
                    }
                    other => {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                        if tick < 5 {
                            eprintln!("Unexpected status: {}", other);
                        }
                    }
                }
            }
            Err(_) => {
                counters.network_error.fetch_add(1, Ordering::Relaxed);
            }
        }

        tick += 1;

        if tick % 500 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let sent = counters.sent.load(Ordering::Relaxed);
            println!(
                "  [{:.1}s] sent={} accepted={} rejected={} rate_limited={} queue_full={} err={} ({:.0} samples/s)",
                elapsed,
                sent,
                counters.accepted.load(Ordering::Relaxed),
                counters.rejected.load(Ordering::Relaxed),
                counters.rate_limited.load(Ordering::Relaxed),
                counters.queue_full.load(Ordering::Relaxed),
                counters.network_error.load(Ordering::Relaxed),
                sent as f64 / elapsed,
            );
        }

        let target = Duration::from_micros(tick * interval.as_micros() as u64);
        let actual = start.elapsed();
        if actual < target {
            std::thread::sleep(target - actual);
        }
    }

    let elapsed = start.elapsed();
    let sent = counters.sent.load(Ordering::Relaxed);
    let accepted = counters.accepted.load(Ordering::Relaxed);
    let avg_lat = if sent > 0 {
        counters.latency_sum_us.load(Ordering::Relaxed) / sent
    } else {
        0
    };

    println!("\n=== Results ===");
    println!("Duration:     {:.2}s", elapsed.as_secs_f64());
    println!("Total sent:   {}", sent);
    println!("Accepted:     {} ({:.1}%)", accepted, accepted as f64 / sent.max(1) as f64 * 100.0);
    println!("Rejected:     {}", counters.rejected.load(Ordering::Relaxed));
    println!("Rate limited: {}", counters.rate_limited.load(Ordering::Relaxed));
    println!("Queue full:   {}", counters.queue_full.load(Ordering::Relaxed));
    println!("Net errors:   {}", counters.network_error.load(Ordering::Relaxed));
    println!("Avg latency:  {} us", avg_lat);
    println!("Throughput:   {:.1} samples/s", sent as f64 / elapsed.as_secs_f64());
}
