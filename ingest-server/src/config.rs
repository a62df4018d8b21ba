//! Configuration surface. All fields are optional in the environment and
//! fall back to the defaults below when unset.

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueFallback {
    Sync,
    Reject,
    Drop,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeoRegion {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    /// If true, the emitted alert message mentions "forbidden" (-> CRITICAL)
    /// rather than merely "restricted" (-> MEDIUM).
    pub forbidden: bool,
}

impl GeoRegion {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub workers: usize,
    pub fallback: QueueFallback,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            workers: 8,
            fallback: QueueFallback::Sync,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global_per_second: u32,
    pub address_per_minute: u32,
    pub address_burst_per_minute: u32,
    pub device_per_minute: u32,
    pub cache_max_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_per_second: 500,
            address_per_minute: 200,
            address_burst_per_minute: 20,
            device_per_minute: 100,
            cache_max_size: 100_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub speed_threshold_kmh: f64,
    pub speed_min_interval_seconds: f64,
    pub anomaly_extreme_latitude: f64,
    pub geofence_regions: Vec<GeoRegion>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            speed_threshold_kmh: 150.0,
            speed_min_interval_seconds: 30.0,
            anomaly_extreme_latitude: 80.0,
            geofence_regions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub queue: QueueConfig,
    pub ratelimit: RateLimitConfig,
    pub processors: ProcessorConfig,
    pub alert_retention_months: u32,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            ratelimit: RateLimitConfig::default(),
            processors: ProcessorConfig::default(),
            alert_retention_months: 3,
            port: 8080,
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to the
    /// defaults above for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("PORT") {
            if let Ok(p) = v.parse() {
                cfg.port = p;
            }
        }
        if let Ok(v) = std::env::var("INGEST_QUEUE_ENABLED") {
            cfg.queue.enabled = v.parse().unwrap_or(cfg.queue.enabled);
        }
        if let Ok(v) = std::env::var("INGEST_QUEUE_CAPACITY") {
            cfg.queue.capacity = v.parse().unwrap_or(cfg.queue.capacity);
        }
        if let Ok(v) = std::env::var("INGEST_QUEUE_WORKERS") {
            cfg.queue.workers = v.parse().unwrap_or(cfg.queue.workers);
        }
        if let Ok(v) = std::env::var("INGEST_QUEUE_FALLBACK") {
            cfg.queue.fallback = match v.to_ascii_lowercase().as_str() {
                "reject" => QueueFallback::Reject,
                "drop" => QueueFallback::Drop,
                _ => QueueFallback::Sync,
            };
        }
        if let Ok(v) = std::env::var("INGEST_RATELIMIT_ENABLED") {
            cfg.ratelimit.enabled = v.parse().unwrap_or(cfg.ratelimit.enabled);
        }
        if let Ok(v) = std::env::var("INGEST_RATELIMIT_GLOBAL_PER_SECOND") {
            cfg.ratelimit.global_per_second = v.parse().unwrap_or(cfg.ratelimit.global_per_second);
        }
        if let Ok(v) = std::env::var("INGEST_RATELIMIT_ADDRESS_PER_MINUTE") {
            cfg.ratelimit.address_per_minute =
                v.parse().unwrap_or(cfg.ratelimit.address_per_minute);
        }
        if let Ok(v) = std::env::var("INGEST_RATELIMIT_DEVICE_PER_MINUTE") {
            cfg.ratelimit.device_per_minute = v.parse().unwrap_or(cfg.ratelimit.device_per_minute);
        }
        if let Ok(v) = std::env::var("INGEST_GEOFENCE_REGIONS") {
            if let Ok(regions) = parse_regions(&v) {
                cfg.processors.geofence_regions = regions;
            }
        }

        cfg
    }
}

#[derive(Deserialize)]
struct RawRegion {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
    #[serde(default)]
    forbidden: bool,
}

fn parse_regions(json: &str) -> Result<Vec<GeoRegion>, serde_json::Error> {
    let raw: Vec<RawRegion> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|r| GeoRegion {
            min_lat: r.min_lat,
            max_lat: r.max_lat,
            min_lon: r.min_lon,
            max_lon: r.max_lon,
            forbidden: r.forbidden,
        })
        .collect())
}
