use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub monitoring: MonitoringConfig,
}

/// Cadences, windows and caps of the monitoring engine.
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub health_check_interval: Duration,
    pub sweep_interval: Duration,
    pub retention_interval: Duration,
    pub metric_retention_days: i64,
    pub cooldown_retention: Duration,
    pub probe_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub stale_sweep_interval: Duration,
    pub stale_after: Duration,
    pub backfill_limit: usize,
    pub channel_capacity: usize,
    pub storage_cooldown: Duration,
    pub memory_cooldown: Duration,
    pub default_cooldown: Duration,
    pub alert_roles: Vec<String>,
    /// Probe name -> (warning, critical)
    pub threshold_overrides: HashMap<String, (f64, f64)>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(300),
            retention_interval: Duration::from_secs(24 * 3600),
            metric_retention_days: 30,
            cooldown_retention: Duration::from_secs(24 * 3600),
            probe_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            stale_sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(120),
            backfill_limit: 50,
            channel_capacity: 64,
            storage_cooldown: Duration::from_secs(5 * 60),
            memory_cooldown: Duration::from_secs(10 * 60),
            default_cooldown: Duration::from_secs(15 * 60),
            alert_roles: vec!["admin".to_string()],
            threshold_overrides: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            monitoring: MonitoringConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Storage not configured - monitoring will run against the in-memory store");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            health_check_interval: env_secs("MONITOR_HEALTH_CHECK_INTERVAL_SECS", defaults.health_check_interval),
            sweep_interval: env_secs("MONITOR_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            retention_interval: env_secs("MONITOR_RETENTION_INTERVAL_SECS", defaults.retention_interval),
            metric_retention_days: env_parse("MONITOR_METRIC_RETENTION_DAYS", defaults.metric_retention_days),
            cooldown_retention: env_secs("MONITOR_COOLDOWN_RETENTION_SECS", defaults.cooldown_retention),
            probe_timeout: env_secs("MONITOR_PROBE_TIMEOUT_SECS", defaults.probe_timeout),
            heartbeat_interval: env_secs("MONITOR_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            stale_sweep_interval: env_secs("MONITOR_STALE_SWEEP_INTERVAL_SECS", defaults.stale_sweep_interval),
            stale_after: env_secs("MONITOR_STALE_AFTER_SECS", defaults.stale_after),
            backfill_limit: env_parse("MONITOR_BACKFILL_LIMIT", defaults.backfill_limit),
            channel_capacity: env_parse("MONITOR_CHANNEL_CAPACITY", defaults.channel_capacity),
            storage_cooldown: env_secs("MONITOR_STORAGE_COOLDOWN_SECS", defaults.storage_cooldown),
            memory_cooldown: env_secs("MONITOR_MEMORY_COOLDOWN_SECS", defaults.memory_cooldown),
            default_cooldown: env_secs("MONITOR_DEFAULT_COOLDOWN_SECS", defaults.default_cooldown),
            alert_roles: env::var("MONITOR_ALERT_ROLES")
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.alert_roles),
            threshold_overrides: env::var("MONITOR_THRESHOLDS")
                .map(|raw| parse_threshold_overrides(&raw))
                .unwrap_or_default(),
        }
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Zero is rejected: every duration here is a timer period or a bound.
fn env_secs(key: &str, default: Duration) -> Duration {
    match env_parse(key, default.as_secs()) {
        0 => {
            warn!("{} must be greater than zero, using default {:?}", key, default);
            default
        }
        secs => Duration::from_secs(secs),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `name=warning:critical` pairs separated by commas. Malformed entries are
/// skipped with a warning.
pub fn parse_threshold_overrides(raw: &str) -> HashMap<String, (f64, f64)> {
    let mut overrides = HashMap::new();

    for entry in parse_list(raw) {
        let parsed = entry.split_once('=').and_then(|(name, bounds)| {
            let (warning, critical) = bounds.split_once(':')?;
            let warning = warning.trim().parse::<f64>().ok()?;
            let critical = critical.trim().parse::<f64>().ok()?;
            (warning <= critical).then(|| (name.trim().to_string(), (warning, critical)))
        });

        match parsed {
            Some((name, bounds)) => {
                overrides.insert(name, bounds);
            }
            None => warn!("Ignoring malformed threshold override {:?}", entry),
        }
    }

    overrides
}
