use crate::poller::{DelayLevel, LevelMode};
use std::env;
use std::time::Duration;

/// Scheduler configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: String,
    pub nats_url: String,
    pub port: u16,
    pub tick: Duration,
    pub levels: Vec<DelayLevel>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string());

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8092".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let tick_ms: u64 = env::var("SCHEDULER_TICK_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| "SCHEDULER_TICK_MS must be an integer".to_string())?;

        let levels_spec = env::var("SCHEDULER_LEVELS")
            .unwrap_or_else(|_| "delay_5s=5s,delay_1m=1m,delay_10m=10m".to_string());
        let levels = parse_levels(&levels_spec)?;

        Ok(Config {
            bus_type,
            nats_url,
            port,
            tick: Duration::from_millis(tick_ms),
            levels,
        })
    }
}

/// Parse a level list of the form
/// `delay_5s=5s,delay_1m=1m,delay_10m=10m,delay_at=timestamp`.
///
/// A duration value makes the level fixed-delay; the literal `timestamp`
/// makes it absolute-time. A level is one mode or the other, never both.
pub fn parse_levels(spec: &str) -> Result<Vec<DelayLevel>, String> {
    let mut levels: Vec<DelayLevel> = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("level entry {:?} is not name=value", entry))?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(format!("level entry {:?} has an empty name", entry));
        }
        if levels.iter().any(|l| l.name == name) {
            return Err(format!("duplicate delay level {:?}", name));
        }

        let mode = if value.eq_ignore_ascii_case("timestamp") {
            LevelMode::AbsoluteTimestamp
        } else {
            LevelMode::FixedDelay(parse_duration(value)?)
        };

        levels.push(DelayLevel {
            name: name.to_string(),
            mode,
        });
    }

    if levels.is_empty() {
        return Err("at least one delay level must be configured".to_string());
    }
    Ok(levels)
}

/// Parse `5s`, `1m`, `10m`, `2h`, or a bare number of seconds.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {:?}", value))?;
    if amount == 0 {
        return Err(format!("duration {:?} must be positive", value));
    }
    match unit {
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(format!("invalid duration unit in {:?}", value)),
    }
}
