use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// How far past the start of an availability window a ride time may fall
    /// and still match. Policy knob, not a law of the domain.
    pub match_lookahead_hours: i64,
    pub availability_sweep_secs: u64,
    pub stale_ride_sweep_secs: u64,
    pub stalled_match_sweep_secs: u64,
    pub abandoned_match_sweep_secs: u64,
    pub reminder_sweep_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            match_lookahead_hours: 24,
            availability_sweep_secs: 300,
            stale_ride_sweep_secs: 60,
            stalled_match_sweep_secs: 1800,
            abandoned_match_sweep_secs: 3600,
            reminder_sweep_secs: 900,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Config::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            match_lookahead_hours: parse_or_default(
                "MATCH_LOOKAHEAD_HOURS",
                defaults.match_lookahead_hours,
            )?,
            availability_sweep_secs: parse_or_default(
                "AVAILABILITY_SWEEP_SECS",
                defaults.availability_sweep_secs,
            )?,
            stale_ride_sweep_secs: parse_or_default(
                "STALE_RIDE_SWEEP_SECS",
                defaults.stale_ride_sweep_secs,
            )?,
            stalled_match_sweep_secs: parse_or_default(
                "STALLED_MATCH_SWEEP_SECS",
                defaults.stalled_match_sweep_secs,
            )?,
            abandoned_match_sweep_secs: parse_or_default(
                "ABANDONED_MATCH_SWEEP_SECS",
                defaults.abandoned_match_sweep_secs,
            )?,
            reminder_sweep_secs: parse_or_default(
                "REMINDER_SWEEP_SECS",
                defaults.reminder_sweep_secs,
            )?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
