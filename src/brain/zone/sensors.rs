use crate::config::DeviceId;
use crate::io::temperatures::SensorReading;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::collections::HashMap;

/// Tracks which sensors are currently responding so that timeout/recovery is
/// reported exactly once per transition, not on every tick.
#[derive(Default)]
pub struct SensorHealth {
    active: HashMap<DeviceId, bool>,
}

impl SensorHealth {
    /// Note the latest observed state of a sensor. Returns the new state if it
    /// changed, None while it is unchanged.
    pub fn note(&mut self, id: DeviceId, active: bool) -> Option<bool> {
        let previous = self.active.insert(id, active).unwrap_or(true);
        if previous != active {
            return Some(active);
        }
        None
    }

    #[cfg(test)]
    pub fn is_active(&self, id: DeviceId) -> Option<bool> {
        self.active.get(&id).copied()
    }
}

/// Average the readings that have not timed out, rounded to one decimal.
/// Returns None when no valid reading exists. Timeout/recovery edges are
/// logged through [SensorHealth].
pub fn average_valid(
    readings: &[SensorReading],
    now: DateTime<Utc>,
    timeout_threshold: chrono::Duration,
    health: &mut SensorHealth,
) -> Option<f32> {
    let mut valid = Vec::new();
    for reading in readings {
        let timed_out = *reading.get_last_update() + timeout_threshold < now;
        match health.note(reading.get_id(), !timed_out) {
            Some(false) => error!("Temperature sensor {} timed out, skipping it", reading.get_id()),
            Some(true) => info!("Temperature sensor {} is reporting again", reading.get_id()),
            None => {}
        }
        if !timed_out {
            valid.push(reading.get_value());
        }
    }
    if valid.is_empty() {
        return None;
    }
    let average = valid.iter().sum::<f32>() / valid.len() as f32;
    Some((average * 10.0).round() / 10.0)
}
