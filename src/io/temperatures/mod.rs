use crate::config::DeviceId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};

pub mod dummy;

/// One temperature sensor's latest value as known by the gateway, along with
/// when the gateway last heard from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    id: DeviceId,
    value: f32,
    last_update: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(id: DeviceId, value: f32, last_update: DateTime<Utc>) -> Self {
        Self {
            id,
            value,
            last_update,
        }
    }

    pub fn get_id(&self) -> DeviceId {
        self.id
    }

    pub fn get_value(&self) -> f32 {
        self.value
    }

    pub fn get_last_update(&self) -> &DateTime<Utc> {
        &self.last_update
    }
}

impl Display for SensorReading {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sensor {}: {:.1} (at {})", self.id, self.value, self.last_update)
    }
}

#[async_trait]
pub trait TemperatureManager: Send + Sync {
    /// Retrieve the latest readings for the given sensors. Sensors the gateway
    /// does not know about are simply absent from the result.
    async fn retrieve_readings(&self, sensors: &[DeviceId]) -> Result<Vec<SensorReading>, String>;

    /// The gateway wide threshold after which a sensor that hasn't reported
    /// is considered timed out.
    async fn get_timeout_threshold(&self) -> Result<chrono::Duration, String>;
}
