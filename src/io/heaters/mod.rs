use crate::brain::BrainFailure;
use async_trait::async_trait;

pub mod dummy;

/// Commands the zone's heater switch(es). All heaters in the zone are
/// interchangeable and always commanded together.
///
/// A failure here means the commanded state of the heaters is unknown, which
/// is the one thing this system cannot tolerate silently, hence the
/// [BrainFailure] rather than a soft error.
#[async_trait]
pub trait HeaterControl: Send + Sync {
    /// Whether any heater in the zone currently reports being on.
    async fn try_get_heaters(&self) -> Result<bool, String>;

    async fn try_set_heaters(&mut self, on: bool) -> Result<(), BrainFailure>;
}
