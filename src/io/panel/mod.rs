use async_trait::async_trait;
use strum_macros::Display;

pub mod dummy;

/// The thermostat's operating mode as selected on the host UI.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatMode {
    Off,
    Auto,
    Forced,
}

/// Which setpoint register applies while in [ThermostatMode::Auto].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Submode {
    Normal,
    Economy,
}

/// A snapshot of every user controlled register, as sampled from the gateway.
/// Setpoints are always in celsius - unit conversion happens in the gateway
/// implementation, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub mode: ThermostatMode,
    pub submode: Submode,
    pub pause_requested: bool,
    pub setpoint_normal: f32,
    pub setpoint_economy: f32,
}

impl PanelState {
    pub fn setpoint_for(&self, submode: Submode) -> f32 {
        match submode {
            Submode::Normal => self.setpoint_normal,
            Submode::Economy => self.setpoint_economy,
        }
    }
}

/// The host facing registers the core renders its state through, and the
/// source of user commands (mode / submode / pause / setpoint changes are
/// detected by sampling this every tick).
#[async_trait]
pub trait PanelView: Send + Sync {
    async fn read_panel(&self) -> Result<PanelState, String>;

    /// Update the read-only temperature register shown on the host UI.
    async fn update_temperature(&self, value: f32) -> Result<(), String>;

    /// Write the mode register back, e.g. when forced mode expires into auto.
    async fn set_mode(&self, mode: ThermostatMode) -> Result<(), String>;

    /// Flag (or unflag) the mode and temperature registers as timed out on the
    /// host UI. Presentation only - does not affect control.
    async fn set_register_error(&self, error: bool) -> Result<(), String>;

    /// Re-touch the setpoint registers so the host doesn't style them stale.
    async fn refresh_setpoints(&self) -> Result<(), String>;
}
