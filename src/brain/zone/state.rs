use crate::io::panel::{Submode, ThermostatMode};
use chrono::{DateTime, Utc};

/// The live control state of one heating zone. Created at startup, mutated
/// every tick, never destroyed.
#[derive(Debug)]
pub struct ThermostatState {
    pub mode: ThermostatMode,
    pub submode: Submode,

    pub pause_requested: bool,
    pub paused: bool,
    /// When the pause request last changed, for debouncing.
    pub pause_changed_at: DateTime<Utc>,

    /// Whether the heaters are currently commanded on.
    pub heating: bool,
    pub forced: bool,
    /// End of the current heat cycle, or of forced mode while forced.
    pub end_heat: DateTime<Utc>,

    pub inside_temp: Option<f32>,
    pub outside_temp: Option<f32>,
    pub setpoint: f32,

    pub next_calc_at: DateTime<Utc>,
    pub next_temps_at: DateTime<Utc>,
    pub next_setpoint_refresh_at: DateTime<Utc>,
    pub last_calc_at: DateTime<Utc>,

    /// Latched while no valid inside reading exists. Cleared exactly once on
    /// recovery.
    pub inside_temp_error: bool,
    /// Set when a manual mode / submode / setpoint change makes the current
    /// cycle unrepresentative, so the next calculation must not calibrate.
    pub skip_next_learn: bool,
}

impl ThermostatState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            mode: ThermostatMode::Off,
            submode: Submode::Normal,
            pause_requested: false,
            paused: false,
            pause_changed_at: now,
            heating: false,
            forced: false,
            end_heat: now,
            inside_temp: None,
            outside_temp: None,
            setpoint: 20.0,
            next_calc_at: now,
            next_temps_at: now,
            next_setpoint_refresh_at: now,
            last_calc_at: now,
            inside_temp_error: false,
            skip_next_learn: false,
        }
    }
}
