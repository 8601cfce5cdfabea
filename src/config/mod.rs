use log::warn;
use serde::Deserialize;
use serde_with::serde_as;
use serde_with::DurationSeconds;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::time::Duration;

/// Identifier of a device within the home automation gateway.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Clone)]
pub struct Config {
    gateway: GatewayConfig,
    zone: ZoneConfig,
}

impl Config {
    pub fn get_gateway(&self) -> &GatewayConfig {
        &self.gateway
    }

    pub fn get_zone(&self) -> &ZoneConfig {
        &self.zone
    }

    /// Clamp any out of range tuning values to usable ones, logging what was changed.
    /// A bad value must never stop the control loop from starting.
    pub fn sanitise(&mut self) {
        self.zone.sanitise();
    }
}

/// The unit that setpoints are entered in on the host UI.
/// Conversion to celsius happens at the gateway boundary, never later.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn to_celsius(&self, value: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) / 1.8,
        }
    }
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct GatewayConfig {
    ip: IpAddr,
    port: u16,
    #[serde(default)]
    unit: TemperatureUnit,
    /// How long to wait (in seconds) for a gateway API request before giving up
    /// and retrying on the next tick.
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(3)
}

impl GatewayConfig {
    pub fn get_ip(&self) -> &IpAddr {
        &self.ip
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn get_request_timeout(&self) -> Duration {
        self.request_timeout_secs
    }
}

/// Whether the minimum heat power floor applies even when no heating is
/// needed. Keeping high thermal inertia systems (e.g. heated floors) warm
/// requires applying it always.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MinPowerPolicy {
    AlwaysApply,
    #[default]
    OnlyWhenHeatingNeeded,
}

#[derive(Deserialize, Clone)]
pub struct ZoneConfig {
    /// Name of the zone, used to key this zone's persisted state on the
    /// gateway.
    #[serde(default = "default_zone_name")]
    name: String,
    /// Inside temperature sensor device ids. At least one is required for the
    /// zone to ever heat.
    inside_sensors: Vec<DeviceId>,
    /// Outside temperature sensor device ids. May be empty - the outside term
    /// of the model is then simply omitted.
    #[serde(default)]
    outside_sensors: Vec<DeviceId>,
    /// Heater switch device ids. All are commanded together.
    heaters: Vec<DeviceId>,
    panel: PanelConfig,
    #[serde(default = "default_calculate_period")]
    calculate_period_minutes: i64,
    #[serde(default)]
    min_heat_power: f32,
    #[serde(default = "default_pause_on_delay")]
    pause_on_delay_minutes: i64,
    #[serde(default = "default_pause_off_delay")]
    pause_off_delay_minutes: i64,
    #[serde(default = "default_forced_duration")]
    forced_duration_minutes: i64,
    /// Allowed temperature excess over the setpoint before heating (and
    /// learning) is suppressed entirely.
    #[serde(default = "default_delta_max")]
    delta_max: f32,
    #[serde(default)]
    min_power_policy: MinPowerPolicy,
    /// If set, force 100% power whenever the inside temperature is more than
    /// this far below the setpoint.
    #[serde(default)]
    boost_gap: Option<f32>,
    /// How often to refresh the displayed temperature when no calculation is
    /// driving refreshes (Off / Forced / paused).
    #[serde(default = "default_temp_refresh")]
    temp_refresh_minutes: i64,
}

fn default_zone_name() -> String {
    "virtual_thermostat".to_owned()
}

fn default_calculate_period() -> i64 {
    30
}

fn default_pause_on_delay() -> i64 {
    2
}

fn default_pause_off_delay() -> i64 {
    1
}

fn default_forced_duration() -> i64 {
    60
}

fn default_delta_max() -> f32 {
    0.2
}

fn default_temp_refresh() -> i64 {
    5
}

const MIN_CALCULATE_PERIOD_MINUTES: i64 = 5;
const MIN_FORCED_DURATION_MINUTES: i64 = 30;

impl ZoneConfig {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_inside_sensors(&self) -> &[DeviceId] {
        &self.inside_sensors
    }

    pub fn get_outside_sensors(&self) -> &[DeviceId] {
        &self.outside_sensors
    }

    pub fn get_heaters(&self) -> &[DeviceId] {
        &self.heaters
    }

    pub fn get_panel(&self) -> &PanelConfig {
        &self.panel
    }

    pub fn get_calculate_period_minutes(&self) -> i64 {
        self.calculate_period_minutes
    }

    pub fn get_calculate_period(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.calculate_period_minutes)
    }

    pub fn get_min_heat_power(&self) -> f32 {
        self.min_heat_power
    }

    pub fn get_pause_on_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pause_on_delay_minutes)
    }

    pub fn get_pause_off_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pause_off_delay_minutes)
    }

    pub fn get_forced_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.forced_duration_minutes)
    }

    pub fn get_delta_max(&self) -> f32 {
        self.delta_max
    }

    pub fn get_min_power_policy(&self) -> MinPowerPolicy {
        self.min_power_policy
    }

    pub fn get_boost_gap(&self) -> Option<f32> {
        self.boost_gap
    }

    pub fn get_temp_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.temp_refresh_minutes)
    }

    fn sanitise(&mut self) {
        if self.calculate_period_minutes < MIN_CALCULATE_PERIOD_MINUTES {
            warn!(
                "Invalid calculation period {} - using minimum of {} minutes",
                self.calculate_period_minutes, MIN_CALCULATE_PERIOD_MINUTES
            );
            self.calculate_period_minutes = MIN_CALCULATE_PERIOD_MINUTES;
        }
        if self.min_heat_power > 100.0 {
            warn!(
                "Invalid minimum heating power {} - using maximum of 100%",
                self.min_heat_power
            );
            self.min_heat_power = 100.0;
        }
        if self.min_heat_power < 0.0 {
            warn!(
                "Invalid minimum heating power {} - using 0%",
                self.min_heat_power
            );
            self.min_heat_power = 0.0;
        }
        if self.forced_duration_minutes < MIN_FORCED_DURATION_MINUTES {
            warn!(
                "Invalid forced mode duration {} - using minimum of {} minutes",
                self.forced_duration_minutes, MIN_FORCED_DURATION_MINUTES
            );
            self.forced_duration_minutes = MIN_FORCED_DURATION_MINUTES;
        }
        if self.temp_refresh_minutes < 1 {
            warn!(
                "Invalid temperature refresh interval {} - using 1 minute",
                self.temp_refresh_minutes
            );
            self.temp_refresh_minutes = 1;
        }
    }
}

/// The gateway device ids of the host facing registers that make up the zone's
/// control panel.
#[derive(Deserialize, Clone)]
pub struct PanelConfig {
    mode_idx: DeviceId,
    submode_idx: DeviceId,
    pause_idx: DeviceId,
    setpoint_normal_idx: DeviceId,
    setpoint_economy_idx: DeviceId,
    temp_display_idx: DeviceId,
}

impl PanelConfig {
    pub fn get_mode_idx(&self) -> DeviceId {
        self.mode_idx
    }

    pub fn get_submode_idx(&self) -> DeviceId {
        self.submode_idx
    }

    pub fn get_pause_idx(&self) -> DeviceId {
        self.pause_idx
    }

    pub fn get_setpoint_normal_idx(&self) -> DeviceId {
        self.setpoint_normal_idx
    }

    pub fn get_setpoint_economy_idx(&self) -> DeviceId {
        self.setpoint_economy_idx
    }

    pub fn get_temp_display_idx(&self) -> DeviceId {
        self.temp_display_idx
    }
}
