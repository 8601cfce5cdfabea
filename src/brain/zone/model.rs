use crate::config::{MinPowerPolicy, ZoneConfig};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const STORED_VERSION: u32 = 1;
const MAX_LEARN_SAMPLES: u32 = 50;

const DEFAULT_INSIDE_GAIN: f32 = 60.0;
const DEFAULT_OUTSIDE_LOSS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnStatus {
    Uninitialized,
    Initialized,
    Disabled,
}

/// The two learned coefficients of the linear thermal model, together with the
/// snapshot of the previous cycle that the next calibration step works from.
///
/// Persisted on the gateway as a versioned JSON record; anything unparseable
/// falls back to the defaults, which also resets learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalCoefficients {
    version: u32,
    /// Inside heating coefficient: power needed per degree of deficit.
    /// Depends on room size and heater strength.
    const_c: f32,
    /// Outside loss coefficient: extra power per degree of inside/outside
    /// difference. Depends on insulation.
    const_t: f32,
    nb_cc: u32,
    nb_ct: u32,
    last_power: f32,
    last_inside_temp: f32,
    last_outside_temp: Option<f32>,
    last_setpoint: f32,
    learn_status: LearnStatus,
}

impl Default for ThermalCoefficients {
    fn default() -> Self {
        Self {
            version: STORED_VERSION,
            const_c: DEFAULT_INSIDE_GAIN,
            const_t: DEFAULT_OUTSIDE_LOSS,
            nb_cc: 0,
            nb_ct: 0,
            last_power: 0.0,
            last_inside_temp: 0.0,
            last_outside_temp: None,
            last_setpoint: 20.0,
            learn_status: LearnStatus::Uninitialized,
        }
    }
}

impl ThermalCoefficients {
    /// Parse a stored record, falling back to defaults (and so resetting
    /// learning) if it is missing pieces, corrupt, or from a different
    /// version.
    pub fn from_stored(raw: &str) -> Self {
        match serde_json::from_str::<ThermalCoefficients>(raw) {
            Ok(coefficients) if coefficients.version == STORED_VERSION => coefficients,
            Ok(coefficients) => {
                warn!(
                    "Stored thermal model has version {} but we expected {} - using defaults",
                    coefficients.version, STORED_VERSION
                );
                ThermalCoefficients::default()
            }
            Err(err) => {
                warn!("Error parsing stored thermal model ({}) - using defaults", err);
                ThermalCoefficients::default()
            }
        }
    }

    pub fn to_stored(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn get_const_c(&self) -> f32 {
        self.const_c
    }

    pub fn get_const_t(&self) -> f32 {
        self.const_t
    }

    pub fn get_nb_cc(&self) -> u32 {
        self.nb_cc
    }

    pub fn get_nb_ct(&self) -> u32 {
        self.nb_ct
    }

    pub fn get_last_power(&self) -> f32 {
        self.last_power
    }

    pub fn get_learn_status(&self) -> LearnStatus {
        self.learn_status
    }
}

/// What a calculation decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub power: f32,
    pub heat_duration: chrono::Duration,
}

pub struct ThermalModel {
    coefficients: ThermalCoefficients,
}

impl ThermalModel {
    pub fn new(coefficients: ThermalCoefficients) -> Self {
        Self { coefficients }
    }

    pub fn get_coefficients(&self) -> &ThermalCoefficients {
        &self.coefficients
    }

    pub fn set_coefficients(&mut self, coefficients: ThermalCoefficients) {
        self.coefficients = coefficients;
    }

    pub fn learning_active(&self) -> bool {
        self.coefficients.learn_status != LearnStatus::Disabled
    }

    /// Compute the required heating power (in % of the calculation period) and
    /// the resulting heat duration. Runs auto-calibration first, off the
    /// previous cycle's snapshot, unless `learn` is false or the temperature
    /// has overshot the setpoint (neither yields a clean signal).
    pub fn calculate(
        &mut self,
        zone: &ZoneConfig,
        inside_temp: f32,
        outside_temp: Option<f32>,
        setpoint: f32,
        learn: bool,
        now: DateTime<Utc>,
        last_calc_at: DateTime<Utc>,
    ) -> Calculation {
        let overshoot = inside_temp > setpoint + zone.get_delta_max();
        let mut power = if overshoot {
            debug!("Temperature exceeds setpoint by more than {}: no heating", zone.get_delta_max());
            0.0
        } else {
            if learn {
                self.calibrate(zone, inside_temp, outside_temp, now, last_calc_at);
            }
            let deficit_term = (setpoint - inside_temp) * self.coefficients.const_c;
            let raw = match outside_temp {
                None => deficit_term,
                Some(outside) => deficit_term + (setpoint - outside) * self.coefficients.const_t,
            };
            round1(raw)
        };

        power = power.clamp(0.0, 100.0);

        let apply_floor = match zone.get_min_power_policy() {
            MinPowerPolicy::AlwaysApply => true,
            MinPowerPolicy::OnlyWhenHeatingNeeded => !overshoot,
        };
        if power <= zone.get_min_heat_power() && apply_floor {
            power = zone.get_min_heat_power();
        }

        if let Some(boost_gap) = zone.get_boost_gap() {
            if setpoint - inside_temp > boost_gap {
                debug!("Deficit of {:.1} exceeds boost gap {:.1}: full power", setpoint - inside_temp, boost_gap);
                power = 100.0;
            }
        }

        let heat_duration = chrono::Duration::minutes(
            (power * zone.get_calculate_period_minutes() as f32 / 100.0).round() as i64,
        );

        Calculation { power, heat_duration }
    }

    /// Adjust one of the two coefficients from how the previous cycle's
    /// prediction turned out, as a running weighted average over up to
    /// [MAX_LEARN_SAMPLES] learnings.
    fn calibrate(
        &mut self,
        zone: &ZoneConfig,
        inside_temp: f32,
        outside_temp: Option<f32>,
        now: DateTime<Utc>,
        last_calc_at: DateTime<Utc>,
    ) {
        let c = &mut self.coefficients;
        if c.learn_status != LearnStatus::Initialized {
            debug!("First pass at calibration... nothing to learn from yet");
            return;
        }
        if c.last_power == 0.0 {
            debug!("Last power was zero... no calibration");
            return;
        }
        if c.last_power == 100.0 && inside_temp < c.last_setpoint {
            debug!("Last power was 100% but setpoint not reached... no calibration");
            return;
        }

        // Ratio of time actually elapsed to the nominal cycle length, so a
        // late tick doesn't distort the learning.
        let elapsed_ratio = (now - last_calc_at).num_seconds() as f32
            / (zone.get_calculate_period_minutes() * 60) as f32;

        if inside_temp > c.last_inside_temp && c.last_setpoint > c.last_inside_temp {
            let candidate = c.const_c * (c.last_setpoint - c.last_inside_temp)
                / (inside_temp - c.last_inside_temp)
                * elapsed_ratio;
            info!("New learning for inside gain: {:.2}", candidate);
            c.const_c = round1((c.const_c * c.nb_cc as f32 + candidate) / (c.nb_cc + 1) as f32);
            c.nb_cc = (c.nb_cc + 1).min(MAX_LEARN_SAMPLES);
            info!("Inside gain updated to {}", c.const_c);
        } else if let (Some(_), Some(last_outside)) = (outside_temp, c.last_outside_temp) {
            if c.last_setpoint > last_outside {
                let candidate = c.const_t
                    + (c.last_setpoint - inside_temp) / (c.last_setpoint - last_outside)
                        * c.const_c
                        * elapsed_ratio;
                info!("New learning for outside loss: {:.2}", candidate);
                c.const_t = round1((c.const_t * c.nb_ct as f32 + candidate) / (c.nb_ct + 1) as f32);
                c.nb_ct = (c.nb_ct + 1).min(MAX_LEARN_SAMPLES);
                info!("Outside loss updated to {}", c.const_t);
            }
        }
    }

    /// Record this cycle's inputs and output as the basis for the next
    /// calibration step. Bootstraps learning on the first ever cycle.
    pub fn record_snapshot(
        &mut self,
        power: f32,
        inside_temp: f32,
        outside_temp: Option<f32>,
        setpoint: f32,
    ) {
        let c = &mut self.coefficients;
        c.last_power = power;
        c.last_inside_temp = inside_temp;
        c.last_outside_temp = outside_temp;
        c.last_setpoint = setpoint;
        c.learn_status = LearnStatus::Initialized;
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
