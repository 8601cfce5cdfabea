use crate::brain::{Brain, BrainFailure};
use crate::config::ZoneConfig;
use crate::io::panel::{PanelState, ThermostatMode};
use crate::io::IOBundle;
use crate::time_util::mytime::TimeProvider;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::runtime::Runtime;

use self::model::{ThermalCoefficients, ThermalModel};
use self::sensors::SensorHealth;
use self::state::ThermostatState;

pub mod model;
pub mod sensors;
pub mod state;

#[cfg(test)]
mod test;

/// The controller for one heating zone.
///
/// Everything is driven from [Brain::run], called on the host's heartbeat:
/// user commands are detected by diffing the panel registers against the
/// previous sample, then the mode state machine advances. All state is owned
/// here - there are no ambient globals.
pub struct ZoneBrain {
    zone_config: ZoneConfig,
    store_variable: String,
    state: ThermostatState,
    model: ThermalModel,
    health: SensorHealth,
    last_panel: Option<PanelState>,
    started: bool,
}

impl ZoneBrain {
    pub fn new(zone_config: ZoneConfig, start_time: DateTime<Utc>) -> Self {
        let store_variable = format!("{}-thermal-model", zone_config.get_name());
        Self {
            zone_config,
            store_variable,
            state: ThermostatState::new(start_time),
            model: ThermalModel::new(ThermalCoefficients::default()),
            health: SensorHealth::default(),
            last_panel: None,
            started: false,
        }
    }

    fn load_coefficients(&mut self, rt: &Runtime, io_bundle: &IOBundle) {
        match rt.block_on(io_bundle.store().load_variable(&self.store_variable)) {
            Ok(Some(raw)) => {
                let coefficients = ThermalCoefficients::from_stored(&raw);
                info!(
                    "Loaded thermal model: inside gain {}, outside loss {}",
                    coefficients.get_const_c(),
                    coefficients.get_const_t()
                );
                self.model.set_coefficients(coefficients);
            }
            Ok(None) => {
                info!("No persisted thermal model found - starting with defaults");
                self.persist_coefficients(rt, io_bundle);
            }
            Err(err) => {
                warn!("Failed to load persisted thermal model: {} - using defaults", err);
            }
        }
    }

    fn persist_coefficients(&self, rt: &Runtime, io_bundle: &IOBundle) {
        let stored = match self.model.get_coefficients().to_stored() {
            Ok(stored) => stored,
            Err(err) => {
                error!("Failed to serialize thermal model: {}", err);
                return;
            }
        };
        if let Err(err) = rt.block_on(
            io_bundle
                .store()
                .save_variable(&self.store_variable, &stored),
        ) {
            error!("Failed to persist thermal model: {}", err);
        }
    }

    /// Fold the latest panel sample into our state, treating differences from
    /// the previous sample as user commands.
    fn apply_panel(&mut self, panel: &PanelState, now: DateTime<Utc>) {
        let last_panel = self.last_panel.clone();
        match &last_panel {
            None => {
                self.state.mode = panel.mode;
                self.state.submode = panel.submode;
                self.state.pause_requested = panel.pause_requested;
                self.state.setpoint = panel.setpoint_for(panel.submode);
            }
            Some(last) => {
                if panel.mode != last.mode {
                    info!("Mode changed from {} to {}", last.mode, panel.mode);
                    self.state.mode = panel.mode;
                    self.force_recalc_without_learning(now);
                }
                if panel.submode != last.submode {
                    info!("Submode changed from {} to {}", last.submode, panel.submode);
                    self.state.submode = panel.submode;
                    self.force_recalc_without_learning(now);
                }
                if panel.setpoint_normal != last.setpoint_normal
                    || panel.setpoint_economy != last.setpoint_economy
                {
                    info!(
                        "Setpoints changed to {:.1} (normal) / {:.1} (economy)",
                        panel.setpoint_normal, panel.setpoint_economy
                    );
                    self.force_recalc_without_learning(now);
                }
                if panel.pause_requested != last.pause_requested {
                    debug!("Pause request changed to {}", panel.pause_requested);
                    self.state.pause_requested = panel.pause_requested;
                    self.state.pause_changed_at = now;
                }
            }
        }
        self.last_panel = Some(panel.clone());
    }

    /// An interrupted cycle is not representative, so the next calculation
    /// must happen immediately and without calibrating.
    fn force_recalc_without_learning(&mut self, now: DateTime<Utc>) {
        self.state.next_calc_at = now;
        self.state.skip_next_learn = true;
    }

    fn tick_off(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        if self.state.forced || self.state.heating {
            self.state.forced = false;
            self.state.end_heat = now;
            debug!("Thermostat is off - switching heat off");
            self.switch_heat(false, rt, io_bundle)?;
        }

        if self.state.next_temps_at <= now {
            self.refresh_temps(now, rt, io_bundle)?;
        }
        Ok(())
    }

    fn tick_forced(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        if self.state.forced {
            if self.state.end_heat <= now {
                info!("Forced mode expired - reverting to auto");
                if let Err(err) = rt.block_on(io_bundle.panel().set_mode(ThermostatMode::Auto)) {
                    // Stay forced and retry on the next tick.
                    error!("Failed to write mode register: {}", err);
                    return Ok(());
                }
                self.state.forced = false;
                self.state.end_heat = now;
                self.state.mode = ThermostatMode::Auto;
                self.switch_heat(false, rt, io_bundle)?;
            }
        } else {
            self.state.forced = true;
            self.state.end_heat = now + self.zone_config.get_forced_duration();
            info!(
                "Forced mode on for {} minutes",
                self.zone_config.get_forced_duration().num_minutes()
            );
            self.switch_heat(true, rt, io_bundle)?;
        }

        if self.state.next_temps_at <= now {
            self.refresh_temps(now, rt, io_bundle)?;
        }
        Ok(())
    }

    fn tick_auto(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        if self.state.forced {
            // Mode was just switched out of forced.
            debug!("Cancelling forced mode");
            self.state.forced = false;
            self.state.end_heat = now;
            self.state.next_calc_at = now;
            self.switch_heat(false, rt, io_bundle)?;
        } else if (self.state.end_heat <= now || self.state.paused) && self.state.heating {
            // Heat cycle is over.
            self.state.end_heat = now;
            self.state.heating = false;
            if self.model.get_coefficients().get_last_power() < 100.0 {
                self.switch_heat(false, rt, io_bundle)?;
            }
            // If power was 100 (a full cycle), the next calculation decides
            // whether to switch off, avoiding a quick off/on to the heaters.
        } else if self.state.paused && !self.state.pause_requested {
            if self.state.pause_changed_at + self.zone_config.get_pause_off_delay() <= now {
                debug!("Pause is now off");
                self.state.paused = false;
                self.state.next_calc_at = now;
            }
        } else if !self.state.paused && self.state.pause_requested {
            if self.state.pause_changed_at + self.zone_config.get_pause_on_delay() <= now {
                debug!("Pause is now on");
                self.state.paused = true;
                self.switch_heat(false, rt, io_bundle)?;
            }
        } else if self.state.paused && self.state.next_temps_at <= now {
            // Keep the displayed temperature fresh even while paused.
            self.refresh_temps(now, rt, io_bundle)?;
        } else if self.state.next_calc_at <= now && !self.state.paused {
            self.calculate(now, rt, io_bundle)?;
        }
        Ok(())
    }

    fn calculate(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        self.state.next_calc_at = now + self.zone_config.get_calculate_period();
        debug!("Next calculation at {}", self.state.next_calc_at);

        if let Some(panel) = &self.last_panel {
            self.state.setpoint = panel.setpoint_for(self.state.submode);
        }

        self.refresh_temps(now, rt, io_bundle)?;

        let inside_temp = match self.state.inside_temp {
            Some(temp) if !self.state.inside_temp_error => temp,
            _ => {
                debug!("No valid inside temperature - skipping calculation");
                return Ok(());
            }
        };

        let learn = !self.state.skip_next_learn;
        if self.state.skip_next_learn {
            debug!("Skipping calibration - cycle was interrupted by a manual change");
            self.state.skip_next_learn = false;
        }

        let calc = self.model.calculate(
            &self.zone_config,
            inside_temp,
            self.state.outside_temp,
            self.state.setpoint,
            learn,
            now,
            self.state.last_calc_at,
        );
        info!(
            "Calculation: power = {}% -> heat duration = {} minutes",
            calc.power,
            calc.heat_duration.num_minutes()
        );

        if calc.power == 0.0 {
            debug!("No heating required");
            self.switch_heat(false, rt, io_bundle)?;
        } else {
            self.state.end_heat = now + calc.heat_duration;
            debug!("End of heat cycle at {}", self.state.end_heat);
            self.switch_heat(true, rt, io_bundle)?;
            if self.model.learning_active() {
                self.model.record_snapshot(
                    calc.power,
                    inside_temp,
                    self.state.outside_temp,
                    self.state.setpoint,
                );
                self.persist_coefficients(rt, io_bundle);
            }
        }

        self.state.last_calc_at = now;
        Ok(())
    }

    fn refresh_temps(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        self.state.next_temps_at = now + self.zone_config.get_temp_refresh_interval();

        let threshold = match rt.block_on(io_bundle.temperature_manager().get_timeout_threshold()) {
            Ok(threshold) => threshold,
            Err(err) => {
                error!("Failed to get sensor timeout threshold: {}", err);
                return Ok(());
            }
        };

        let inside_readings = match rt.block_on(
            io_bundle
                .temperature_manager()
                .retrieve_readings(self.zone_config.get_inside_sensors()),
        ) {
            Ok(readings) => readings,
            Err(err) => {
                error!("Error retrieving temperatures: {}", err);
                return Ok(());
            }
        };
        let outside_readings = match rt.block_on(
            io_bundle
                .temperature_manager()
                .retrieve_readings(self.zone_config.get_outside_sensors()),
        ) {
            Ok(readings) => readings,
            Err(err) => {
                error!("Error retrieving temperatures: {}", err);
                return Ok(());
            }
        };

        let inside = sensors::average_valid(&inside_readings, now, threshold, &mut self.health);
        // No outside readings is a supported configuration, not an error.
        self.state.outside_temp =
            sensors::average_valid(&outside_readings, now, threshold, &mut self.health);
        debug!(
            "Inside temperature = {:?}, outside temperature = {:?}",
            inside, self.state.outside_temp
        );

        match inside {
            Some(temp) => {
                self.state.inside_temp = Some(temp);
                if let Err(err) = rt.block_on(io_bundle.panel().update_temperature(temp)) {
                    error!("Failed to update temperature register: {}", err);
                }
                if self.state.inside_temp_error {
                    info!("Valid inside temperature again - resuming normal operation");
                    self.state.inside_temp_error = false;
                    if let Err(err) = rt.block_on(io_bundle.panel().set_register_error(false)) {
                        error!("Failed to clear register error flag: {}", err);
                    }
                }
            }
            None => {
                self.state.inside_temp = None;
                if !self.state.inside_temp_error {
                    error!("No valid inside temperature - suppressing heating");
                    self.state.inside_temp_error = true;
                    self.switch_heat(false, rt, io_bundle)?;
                    if let Err(err) = rt.block_on(io_bundle.panel().set_register_error(true)) {
                        error!("Failed to set register error flag: {}", err);
                    }
                }
            }
        }
        Ok(())
    }

    fn refresh_setpoint_registers(
        &mut self,
        now: DateTime<Utc>,
        rt: &Runtime,
        io_bundle: &IOBundle,
    ) {
        let threshold = match rt.block_on(io_bundle.temperature_manager().get_timeout_threshold()) {
            Ok(threshold) => threshold,
            Err(err) => {
                error!("Failed to get sensor timeout threshold: {}", err);
                self.state.next_setpoint_refresh_at = now + chrono::Duration::minutes(1);
                return;
            }
        };
        self.state.next_setpoint_refresh_at = now + threshold;
        if let Err(err) = rt.block_on(io_bundle.panel().refresh_setpoints()) {
            error!("Failed to refresh setpoint registers: {}", err);
        }
    }

    fn switch_heat(
        &mut self,
        on: bool,
        rt: &Runtime,
        io_bundle: &mut IOBundle,
    ) -> Result<(), BrainFailure> {
        self.state.heating = on;
        debug!("Heating {}", if on { "on" } else { "off" });
        rt.block_on(io_bundle.heater_control().try_set_heaters(on))
    }
}

impl Brain for ZoneBrain {
    fn run(
        &mut self,
        runtime: &Runtime,
        io_bundle: &mut IOBundle,
        time_provider: &impl TimeProvider,
    ) -> Result<(), BrainFailure> {
        let now = time_provider.get_utc_time();

        if !self.started {
            self.load_coefficients(runtime, io_bundle);
        }

        let panel = match runtime.block_on(io_bundle.panel().read_panel()) {
            Ok(panel) => panel,
            Err(err) => {
                // Retried naturally next tick.
                error!("Failed to read panel registers: {} - skipping tick", err);
                return Ok(());
            }
        };
        self.apply_panel(&panel, now);

        if !self.started {
            self.started = true;
            // Heating may have been switched on manually before we started.
            if self.state.mode == ThermostatMode::Off {
                match runtime.block_on(io_bundle.heater_control().try_get_heaters()) {
                    Ok(true) => {
                        info!("Heaters were left on - switching off");
                        self.switch_heat(false, runtime, io_bundle)?;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!("Could not read heater state ({}) - switching off to be safe", err);
                        self.switch_heat(false, runtime, io_bundle)?;
                    }
                }
            }
        }

        match self.state.mode {
            ThermostatMode::Off => self.tick_off(now, runtime, io_bundle)?,
            ThermostatMode::Forced => self.tick_forced(now, runtime, io_bundle)?,
            ThermostatMode::Auto => self.tick_auto(now, runtime, io_bundle)?,
        }

        if self.state.next_setpoint_refresh_at <= now {
            self.refresh_setpoint_registers(now, runtime, io_bundle);
        }

        Ok(())
    }
}
