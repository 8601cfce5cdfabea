use super::model::{LearnStatus, ThermalCoefficients};
use super::ZoneBrain;
use crate::brain::Brain;
use crate::config::{DeviceId, ZoneConfig};
use crate::io::dummy_io_bundle::{new_dummy_io, DummyIOBundleHandle};
use crate::io::panel::{Submode, ThermostatMode};
use crate::io::temperatures::dummy::ModifyState;
use crate::io::temperatures::SensorReading;
use crate::io::IOBundle;
use crate::time_util::mytime::{DummyTimeProvider, TimeProvider};
use crate::time_util::test_utils::{date, time};
use chrono::{DateTime, TimeZone, Utc};
use tokio::runtime::{Builder, Runtime};

const INSIDE_SENSOR: DeviceId = DeviceId(101);
const OUTSIDE_SENSOR: DeviceId = DeviceId(103);
const SENSOR_TIMEOUT_MINUTES: i64 = 60;

fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date(2023, 1, 14).and_time(time(hour, minute, 0)))
}

fn zone_config(extra: &str) -> ZoneConfig {
    let config = format!(
        r#"
        inside_sensors = [101]
        outside_sensors = [103]
        heaters = [55]
        {}

        [panel]
        mode_idx = 1
        submode_idx = 2
        pause_idx = 3
        setpoint_normal_idx = 4
        setpoint_economy_idx = 5
        temp_display_idx = 6
        "#,
        extra
    );
    toml::from_str(&config).expect("Test zone config should parse")
}

struct TestEnv {
    brain: ZoneBrain,
    io_bundle: IOBundle,
    handle: DummyIOBundleHandle,
    time: DummyTimeProvider,
    rt: Runtime,
}

impl TestEnv {
    fn new(extra_config: &str) -> Self {
        let start = utc(10, 0);
        let (io_bundle, handle) =
            new_dummy_io(chrono::Duration::minutes(SENSOR_TIMEOUT_MINUTES));
        Self {
            brain: ZoneBrain::new(zone_config(extra_config), start),
            io_bundle,
            handle,
            time: DummyTimeProvider::new(start),
            rt: Builder::new_current_thread()
                .build()
                .expect("Expected to be able to make runtime"),
        }
    }

    fn tick(&mut self) {
        self.brain
            .run(&self.rt, &mut self.io_bundle, &self.time)
            .expect("Tick should not fail");
    }

    fn advance_and_tick(&mut self, duration: chrono::Duration) {
        self.time.advance(duration);
        self.tick();
    }

    /// Report an inside reading timestamped now.
    fn set_inside(&mut self, value: f32) {
        let now = self.time.get_utc_time();
        self.handle.send_temps(ModifyState::SetReading(SensorReading::new(
            INSIDE_SENSOR,
            value,
            now,
        )));
    }

    fn set_outside(&mut self, value: f32) {
        let now = self.time.get_utc_time();
        self.handle.send_temps(ModifyState::SetReading(SensorReading::new(
            OUTSIDE_SENSOR,
            value,
            now,
        )));
    }
}

#[test_log::test]
fn test_off_mode_switches_leftover_heating_off_once() {
    let mut env = TestEnv::new("");
    env.set_inside(19.0);
    env.set_outside(5.0);
    // Heating was switched on manually before we started.
    env.handle.heaters().set_on(true);

    env.tick();
    assert_eq!(env.handle.heaters().commands(), vec![false]);
    assert_eq!(env.handle.panel().get_displayed_temp(), Some(19.0));

    // Further ticks issue no redundant commands.
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().commands(), vec![false]);
}

#[test_log::test]
fn test_displayed_temperature_refreshes_in_off_mode() {
    let mut env = TestEnv::new("");
    env.set_inside(19.0);
    env.tick();
    assert_eq!(env.handle.panel().get_displayed_temp(), Some(19.0));

    env.time.advance(chrono::Duration::minutes(5));
    env.set_inside(18.0);
    env.tick();
    assert_eq!(env.handle.panel().get_displayed_temp(), Some(18.0));
    // Heaters were already off, so no command was ever needed.
    assert_eq!(env.handle.heaters().command_count(), 0);
}

#[test_log::test]
fn test_auto_mode_calculates_power_and_heat_duration() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);

    env.tick();
    // (20 - 19) * 60 + (20 - 5) * 1 = 75% of a 30 minute period = 23 minutes.
    assert_eq!(env.handle.heaters().commands(), vec![true]);
    assert!(env.brain.state.heating);
    assert_eq!(env.brain.state.end_heat, utc(10, 23));

    // Nothing more to do until the cycle ends.
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().commands(), vec![true]);
}

#[test_log::test]
fn test_heating_stops_at_end_of_cycle() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);

    env.tick();
    env.advance_and_tick(chrono::Duration::minutes(23));
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);
    assert!(!env.brain.state.heating);
}

#[test_log::test]
fn test_full_power_cycle_defers_switch_off() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(10.0);
    env.set_outside(5.0);

    env.tick();
    assert_eq!(env.brain.state.end_heat, utc(10, 30));

    // The cycle ends at full power: leave the heaters on and let the next
    // calculation decide, avoiding an off/on flap.
    env.advance_and_tick(chrono::Duration::minutes(30));
    assert_eq!(env.handle.heaters().commands(), vec![true]);
    assert!(!env.brain.state.heating);

    // The next calculation finds no heating needed and switches off.
    env.time.advance(chrono::Duration::seconds(10));
    env.set_inside(21.0);
    env.set_outside(5.0);
    env.tick();
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);
}

#[test_log::test]
fn test_no_outside_reading_omits_loss_term() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);

    env.tick();
    // (20 - 19) * 60 = 60% of 30 minutes = 18 minutes.
    assert_eq!(env.handle.heaters().commands(), vec![true]);
    assert_eq!(env.brain.state.end_heat, utc(10, 18));
}

#[test_log::test]
fn test_economy_submode_uses_economy_setpoint() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.handle.panel().set_submode(Submode::Economy);
    env.handle.panel().set_setpoint_economy(18.0);
    env.set_inside(19.0);
    env.set_outside(5.0);

    env.tick();
    assert_eq!(env.brain.state.setpoint, 18.0);
    // Already warmer than the economy setpoint.
    assert_eq!(env.handle.heaters().commands(), vec![false]);
}

#[test_log::test]
fn test_boost_forces_full_power() {
    let mut env = TestEnv::new("boost_gap = 0.5");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);

    env.tick();
    // A deficit of 1.0 exceeds the boost gap, so full power for the whole
    // period instead of the computed 75%.
    assert_eq!(env.handle.heaters().commands(), vec![true]);
    assert_eq!(env.brain.state.end_heat, utc(10, 30));
}

#[test_log::test]
fn test_pause_request_shorter_than_delay_is_ignored() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();

    env.handle.panel().set_pause_requested(true);
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::seconds(60));
    assert!(!env.brain.state.paused);

    // Withdrawn before the on-delay elapsed, so the pause never engages.
    env.handle.panel().set_pause_requested(false);
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::minutes(5));
    assert!(!env.brain.state.paused);
    assert_eq!(env.handle.heaters().commands(), vec![true]);
}

#[test_log::test]
fn test_pause_engages_after_delay_and_recalculates_on_release() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();

    env.handle.panel().set_pause_requested(true);
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::minutes(2));
    assert!(env.brain.state.paused);
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);

    env.handle.panel().set_pause_requested(false);
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::minutes(1));
    assert!(!env.brain.state.paused);

    // Coming out of a pause forces a fresh calculation on the next tick.
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().commands(), vec![true, false, true]);
}

#[test_log::test]
fn test_pause_suppresses_calculation_but_refreshes_temps() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();

    env.handle.panel().set_pause_requested(true);
    env.advance_and_tick(chrono::Duration::seconds(10));
    env.advance_and_tick(chrono::Duration::minutes(2));
    assert!(env.brain.state.paused);

    // Well past the next calculation time, but paused: no calculation, only
    // a temperature refresh.
    env.time.advance(chrono::Duration::minutes(30));
    env.set_inside(18.5);
    env.tick();
    assert_eq!(env.handle.panel().get_displayed_temp(), Some(18.5));
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);
    assert!(env.brain.state.paused);
}

#[test_log::test]
fn test_forced_mode_runs_for_duration_then_reverts_to_auto() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Forced);
    env.set_inside(19.0);
    env.set_outside(5.0);

    env.tick();
    assert_eq!(env.handle.heaters().commands(), vec![true]);
    assert_eq!(env.brain.state.end_heat, utc(11, 0));

    env.advance_and_tick(chrono::Duration::minutes(30));
    assert_eq!(env.handle.heaters().commands(), vec![true]);

    // Expiry: heat off and the mode register written back to auto.
    env.time.advance(chrono::Duration::minutes(30));
    env.set_inside(19.5);
    env.set_outside(5.0);
    env.tick();
    assert_eq!(env.handle.panel().get_mode(), ThermostatMode::Auto);
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);

    // The next tick picks up the mode change and recalculates immediately.
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().last_command(), Some(true));
}

#[test_log::test]
fn test_switching_out_of_forced_mode_stops_heating() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Forced);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();
    assert_eq!(env.handle.heaters().commands(), vec![true]);

    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert!(!env.brain.state.forced);
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);

    // Auto then calculates on the following tick.
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().commands(), vec![true, false, true]);
}

#[test_log::test]
fn test_mode_change_to_off_stops_heating() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();
    assert_eq!(env.handle.heaters().commands(), vec![true]);

    env.handle.panel().set_mode(ThermostatMode::Off);
    env.advance_and_tick(chrono::Duration::seconds(10));
    assert_eq!(env.handle.heaters().commands(), vec![true, false]);
}

#[test_log::test]
fn test_setpoint_change_forces_recalc_without_learning() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();

    // Temperature has risen, so a calibration here would adjust the inside
    // gain. The manual setpoint change must prevent that.
    env.time.advance(chrono::Duration::minutes(5));
    env.set_inside(19.4);
    env.handle.panel().set_setpoint_normal(22.0);
    env.tick();

    assert_eq!(env.brain.state.setpoint, 22.0);
    assert_eq!(env.brain.model.get_coefficients().get_const_c(), 60.0);
    assert_eq!(env.brain.model.get_coefficients().get_nb_cc(), 0);
    assert!(!env.brain.state.skip_next_learn);
    assert_eq!(env.handle.heaters().last_command(), Some(true));
}

#[test_log::test]
fn test_inside_sensor_timeout_latches_error_once_and_recovers() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    // Last heard from two hours ago, well past the one hour threshold.
    env.handle.send_temps(ModifyState::SetReading(SensorReading::new(
        INSIDE_SENSOR,
        19.0,
        utc(8, 0),
    )));
    env.set_outside(5.0);

    env.tick();
    assert!(env.brain.state.inside_temp_error);
    assert_eq!(env.handle.heaters().commands(), vec![false]);
    assert!(env.handle.panel().get_register_error());
    assert_eq!(env.handle.panel().get_error_write_count(), 1);

    // Still no valid reading at the next calculation: no repeated commands.
    env.advance_and_tick(chrono::Duration::minutes(30));
    assert_eq!(env.handle.heaters().commands(), vec![false]);
    assert_eq!(env.handle.panel().get_error_write_count(), 1);

    // A fresh reading clears the error exactly once and heating resumes.
    env.time.advance(chrono::Duration::minutes(30));
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();
    assert!(!env.brain.state.inside_temp_error);
    assert!(!env.handle.panel().get_register_error());
    assert_eq!(env.handle.panel().get_error_write_count(), 2);
    assert_eq!(env.handle.heaters().commands(), vec![false, true]);
}

#[test_log::test]
fn test_thermal_model_persisted_and_reloaded() {
    let mut env = TestEnv::new("");
    env.handle.panel().set_mode(ThermostatMode::Auto);
    env.set_inside(19.0);
    env.set_outside(5.0);
    env.tick();

    let stored = env
        .handle
        .store()
        .get("virtual_thermostat-thermal-model")
        .expect("Thermal model should have been persisted");
    let coefficients = ThermalCoefficients::from_stored(&stored);
    assert_eq!(coefficients.get_last_power(), 75.0);
    assert_eq!(coefficients.get_learn_status(), LearnStatus::Initialized);

    // A fresh brain picks the persisted model up at startup.
    let (mut io_bundle, handle) =
        new_dummy_io(chrono::Duration::minutes(SENSOR_TIMEOUT_MINUTES));
    handle.store().set("virtual_thermostat-thermal-model", &stored);
    let time = DummyTimeProvider::new(utc(12, 0));
    let rt = Builder::new_current_thread()
        .build()
        .expect("Expected to be able to make runtime");
    let mut brain = ZoneBrain::new(zone_config(""), utc(12, 0));
    brain
        .run(&rt, &mut io_bundle, &time)
        .expect("Tick should not fail");
    assert_eq!(brain.model.get_coefficients(), &coefficients);
}
