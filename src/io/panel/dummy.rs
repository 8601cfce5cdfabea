use crate::io::panel::{PanelState, PanelView, Submode, ThermostatMode};
use async_trait::async_trait;
use log::debug;
use std::sync::{Arc, Mutex};

pub struct DummyPanel {
    state: Arc<Mutex<PanelState>>,
    displayed_temp: Arc<Mutex<Option<f32>>>,
    register_error: Arc<Mutex<bool>>,
    error_writes: Arc<Mutex<u32>>,
}

/// Shared view of the dummy panel: tests mutate the user registers through
/// this and inspect what the brain wrote back.
#[derive(Clone)]
pub struct DummyPanelHandle {
    state: Arc<Mutex<PanelState>>,
    displayed_temp: Arc<Mutex<Option<f32>>>,
    register_error: Arc<Mutex<bool>>,
    error_writes: Arc<Mutex<u32>>,
}

impl DummyPanel {
    pub fn create() -> (Self, DummyPanelHandle) {
        let state = Arc::new(Mutex::new(PanelState {
            mode: ThermostatMode::Off,
            submode: Submode::Normal,
            pause_requested: false,
            setpoint_normal: 20.0,
            setpoint_economy: 20.0,
        }));
        let displayed_temp = Arc::new(Mutex::new(None));
        let register_error = Arc::new(Mutex::new(false));
        let error_writes = Arc::new(Mutex::new(0));
        (
            Self {
                state: state.clone(),
                displayed_temp: displayed_temp.clone(),
                register_error: register_error.clone(),
                error_writes: error_writes.clone(),
            },
            DummyPanelHandle {
                state,
                displayed_temp,
                register_error,
                error_writes,
            },
        )
    }
}

impl DummyPanelHandle {
    pub fn set_mode(&self, mode: ThermostatMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn set_submode(&self, submode: Submode) {
        self.state.lock().unwrap().submode = submode;
    }

    pub fn set_pause_requested(&self, requested: bool) {
        self.state.lock().unwrap().pause_requested = requested;
    }

    pub fn set_setpoint_normal(&self, setpoint: f32) {
        self.state.lock().unwrap().setpoint_normal = setpoint;
    }

    pub fn set_setpoint_economy(&self, setpoint: f32) {
        self.state.lock().unwrap().setpoint_economy = setpoint;
    }

    pub fn get_mode(&self) -> ThermostatMode {
        self.state.lock().unwrap().mode
    }

    pub fn get_displayed_temp(&self) -> Option<f32> {
        *self.displayed_temp.lock().unwrap()
    }

    pub fn get_register_error(&self) -> bool {
        *self.register_error.lock().unwrap()
    }

    pub fn get_error_write_count(&self) -> u32 {
        *self.error_writes.lock().unwrap()
    }
}

#[async_trait]
impl PanelView for DummyPanel {
    async fn read_panel(&self) -> Result<PanelState, String> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn update_temperature(&self, value: f32) -> Result<(), String> {
        debug!("Panel temperature display set to {:.1}", value);
        *self.displayed_temp.lock().unwrap() = Some(value);
        Ok(())
    }

    async fn set_mode(&self, mode: ThermostatMode) -> Result<(), String> {
        debug!("Panel mode register set to {}", mode);
        self.state.lock().unwrap().mode = mode;
        Ok(())
    }

    async fn set_register_error(&self, error: bool) -> Result<(), String> {
        *self.register_error.lock().unwrap() = error;
        *self.error_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn refresh_setpoints(&self) -> Result<(), String> {
        Ok(())
    }
}
