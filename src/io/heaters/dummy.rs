use crate::brain::BrainFailure;
use crate::io::heaters::HeaterControl;
use async_trait::async_trait;
use log::debug;
use std::sync::{Arc, Mutex};

/// Records every command issued so tests can assert both the final state and
/// that no redundant commands were sent.
pub struct DummyHeaters {
    on: Arc<Mutex<bool>>,
    commands: Arc<Mutex<Vec<bool>>>,
}

#[derive(Clone)]
pub struct DummyHeatersHandle {
    on: Arc<Mutex<bool>>,
    commands: Arc<Mutex<Vec<bool>>>,
}

impl DummyHeaters {
    pub fn create() -> (Self, DummyHeatersHandle) {
        let on = Arc::new(Mutex::new(false));
        let commands = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                on: on.clone(),
                commands: commands.clone(),
            },
            DummyHeatersHandle { on, commands },
        )
    }
}

impl DummyHeatersHandle {
    pub fn is_on(&self) -> bool {
        *self.on.lock().unwrap()
    }

    pub fn set_on(&self, on: bool) {
        *self.on.lock().unwrap() = on;
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    pub fn last_command(&self) -> Option<bool> {
        self.commands.lock().unwrap().last().copied()
    }

    pub fn commands(&self) -> Vec<bool> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeaterControl for DummyHeaters {
    async fn try_get_heaters(&self) -> Result<bool, String> {
        Ok(*self.on.lock().unwrap())
    }

    async fn try_set_heaters(&mut self, on: bool) -> Result<(), BrainFailure> {
        debug!("Set heaters to {}", if on { "On" } else { "Off" });
        *self.on.lock().unwrap() = on;
        self.commands.lock().unwrap().push(on);
        Ok(())
    }
}
