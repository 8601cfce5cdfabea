use crate::config::DeviceId;
use crate::io;
use crate::io::dummy::DummyIO;
use crate::io::temperatures::{SensorReading, TemperatureManager};
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

pub enum ModifyState {
    SetReading(SensorReading),
    RemoveSensor(DeviceId),
    Clear,
}

pub struct Dummy {
    receiver: Mutex<Receiver<ModifyState>>,
    readings: Mutex<RefCell<HashMap<DeviceId, SensorReading>>>,
    timeout_threshold: chrono::Duration,
}

#[async_trait]
impl TemperatureManager for Dummy {
    async fn retrieve_readings(&self, sensors: &[DeviceId]) -> Result<Vec<SensorReading>, String> {
        self.update_state();
        let guard = self.readings.lock().unwrap();
        let map = guard.borrow();
        Ok(sensors.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn get_timeout_threshold(&self) -> Result<chrono::Duration, String> {
        Ok(self.timeout_threshold)
    }
}

impl DummyIO for Dummy {
    type MessageType = ModifyState;
    type Config = chrono::Duration;

    fn new(receiver: Receiver<Self::MessageType>, config: &Self::Config) -> Self {
        Dummy {
            receiver: Mutex::new(receiver),
            readings: Mutex::new(RefCell::new(HashMap::new())),
            timeout_threshold: *config,
        }
    }
}

impl Dummy {
    fn update_state(&self) {
        let guard = self.receiver.lock().unwrap();
        io::dummy::read_all(&*guard, |message| match message {
            ModifyState::SetReading(reading) => {
                self.readings
                    .lock()
                    .unwrap()
                    .borrow_mut()
                    .insert(reading.get_id(), reading);
            }
            ModifyState::RemoveSensor(id) => {
                self.readings.lock().unwrap().borrow_mut().remove(&id);
            }
            ModifyState::Clear => {
                self.readings.lock().unwrap().borrow_mut().clear();
            }
        })
    }
}
