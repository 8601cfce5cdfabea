use std::sync::mpsc::Sender;

use super::dummy::DummyIO;
use super::heaters::dummy::{DummyHeaters, DummyHeatersHandle};
use super::panel::dummy::{DummyPanel, DummyPanelHandle};
use super::store::dummy::{DummyStore, DummyStoreHandle};
use super::temperatures;
use super::IOBundle;

pub struct DummyIOBundleHandle {
    temp_handle: Sender<temperatures::dummy::ModifyState>,
    heater_handle: DummyHeatersHandle,
    panel_handle: DummyPanelHandle,
    store_handle: DummyStoreHandle,
}

impl DummyIOBundleHandle {
    pub fn send_temps(&mut self, msg: temperatures::dummy::ModifyState) {
        self.temp_handle.send(msg).unwrap();
    }

    pub fn heaters(&self) -> &DummyHeatersHandle {
        &self.heater_handle
    }

    pub fn panel(&self) -> &DummyPanelHandle {
        &self.panel_handle
    }

    pub fn store(&self) -> &DummyStoreHandle {
        &self.store_handle
    }
}

pub fn new_dummy_io(sensor_timeout: chrono::Duration) -> (IOBundle, DummyIOBundleHandle) {
    let (temp_manager, temp_handle) = temperatures::dummy::Dummy::create(&sensor_timeout);
    let (heaters, heater_handle) = DummyHeaters::create();
    let (panel, panel_handle) = DummyPanel::create();
    let (store, store_handle) = DummyStore::create();

    let io_bundle = IOBundle::new(temp_manager, heaters, panel, store);

    let handle = DummyIOBundleHandle {
        temp_handle,
        heater_handle,
        panel_handle,
        store_handle,
    };

    (io_bundle, handle)
}
