pub mod dummy;
pub mod dummy_io_bundle;
pub mod gateway;
pub mod heaters;
pub mod panel;
pub mod store;
pub mod temperatures;

use crate::io::heaters::HeaterControl;
use crate::io::panel::PanelView;
use crate::io::store::StateStore;
use crate::io::temperatures::TemperatureManager;

pub struct IOBundle {
    temperature_manager: Box<dyn TemperatureManager>,
    heater_control: Box<dyn HeaterControl>,
    panel: Box<dyn PanelView>,
    store: Box<dyn StateStore>,
}

impl IOBundle {
    pub fn new(
        temperature_manager: impl TemperatureManager + 'static,
        heater_control: impl HeaterControl + 'static,
        panel: impl PanelView + 'static,
        store: impl StateStore + 'static,
    ) -> IOBundle {
        IOBundle {
            temperature_manager: Box::new(temperature_manager),
            heater_control: Box::new(heater_control),
            panel: Box::new(panel),
            store: Box::new(store),
        }
    }

    pub fn temperature_manager(&self) -> &dyn TemperatureManager {
        &*self.temperature_manager
    }

    pub fn heater_control(&mut self) -> &mut dyn HeaterControl {
        &mut *self.heater_control
    }

    pub fn panel(&self) -> &dyn PanelView {
        &*self.panel
    }

    pub fn store(&self) -> &dyn StateStore {
        &*self.store
    }
}
