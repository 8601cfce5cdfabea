use crate::io::store::StateStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct DummyStore {
    variables: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Clone, Default)]
pub struct DummyStoreHandle {
    variables: Arc<Mutex<HashMap<String, String>>>,
}

impl DummyStore {
    pub fn create() -> (Self, DummyStoreHandle) {
        let variables = Arc::new(Mutex::new(HashMap::new()));
        (
            Self {
                variables: variables.clone(),
            },
            DummyStoreHandle { variables },
        )
    }
}

impl DummyStoreHandle {
    pub fn get(&self, name: &str) -> Option<String> {
        self.variables.lock().unwrap().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.variables
            .lock()
            .unwrap()
            .insert(name.to_owned(), value.to_owned());
    }
}

#[async_trait]
impl StateStore for DummyStore {
    async fn load_variable(&self, name: &str) -> Result<Option<String>, String> {
        Ok(self.variables.lock().unwrap().get(name).cloned())
    }

    async fn save_variable(&self, name: &str, value: &str) -> Result<(), String> {
        self.variables
            .lock()
            .unwrap()
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }
}
