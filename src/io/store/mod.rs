use async_trait::async_trait;

pub mod dummy;

/// Named opaque values persisted by the gateway across restarts. The thermal
/// model's learned coefficients live here.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the raw stored value, or None if the variable doesn't exist yet.
    async fn load_variable(&self, name: &str) -> Result<Option<String>, String>;

    /// Create or overwrite the variable.
    async fn save_variable(&self, name: &str, value: &str) -> Result<(), String>;
}
