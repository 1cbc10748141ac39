// # Notifier Trait
//
// Delivers status-change events to an outside channel. The engine never
// calls a notifier directly: it publishes `EngineEvent::StatusChanged` and
// the embedding process forwards it.

use async_trait::async_trait;

use crate::events::StatusChange;

/// Trait for notifier implementations
///
/// Implementations decide per channel whether an event is worth delivering
/// (on-block / on-recover toggles) and how to format it.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one status change
    ///
    /// # Returns
    ///
    /// - `Ok(())`: delivered to every interested channel (or none was interested)
    /// - `Err(Error::Notifier)`: at least one delivery failed
    async fn notify(&self, change: &StatusChange) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn notifier_name(&self) -> &'static str;
}
