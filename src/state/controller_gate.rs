//! Controller flag shared between the API and the sync bridge

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

/// Whether this process may publish authoritative timer state.
///
/// Clones share the same flag. Nothing here elects a controller; whoever
/// sets the flag is trusted to be the only one doing so for a session.
#[derive(Debug, Clone, Default)]
pub struct ControllerGate {
    enabled: Arc<AtomicBool>,
}

impl ControllerGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set_controller(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("Controller role {}", if enabled { "claimed" } else { "released" });
        }
    }

    pub fn is_controller(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let gate = ControllerGate::new(false);
        let other = gate.clone();
        other.set_controller(true);
        assert!(gate.is_controller());
        gate.set_controller(false);
        assert!(!other.is_controller());
    }
}
