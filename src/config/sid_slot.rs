// sid_slot.rs
use std::sync::{Arc, OnceLock};

/// Process-wide SAP system id. Pre-filled from configuration, otherwise
/// written once by the first instance that reports its SID.
///
/// Best effort: later instances reporting a different SID are not reconciled.
#[derive(Debug, Clone, Default)]
pub struct SidSlot(Arc<OnceLock<String>>);

impl SidSlot {
    pub fn new(configured: &str) -> Self {
        let slot = SidSlot::default();
        if !configured.is_empty() {
            let _ = slot.0.set(configured.to_string());
        }
        slot
    }

    pub fn get(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }

    /// Returns true when this call filled the slot.
    pub fn fill(&self, sid: &str) -> bool {
        if sid.is_empty() {
            return false;
        }
        self.0.set(sid.to_string()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let slot = SidSlot::new("");
        assert_eq!(slot.get(), None);
        assert!(!slot.fill(""));
        assert!(slot.fill("PRD"));
        assert!(!slot.fill("QAS"));
        assert_eq!(slot.clone().get(), Some("PRD"));
    }

    #[test]
    fn test_configured_sid_is_kept() {
        let slot = SidSlot::new("DEV");
        assert!(!slot.fill("PRD"));
        assert_eq!(slot.get(), Some("DEV"));
    }
}
