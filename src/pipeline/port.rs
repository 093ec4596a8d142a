//! Per-processor table of named signals and slots.
//!
//! Each processor builds its [`Ports`] at construction. The toolbox resolves
//! `processor:port` addresses against these tables, and [`PortDescriptor`]s
//! describe them for listings.

use std::any::Any;
use std::collections::BTreeMap;

use super::signal::{Signal, SignalPort, Signature};
use super::slot::{Slot, SlotRef};

/// Whether a port emits or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Signal,
    Slot,
}

/// Description of one port, for listings and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub signature: Signature,
    pub queueing: bool,
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.direction {
            PortDirection::Signal => "signal",
            PortDirection::Slot if self.queueing => "slot (queueing)",
            PortDirection::Slot => "slot",
        };
        write!(f, "{} {}: {}", kind, self.name, self.signature)
    }
}

/// Named signals and slots of one processor.
#[derive(Debug, Default)]
pub struct Ports {
    signals: BTreeMap<String, SignalPort>,
    slots: BTreeMap<String, SlotRef>,
}

impl Ports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a signal named `name`, returning the typed handle
    /// the processor emits through. Re-using a name replaces the old signal.
    pub fn signal<A: Any + Send + Sync>(&mut self, name: &str) -> Signal<A> {
        let signal = Signal::new(name);
        if self.signals.insert(name.to_string(), signal.port()).is_some() {
            tracing::warn!("Signal <{}> registered twice; keeping the newer one", name);
        }
        signal
    }

    /// Register a slot. Re-using a name replaces the old slot.
    pub fn slot(&mut self, slot: Slot) -> SlotRef {
        let slot = SlotRef::new(slot);
        if self
            .slots
            .insert(slot.name().to_string(), slot.clone())
            .is_some()
        {
            tracing::warn!("Slot <{}> registered twice; keeping the newer one", slot.name());
        }
        slot
    }

    pub fn find_signal(&self, name: &str) -> Option<&SignalPort> {
        self.signals.get(name)
    }

    pub fn find_slot(&self, name: &str) -> Option<&SlotRef> {
        self.slots.get(name)
    }

    pub fn signals(&self) -> impl Iterator<Item = &SignalPort> {
        self.signals.values()
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotRef> {
        self.slots.values()
    }

    /// Freeze every signal's connections.
    pub fn seal(&self) {
        for signal in self.signals.values() {
            signal.seal();
        }
    }

    /// Signals first, then slots, each sorted by name.
    pub fn descriptors(&self) -> Vec<PortDescriptor> {
        let signals = self.signals.values().map(|s| PortDescriptor {
            name: s.name().to_string(),
            direction: PortDirection::Signal,
            signature: s.signature(),
            queueing: false,
        });
        let slots = self.slots.values().map(|s| PortDescriptor {
            name: s.name().to_string(),
            direction: PortDirection::Slot,
            signature: s.signature(),
            queueing: s.is_queueing(),
        });
        signals.chain(slots).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_find() {
        let mut ports = Ports::new();
        let signal: Signal<u32> = ports.signal("out");
        let slot = ports.slot(Slot::new::<u32, _>("in", |_| Ok(())).queueing());

        assert_eq!(ports.find_signal("out").unwrap().name(), signal.name());
        assert!(ports.find_slot("in").unwrap().is_queueing());
        assert!(ports.find_signal("in").is_none());
        assert!(ports.find_slot("out").is_none());
        assert_eq!(slot.name(), "in");
    }

    #[test]
    fn test_descriptors() {
        let mut ports = Ports::new();
        let _: Signal<String> = ports.signal("text");
        ports.slot(Slot::unit("start", || Ok(())));

        let descriptors = ports.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].direction, PortDirection::Signal);
        assert_eq!(descriptors[1].name, "start");
        assert!(descriptors[1].signature.is_unit());
        assert!(descriptors[1].to_string().starts_with("slot start"));
    }

    #[test]
    fn test_seal_all() {
        let mut ports = Ports::new();
        let a: Signal<u8> = ports.signal("a");
        let b: Signal<u8> = ports.signal("b");
        ports.seal();
        assert!(a.port().is_sealed());
        assert!(b.port().is_sealed());
    }
}
