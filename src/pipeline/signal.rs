//! Name-addressed, type-checked publish side of the signal/slot mechanism.
//!
//! A [`Signal<A>`] is owned by a processor and emits `&A` to every connected
//! [`Slot`]. The toolbox wires signals to slots from configuration through the
//! untyped [`SignalPort`] view, comparing [`Signature`]s once at connect time.
//!
//! # Lifecycle
//!
//! ```text
//! construct ──► connect* ──► seal ──► emit*
//!               (setup)     (Wired)   (Running, any thread)
//! ```
//!
//! After [`SignalPort::seal`] the connection list is frozen and emission reads
//! it without locking.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use super::slot::{Slot, SlotRef};
use anyhow::Context;

/// Errors raised while wiring or dispatching signals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("Signal <{signal}> carries {signal_type} but slot <{slot}> expects {slot_type}")]
    SignalSlotTypeMismatch {
        signal: String,
        signal_type: &'static str,
        slot: String,
        slot_type: &'static str,
    },

    #[error("Signal <{0}> is sealed; connections are fixed once the toolbox is wired")]
    Sealed(String),

    #[error("Slot <{slot}> expects {expected} but was invoked with another argument type")]
    Dispatch { slot: String, expected: &'static str },
}

/// Run-time identity of a signal or slot argument type.
#[derive(Clone, Copy)]
pub struct Signature {
    type_id: TypeId,
    type_name: &'static str,
}

impl Signature {
    pub fn of<A: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
        }
    }

    /// The signature of argument-less slots.
    pub fn unit() -> Self {
        Self::of::<()>()
    }

    pub fn is_unit(&self) -> bool {
        self.type_id == TypeId::of::<()>()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether a slot with this signature can receive `signal`. Unit slots
    /// ignore the argument and so accept any signal.
    pub fn accepts(&self, signal: &Signature) -> bool {
        self.is_unit() || self.type_id == signal.type_id
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.type_name)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

struct Connection {
    slot: SlotRef,
    order: Option<i64>,
}

struct SignalCore {
    name: String,
    signature: Signature,
    pending: Mutex<Vec<Connection>>,
    sealed: OnceLock<Box<[SlotRef]>>,
}

impl SignalCore {
    /// Ordered connections first (ascending, stable), then the rest in connect order.
    fn dispatch_order(connections: &[Connection]) -> Vec<SlotRef> {
        let mut ordered: Vec<&Connection> = connections.iter().filter(|c| c.order.is_some()).collect();
        ordered.sort_by_key(|c| c.order);
        ordered
            .into_iter()
            .chain(connections.iter().filter(|c| c.order.is_none()))
            .map(|c| c.slot.clone())
            .collect()
    }

    fn emit(&self, arg: &dyn Any) -> anyhow::Result<()> {
        match self.sealed.get() {
            Some(slots) => self.dispatch(slots, arg),
            None => {
                let snapshot = Self::dispatch_order(&self.pending.lock());
                self.dispatch(&snapshot, arg)
            }
        }
    }

    fn dispatch(&self, slots: &[SlotRef], arg: &dyn Any) -> anyhow::Result<()> {
        for slot in slots {
            slot.invoke(arg)
                .with_context(|| format!("slot <{}> failed on signal <{}>", slot.name(), self.name))?;
        }
        Ok(())
    }
}

/// Untyped handle to a signal, used by the toolbox for wiring.
#[derive(Clone)]
pub struct SignalPort(Arc<SignalCore>);

impl SignalPort {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn signature(&self) -> Signature {
        self.0.signature
    }

    /// Connect `slot`, checking that it accepts this signal's argument type.
    ///
    /// On mismatch nothing is added. `order` places the connection in the
    /// ordered block that runs before unordered connections.
    pub fn connect(&self, slot: SlotRef, order: Option<i64>) -> Result<(), SignalError> {
        if self.is_sealed() {
            return Err(SignalError::Sealed(self.0.name.clone()));
        }
        if !slot.signature().accepts(&self.0.signature) {
            return Err(SignalError::SignalSlotTypeMismatch {
                signal: self.0.name.clone(),
                signal_type: self.0.signature.type_name(),
                slot: slot.name().to_string(),
                slot_type: slot.signature().type_name(),
            });
        }
        tracing::debug!(
            "Connected signal <{}> to slot <{}>{}",
            self.0.name,
            slot.name(),
            order.map(|o| format!(" (order {})", o)).unwrap_or_default()
        );
        self.0.pending.lock().push(Connection { slot, order });
        Ok(())
    }

    /// Freeze the connection list. Later `connect` calls fail.
    pub fn seal(&self) {
        let order = SignalCore::dispatch_order(&self.0.pending.lock());
        let _ = self.0.sealed.set(order.into_boxed_slice());
    }

    pub fn is_sealed(&self) -> bool {
        self.0.sealed.get().is_some()
    }

    pub fn connection_count(&self) -> usize {
        match self.0.sealed.get() {
            Some(slots) => slots.len(),
            None => self.0.pending.lock().len(),
        }
    }

    /// Connected slot names in dispatch order.
    pub fn connected_slots(&self) -> Vec<String> {
        match self.0.sealed.get() {
            Some(slots) => slots.iter().map(|s| s.name().to_string()).collect(),
            None => SignalCore::dispatch_order(&self.0.pending.lock())
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
        }
    }

    /// Emit a type-erased argument. Slots with a mismatched signature fail
    /// with [`SignalError::Dispatch`].
    pub fn emit_any(&self, arg: &dyn Any) -> anyhow::Result<()> {
        self.0.emit(arg)
    }
}

impl fmt::Debug for SignalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalPort")
            .field("name", &self.0.name)
            .field("signature", &self.0.signature)
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Typed signal carrying `&A` to its slots.
pub struct Signal<A> {
    core: Arc<SignalCore>,
    _arg: PhantomData<fn(&A)>,
}

impl<A: Any + Send + Sync> Signal<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: Arc::new(SignalCore {
                name: name.into(),
                signature: Signature::of::<A>(),
                pending: Mutex::new(Vec::new()),
                sealed: OnceLock::new(),
            }),
            _arg: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Call every connected slot with `arg`, in dispatch order, on this thread.
    /// Stops at the first slot error and returns it.
    pub fn emit(&self, arg: &A) -> anyhow::Result<()> {
        self.core.emit(arg)
    }

    /// Untyped view for wiring.
    pub fn port(&self) -> SignalPort {
        SignalPort(self.core.clone())
    }

    /// Convenience for connecting in code rather than configuration.
    pub fn connect(&self, slot: &SlotRef) -> Result<(), SignalError> {
        self.port().connect(slot.clone(), None)
    }

    pub fn connection_count(&self) -> usize {
        self.port().connection_count()
    }
}

impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _arg: PhantomData,
        }
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.core.name)
            .field("signature", &self.core.signature)
            .finish()
    }
}

/// Build a slot reference from a closure; shorthand used in tests and wiring code.
pub fn slot_fn<A, F>(name: &str, f: F) -> SlotRef
where
    A: Any,
    F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(Slot::new::<A, F>(name, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording_slot(name: &str, log: Arc<Mutex<Vec<String>>>) -> SlotRef {
        let tag = name.to_string();
        slot_fn::<u32, _>(name, move |value| {
            log.lock().push(format!("{}:{}", tag, value));
            Ok(())
        })
    }

    #[test]
    fn test_emit_in_connect_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signal: Signal<u32> = Signal::new("count");
        signal.connect(&recording_slot("a", log.clone())).unwrap();
        signal.connect(&recording_slot("b", log.clone())).unwrap();

        signal.emit(&7).unwrap();
        assert_eq!(*log.lock(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_type_mismatch_rejected_and_not_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let signal: Signal<u32> = Signal::new("count");
        let counter = calls.clone();
        let text_slot = slot_fn::<String, _>("text", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = signal.connect(&text_slot).unwrap_err();
        assert!(matches!(err, SignalError::SignalSlotTypeMismatch { .. }));
        assert_eq!(signal.connection_count(), 0);

        signal.emit(&1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unit_slot_accepts_any_signal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let unit = Arc::new(Slot::unit("tick", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let signal: Signal<String> = Signal::new("text");
        signal.connect(&unit).unwrap();
        signal.emit(&"hello".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ordered_connections_run_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signal: Signal<u32> = Signal::new("count");
        let port = signal.port();
        port.connect(recording_slot("plain-1", log.clone()), None).unwrap();
        port.connect(recording_slot("late", log.clone()), Some(5)).unwrap();
        port.connect(recording_slot("plain-2", log.clone()), None).unwrap();
        port.connect(recording_slot("early", log.clone()), Some(-1)).unwrap();
        port.connect(recording_slot("late-tie", log.clone()), Some(5)).unwrap();

        assert_eq!(
            port.connected_slots(),
            vec!["early", "late", "late-tie", "plain-1", "plain-2"]
        );
        signal.emit(&1).unwrap();
        assert_eq!(log.lock()[0], "early:1");
        assert_eq!(log.lock()[4], "plain-2:1");
    }

    #[test]
    fn test_seal_freezes_connections() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signal: Signal<u32> = Signal::new("count");
        signal.connect(&recording_slot("a", log.clone())).unwrap();
        signal.port().seal();

        assert!(signal.port().is_sealed());
        assert_eq!(
            signal.connect(&recording_slot("b", log.clone())),
            Err(SignalError::Sealed("count".to_string()))
        );
        signal.emit(&3).unwrap();
        assert_eq!(*log.lock(), vec!["a:3"]);
    }

    #[test]
    fn test_slot_error_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signal: Signal<u32> = Signal::new("count");
        signal
            .connect(&slot_fn::<u32, _>("fails", |_| anyhow::bail!("bad slice")))
            .unwrap();
        signal.connect(&recording_slot("after", log.clone())).unwrap();

        let err = signal.emit(&1).unwrap_err();
        assert!(format!("{:#}", err).contains("bad slice"));
        assert!(err.to_string().contains("fails"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_emit_any_with_wrong_type_is_dispatch_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signal: Signal<u32> = Signal::new("count");
        signal.connect(&recording_slot("a", log)).unwrap();

        let err = signal.port().emit_any(&"not a number").unwrap_err();
        let dispatch = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<SignalError>())
            .cloned();
        assert!(matches!(dispatch, Some(SignalError::Dispatch { .. })));
    }
}
