//! Receive side of the signal/slot mechanism.
//!
//! A [`Slot`] wraps a closure together with the [`Signature`] of the argument
//! it expects. The closure receives the argument type-erased; the wrapper
//! downcasts it and reports a [`SignalError::Dispatch`] if the type is wrong.
//! Processor state shared with slot closures lives behind `Arc<Mutex<_>>`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::signal::{SignalError, Signature};

type SlotFn = dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync;

/// Shared reference to a slot. Signals hold these.
pub type SlotRef = Arc<Slot>;

/// A named, typed callback.
pub struct Slot {
    name: String,
    signature: Signature,
    queueing: bool,
    func: Box<SlotFn>,
}

impl Slot {
    /// A slot receiving `&A`.
    pub fn new<A, F>(name: impl Into<String>, f: F) -> Self
    where
        A: Any,
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let slot_name = name.clone();
        Self {
            name,
            signature: Signature::of::<A>(),
            queueing: false,
            func: Box::new(move |arg: &dyn Any| match arg.downcast_ref::<A>() {
                Some(arg) => f(arg),
                None => Err(SignalError::Dispatch {
                    slot: slot_name.clone(),
                    expected: std::any::type_name::<A>(),
                }
                .into()),
            }),
        }
    }

    /// A slot that ignores its argument. It can be connected to any signal.
    pub fn unit<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature: Signature::unit(),
            queueing: false,
            func: Box::new(move |_: &dyn Any| f()),
        }
    }

    /// Mark this slot as handing its argument to another thread. The planner
    /// does not follow queueing slots when grouping processors.
    pub fn queueing(mut self) -> Self {
        self.queueing = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn is_queueing(&self) -> bool {
        self.queueing
    }

    pub fn invoke(&self, arg: &dyn Any) -> anyhow::Result<()> {
        (self.func)(arg)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("queueing", &self.queueing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_typed_invoke() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let slot = Slot::new::<u64, _>("collect", move |v| {
            sink.lock().push(*v);
            Ok(())
        });
        slot.invoke(&5u64).unwrap();
        slot.invoke(&6u64).unwrap();
        assert_eq!(*seen.lock(), vec![5, 6]);
        assert_eq!(slot.signature(), Signature::of::<u64>());
        assert!(!slot.is_queueing());
    }

    #[test]
    fn test_wrong_argument_is_dispatch_error() {
        let slot = Slot::new::<u64, _>("collect", |_| Ok(()));
        let err = slot.invoke(&"text").unwrap_err();
        assert_eq!(
            err.downcast_ref::<SignalError>(),
            Some(&SignalError::Dispatch {
                slot: "collect".to_string(),
                expected: "u64"
            })
        );
    }

    #[test]
    fn test_unit_slot() {
        let slot = Slot::unit("stop", || Ok(())).queueing();
        assert!(slot.signature().is_unit());
        assert!(slot.is_queueing());
        slot.invoke(&42i32).unwrap();
    }
}
