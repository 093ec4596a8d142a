//! The unit of work that flows through a pipeline.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

use super::cut::CutStatus;
use super::{Attach, Erased, ExtensibleRecord};

/// One slice worth of results.
///
/// A source creates it with a sequence number; downstream processors attach
/// their own result types with [`Data::of`]. The end-of-stream flag can only be
/// raised, never cleared.
pub struct Data {
    sequence: u64,
    last: bool,
    extensions: ExtensibleRecord<dyn Erased>,
    cuts: CutStatus,
}

impl Data {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            last: false,
            extensions: ExtensibleRecord::new(),
            cuts: CutStatus::new(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether this is the final record of its stream.
    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn mark_last(&mut self) {
        self.last = true;
    }

    /// Get-or-create the attached `T`.
    pub fn of<T>(&mut self) -> &mut T
    where
        T: Attach<dyn Erased> + Default + 'static,
    {
        self.extensions.of::<T>()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut::<T>()
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.extensions.has::<T>()
    }

    pub fn attach<T>(&mut self, value: T) -> &mut T
    where
        T: Attach<dyn Erased> + 'static,
    {
        self.extensions.attach(value)
    }

    pub fn extensions(&self) -> &ExtensibleRecord<dyn Erased> {
        &self.extensions
    }

    pub fn cuts(&self) -> &CutStatus {
        &self.cuts
    }

    pub fn cuts_mut(&mut self) -> &mut CutStatus {
        &mut self.cuts
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("sequence", &self.sequence)
            .field("last", &self.last)
            .field("extensions", &self.extensions)
            .field("cuts", &self.cuts)
            .finish()
    }
}

/// Shared handle to a [`Data`] record.
///
/// Every slot a record is dispatched to sees the same record. Cloning the
/// handle is how a queueing slot keeps it alive across a thread hand-off; the
/// record is dropped when the last handle goes.
#[derive(Clone)]
pub struct DataHandle(Arc<Mutex<Data>>);

impl DataHandle {
    pub fn new(data: Data) -> Self {
        Self(Arc::new(Mutex::new(data)))
    }

    /// Lock the record for reading or writing.
    ///
    /// Slots run one at a time on the emitting thread, so the lock is
    /// uncontended unless a handle has been queued and is being read elsewhere.
    pub fn lock(&self) -> MutexGuard<'_, Data> {
        self.0.lock()
    }

    pub fn sequence(&self) -> u64 {
        self.0.lock().sequence()
    }

    pub fn is_last(&self) -> bool {
        self.0.lock().is_last()
    }

    /// Whether both handles refer to the same record.
    pub fn ptr_eq(&self, other: &DataHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this record.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<Data> for DataHandle {
    fn from(data: Data) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(data) => fmt::Debug::fmt(&*data, f),
            None => f.write_str("DataHandle(<locked>)"),
        }
    }
}
