//! Append-only, type-keyed heterogeneous records.
//!
//! An [`ExtensibleRecord`] holds at most one value per concrete type. Modules
//! that know nothing about each other attach their own result types to the same
//! record, and readers look them up by type.
//!
//! # Architecture
//!
//! ```text
//! ExtensibleRecord<E>
//!   entries: [ (TypeId, Box<E>), (TypeId, Box<E>), ... ]   attachment order
//!                                              ▲
//!                                  newest ─────┘  (iteration walks backwards)
//! ```
//!
//! The record is generic over the boxed trait object `E`. Two instances exist:
//! - `ExtensibleRecord<dyn Erased>` stores arbitrary `Send + Sync` values and
//!   backs [`Data`].
//! - `ExtensibleRecord<dyn CutResult>` stores pass/fail flags and backs
//!   [`CutStatus`].
//!
//! Lookup is a linear scan comparing `TypeId`s. Records carry tens of entries
//! at most, so a map would cost more than it saves.

pub mod cut;
pub mod data;

pub use cut::{CutMaskError, CutRegistry, CutResult, CutStatus};
pub use data::{Data, DataHandle};

use std::any::{Any, TypeId};
use std::fmt;

/// Any value that can ride along on a [`Data`] record.
pub trait Erased: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send + Sync> Erased for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A trait-object type that can be stored in an [`ExtensibleRecord`].
///
/// Implemented for `dyn Erased` and `dyn CutResult`.
pub trait Extension: Send + Sync + 'static {
    fn ext_any(&self) -> &dyn Any;
    fn ext_any_mut(&mut self) -> &mut dyn Any;
}

impl Extension for dyn Erased {
    fn ext_any(&self) -> &dyn Any {
        Erased::as_any(self)
    }

    fn ext_any_mut(&mut self) -> &mut dyn Any {
        Erased::as_any_mut(self)
    }
}

/// Converts a concrete value into the boxed form stored by a record.
pub trait Attach<E: ?Sized> {
    fn into_entry(self) -> Box<E>;
}

impl<T: Any + Send + Sync> Attach<dyn Erased> for T {
    fn into_entry(self) -> Box<dyn Erased> {
        Box::new(self)
    }
}

struct Entry<E: ?Sized> {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<E>,
}

/// Ordered collection with at most one value per concrete type.
pub struct ExtensibleRecord<E: ?Sized + Extension> {
    entries: Vec<Entry<E>>,
}

impl<E: ?Sized + Extension> ExtensibleRecord<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn position(&self, type_id: TypeId) -> Option<usize> {
        self.entries.iter().position(|e| e.type_id == type_id)
    }

    /// Whether a value of type `T` is attached.
    pub fn has<T: 'static>(&self) -> bool {
        self.position(TypeId::of::<T>()).is_some()
    }

    /// The attached `T`, or `None` if it was never attached.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        let index = self.position(TypeId::of::<T>())?;
        self.entries[index].value.ext_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let index = self.position(TypeId::of::<T>())?;
        self.entries[index].value.ext_any_mut().downcast_mut::<T>()
    }

    /// Get-or-create: the attached `T`, attaching `T::default()` first if needed.
    pub fn of<T>(&mut self) -> &mut T
    where
        T: Attach<E> + Default + 'static,
    {
        let index = match self.position(TypeId::of::<T>()) {
            Some(index) => index,
            None => self.push(T::default()),
        };
        let type_name = self.entries[index].type_name;
        match self.entries[index].value.ext_any_mut().downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("record entry tagged {type_name} holds another type"),
        }
    }

    /// Attach `value`, replacing an existing value of the same type in place.
    pub fn attach<T>(&mut self, value: T) -> &mut T
    where
        T: Attach<E> + 'static,
    {
        let index = match self.position(TypeId::of::<T>()) {
            Some(index) => {
                self.entries[index].value = value.into_entry();
                index
            }
            None => self.push(value),
        };
        let type_name = self.entries[index].type_name;
        match self.entries[index].value.ext_any_mut().downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("record entry tagged {type_name} holds another type"),
        }
    }

    fn push<T>(&mut self, value: T) -> usize
    where
        T: Attach<E> + 'static,
    {
        self.entries.push(Entry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: value.into_entry(),
        });
        self.entries.len() - 1
    }

    /// Attach an already-boxed value whose concrete type is only known at run
    /// time (e.g. built through a registry). Returns `false` and drops `value`
    /// if a value of the same concrete type is already attached.
    pub fn attach_boxed(&mut self, value: Box<E>) -> bool {
        let type_id = Any::type_id(value.ext_any());
        if self.position(type_id).is_some() {
            return false;
        }
        self.entries.push(Entry {
            type_id,
            type_name: "<dynamic>",
            value,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().rev().map(|e| &*e.value)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.entries.iter_mut().rev().map(|e| &mut *e.value)
    }

    /// Values from oldest to newest.
    pub fn iter_attached(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|e| &*e.value)
    }

    pub fn iter_attached_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.entries.iter_mut().map(|e| &mut *e.value)
    }

    /// Rust type names of the attached values, newest first.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.iter().rev().map(|e| e.type_name).collect()
    }
}

impl<E: ?Sized + Extension> Default for ExtensibleRecord<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized + Extension> fmt::Debug for ExtensibleRecord<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}
