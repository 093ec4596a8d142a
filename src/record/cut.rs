//! Pass/fail flags attached to a [`Data`](super::Data) record.
//!
//! Each cut processor contributes one [`CutResult`] type. [`CutStatus`] keeps
//! them in an [`ExtensibleRecord`] so independent cuts never need to know about
//! each other. A record is accepted when every attached cut passed; the order in
//! which cuts were attached does not matter for acceptance.
//!
//! Summaries and masks do use attachment order: position `i` is the `i`-th cut
//! attached, and a set bit means that cut rejected the record.
//!
//! ```ignore
//! sliceflow::define_cut!(pub EnergyCut, "energy-cut");
//!
//! data.cuts_mut().set::<EnergyCut>(energy > threshold);
//! if data.cuts().is_cut_by_mask("10")? { /* rejected by the first cut */ }
//! ```

use std::any::Any;
use std::fmt;
use thiserror::Error;

use super::{Attach, Erased, Extension, ExtensibleRecord};
use crate::registry::{Registry, RegistryError};

/// One cut's verdict on a record.
pub trait CutResult: Erased {
    /// Registered name of the cut.
    fn name(&self) -> &str;

    fn passed(&self) -> bool;

    fn set_passed(&mut self, passed: bool);
}

impl Extension for dyn CutResult {
    fn ext_any(&self) -> &dyn Any {
        Erased::as_any(self)
    }

    fn ext_any_mut(&mut self) -> &mut dyn Any {
        Erased::as_any_mut(self)
    }
}

impl<T: CutResult> Attach<dyn CutResult> for T {
    fn into_entry(self) -> Box<dyn CutResult> {
        Box::new(self)
    }
}

/// Registry of cut types, keyed by cut name.
pub type CutRegistry = Registry<dyn CutResult>;

/// Malformed `0`/`1` cut mask.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CutMaskError {
    #[error("Invalid character {ch:?} at position {position} in cut mask")]
    InvalidChar { ch: char, position: usize },

    #[error("Cut mask has {len} positions but only {cuts} cuts are attached")]
    TooLong { len: usize, cuts: usize },
}

/// Declare a cut result type.
///
/// Generates a struct with a `passed` flag (default `true`), a `NAME` constant,
/// its [`CutResult`] impl and a `register` function for a [`CutRegistry`].
#[macro_export]
macro_rules! define_cut {
    ($(#[$meta:meta])* $vis:vis $ty:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $ty {
            passed: bool,
        }

        impl $ty {
            pub const NAME: &'static str = $name;

            pub fn register(
                registry: &mut $crate::record::CutRegistry,
            ) -> ::std::result::Result<(), $crate::registry::RegistryError> {
                registry.register(
                    $name,
                    || ::std::boxed::Box::new(<$ty>::default()) as ::std::boxed::Box<dyn $crate::record::CutResult>,
                )
            }
        }

        impl ::std::default::Default for $ty {
            fn default() -> Self {
                Self { passed: true }
            }
        }

        impl $crate::record::CutResult for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn passed(&self) -> bool {
                self.passed
            }

            fn set_passed(&mut self, passed: bool) {
                self.passed = passed;
            }
        }
    };
}

/// All cut verdicts attached to one record.
#[derive(Default)]
pub struct CutStatus {
    cuts: ExtensibleRecord<dyn CutResult>,
}

impl CutStatus {
    pub fn new() -> Self {
        Self {
            cuts: ExtensibleRecord::new(),
        }
    }

    /// Get-or-create the cut of type `T`.
    pub fn of<T>(&mut self) -> &mut T
    where
        T: CutResult + Default,
    {
        self.cuts.of::<T>()
    }

    pub fn get<T: CutResult>(&self) -> Option<&T> {
        self.cuts.get::<T>()
    }

    pub fn has<T: CutResult>(&self) -> bool {
        self.cuts.has::<T>()
    }

    /// Record the verdict of cut `T`, attaching it if needed.
    pub fn set<T>(&mut self, passed: bool)
    where
        T: CutResult + Default,
    {
        self.of::<T>().set_passed(passed);
    }

    /// Attach the cut registered as `name` with the given verdict.
    ///
    /// Returns `Ok(false)` without changing anything if a cut with that name is
    /// already attached.
    pub fn add_named(
        &mut self,
        registry: &CutRegistry,
        name: &str,
        passed: bool,
    ) -> Result<bool, RegistryError> {
        if self.has_named(name) {
            return Ok(false);
        }
        let mut cut = registry.create(name)?;
        cut.set_passed(passed);
        let added = self.cuts.attach_boxed(cut);
        if added {
            tracing::trace!("Attached cut <{}> (passed: {})", name, passed);
        }
        Ok(added)
    }

    fn find_named(&self, name: &str) -> Option<&dyn CutResult> {
        self.cuts.iter().find(|cut| cut.name() == name)
    }

    pub fn has_named(&self, name: &str) -> bool {
        self.find_named(name).is_some()
    }

    /// Verdict of the cut called `name`, if attached.
    pub fn passed_named(&self, name: &str) -> Option<bool> {
        self.find_named(name).map(|cut| cut.passed())
    }

    /// Update the cut called `name`. Returns `false` if no such cut is attached.
    pub fn set_named(&mut self, name: &str, passed: bool) -> bool {
        match self.cuts.iter_mut().find(|cut| cut.name() == name) {
            Some(cut) => {
                cut.set_passed(passed);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// True when every attached cut passed (or none are attached).
    pub fn is_accepted(&self) -> bool {
        self.cuts.iter().all(|cut| cut.passed())
    }

    pub fn is_cut(&self) -> bool {
        !self.is_accepted()
    }

    /// One flag per cut in attachment order; `true` means the cut rejected.
    pub fn summary(&self) -> Vec<bool> {
        self.cuts.iter_attached().map(|cut| !cut.passed()).collect()
    }

    /// Cut names in attachment order.
    pub fn names(&self) -> Vec<&str> {
        self.cuts.iter_attached().map(|cut| cut.name()).collect()
    }

    /// Whether any cut selected by `mask` rejected the record. Bit `i` selects
    /// the `i`-th attached cut; bits beyond the attached cuts are ignored.
    pub fn is_cut_masked(&self, mask: u64) -> bool {
        self.summary()
            .iter()
            .take(64)
            .enumerate()
            .any(|(i, &rejected)| rejected && mask & (1 << i) != 0)
    }

    /// Like [`is_cut_masked`](Self::is_cut_masked) with a string of `0`/`1`,
    /// where character `i` selects the `i`-th attached cut. A shorter mask
    /// leaves the remaining cuts unselected.
    pub fn is_cut_by_mask(&self, mask: &str) -> Result<bool, CutMaskError> {
        let summary = self.summary();
        let len = mask.chars().count();
        if len > summary.len() {
            return Err(CutMaskError::TooLong {
                len,
                cuts: summary.len(),
            });
        }
        let mut any = false;
        for (position, ch) in mask.chars().enumerate() {
            let selected = match ch {
                '0' => false,
                '1' => true,
                other => return Err(CutMaskError::InvalidChar { ch: other, position }),
            };
            any |= selected && summary[position];
        }
        Ok(any)
    }
}

impl fmt::Display for CutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Cut summary: none");
        }
        write!(f, "Cut summary: ")?;
        for rejected in self.summary() {
            f.write_str(if rejected { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for CutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.cuts.iter_attached().map(|cut| (cut.name(), cut.passed())))
            .finish()
    }
}
