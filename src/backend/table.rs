//! Function tables: one resolved-or-absent slot per operation.

use super::module::SymbolSource;
use crate::abi::RawEntry;
use crate::ops::Operation;
use crate::version::ApiVersion;
use std::fmt;
use std::marker::PhantomData;

/// Resolved entry points of one operation family.
///
/// Built once, immutable afterwards. Slots for operations newer than the
/// table's API version are always absent, whatever the module exports.
pub struct FunctionTable<O: Operation> {
    slots: Box<[Option<RawEntry>]>,
    version: ApiVersion,
    _family: PhantomData<fn() -> O>,
}

impl<O: Operation> FunctionTable<O> {
    /// Resolve every operation of the family against `module`.
    ///
    /// Never fails: missing symbols become absent slots.
    pub fn build(module: &dyn SymbolSource, version: ApiVersion) -> Self {
        let slots: Box<[Option<RawEntry>]> = O::all()
            .iter()
            .map(|&op| {
                if !op.exists_at(version) {
                    return None;
                }
                let entry = module.resolve(op.symbol());
                if entry.is_none() {
                    tracing::trace!(
                        module = module.name(),
                        op = op.name(),
                        "entry point not exported"
                    );
                }
                entry
            })
            .collect();

        let table = Self {
            slots,
            version,
            _family: PhantomData,
        };
        tracing::debug!(
            module = module.name(),
            family = %O::FAMILY,
            version = %version,
            available = table.available().count(),
            total = O::COUNT,
            "built function table"
        );
        table
    }

    /// A table with every slot absent.
    pub fn empty(version: ApiVersion) -> Self {
        Self {
            slots: vec![None; O::COUNT].into_boxed_slice(),
            version,
            _family: PhantomData,
        }
    }

    /// API version the table was built for.
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// Whether `op` resolved to an entry point.
    #[inline]
    pub fn is_available(&self, op: O) -> bool {
        self.entry(op).is_some()
    }

    /// The entry point for `op`, if present.
    #[inline]
    pub fn entry(&self, op: O) -> Option<RawEntry> {
        self.slots.get(op.index()).copied().flatten()
    }

    /// The entry point for `op`, cast to its signature.
    ///
    /// # Safety
    ///
    /// `F` must be the signature listed for `op` in [`crate::abi`].
    #[inline]
    pub unsafe fn get<F: Copy>(&self, op: O) -> Option<F> {
        // SAFETY: forwarded to the caller.
        self.entry(op).map(|entry| unsafe { entry.cast::<F>() })
    }

    /// Operations with a resolved entry point, in identifier order.
    pub fn available(&self) -> impl Iterator<Item = O> + '_ {
        O::all()
            .iter()
            .copied()
            .filter(|op| self.is_available(*op))
    }

    /// Number of slots (the family size).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the family has no operations.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Whether `op` can be called through `table`.
#[inline]
pub fn is_operation_available<O: Operation>(table: &FunctionTable<O>, op: O) -> bool {
    table.is_available(op)
}

impl<O: Operation> fmt::Debug for FunctionTable<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("family", &O::FAMILY)
            .field("version", &self.version)
            .field("available", &self.available().count())
            .field("slots", &self.slots.len())
            .finish()
    }
}
