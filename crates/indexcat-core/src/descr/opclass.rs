//! Binding of opclasses to comparators.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::builtin::type_for_opclass;
use crate::error::DescrError;
use crate::expr::Datum;
use crate::types::Oid;

/// Orders two non-null datums of an opclass's type.
pub type Comparator = Arc<dyn Fn(&Datum, &Datum) -> Ordering + Send + Sync>;

/// Host facility mapping `(database, opclass)` to a comparator.
pub trait OpclassResolver {
    fn resolve(&self, datoid: Oid, opclass: Oid) -> Result<Comparator, DescrError>;
}

fn natural_order(a: &Datum, b: &Datum) -> Ordering {
    a.partial_cmp_value(b).unwrap_or(Ordering::Equal)
}

/// Resolver for the built-in btree opclasses, with a shared cache of
/// resolved comparators.
#[derive(Default)]
pub struct BuiltinOpclasses {
    extra: HashMap<Oid, Comparator>,
    cache: Mutex<HashMap<(Oid, Oid), Comparator>>,
}

impl BuiltinOpclasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comparator for an opclass outside the built-in table.
    pub fn with_opclass(mut self, opclass: Oid, comparator: Comparator) -> Self {
        self.extra.insert(opclass, comparator);
        self
    }

    /// Number of `(database, opclass)` pairs resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl fmt::Debug for BuiltinOpclasses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOpclasses")
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .field("cached", &self.cached())
            .finish()
    }
}

impl OpclassResolver for BuiltinOpclasses {
    fn resolve(&self, datoid: Oid, opclass: Oid) -> Result<Comparator, DescrError> {
        let mut cache = self.cache.lock();
        if let Some(cmp) = cache.get(&(datoid, opclass)) {
            return Ok(Arc::clone(cmp));
        }
        let cmp = match self.extra.get(&opclass) {
            Some(cmp) => Arc::clone(cmp),
            None if type_for_opclass(opclass).is_some() => Arc::new(natural_order) as Comparator,
            None => return Err(DescrError::UnknownOpclass { datoid, opclass }),
        };
        trace!(datoid, opclass, "resolved opclass comparator");
        cache.insert((datoid, opclass), Arc::clone(&cmp));
        Ok(cmp)
    }
}
