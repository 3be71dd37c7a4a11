//! Content-addressed keys used to namespace cache entries per data source.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An opaque, content-addressed key within one data source's namespace.
///
/// `Identity` erases the concrete `DataSource::Id` type so that the
/// interpreter can store a heterogeneous set of requests (possibly against
/// many different source types) in one cache and one round. Two identities
/// compare equal only if they were built from the same underlying type and
/// that type's `Eq` impl agrees.
#[derive(Clone)]
pub struct Identity(std::sync::Arc<dyn ErasedKey>);

impl Identity {
    /// Erase a concrete identity value.
    pub fn new<K>(key: K) -> Self
    where
        K: Send + Sync + fmt::Debug + Eq + Hash + 'static,
    {
        Identity(std::sync::Arc::new(key))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

/// Object-safe counterpart of `Eq + Hash` for boxed identity values.
///
/// Trait objects can't derive `Eq`/`Hash` directly since those require
/// `Self: Sized` on the comparison side; this mirrors the standard
/// "downcast and compare" trick used anywhere heterogeneous keys need to
/// live in one collection.
trait ErasedKey: Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn ErasedKey) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<K> ErasedKey for K
where
    K: Send + Sync + fmt::Debug + Eq + Hash + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ErasedKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        // `dyn Hasher` implements `Hasher` via the standard library's
        // blanket impl for `&mut H`, so this forwards without boxing twice.
        K::hash(self, &mut state);
    }
}

/// The cache's global key: a source name paired with an identity local to
/// that source.
pub type CacheKey = (std::sync::Arc<str>, Identity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_identities_from_same_type_compare_equal() {
        let a = Identity::new(42i32);
        let b = Identity::new(42i32);
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_compare_unequal() {
        let a = Identity::new(1i32);
        let b = Identity::new(2i32);
        assert_ne!(a, b);
    }

    #[test]
    fn different_underlying_types_never_compare_equal() {
        let a = Identity::new(1i32);
        let b = Identity::new("1".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn identities_hash_consistently_with_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Identity::new("AAPL".to_string()));
        assert!(set.contains(&Identity::new("AAPL".to_string())));
    }
}
