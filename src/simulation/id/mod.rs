use crate::simulation::id::id_store::{IdStore, UntypedId};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

// keep this private, as we don't want to leak how we cache ids.
mod id_store;

/// This type represents a reference counted pointer to an id. It can be used in hash maps/sets
/// in combination with NoHashHasher, to achieve fast look ups with no randomness involved.
///
/// As this type wraps Rc<UntypedId>, using clone produces a new Rc pointer to the actual id and is
/// the intended way of passing around ids.
///
/// Ids are typed, so that an `Id<Link>` can't be passed where an `Id<Node>` is expected. Internal
/// ids are dense per type and start at 0, which makes them suitable as keys in `IntMap`s.
pub struct Id<T> {
    _type_marker: PhantomData<T>,
    id: Rc<UntypedId>,
}

impl<T: 'static> Id<T> {
    fn new(untyped_id: Rc<UntypedId>) -> Self {
        Self {
            _type_marker: PhantomData,
            id: untyped_id,
        }
    }

    pub fn internal(&self) -> u64 {
        self.id.internal
    }

    pub fn external(&self) -> &str {
        &self.id.external
    }

    /// Creates a new id or returns the existing one with the same external value.
    pub fn create(id: &str) -> Self {
        ID_STORE.with(|store| store.borrow_mut().create_id(id))
    }

    pub fn get(internal: u64) -> Self {
        ID_STORE.with(|store| store.borrow().get(internal))
    }

    pub fn get_from_ext(external: &str) -> Self {
        ID_STORE.with(|store| store.borrow().get_from_ext(external))
    }

    pub fn try_get_from_ext(external: &str) -> Option<Self> {
        ID_STORE.with(|store| store.borrow().try_get_from_ext(external))
    }
}

/// Clears all ids of the current thread. Ids created before calling this function must not be
/// used afterwards, as their internal values will be handed out again.
pub fn reset_store() {
    ID_STORE.with(|store| store.borrow_mut().reset())
}

/// Mark Id as enabled for the nohash_hasher::NoHashHasher
impl<T> nohash_hasher::IsEnabled for Id<T> {}
impl<T> nohash_hasher::IsEnabled for &Id<T> {}

/// Implement PartialEq, Eq, PartialOrd, Ord, so that Ids can be used in HashMaps and Ordered collections
/// all four methods rely on the internal id.
impl<T: 'static> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.internal().eq(&other.internal())
    }
}

impl<T: 'static> Eq for Id<T> {}

impl<T: 'static> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // use write u64 directly, so that we can use NoHashHasher with ids
        state.write_u64(self.internal());
    }
}

impl<T: 'static> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.internal().cmp(&other.internal())
    }
}

impl<T: 'static> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: 'static> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.external())
    }
}

impl<T: 'static> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({}, {})", self.internal(), self.external())
    }
}

/// This creates a new struct with a cloned Rc pointer
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self {
            _type_marker: PhantomData,
            id: self.id.clone(),
        }
    }
}

impl<T: 'static> serde::Serialize for Id<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.external())
    }
}

thread_local! {static ID_STORE: RefCell<IdStore> = RefCell::new(IdStore::new())}
