use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

use crate::simulation::id::Id;

#[derive(Debug, PartialEq, Eq)]
pub struct UntypedId {
    pub(crate) internal: u64,
    pub(crate) external: String,
}

impl UntypedId {
    fn new(internal: u64, external: String) -> Self {
        Self { internal, external }
    }
}

/// Cache for ids. Ids are stored per rust type, so that the internal ids of each type are dense and
/// start at 0.
#[derive(Debug, Default)]
pub struct IdStore {
    ids: HashMap<TypeId, Vec<Rc<UntypedId>>>,
    mapping: HashMap<TypeId, HashMap<String, u64>>,
}

impl IdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_id<T: 'static>(&mut self, id: &str) -> Id<T> {
        let type_id = TypeId::of::<T>();
        let type_mapping = self.mapping.entry(type_id).or_default();
        let type_ids = self.ids.entry(type_id).or_default();

        if let Some(internal) = type_mapping.get(id) {
            return Id::new(type_ids[*internal as usize].clone());
        }

        let next_internal = type_ids.len() as u64;
        let next_id = Rc::new(UntypedId::new(next_internal, String::from(id)));
        type_ids.push(next_id.clone());
        type_mapping.insert(String::from(id), next_internal);

        Id::new(next_id)
    }

    pub fn get<T: 'static>(&self, internal: u64) -> Id<T> {
        let type_ids = self
            .ids
            .get(&TypeId::of::<T>())
            .unwrap_or_else(|| panic!("No ids for type. Use Id::create::<T>(...) to create ids"));

        let untyped_id = type_ids
            .get(internal as usize)
            .unwrap_or_else(|| panic!("No id found for internal {internal}"))
            .clone();
        Id::new(untyped_id)
    }

    pub fn try_get_from_ext<T: 'static>(&self, external: &str) -> Option<Id<T>> {
        let type_mapping = self.mapping.get(&TypeId::of::<T>())?;
        let index = type_mapping.get(external)?;
        Some(self.get(*index))
    }

    pub fn get_from_ext<T: 'static>(&self, external: &str) -> Id<T> {
        self.try_get_from_ext(external)
            .unwrap_or_else(|| panic!("Could not find id for external id: {external}"))
    }

    pub fn reset(&mut self) {
        self.ids.clear();
        self.mapping.clear();
    }
}
