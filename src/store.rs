use crate::{error::MetricsError, prop::Property};
use std::collections::HashSet;

/// Number of slots added each time the store runs out of room.
pub const GROW_PROPS: usize = 10;

/// Growable collection of properties.
///
/// Slots past [`PropertyStore::len`] are spare capacity and hold cleared
/// entries. Removal moves the last live entry into the vacated slot, so the
/// order of entries is not meaningful.
///
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    slots: Vec<Property>,
    count: usize,
}

impl PropertyStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            count: 0,
        }
    }

    /// Number of live properties.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of allocated slots, live or spare.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Property] {
        &self.slots[..self.count]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.as_slice().iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Property> {
        self.as_slice().get(index)
    }

    /// Index of the first property called `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.iter().position(|prop| prop.is_named(name))
    }

    #[must_use]
    pub fn find_prop(&self, name: &str) -> Option<&Property> {
        self.find(name).map(|i| &self.slots[i])
    }

    pub fn find_prop_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.find(name).map(|i| &mut self.slots[i])
    }

    /// Returns the property called `name`, appending an unset one if it is missing.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if the store cannot grow.
    pub fn find_or_allocate(&mut self, name: &str) -> Result<&mut Property, MetricsError> {
        if let Some(i) = self.find(name) {
            return Ok(&mut self.slots[i]);
        }
        let prop = self.allocate()?;
        prop.set_name(name);
        Ok(prop)
    }

    /// Appends an unnamed, unset slot. Callers are responsible for naming it.
    pub(crate) fn allocate(&mut self) -> Result<&mut Property, MetricsError> {
        if self.count == self.slots.len() {
            if let Err(e) = self.grow(GROW_PROPS) {
                log::error!("failed allocation for new properties");
                return Err(e);
            }
        }
        let prop = &mut self.slots[self.count];
        self.count += 1;
        Ok(prop)
    }

    pub(crate) fn grow(&mut self, increment: usize) -> Result<(), MetricsError> {
        let increment = if increment == 0 { GROW_PROPS } else { increment };
        let size = self
            .slots
            .len()
            .checked_add(increment)
            .ok_or(MetricsError::AllocationFailed)?;
        self.slots.try_reserve_exact(increment).map_err(|e| {
            log::warn!("property store growth to {size} slots failed: {e}");
            MetricsError::AllocationFailed
        })?;
        self.slots.resize_with(size, Property::default);
        Ok(())
    }

    fn swap_remove_at(&mut self, index: usize) {
        let last = self.count - 1;
        self.slots[index].clear();
        if index != last {
            self.slots.swap(index, last);
        }
        self.count -= 1;
    }

    /// Removes the property called `name`, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(i) => {
                self.swap_remove_at(i);
                true
            }
            None => false,
        }
    }

    /// Removes every property named in `names`, returning how many went.
    pub fn filter_drop<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        names
            .iter()
            .filter(|name| self.remove(name.as_ref()))
            .count()
    }

    /// Removes every property not named in `names`, returning how many went.
    pub fn filter_keep_only<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let keep: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut zapped = 0;
        let mut i = 0;
        while i < self.count {
            if keep.contains(self.slots[i].name()) {
                i += 1;
            } else {
                // the entry swapped into `i` still needs checking
                self.swap_remove_at(i);
                zapped += 1;
            }
        }
        zapped
    }

    /// Releases every property and the backing slots.
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.count = 0;
    }

    /// Deep copy of the live entries, in order, with no spare capacity carried over.
    pub(crate) fn duplicate(&self) -> Result<Self, MetricsError> {
        let mut dst = Self::new();
        if self.count > 0 {
            dst.grow(self.count)?;
        }
        for prop in self {
            *dst.allocate()? = prop.clone();
        }
        Ok(dst)
    }
}

impl PartialEq for PropertyStore {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<'a> IntoIterator for &'a PropertyStore {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyValue;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn store_of(names: &[&str]) -> PropertyStore {
        let mut store = PropertyStore::new();
        for (i, name) in names.iter().enumerate() {
            store
                .find_or_allocate(name)
                .unwrap()
                .set_value(i32::try_from(i).unwrap());
        }
        store
    }

    fn names(store: &PropertyStore) -> BTreeSet<String> {
        store.iter().map(|p| p.name().to_owned()).collect()
    }

    #[test]
    fn find_or_allocate_returns_existing_entry() {
        let mut store = PropertyStore::new();
        store.find_or_allocate("x").unwrap().set_value(1i32);
        let again = store.find_or_allocate("x").unwrap();
        assert_eq!(again.value(), &PropertyValue::Int32(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn new_entry_starts_unset() {
        let mut store = PropertyStore::new();
        let prop = store.find_or_allocate("fresh").unwrap();
        assert!(prop.value().is_none());
        assert_eq!(prop.name(), "fresh");
    }

    #[test]
    fn capacity_grows_in_fixed_steps() {
        let mut store = PropertyStore::new();
        assert_eq!(store.capacity(), 0);
        store.find_or_allocate("a").unwrap();
        assert_eq!(store.capacity(), GROW_PROPS);
        for i in 0..GROW_PROPS {
            store.find_or_allocate(&format!("p{i}")).unwrap();
        }
        assert_eq!(store.capacity(), 2 * GROW_PROPS);
        assert_eq!(store.len(), GROW_PROPS + 1);
    }

    #[test]
    fn find_is_case_sensitive() {
        let store = store_of(&["Name"]);
        assert_eq!(store.find("Name"), Some(0));
        assert_eq!(store.find("name"), None);
    }

    #[test]
    fn remove_swaps_last_entry_into_gap() {
        let mut store = store_of(&["x", "y", "z"]);
        assert!(store.remove("x"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().name(), "z");
        assert_eq!(store.get(1).unwrap().name(), "y");
        assert!(!store.remove("x"));
        assert_eq!(store.capacity(), GROW_PROPS);
    }

    #[test]
    fn remove_last_entry_just_shrinks() {
        let mut store = store_of(&["x", "y"]);
        assert!(store.remove("y"));
        assert_eq!(names(&store), BTreeSet::from(["x".to_owned()]));
    }

    #[test]
    fn filter_drop_leaves_the_rest() {
        let mut store = store_of(&["x", "y", "z"]);
        assert_eq!(store.filter_drop(&["x", "missing"]), 1);
        assert_eq!(names(&store), BTreeSet::from(["y".to_owned(), "z".to_owned()]));
    }

    #[test]
    fn filter_keep_only_checks_swapped_in_entries() {
        let mut store = store_of(&["x", "y", "z"]);
        assert_eq!(store.filter_keep_only(&["y"]), 2);
        assert_eq!(names(&store), BTreeSet::from(["y".to_owned()]));

        let mut store = store_of(&["a", "b", "c", "d"]);
        assert_eq!(store.filter_keep_only(&["b", "d"]), 2);
        assert_eq!(names(&store), BTreeSet::from(["b".to_owned(), "d".to_owned()]));
    }

    #[test]
    fn filter_keep_only_empty_list_removes_everything() {
        let mut store = store_of(&["a", "b"]);
        assert_eq!(store.filter_keep_only::<&str>(&[]), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_is_deep_and_ordered() {
        let mut store = store_of(&["a", "b"]);
        store.find_or_allocate("t").unwrap().set_value("text");
        let copy = store.duplicate().unwrap();
        assert_eq!(copy, store);
        assert_eq!(copy.capacity(), store.len());

        store.find_prop_mut("t").unwrap().set_value("changed");
        assert_eq!(copy.find_prop("t").unwrap().value().as_text().unwrap(), "text");
    }

    #[test]
    fn clear_releases_everything() {
        let mut store = store_of(&["a", "b"]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.find("a"), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(String),
        Remove(String),
        Drop(Vec<String>),
        KeepOnly(Vec<String>),
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_owned)
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => name_strategy().prop_map(Op::Allocate),
            2 => name_strategy().prop_map(Op::Remove),
            1 => prop::collection::vec(name_strategy(), 0..3).prop_map(Op::Drop),
            1 => prop::collection::vec(name_strategy(), 0..4).prop_map(Op::KeepOnly),
        ]
    }

    proptest! {
        #[test]
        fn store_matches_set_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut store = PropertyStore::new();
            let mut model = BTreeSet::new();
            for op in ops {
                match op {
                    Op::Allocate(name) => {
                        store.find_or_allocate(&name).unwrap();
                        model.insert(name);
                    }
                    Op::Remove(name) => {
                        prop_assert_eq!(store.remove(&name), model.remove(&name));
                    }
                    Op::Drop(list) => {
                        store.filter_drop(&list);
                        for name in &list {
                            model.remove(name);
                        }
                    }
                    Op::KeepOnly(list) => {
                        store.filter_keep_only(&list);
                        model.retain(|name| list.contains(name));
                    }
                }
                prop_assert!(store.len() <= store.capacity());
                prop_assert_eq!(store.len(), model.len());
                prop_assert_eq!(names(&store), model.clone());
                prop_assert!(store.iter().all(|p| !p.name().is_empty()));
            }
        }
    }
}
