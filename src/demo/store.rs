use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;

/// Anything kept in a [`Store`] is addressed by an integer id.
pub trait Identified {
    fn id(&self) -> i64;
}

/// In-memory table with many readers and a single writer at a time.
pub struct Store<T> {
    items: RwLock<Vec<T>>,
    next_id: AtomicI64,
}

impl<T: Clone + Identified> Store<T> {
    pub fn new(items: Vec<T>) -> Self {
        let next_id = items.iter().map(Identified::id).max().unwrap_or(0) + 1;
        Store {
            items: RwLock::new(items),
            next_id: AtomicI64::new(next_id),
        }
    }

    pub fn get(&self, id: i64) -> Option<T> {
        self.items.read().iter().find(|item| item.id() == id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.items.read().clone()
    }

    pub fn filter(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        self.items
            .read()
            .iter()
            .filter(|item| keep(item))
            .cloned()
            .collect()
    }

    /// Replaces the item with the same id, or appends it.
    pub fn upsert(&self, item: T) -> T {
        let mut items = self.items.write();
        match items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        item
    }

    /// Appends an item built from a freshly allocated id.
    pub fn insert_with(&self, build: impl FnOnce(i64) -> T) -> T {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = build(id);
        self.items.write().push(item.clone());
        item
    }

    /// Applies `change` to the item with `id` under the write lock.
    pub fn update(&self, id: i64, change: impl FnOnce(&mut T)) -> Option<T> {
        let mut items = self.items.write();
        let item = items.iter_mut().find(|item| item.id() == id)?;
        change(item);
        Some(item.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Clone, Debug, PartialEq)]
    struct Row(i64, &'static str);

    impl Identified for Row {
        fn id(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn allocates_ids_after_the_seed_data() {
        let store = Store::new(vec![Row(1, "a"), Row(4, "b")]);
        let row = store.insert_with(|id| Row(id, "c"));
        assert_eq!(row, Row(5, "c"));
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = Store::new(vec![Row(1, "a")]);
        store.upsert(Row(1, "z"));
        store.upsert(Row(2, "b"));
        assert_eq!(store.get(1), Some(Row(1, "z")));
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn update_touches_only_existing_rows() {
        let store = Store::new(vec![Row(1, "a")]);
        assert_eq!(store.update(1, |row| row.1 = "b"), Some(Row(1, "b")));
        assert_eq!(store.update(9, |row| row.1 = "b"), None);
    }
}
