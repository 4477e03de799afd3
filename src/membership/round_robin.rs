/// Cyclic cursor over a mutable list.
///
/// Not synchronized on its own; `WorkerRegistry` keeps it behind a single mutex so that
/// read-and-advance and insert/remove are each one critical section.
#[derive(Debug, Clone)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> Default for RoundRobin<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: Clone> RoundRobin<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Returns the current item and advances. `None` when empty.
    pub fn next(&mut self) -> Option<T> {
        if self.items.is_empty() {
            self.cursor = 0;
            return None;
        }

        let item = self.items[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.items.len();
        Some(item)
    }

    /// Appends to the tail of the rotation.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes the first item matching `pred`. Missing items leave the rotation untouched.
    pub fn remove_where<F>(&mut self, pred: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let idx = self.items.iter().position(pred)?;
        let removed = self.items.remove(idx);

        // Keep pointing at the item that would have come next.
        if idx < self.cursor {
            self.cursor -= 1;
        }
        if self.items.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor %= self.items.len();
        }

        Some(removed)
    }

    pub fn contains_where<F>(&self, pred: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().any(pred)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
