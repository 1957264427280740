//! Bounded recency tracker for cached range prefixes.
//!
//! Nodes live in a flat slab indexed by integer handles, with a free-list
//! for slot reuse; `prev`/`next` handles form the recency list. This keeps
//! the doubly-linked structure free of reference cycles and keeps every
//! operation O(1).

use std::collections::HashMap;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node {
    key: String,
    prev: usize,
    next: usize,
}

/// LRU set of prefixes with a hard capacity.
///
/// Invariant: the key set of `index` is exactly the set of slots reachable
/// from `head` to `tail`, and its size never exceeds `capacity`.
#[derive(Debug)]
pub struct RecencyTracker {
    slots: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl RecencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(1024)),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity.min(1024)),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Marks `key` as most-recently-used, inserting it if absent.
    ///
    /// Returns the key evicted to stay within capacity, if any. The caller
    /// is responsible for deleting the evicted key's durable counterpart.
    pub fn touch(&mut self, key: &str) -> Option<String> {
        if let Some(&handle) = self.index.get(key) {
            self.unlink(handle);
            self.push_front(handle);
            return None;
        }

        let handle = self.alloc(key.to_string());
        self.index.insert(key.to_string(), handle);
        self.push_front(handle);

        if self.index.len() > self.capacity { self.evict_tail() } else { None }
    }

    /// Drops every tracked key and reclaims all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn alloc(&mut self, key: String) -> usize {
        match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = Node { key, prev: NIL, next: NIL };
                handle
            }
            None => {
                self.slots.push(Node { key, prev: NIL, next: NIL });
                self.slots.len() - 1
            }
        }
    }

    fn push_front(&mut self, handle: usize) {
        self.slots[handle].prev = NIL;
        self.slots[handle].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = handle;
        }
        self.head = handle;
        if self.tail == NIL {
            self.tail = handle;
        }
    }

    fn unlink(&mut self, handle: usize) {
        let (prev, next) = (self.slots[handle].prev, self.slots[handle].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[handle].prev = NIL;
        self.slots[handle].next = NIL;
    }

    fn evict_tail(&mut self) -> Option<String> {
        let handle = self.tail;
        if handle == NIL {
            return None;
        }
        self.unlink(handle);
        self.free.push(handle);
        let key = std::mem::take(&mut self.slots[handle].key);
        self.index.remove(&key);
        Some(key)
    }
}
