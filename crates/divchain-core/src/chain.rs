//! Circular doubly linked chain over a shared node arena.
//!
//! A [`Chain`] is a head *cursor* into nodes owned by an [`Arena`],
//! not an owner of node storage itself: the head is just a position in
//! the ring, and node ownership lives one level down in the arena.
//! [`DivChainTable`] owns one [`Arena`] shared by every slot's
//! [`Chain`], so a grow step can splice existing arena nodes into new
//! slot chains without ever allocating a new node — the address
//! stability a raw-pointer ring would get from pointer identity, this
//! crate gets from a stable `(index, generation)` handle into the
//! arena.
//!
//! [`DivChainTable`]: crate::table::DivChainTable

use crate::alignment::AlignedBytes;
use crate::callbacks::KeyCompare;

/// A stable reference to one arena-resident node.
///
/// Valid only for the `Arena` that issued it. A handle whose node has
/// since been removed is detectably stale: `generation` will no
/// longer match the slot's current generation, so the arena's
/// accessors return `None` instead of aliasing an unrelated node that
/// was later allocated into the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: usize,
    generation: u32,
}

struct Node {
    key: Vec<u8>,
    value: AlignedBytes,
    prev: usize,
    next: usize,
}

enum Slot {
    Free,
    Occupied(Node),
}

/// Shared node storage for every [`Chain`] (slot) in a table.
///
/// A generational arena: a `Vec<Slot>` plus a `free_list: Vec<usize>`
/// of indices available for reuse, each slot carrying a generation
/// counter bumped on every free so stale handles are detectable
/// rather than dangling.
pub struct Arena {
    slots: Vec<Slot>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    key_size: usize,
    elt_size: usize,
    alignment: usize,
}

impl Arena {
    #[must_use]
    pub fn new(key_size: usize, elt_size: usize, alignment: usize) -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            key_size,
            elt_size,
            alignment,
        }
    }

    /// Updates the alignment used for subsequently allocated value
    /// areas. Existing nodes are unaffected.
    pub fn set_alignment(&mut self, alignment: usize) {
        self.alignment = alignment;
    }

    #[must_use]
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    #[must_use]
    pub fn elt_size(&self) -> usize {
        self.elt_size
    }

    fn alloc(&mut self, key: &[u8], value: &[u8]) -> NodeHandle {
        debug_assert_eq!(key.len(), self.key_size);
        debug_assert_eq!(value.len(), self.elt_size);
        let mut buf = AlignedBytes::zeroed(self.elt_size, self.alignment);
        buf.as_mut_slice().copy_from_slice(value);
        let node = Node {
            key: key.to_vec(),
            value: buf,
            prev: 0,
            next: 0,
        };
        let index = if let Some(index) = self.free_list.pop() {
            self.slots[index] = Slot::Occupied(node);
            index
        } else {
            self.slots.push(Slot::Occupied(node));
            self.generations.push(0);
            self.slots.len() - 1
        };
        NodeHandle {
            index,
            generation: self.generations[index],
        }
    }

    fn node(&self, index: usize) -> &Node {
        match &self.slots[index] {
            Slot::Occupied(n) => n,
            Slot::Free => unreachable!("index belongs to a live chain"),
        }
    }

    fn node_mut(&mut self, index: usize) -> &mut Node {
        match &mut self.slots[index] {
            Slot::Occupied(n) => n,
            Slot::Free => unreachable!("index belongs to a live chain"),
        }
    }

    /// Resolves a handle to its current key/value, or `None` if the
    /// node was removed (and possibly recycled) since the handle was
    /// issued.
    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> Option<(&[u8], &[u8])> {
        if self.generations.get(handle.index).copied() != Some(handle.generation) {
            return None;
        }
        let node = self.node(handle.index);
        Some((&node.key, node.value.as_slice()))
    }

    /// Mutable access to a handle's value area, or `None` if stale.
    pub fn get_value_mut(&mut self, handle: NodeHandle) -> Option<&mut [u8]> {
        if self.generations.get(handle.index).copied() != Some(handle.generation) {
            return None;
        }
        Some(self.node_mut(handle.index).value.as_mut_slice())
    }

    fn free(&mut self, index: usize) {
        self.slots[index] = Slot::Free;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free_list.push(index);
    }
}

/// A circular doubly linked ring of arena nodes, identified by a
/// movable head cursor. Empty iff `head.is_none()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Chain {
    head: Option<usize>,
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self { head: None }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn splice_before_head(&mut self, arena: &mut Arena, index: usize) {
        match self.head {
            None => {
                let node = arena.node_mut(index);
                node.prev = index;
                node.next = index;
            }
            Some(head) => {
                let tail = arena.node(head).prev;
                arena.node_mut(tail).next = index;
                arena.node_mut(head).prev = index;
                let node = arena.node_mut(index);
                node.prev = tail;
                node.next = head;
            }
        }
        self.head = Some(index);
    }

    /// Allocates a new node holding `key`/`value` and splices it
    /// immediately before the current head, which becomes the new
    /// head. `O(1)`.
    pub fn prepend_new(&mut self, arena: &mut Arena, key: &[u8], value: &[u8]) -> NodeHandle {
        let handle = arena.alloc(key, value);
        self.splice_before_head(arena, handle.index);
        handle
    }

    /// Equivalent to [`Chain::prepend_new`] followed by advancing the
    /// head to `head.next`, so the new node becomes the predecessor
    /// (not the head) of the ring. `O(1)`.
    pub fn append_new(&mut self, arena: &mut Arena, key: &[u8], value: &[u8]) -> NodeHandle {
        let handle = self.prepend_new(arena, key, value);
        if let Some(head) = self.head {
            self.head = Some(arena.node(head).next);
        }
        handle
    }

    /// Walks the ring from the head, returning the first node whose
    /// key compares equal under `cmp`. `None` if the chain is empty
    /// or no node matches.
    #[must_use]
    pub fn search_key(&self, arena: &Arena, key: &[u8], cmp: &dyn KeyCompare) -> Option<NodeHandle> {
        let head = self.head?;
        let mut cur = head;
        loop {
            let node = arena.node(cur);
            if cmp.keys_equal(&node.key, key) {
                return Some(NodeHandle {
                    index: cur,
                    generation: arena.generations[cur],
                });
            }
            cur = node.next;
            if cur == head {
                return None;
            }
        }
    }

    /// Detaches `handle`'s node from the ring without freeing it.
    /// Returns `false` if the handle is stale or not actually part of
    /// this chain, treated as a no-op rather than a panic: removing
    /// something already absent is not an error condition callers need
    /// to guard against.
    pub fn remove(&mut self, arena: &mut Arena, handle: NodeHandle) -> bool {
        let Some(head) = self.head else { return false };
        if arena.generations.get(handle.index).copied() != Some(handle.generation) {
            return false;
        }
        let index = handle.index;
        let (prev, next) = {
            let node = arena.node(index);
            (node.prev, node.next)
        };
        if prev == index {
            // Singleton ring.
            self.head = None;
        } else {
            arena.node_mut(prev).next = next;
            arena.node_mut(next).prev = prev;
            if head == index {
                self.head = Some(next);
            }
        }
        true
    }

    /// Removes and deallocates `handle`'s node. Callers needing a
    /// [`FreeElt`] side effect on the displaced value should invoke it
    /// against the value read from [`Arena::get`] before calling this
    /// (the table layer does this; see `DivChainTable::delete`).
    pub fn delete_bytes(&mut self, arena: &mut Arena, handle: NodeHandle) -> bool {
        if !self.remove(arena, handle) {
            return false;
        }
        arena.free(handle.index);
        true
    }

    /// Iterates once around the ring, deallocating every node, then
    /// marks the chain empty.
    pub fn free_all(&mut self, arena: &mut Arena) {
        let Some(head) = self.head else { return };
        let mut cur = head;
        loop {
            let next = arena.node(cur).next;
            arena.free(cur);
            if next == head {
                break;
            }
            cur = next;
        }
        self.head = None;
    }

    /// Splices an already-allocated, currently detached arena node
    /// onto the front of this chain, becoming its new head. The
    /// externally-provided-node counterpart to `prepend_new`: no
    /// allocation occurs, so the handle and its address stay valid.
    /// Used by `DivChainTable::grow` to re-home nodes into resized
    /// slots.
    ///
    /// Caller guarantees `handle` is not currently part of any ring.
    pub fn prepend_existing(&mut self, arena: &mut Arena, handle: NodeHandle) {
        self.splice_before_head(arena, handle.index);
    }

    /// As [`Chain::prepend_existing`], but the spliced node becomes
    /// the predecessor of the (unchanged) head rather than the head
    /// itself — the externally-provided-node counterpart to
    /// `append_new`.
    ///
    /// Caller guarantees `handle` is not currently part of any ring.
    pub fn append_existing(&mut self, arena: &mut Arena, handle: NodeHandle) {
        let was_empty = self.head.is_none();
        self.splice_before_head(arena, handle.index);
        if !was_empty {
            self.head = Some(arena.node(handle.index).next);
        }
    }

    /// Walks the ring from the head, returning the first node whose
    /// value satisfies `cmp_elt`. `None` if the chain is empty or no
    /// node matches.
    #[must_use]
    pub fn search_elt(&self, arena: &Arena, cmp_elt: &dyn Fn(&[u8]) -> bool) -> Option<NodeHandle> {
        let head = self.head?;
        let mut cur = head;
        loop {
            let node = arena.node(cur);
            if cmp_elt(node.value.as_slice()) {
                return Some(NodeHandle {
                    index: cur,
                    generation: arena.generations[cur],
                });
            }
            cur = node.next;
            if cur == head {
                return None;
            }
        }
    }

    /// Handles for every live node, starting at the head, in ring
    /// order. Used by grow (to rehash) and by invariant checks.
    pub fn handles(&self, arena: &Arena) -> Vec<NodeHandle> {
        let Some(head) = self.head else { return Vec::new() };
        let mut out = Vec::new();
        let mut cur = head;
        loop {
            out.push(NodeHandle {
                index: cur,
                generation: arena.generations[cur],
            });
            cur = arena.node(cur).next;
            if cur == head {
                break;
            }
        }
        out
    }

    #[must_use]
    pub fn len(&self, arena: &Arena) -> usize {
        self.handles(arena).len()
    }
}
