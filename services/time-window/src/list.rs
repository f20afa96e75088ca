//! Ordered Linked Window
//!
//! A doubly-linked sequence with per-list Head/Tail sentinels that supports
//! O(1) insertion at either end and O(1) splicing of a whole list onto
//! either end of another.
//!
//! Nodes live in arena segments addressed by stable `NodeId`s. Every list
//! owns at least one segment (its own, where new nodes are pushed). A merge
//! moves the absorbed list's segments over without touching the nodes, then
//! relinks the four boundary pointers; handles taken from the absorbed list
//! stay valid in the surviving one.
//!
//! ```text
//!  Head ─► n0 ⇄ n1 ⇄ n2 ◄─ Tail        Head ─► m0 ⇄ m1 ◄─ Tail
//!                   │  merge_last          │
//!                   └──────────────────────┘
//!  Head ─► n0 ⇄ n1 ⇄ n2 ⇄ m0 ⇄ m1 ◄─ Tail  (other: destroyed)
//! ```
//!
//! The list never inspects the values; keeping them in time order is the
//! window's job.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use types::errors::WindowError;

/// Segment ids are unique across all lists so merged arenas never collide.
static NEXT_SEGMENT: AtomicU64 = AtomicU64::new(0);

/// Stable handle to a real element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    segment: u64,
    slot: u32,
}

/// A position in a list: one of the two sentinels or a real element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Head,
    Node(NodeId),
    Tail,
}

impl Link {
    /// True for Head and Tail. A `first()` or `last()` that returns a
    /// sentinel means the list is empty.
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Link::Node(_))
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Link::Node(id) => Some(*id),
            _ => None,
        }
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

struct Node<T> {
    value: T,
    prev: Link,
    next: Link,
}

/// Doubly-linked list with sentinel boundaries and destructible merge.
pub struct TimeList<T> {
    own_segment: u64,
    segments: HashMap<u64, Vec<Node<T>>>,
    /// `Head.next`
    head_next: Link,
    /// `Tail.prev`
    tail_prev: Link,
    len: usize,
    destroyed: bool,
}

impl<T> TimeList<T> {
    pub fn new() -> Self {
        let own_segment = NEXT_SEGMENT.fetch_add(1, Ordering::Relaxed);
        let mut segments = HashMap::new();
        segments.insert(own_segment, Vec::new());
        Self {
            own_segment,
            segments,
            head_next: Link::Tail,
            tail_prev: Link::Head,
            len: 0,
            destroyed: false,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Fails with `UsedAfterDestroy` once the list has been absorbed.
    pub fn ensure_alive(&self) -> Result<(), WindowError> {
        if self.destroyed {
            return Err(WindowError::UsedAfterDestroy);
        }
        Ok(())
    }

    /// First element, or `Link::Tail` when empty.
    pub fn first(&self) -> Result<Link, WindowError> {
        self.ensure_alive()?;
        Ok(self.head_next)
    }

    /// Last element, or `Link::Head` when empty.
    pub fn last(&self) -> Result<Link, WindowError> {
        self.ensure_alive()?;
        Ok(self.tail_prev)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value stored at `link`; `None` for sentinels.
    pub fn value(&self, link: Link) -> Result<Option<&T>, WindowError> {
        self.ensure_alive()?;
        match link {
            Link::Node(id) => Ok(Some(&self.node(id)?.value)),
            _ => Ok(None),
        }
    }

    /// Successor of `link`. Tail is its own successor.
    pub fn next(&self, link: Link) -> Result<Link, WindowError> {
        self.ensure_alive()?;
        match link {
            Link::Head => Ok(self.head_next),
            Link::Node(id) => Ok(self.node(id)?.next),
            Link::Tail => Ok(Link::Tail),
        }
    }

    /// Predecessor of `link`. Head is its own predecessor.
    pub fn prev(&self, link: Link) -> Result<Link, WindowError> {
        self.ensure_alive()?;
        match link {
            Link::Head => Ok(Link::Head),
            Link::Node(id) => Ok(self.node(id)?.prev),
            Link::Tail => Ok(self.tail_prev),
        }
    }

    /// Insert right after Head.
    pub fn add_first(&mut self, value: T) -> Result<NodeId, WindowError> {
        self.ensure_alive()?;
        let next = self.head_next;
        let id = self.push_node(value, Link::Head, next);
        self.set_prev(next, Link::Node(id));
        self.head_next = Link::Node(id);
        Ok(id)
    }

    /// Insert right before Tail.
    pub fn add_last(&mut self, value: T) -> Result<NodeId, WindowError> {
        self.ensure_alive()?;
        let prev = self.tail_prev;
        let id = self.push_node(value, prev, Link::Tail);
        self.set_next(prev, Link::Node(id));
        self.tail_prev = Link::Node(id);
        Ok(id)
    }

    /// Splice all of `other` in front of this list. `other` is destroyed.
    pub fn merge_first(&mut self, other: &mut TimeList<T>) -> Result<(), WindowError> {
        self.ensure_alive()?;
        other.ensure_alive()?;
        let left_first = other.head_next;
        let left_last = other.tail_prev;
        self.absorb(other);
        if let (Link::Node(left_first), Link::Node(left_last)) = (left_first, left_last) {
            let right_first = self.head_next;
            self.set_next(Link::Node(left_last), right_first);
            self.set_prev(right_first, Link::Node(left_last));
            self.head_next = Link::Node(left_first);
        }
        Ok(())
    }

    /// Splice all of `other` after this list. `other` is destroyed.
    pub fn merge_last(&mut self, other: &mut TimeList<T>) -> Result<(), WindowError> {
        self.ensure_alive()?;
        other.ensure_alive()?;
        let right_first = other.head_next;
        let right_last = other.tail_prev;
        self.absorb(other);
        if let (Link::Node(right_first), Link::Node(right_last)) = (right_first, right_last) {
            let left_last = self.tail_prev;
            self.set_next(left_last, Link::Node(right_first));
            self.set_prev(Link::Node(right_first), left_last);
            self.tail_prev = Link::Node(right_last);
        }
        Ok(())
    }

    /// Walk from `start` until a sentinel is reached. Starting at a sentinel
    /// yields nothing.
    pub fn iter(&self, start: Link, direction: Direction) -> Result<Iter<'_, T>, WindowError> {
        self.ensure_alive()?;
        Ok(Iter {
            list: self,
            current: start,
            direction,
        })
    }

    /// All elements front to back.
    pub fn iter_forward(&self) -> Result<Iter<'_, T>, WindowError> {
        self.iter(self.head_next, Direction::Forward)
    }

    /// All elements back to front.
    pub fn iter_backward(&self) -> Result<Iter<'_, T>, WindowError> {
        self.iter(self.tail_prev, Direction::Backward)
    }

    /// Take over `other`'s arena and leave it an inert, destroyed shell.
    fn absorb(&mut self, other: &mut TimeList<T>) {
        for (segment, nodes) in other.segments.drain() {
            self.segments.insert(segment, nodes);
        }
        self.len += other.len;
        other.len = 0;
        other.head_next = Link::Tail;
        other.tail_prev = Link::Head;
        other.destroyed = true;
    }

    fn push_node(&mut self, value: T, prev: Link, next: Link) -> NodeId {
        let nodes = self
            .segments
            .entry(self.own_segment)
            .or_insert_with(Vec::new);
        let id = NodeId {
            segment: self.own_segment,
            slot: nodes.len() as u32,
        };
        nodes.push(Node { value, prev, next });
        self.len += 1;
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node<T>, WindowError> {
        self.segments
            .get(&id.segment)
            .and_then(|nodes| nodes.get(id.slot as usize))
            .ok_or_else(|| WindowError::invalid_request("element does not belong to this list"))
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        self.segments
            .get_mut(&id.segment)
            .and_then(|nodes| nodes.get_mut(id.slot as usize))
    }

    fn set_next(&mut self, at: Link, next: Link) {
        match at {
            Link::Head => self.head_next = next,
            Link::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.next = next;
                }
            }
            Link::Tail => {}
        }
    }

    fn set_prev(&mut self, at: Link, prev: Link) {
        match at {
            Link::Tail => self.tail_prev = prev,
            Link::Node(id) => {
                if let Some(node) = self.node_mut(id) {
                    node.prev = prev;
                }
            }
            Link::Head => {}
        }
    }
}

impl<T> Default for TimeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for TimeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.destroyed {
            return f.write_str("TimeList(destroyed)");
        }
        let mut list = f.debug_list();
        if let Ok(iter) = self.iter_forward() {
            list.entries(iter.map(|(_, value)| value));
        }
        list.finish()
    }
}

/// Lazy walk over a list. Restart it by calling `TimeList::iter` again with
/// a stored handle.
pub struct Iter<'a, T> {
    list: &'a TimeList<T>,
    current: Link,
    direction: Direction,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current.node()?;
        let node = self.list.node(id).ok()?;
        self.current = match self.direction {
            Direction::Forward => node.next,
            Direction::Backward => node.prev,
        };
        Some((id, &node.value))
    }
}
