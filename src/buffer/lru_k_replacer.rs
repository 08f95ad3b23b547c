use parking_lot::Mutex;

use crate::common::FrameId;

/// Sentinel for an absent list link.
const NIL: usize = usize::MAX;

/// Per-frame tracking state. Frames double as nodes of an intrusive
/// doubly-linked list; `prev`/`next` index into the node array.
#[derive(Debug, Clone)]
struct FrameNode {
    access_count: usize,
    evictable: bool,
    prev: usize,
    next: usize,
}

impl FrameNode {
    fn new() -> Self {
        Self {
            access_count: 0,
            evictable: false,
            prev: NIL,
            next: NIL,
        }
    }

    fn reset(&mut self) {
        self.access_count = 0;
        self.evictable = false;
    }
}

/// Head/tail handles of an intrusive list over the frame node array.
/// New entries go to the head, so the tail holds the least recent one.
#[derive(Debug)]
struct FrameList {
    head: usize,
    tail: usize,
}

impl FrameList {
    fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
        }
    }

    fn push_front(&mut self, nodes: &mut [FrameNode], id: usize) {
        nodes[id].prev = NIL;
        nodes[id].next = self.head;
        if self.head != NIL {
            nodes[self.head].prev = id;
        } else {
            self.tail = id;
        }
        self.head = id;
    }

    fn unlink(&mut self, nodes: &mut [FrameNode], id: usize) {
        let (prev, next) = (nodes[id].prev, nodes[id].next);
        if prev != NIL {
            nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        nodes[id].prev = NIL;
        nodes[id].next = NIL;
    }
}

struct ReplacerInner {
    nodes: Vec<FrameNode>,
    /// Frames with fewer than k recorded accesses, most recent first.
    history: FrameList,
    /// Frames with at least k recorded accesses, most recent first.
    cache: FrameList,
    /// Number of currently evictable frames.
    curr_size: usize,
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts the frame whose backward k-distance is the
/// maximum over all evictable frames, where the backward k-distance is the
/// time since the k-th most recent access. A frame with fewer than k
/// recorded accesses has infinite k-distance and always takes precedence;
/// ties among such frames break toward the earliest first access.
///
/// Frames are partitioned into two intrusive lists by whether they have
/// reached k accesses. Within each partition plain LRU order suffices, so
/// every operation is an O(1) list move and eviction is a tail scan.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    replacer_size: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    pub fn new(k: usize, replacer_size: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            replacer_size,
            inner: Mutex::new(ReplacerInner {
                nodes: vec![FrameNode::new(); replacer_size],
                history: FrameList::new(),
                cache: FrameList::new(),
                curr_size: 0,
            }),
        }
    }

    /// Validates the frame id against the replacer bound.
    ///
    /// # Panics
    /// Panics when the frame id is out of range; passing one is a
    /// programmer error.
    fn index_of(&self, frame_id: FrameId) -> usize {
        let id = frame_id.as_usize();
        assert!(
            id < self.replacer_size,
            "{} is out of range for replacer of size {}",
            frame_id,
            self.replacer_size
        );
        id
    }

    /// Records that the given frame was accessed.
    ///
    /// The first access places the frame in the history list. The k-th
    /// access migrates it to the cache list; later accesses move it back to
    /// the cache list head. Accesses between the first and the k-th leave
    /// the frame in place, since its k-distance stays infinite and its
    /// first-access order already ranks it.
    pub fn record_access(&self, frame_id: FrameId) {
        let id = self.index_of(frame_id);
        let mut inner = self.inner.lock();
        let ReplacerInner {
            nodes,
            history,
            cache,
            ..
        } = &mut *inner;

        nodes[id].access_count += 1;
        let count = nodes[id].access_count;
        if count == 1 && self.k > 1 {
            history.push_front(nodes, id);
        } else if count == 1 {
            // k == 1: a single access already reaches the cache list
            cache.push_front(nodes, id);
        } else if count == self.k {
            history.unlink(nodes, id);
            cache.push_front(nodes, id);
        } else if count > self.k {
            cache.unlink(nodes, id);
            cache.push_front(nodes, id);
        }
    }

    /// Sets whether a frame is evictable, adjusting the evictable count.
    /// Never moves the frame between lists. No-op for frames that have
    /// never been accessed.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let id = self.index_of(frame_id);
        let mut inner = self.inner.lock();
        if inner.nodes[id].access_count == 0 {
            return;
        }
        if inner.nodes[id].evictable != evictable {
            if evictable {
                inner.curr_size += 1;
            } else {
                inner.curr_size -= 1;
            }
            inner.nodes[id].evictable = evictable;
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance.
    ///
    /// Frames still short of k accesses have infinite k-distance and are
    /// victimized first, oldest first access first; only when none is
    /// evictable does the least recently used cache-list frame go. Returns
    /// `None` if no frame is evictable. The victim's access history is
    /// forgotten.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.curr_size == 0 {
            return None;
        }
        let ReplacerInner {
            nodes,
            history,
            cache,
            curr_size,
        } = &mut *inner;

        let mut id = history.tail;
        while id != NIL {
            if nodes[id].evictable {
                history.unlink(nodes, id);
                nodes[id].reset();
                *curr_size -= 1;
                return Some(FrameId::new(id as u32));
            }
            id = nodes[id].prev;
        }

        let mut id = cache.tail;
        while id != NIL {
            if nodes[id].evictable {
                cache.unlink(nodes, id);
                nodes[id].reset();
                *curr_size -= 1;
                return Some(FrameId::new(id as u32));
            }
            id = nodes[id].prev;
        }

        None
    }

    /// Removes a tracked frame from the replacer, forgetting its history.
    /// No-op for frames that have never been accessed.
    ///
    /// # Panics
    /// Panics when the frame is tracked but currently non-evictable;
    /// removing a pinned frame is a programmer error.
    pub fn remove(&self, frame_id: FrameId) {
        let id = self.index_of(frame_id);
        let mut inner = self.inner.lock();
        let ReplacerInner {
            nodes,
            history,
            cache,
            curr_size,
        } = &mut *inner;

        let count = nodes[id].access_count;
        if count == 0 {
            return;
        }
        assert!(
            nodes[id].evictable,
            "cannot remove non-evictable {}",
            frame_id
        );
        if count < self.k {
            history.unlink(nodes, id);
        } else {
            cache.unlink(nodes, id);
        }
        nodes[id].reset();
        *curr_size -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
