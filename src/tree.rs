//! TreeBalancer: red-black discipline for tree bins.
//!
//! A tree bin is ordered by stored hash first. Entries sharing a hash are
//! ordered by the map's key comparator when one is installed, and finally
//! by their arena id. The id order is arbitrary but stable for an entry's
//! lifetime; it exists only to keep the tree balanced and says nothing
//! about key equality, so lookups that cannot use the comparator scan the
//! whole same-hash region.
//!
//! Besides the tree links, every entry in a tree bin sits on a doubly
//! linked insertion-order list (`Entry::next` / `Links::prev`). Rotations
//! never touch it, which is what lets `untreeify` rebuild the original
//! chain order.

use core::cmp::Ordering;

use crate::entry::{Arena, EntryId, Links, TreeBin};

/// Optional comparator for keys that share a hash.
pub(crate) type KeyOrder<K> = Option<fn(&K, &K) -> Ordering>;

/// Total order of two entries inside a tree bin.
pub(crate) fn compare<K, V>(arena: &Arena<K, V>, order: KeyOrder<K>, a: EntryId, b: EntryId) -> Ordering {
    let (ea, eb) = (&arena[a], &arena[b]);
    ea.hash
        .cmp(&eb.hash)
        .then_with(|| order.map_or(Ordering::Equal, |cmp| cmp(&ea.key, &eb.key)))
        .then_with(|| a.cmp(&b))
}

/// Find the entry with `hash` whose key satisfies `is_match`.
///
/// `probe`, when given, compares the query against a stored key and must
/// agree with the comparator the tree was built with; without it every
/// same-hash subtree is searched.
pub(crate) fn find<K, V, F>(
    arena: &Arena<K, V>,
    root: Option<EntryId>,
    hash: u32,
    is_match: &mut F,
    probe: Option<&dyn Fn(&K) -> Ordering>,
) -> Option<EntryId>
where
    F: FnMut(&K) -> bool,
{
    let mut p = root;
    while let Some(id) = p {
        let e = &arena[id];
        let (left, right) = (e.links.left, e.links.right);
        if hash < e.hash {
            p = left;
        } else if hash > e.hash {
            p = right;
        } else if is_match(&e.key) {
            return Some(id);
        } else if left.is_none() {
            p = right;
        } else if right.is_none() {
            p = left;
        } else {
            match probe.map(|cmp| cmp(&e.key)) {
                Some(Ordering::Less) => p = left,
                Some(Ordering::Greater) => p = right,
                _ => {
                    if let Some(found) = find(arena, right, hash, is_match, probe) {
                        return Some(found);
                    }
                    p = left;
                }
            }
        }
    }
    None
}

/// Mutating tree operations over the entry arena.
pub(crate) struct TreeBalancer<'a, K, V> {
    arena: &'a mut Arena<K, V>,
    order: KeyOrder<K>,
}

impl<'a, K, V> TreeBalancer<'a, K, V> {
    pub(crate) fn new(arena: &'a mut Arena<K, V>, order: KeyOrder<K>) -> Self {
        Self { arena, order }
    }

    #[inline]
    fn links(&self, id: EntryId) -> &Links {
        &self.arena[id].links
    }

    #[inline]
    fn links_mut(&mut self, id: EntryId) -> &mut Links {
        &mut self.arena[id].links
    }

    #[inline]
    fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.links(id).parent
    }

    #[inline]
    fn left(&self, id: EntryId) -> Option<EntryId> {
        self.links(id).left
    }

    #[inline]
    fn right(&self, id: EntryId) -> Option<EntryId> {
        self.links(id).right
    }

    /// Absent children count as black.
    #[inline]
    fn red(&self, id: Option<EntryId>) -> bool {
        id.is_some_and(|id| self.links(id).red)
    }

    #[inline]
    fn set_red(&mut self, id: EntryId, red: bool) {
        self.links_mut(id).red = red;
    }

    /// Convert the chain starting at `head` into a tree bin. Chain order
    /// becomes the insertion order of the tree.
    pub(crate) fn treeify(&mut self, head: EntryId) -> TreeBin {
        self.arena[head].links = Links::default();
        let mut root = self.attach(None, head);
        let (mut tail, mut len) = (head, 1);
        let mut cur = self.arena[head].next;
        while let Some(id) = cur {
            cur = self.arena[id].next;
            self.arena[id].links = Links {
                prev: Some(tail),
                ..Links::default()
            };
            root = self.attach(Some(root), id);
            tail = id;
            len += 1;
        }
        TreeBin {
            root,
            head,
            tail,
            len,
        }
    }

    /// Drop the tree structure of the list starting at `head`, leaving a
    /// plain chain in insertion order. Returns the chain head.
    pub(crate) fn untreeify(&mut self, head: EntryId) -> EntryId {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let e = &mut self.arena[id];
            e.links = Links::default();
            cur = e.next;
        }
        head
    }

    /// Add the unlinked entry `x` to `tree`, at the tail of the insertion
    /// order and in its ordered position in the tree.
    pub(crate) fn insert(&mut self, tree: &mut TreeBin, x: EntryId) {
        self.arena[tree.tail].next = Some(x);
        let e = &mut self.arena[x];
        e.next = None;
        e.links = Links {
            prev: Some(tree.tail),
            ..Links::default()
        };
        tree.tail = x;
        tree.root = self.attach(Some(tree.root), x);
        tree.len += 1;
    }

    /// Unlink `p` from `tree` (both the tree and the insertion order).
    /// Returns `None` when the bin is left empty.
    pub(crate) fn remove(&mut self, tree: TreeBin, p: EntryId) -> Option<TreeBin> {
        if tree.len <= 1 {
            self.clear_entry(p);
            return None;
        }
        let (prev, next) = (self.links(p).prev, self.arena[p].next);
        if let Some(prev) = prev {
            self.arena[prev].next = next;
        }
        if let Some(next) = next {
            self.links_mut(next).prev = prev;
        }
        let head = if tree.head == p { next } else { Some(tree.head) };
        let tail = if tree.tail == p { prev } else { Some(tree.tail) };
        let root = self.detach(tree.root, p);
        self.clear_entry(p);
        match (root, head, tail) {
            (Some(root), Some(head), Some(tail)) => Some(TreeBin {
                root,
                head,
                tail,
                len: tree.len - 1,
            }),
            _ => unreachable!("tree bin with {} entries emptied by one removal", tree.len),
        }
    }

    fn clear_entry(&mut self, id: EntryId) {
        let e = &mut self.arena[id];
        e.next = None;
        e.links = Links::default();
    }

    /// Place `x` below `root` by tree order and rebalance. `x` keeps its
    /// `prev` link. Returns the new root.
    fn attach(&mut self, root: Option<EntryId>, x: EntryId) -> EntryId {
        let Some(root) = root else {
            let l = self.links_mut(x);
            l.parent = None;
            l.red = false;
            return x;
        };
        let mut p = root;
        loop {
            let go_left = compare(&*self.arena, self.order, x, p) == Ordering::Less;
            let child = if go_left { self.left(p) } else { self.right(p) };
            match child {
                Some(c) => p = c,
                None => {
                    self.links_mut(x).parent = Some(p);
                    if go_left {
                        self.links_mut(p).left = Some(x);
                    } else {
                        self.links_mut(p).right = Some(x);
                    }
                    break;
                }
            }
        }
        self.balance_insertion(root, x)
    }

    /// Remove `p` from the tree shape only. Nodes are relinked, never
    /// swapped by content, so ids held elsewhere stay valid.
    fn detach(&mut self, root: EntryId, p: EntryId) -> Option<EntryId> {
        let mut root = root;
        let (pl, pr) = (self.left(p), self.right(p));
        if p == root && pl.is_none() && pr.is_none() {
            return None;
        }
        let replacement = match (pl, pr) {
            (Some(pl), Some(pr)) => {
                // Move the in-order successor `s` into p's position.
                let mut s = pr;
                while let Some(sl) = self.left(s) {
                    s = sl;
                }
                let (s_red, p_red) = (self.links(s).red, self.links(p).red);
                self.set_red(s, p_red);
                self.set_red(p, s_red);
                let sr = self.right(s);
                let pp = self.parent(p);
                if s == pr {
                    self.links_mut(p).parent = Some(s);
                    self.links_mut(s).right = Some(p);
                } else {
                    let sp = self.parent(s);
                    self.links_mut(p).parent = sp;
                    if let Some(sp) = sp {
                        if self.left(sp) == Some(s) {
                            self.links_mut(sp).left = Some(p);
                        } else {
                            self.links_mut(sp).right = Some(p);
                        }
                    }
                    self.links_mut(s).right = Some(pr);
                    self.links_mut(pr).parent = Some(s);
                }
                self.links_mut(p).left = None;
                self.links_mut(p).right = sr;
                if let Some(sr) = sr {
                    self.links_mut(sr).parent = Some(p);
                }
                self.links_mut(s).left = Some(pl);
                self.links_mut(pl).parent = Some(s);
                self.links_mut(s).parent = pp;
                match pp {
                    None => root = s,
                    Some(pp) => {
                        if self.left(pp) == Some(p) {
                            self.links_mut(pp).left = Some(s);
                        } else {
                            self.links_mut(pp).right = Some(s);
                        }
                    }
                }
                sr.unwrap_or(p)
            }
            (Some(child), None) | (None, Some(child)) => child,
            (None, None) => p,
        };

        if replacement != p {
            let pp = self.parent(p);
            self.links_mut(replacement).parent = pp;
            match pp {
                None => {
                    root = replacement;
                    self.set_red(replacement, false);
                }
                Some(pp) => {
                    if self.left(pp) == Some(p) {
                        self.links_mut(pp).left = Some(replacement);
                    } else {
                        self.links_mut(pp).right = Some(replacement);
                    }
                }
            }
            let l = self.links_mut(p);
            l.parent = None;
            l.left = None;
            l.right = None;
        }

        let root = if self.links(p).red {
            root
        } else {
            self.balance_deletion(root, replacement)
        };

        // A childless p stood in as its own replacement during rebalancing.
        if replacement == p {
            if let Some(pp) = self.parent(p) {
                self.links_mut(p).parent = None;
                if self.left(pp) == Some(p) {
                    self.links_mut(pp).left = None;
                } else if self.right(pp) == Some(p) {
                    self.links_mut(pp).right = None;
                }
            }
        }
        Some(root)
    }

    fn rotate_left(&mut self, mut root: EntryId, p: EntryId) -> EntryId {
        if let Some(r) = self.right(p) {
            let rl = self.left(r);
            self.links_mut(p).right = rl;
            if let Some(rl) = rl {
                self.links_mut(rl).parent = Some(p);
            }
            let pp = self.parent(p);
            self.links_mut(r).parent = pp;
            match pp {
                None => {
                    root = r;
                    self.set_red(r, false);
                }
                Some(pp) => {
                    if self.left(pp) == Some(p) {
                        self.links_mut(pp).left = Some(r);
                    } else {
                        self.links_mut(pp).right = Some(r);
                    }
                }
            }
            self.links_mut(r).left = Some(p);
            self.links_mut(p).parent = Some(r);
        }
        root
    }

    fn rotate_right(&mut self, mut root: EntryId, p: EntryId) -> EntryId {
        if let Some(l) = self.left(p) {
            let lr = self.right(l);
            self.links_mut(p).left = lr;
            if let Some(lr) = lr {
                self.links_mut(lr).parent = Some(p);
            }
            let pp = self.parent(p);
            self.links_mut(l).parent = pp;
            match pp {
                None => {
                    root = l;
                    self.set_red(l, false);
                }
                Some(pp) => {
                    if self.right(pp) == Some(p) {
                        self.links_mut(pp).right = Some(l);
                    } else {
                        self.links_mut(pp).left = Some(l);
                    }
                }
            }
            self.links_mut(l).right = Some(p);
            self.links_mut(p).parent = Some(l);
        }
        root
    }

    fn balance_insertion(&mut self, mut root: EntryId, mut x: EntryId) -> EntryId {
        self.set_red(x, true);
        loop {
            let Some(xp) = self.parent(x) else {
                self.set_red(x, false);
                return x;
            };
            if !self.links(xp).red {
                return root;
            }
            let Some(xpp) = self.parent(xp) else {
                return root;
            };
            if self.left(xpp) == Some(xp) {
                let uncle = self.right(xpp);
                match uncle {
                    Some(u) if self.links(u).red => {
                        self.set_red(u, false);
                        self.set_red(xp, false);
                        self.set_red(xpp, true);
                        x = xpp;
                    }
                    _ => {
                        if self.right(xp) == Some(x) {
                            x = xp;
                            root = self.rotate_left(root, x);
                        }
                        if let Some(xp) = self.parent(x) {
                            self.set_red(xp, false);
                            if let Some(xpp) = self.parent(xp) {
                                self.set_red(xpp, true);
                                root = self.rotate_right(root, xpp);
                            }
                        }
                    }
                }
            } else {
                let uncle = self.left(xpp);
                match uncle {
                    Some(u) if self.links(u).red => {
                        self.set_red(u, false);
                        self.set_red(xp, false);
                        self.set_red(xpp, true);
                        x = xpp;
                    }
                    _ => {
                        if self.left(xp) == Some(x) {
                            x = xp;
                            root = self.rotate_right(root, x);
                        }
                        if let Some(xp) = self.parent(x) {
                            self.set_red(xp, false);
                            if let Some(xpp) = self.parent(xp) {
                                self.set_red(xpp, true);
                                root = self.rotate_left(root, xpp);
                            }
                        }
                    }
                }
            }
        }
    }

    fn balance_deletion(&mut self, mut root: EntryId, mut x: EntryId) -> EntryId {
        loop {
            if x == root {
                return root;
            }
            let Some(xp) = self.parent(x) else {
                self.set_red(x, false);
                return x;
            };
            if self.links(x).red {
                self.set_red(x, false);
                return root;
            }
            if self.left(xp) == Some(x) {
                let mut sibling = self.right(xp);
                if let Some(s) = sibling {
                    if self.links(s).red {
                        self.set_red(s, false);
                        self.set_red(xp, true);
                        root = self.rotate_left(root, xp);
                        sibling = self.right(xp);
                    }
                }
                let Some(s) = sibling else {
                    x = xp;
                    continue;
                };
                let (sl, sr) = (self.left(s), self.right(s));
                if !self.red(sl) && !self.red(sr) {
                    self.set_red(s, true);
                    x = xp;
                    continue;
                }
                if !self.red(sr) {
                    if let Some(sl) = sl {
                        self.set_red(sl, false);
                    }
                    self.set_red(s, true);
                    root = self.rotate_right(root, s);
                    sibling = self.right(xp);
                }
                if let Some(s) = sibling {
                    let xp_red = self.links(xp).red;
                    self.set_red(s, xp_red);
                    if let Some(sr) = self.right(s) {
                        self.set_red(sr, false);
                    }
                }
                self.set_red(xp, false);
                root = self.rotate_left(root, xp);
                x = root;
            } else {
                let mut sibling = self.left(xp);
                if let Some(s) = sibling {
                    if self.links(s).red {
                        self.set_red(s, false);
                        self.set_red(xp, true);
                        root = self.rotate_right(root, xp);
                        sibling = self.left(xp);
                    }
                }
                let Some(s) = sibling else {
                    x = xp;
                    continue;
                };
                let (sl, sr) = (self.left(s), self.right(s));
                if !self.red(sl) && !self.red(sr) {
                    self.set_red(s, true);
                    x = xp;
                    continue;
                }
                if !self.red(sl) {
                    if let Some(sr) = sr {
                        self.set_red(sr, false);
                    }
                    self.set_red(s, true);
                    root = self.rotate_left(root, s);
                    sibling = self.left(xp);
                }
                if let Some(s) = sibling {
                    let xp_red = self.links(xp).red;
                    self.set_red(s, xp_red);
                    if let Some(sl) = self.left(s) {
                        self.set_red(sl, false);
                    }
                }
                self.set_red(xp, false);
                root = self.rotate_right(root, xp);
                x = root;
            }
        }
    }
}

/// Verify every structural invariant of a tree bin: parent/child symmetry,
/// no red-red edge, equal black height, in-order sortedness, and an
/// insertion-order list that covers exactly the tree's entries.
#[cfg(test)]
pub(crate) fn check_tree<K, V>(
    arena: &Arena<K, V>,
    tree: &TreeBin,
    order: KeyOrder<K>,
) -> Result<(), String> {
    fn walk<K, V>(
        arena: &Arena<K, V>,
        id: Option<EntryId>,
        parent: Option<EntryId>,
        out: &mut Vec<EntryId>,
    ) -> Result<usize, String> {
        let Some(id) = id else { return Ok(1) };
        let l = &arena[id].links;
        if l.parent != parent {
            return Err(format!("{id:?}: parent link {:?}, expected {parent:?}", l.parent));
        }
        if l.red {
            for child in [l.left, l.right].into_iter().flatten() {
                if arena[child].links.red {
                    return Err(format!("red {id:?} has red child {child:?}"));
                }
            }
        }
        let lh = walk(arena, l.left, Some(id), out)?;
        out.push(id);
        let rh = walk(arena, l.right, Some(id), out)?;
        if lh != rh {
            return Err(format!("{id:?}: black heights differ ({lh} vs {rh})"));
        }
        Ok(lh + usize::from(!l.red))
    }

    let root = &arena[tree.root].links;
    if root.red {
        return Err("root is red".into());
    }
    let mut in_order = Vec::with_capacity(tree.len);
    walk(arena, Some(tree.root), None, &mut in_order)?;
    if in_order.len() != tree.len {
        return Err(format!("tree holds {} entries, bin says {}", in_order.len(), tree.len));
    }
    for pair in in_order.windows(2) {
        if compare(arena, order, pair[0], pair[1]) != Ordering::Less {
            return Err(format!("in-order violation between {:?} and {:?}", pair[0], pair[1]));
        }
    }

    let mut listed = Vec::with_capacity(tree.len);
    let (mut prev, mut cur) = (None, Some(tree.head));
    while let Some(id) = cur {
        if arena[id].links.prev != prev {
            return Err(format!("{id:?}: prev link {:?}, expected {prev:?}", arena[id].links.prev));
        }
        listed.push(id);
        prev = Some(id);
        cur = arena[id].next;
    }
    if prev != Some(tree.tail) {
        return Err(format!("insertion list ends at {prev:?}, tail is {:?}", tree.tail));
    }
    let mut a = in_order;
    a.sort();
    listed.sort();
    if a != listed {
        return Err("insertion list and tree hold different entries".into());
    }
    Ok(())
}
