//! Arena-resident entries and the tagged bucket variant.

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable, generational address of an entry in the arena.
    pub(crate) struct EntryId;
}

new_key_type! {
    /// Address of a tree bin's bookkeeping record.
    pub(crate) struct TreeId;
}

pub(crate) type Arena<K, V> = SlotMap<EntryId, Entry<K, V>>;

/// Out-of-line records for tree bins, so a bucket slot stays one handle wide.
pub(crate) type Trees = SlotMap<TreeId, TreeBin>;

/// Red-black links. Only meaningful while the entry sits in a tree bin;
/// chain bins leave them cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) parent: Option<EntryId>,
    pub(crate) left: Option<EntryId>,
    pub(crate) right: Option<EntryId>,
    /// Insertion-order predecessor, the reverse of `Entry::next`.
    pub(crate) prev: Option<EntryId>,
    pub(crate) red: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u32,
    pub(crate) key: K,
    pub(crate) value: V,
    /// Successor in the bucket: chain order, or insertion order in a tree bin.
    pub(crate) next: Option<EntryId>,
    pub(crate) links: Links,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(hash: u32, key: K, value: V) -> Self {
        Self {
            hash,
            key,
            value,
            next: None,
            links: Links::default(),
        }
    }
}

/// Root and insertion-order bookkeeping of a tree bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TreeBin {
    pub(crate) root: EntryId,
    pub(crate) head: EntryId,
    pub(crate) tail: EntryId,
    pub(crate) len: usize,
}

/// Content of one bucket slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Bin {
    #[default]
    Empty,
    Chain {
        head: EntryId,
    },
    Tree(TreeId),
}

impl Bin {
    /// First entry in bucket order.
    pub(crate) fn head(&self, trees: &Trees) -> Option<EntryId> {
        match self {
            Bin::Empty => None,
            Bin::Chain { head } => Some(*head),
            Bin::Tree(tree) => trees.get(*tree).map(|t| t.head),
        }
    }

    pub(crate) fn kind(&self) -> BinKind {
        match self {
            Bin::Empty => BinKind::Empty,
            Bin::Chain { .. } => BinKind::Chain,
            Bin::Tree(_) => BinKind::Tree,
        }
    }
}

/// Public view of a bucket's current form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinKind {
    Empty,
    Chain,
    Tree,
}

/// Key equality as used by every probe: reference identity or `Eq`.
#[inline]
pub(crate) fn keys_match<Q: ?Sized + Eq>(stored: &Q, query: &Q) -> bool {
    core::ptr::eq(stored, query) || stored == query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_unlinked() {
        let e = Entry::new(7, "k", 1);
        assert_eq!(e.hash, 7);
        assert!(e.next.is_none());
        assert_eq!(e.links, Links::default());
        assert!(!e.links.red);
    }

    #[test]
    fn bin_head_and_kind() {
        let mut arena: Arena<&str, i32> = Arena::with_key();
        let mut trees = Trees::with_key();
        let a = arena.insert(Entry::new(1, "a", 1));
        assert_eq!(Bin::Empty.head(&trees), None);
        assert_eq!(Bin::Empty.kind(), BinKind::Empty);
        assert_eq!(Bin::Chain { head: a }.head(&trees), Some(a));
        let tid = trees.insert(TreeBin {
            root: a,
            head: a,
            tail: a,
            len: 1,
        });
        let tree = Bin::Tree(tid);
        assert_eq!(tree.head(&trees), Some(a));
        assert_eq!(tree.kind(), BinKind::Tree);
        trees.remove(tid);
        assert_eq!(tree.head(&trees), None);
    }

    #[test]
    fn bucket_slot_is_compact() {
        use core::mem::size_of;
        assert!(size_of::<Bin>() <= 2 * size_of::<EntryId>());
        assert!(size_of::<Bin>() < size_of::<TreeBin>());
    }

    #[test]
    fn keys_match_by_identity_or_equality() {
        let a = String::from("x");
        let b = String::from("x");
        assert!(keys_match(a.as_str(), a.as_str()));
        assert!(keys_match(a.as_str(), b.as_str()));
        assert!(!keys_match("x", "y"));
    }
}
