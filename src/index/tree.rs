//! B+tree structure: descent, insertion with split propagation, exact
//! deletion.

use std::cmp::Ordering;
use std::path::Path;

use super::error::IndexError;
use super::node::{
    internal_capacity, leaf_capacity, node_kind, InternalEntry, InternalNode, LeafNode,
    NODE_INTERNAL, NODE_LEAF,
};
use super::scan::IndexScanner;
use crate::datum::{compare_typed, AttrType, CompOp};
use crate::record::RowId;
use crate::storage::{
    BufferPool, FileStorage, PageNo, Storage, StorageError, DEFAULT_POOL_SIZE,
};

const META_ROOT: usize = 0;
const META_KEY_LEN: usize = 4;
const META_ATTR_TYPE: usize = 8;

fn attr_type_to_u8(attr_type: AttrType) -> u8 {
    match attr_type {
        AttrType::Undefined => 0,
        AttrType::Chars => 1,
        AttrType::Int => 2,
        AttrType::Float => 3,
        AttrType::Date => 4,
        AttrType::Text => 5,
        AttrType::Nulls => 6,
    }
}

fn attr_type_from_u8(v: u8) -> Option<AttrType> {
    match v {
        0 => Some(AttrType::Undefined),
        1 => Some(AttrType::Chars),
        2 => Some(AttrType::Int),
        3 => Some(AttrType::Float),
        4 => Some(AttrType::Date),
        5 => Some(AttrType::Text),
        6 => Some(AttrType::Nulls),
        _ => None,
    }
}

/// Disk-resident ordered map from one column's values to [`RowId`]s.
///
/// Page 0 holds the root pointer and key descriptor; every other page is a
/// tree node. Duplicate column values are permitted: the full entry key is
/// `(null_tag, payload, row_id)`, which is unique per row.
pub struct BPlusTree<S: Storage> {
    pool: BufferPool<S>,
    attr_type: AttrType,
    key_len: usize,
    root: PageNo,
}

impl BPlusTree<FileStorage> {
    /// Creates a new index file with an empty root leaf.
    ///
    /// `key_len` is the width of the indexed field's payload.
    pub fn create(
        path: impl AsRef<Path>,
        attr_type: AttrType,
        key_len: usize,
    ) -> Result<Self, IndexError> {
        let storage = FileStorage::create(path.as_ref())?;
        Self::init_pool(BufferPool::new(storage, DEFAULT_POOL_SIZE), attr_type, key_len)
    }

    /// Opens an existing index file, validating the key descriptor.
    pub fn open(
        path: impl AsRef<Path>,
        attr_type: AttrType,
        key_len: usize,
    ) -> Result<Self, IndexError> {
        let storage = FileStorage::open(path.as_ref())?;
        Self::open_pool(BufferPool::new(storage, DEFAULT_POOL_SIZE), attr_type, key_len)
    }
}

impl<S: Storage> BPlusTree<S> {
    /// Initializes an empty tree over a fresh buffer pool.
    pub fn init_pool(
        pool: BufferPool<S>,
        attr_type: AttrType,
        key_len: usize,
    ) -> Result<Self, IndexError> {
        let sk = key_len + 1;
        if leaf_capacity(sk) < 2 || internal_capacity(sk) < 2 {
            return Err(IndexError::KeyTooLarge(key_len));
        }

        {
            let guard = pool.new_page()?;
            debug_assert_eq!(guard.page_no(), 0);
        }
        let root = {
            let mut guard = pool.new_page()?;
            let mut leaf = LeafNode::new(&mut *guard, sk);
            leaf.init();
            guard.page_no()
        };

        let tree = Self {
            pool,
            attr_type,
            key_len,
            root,
        };
        tree.write_meta()?;
        Ok(tree)
    }

    /// Opens a tree over an existing buffer pool, reading the root pointer
    /// from page 0.
    pub fn open_pool(
        pool: BufferPool<S>,
        attr_type: AttrType,
        key_len: usize,
    ) -> Result<Self, IndexError> {
        if pool.page_count() < 2 {
            return Err(IndexError::Corrupted("missing meta or root page".into()));
        }
        let (root, stored_len, stored_type) = {
            let guard = pool.fetch_page(0)?;
            let root = u32::from_le_bytes([
                guard[META_ROOT],
                guard[META_ROOT + 1],
                guard[META_ROOT + 2],
                guard[META_ROOT + 3],
            ]);
            let len = u32::from_le_bytes([
                guard[META_KEY_LEN],
                guard[META_KEY_LEN + 1],
                guard[META_KEY_LEN + 2],
                guard[META_KEY_LEN + 3],
            ]);
            (root, len as usize, guard[META_ATTR_TYPE])
        };

        if stored_len != key_len {
            return Err(IndexError::Corrupted(format!(
                "key length {} does not match field width {}",
                stored_len, key_len
            )));
        }
        match attr_type_from_u8(stored_type) {
            Some(t) if t == attr_type => {}
            _ => {
                return Err(IndexError::Corrupted(format!(
                    "key type {} does not match field type {}",
                    stored_type, attr_type
                )))
            }
        }
        if root == 0 || root >= pool.page_count() {
            return Err(IndexError::Corrupted(format!("invalid root page {}", root)));
        }

        Ok(Self {
            pool,
            attr_type,
            key_len,
            root,
        })
    }

    pub(super) fn pool(&self) -> &BufferPool<S> {
        &self.pool
    }

    pub(super) fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Stored key length: one null-tag byte plus the field payload.
    pub(super) fn sk(&self) -> usize {
        self.key_len + 1
    }

    pub(super) fn key_len(&self) -> usize {
        self.key_len
    }

    /// Builds the stored form of a key. Null keys are normalized to all
    /// zeroes under the minimum tag, independent of the slot sentinel.
    pub(super) fn stored_key(&self, payload: &[u8], is_null: bool) -> Vec<u8> {
        let mut key = vec![0u8; self.sk()];
        if !is_null {
            key[0] = 1;
            key[1..].copy_from_slice(payload);
        }
        key
    }

    pub(super) fn cmp_stored(
        &self,
        a_key: &[u8],
        a_rid: RowId,
        b_key: &[u8],
        b_rid: RowId,
    ) -> Ordering {
        a_key[0]
            .cmp(&b_key[0])
            .then_with(|| {
                if a_key[0] == 0 {
                    Ordering::Equal
                } else {
                    compare_typed(self.attr_type, &a_key[1..], &b_key[1..])
                }
            })
            .then_with(|| a_rid.cmp(&b_rid))
    }

    /// Inserts an index entry for a row.
    ///
    /// `payload` is the raw field bytes from the row buffer; `is_null` the
    /// row's null flag for that field.
    pub fn insert_entry(
        &mut self,
        payload: &[u8],
        is_null: bool,
        rid: RowId,
    ) -> Result<(), IndexError> {
        self.check_payload(payload)?;
        let key = self.stored_key(payload, is_null);
        let (path, leaf_no) = self.descend(&key, rid)?;

        let split = {
            let mut guard = self.pool.fetch_page_mut(leaf_no)?;
            let mut leaf = LeafNode::new(&mut *guard, self.sk());
            let pos = self.leaf_lower_bound(&leaf, &key, rid);

            if leaf.key_count() < leaf.capacity() {
                leaf.insert_entry(pos, &key, rid);
                None
            } else {
                let mut entries = leaf.entries();
                entries.insert(pos, (key.clone(), rid));
                let left_n = entries.len().div_ceil(2);
                let right = entries.split_off(left_n);
                let old_next = leaf.next_leaf();

                let mut rguard = self.pool.new_page()?;
                let right_no = rguard.page_no();
                let mut rleaf = LeafNode::new(&mut *rguard, self.sk());
                rleaf.init();
                rleaf.set_entries(&right);
                rleaf.set_next_leaf(old_next);

                leaf.set_entries(&entries);
                leaf.set_next_leaf(right_no);

                Some((right[0].0.clone(), right[0].1, right_no))
            }
        };

        if let Some((sep_key, sep_rid, right_no)) = split {
            self.insert_into_parents(path, leaf_no, sep_key, sep_rid, right_no)?;
        }
        Ok(())
    }

    /// Removes the exact `(key, row_id)` entry.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::KeyNotFound`] if the pair is absent.
    pub fn delete_entry(
        &mut self,
        payload: &[u8],
        is_null: bool,
        rid: RowId,
    ) -> Result<(), IndexError> {
        self.check_payload(payload)?;
        let key = self.stored_key(payload, is_null);
        let (_, leaf_no) = self.descend(&key, rid)?;

        let mut guard = self.pool.fetch_page_mut(leaf_no)?;
        let mut leaf = LeafNode::new(&mut *guard, self.sk());
        let pos = self.leaf_lower_bound(&leaf, &key, rid);
        if pos < leaf.key_count()
            && self.cmp_stored(leaf.key(pos), leaf.rid(pos), &key, rid) == Ordering::Equal
        {
            leaf.remove_entry(pos);
            Ok(())
        } else {
            Err(IndexError::KeyNotFound)
        }
    }

    /// Opens an ordered scan positioned by `op value`.
    ///
    /// Null rows are stored under the dedicated minimum key and never
    /// produced by a comparison scan; a scan against a NULL literal yields
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnsupportedOperator`] for operators without an
    /// ordered-scan interpretation.
    pub fn scan(
        &self,
        op: CompOp,
        value: &[u8],
        value_is_null: bool,
    ) -> Result<IndexScanner<'_, S>, IndexError> {
        IndexScanner::position(self, op, value, value_is_null)
    }

    /// Writes all dirty pages back and syncs the backing file.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.pool.flush_all()
    }

    fn check_payload(&self, payload: &[u8]) -> Result<(), IndexError> {
        if payload.len() != self.key_len {
            return Err(IndexError::InvalidKeyLength {
                expected: self.key_len,
                actual: payload.len(),
            });
        }
        Ok(())
    }

    fn write_meta(&self) -> Result<(), IndexError> {
        let mut guard = self.pool.fetch_page_mut(0)?;
        guard[META_ROOT..META_ROOT + 4].copy_from_slice(&self.root.to_le_bytes());
        guard[META_KEY_LEN..META_KEY_LEN + 4]
            .copy_from_slice(&(self.key_len as u32).to_le_bytes());
        guard[META_ATTR_TYPE] = attr_type_to_u8(self.attr_type);
        Ok(())
    }

    /// Walks from the root to the leaf that owns `(key, rid)`, recording
    /// the internal pages visited.
    fn descend(&self, key: &[u8], rid: RowId) -> Result<(Vec<PageNo>, PageNo), IndexError> {
        let mut path = Vec::new();
        let mut cur = self.root;
        loop {
            let guard = self.pool.fetch_page(cur)?;
            match node_kind(&guard) {
                NODE_LEAF => return Ok((path, cur)),
                NODE_INTERNAL => {
                    let node = InternalNode::new(&*guard, self.sk());
                    let idx = self.route(&node, key, rid);
                    let next = node.child_at(idx);
                    path.push(cur);
                    cur = next;
                }
                other => {
                    return Err(IndexError::Corrupted(format!(
                        "page {} has invalid node kind {}",
                        cur, other
                    )))
                }
            }
        }
    }

    /// Number of separator entries at or below `(key, rid)`; the matching
    /// child pointer index.
    fn route<T: AsRef<[u8]>>(&self, node: &InternalNode<T>, key: &[u8], rid: RowId) -> usize {
        let mut lo = 0;
        let mut hi = node.key_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.cmp_stored(node.key(mid), node.rid(mid), key, rid) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// First leaf position whose entry is not below `(key, rid)`.
    pub(super) fn leaf_lower_bound<T: AsRef<[u8]>>(
        &self,
        leaf: &LeafNode<T>,
        key: &[u8],
        rid: RowId,
    ) -> usize {
        let mut lo = 0;
        let mut hi = leaf.key_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.cmp_stored(leaf.key(mid), leaf.rid(mid), key, rid) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Seeks the first entry at or above `(key, rid)`.
    pub(super) fn seek_lower(
        &self,
        key: &[u8],
        rid: RowId,
    ) -> Result<(PageNo, usize), IndexError> {
        let (_, leaf_no) = self.descend(key, rid)?;
        let guard = self.pool.fetch_page(leaf_no)?;
        let leaf = LeafNode::new(&*guard, self.sk());
        Ok((leaf_no, self.leaf_lower_bound(&leaf, key, rid)))
    }

    /// Returns the leftmost leaf page.
    pub(super) fn leftmost_leaf(&self) -> Result<PageNo, IndexError> {
        let mut cur = self.root;
        loop {
            let guard = self.pool.fetch_page(cur)?;
            match node_kind(&guard) {
                NODE_LEAF => return Ok(cur),
                NODE_INTERNAL => {
                    let node = InternalNode::new(&*guard, self.sk());
                    let next = node.child_at(0);
                    cur = next;
                }
                other => {
                    return Err(IndexError::Corrupted(format!(
                        "page {} has invalid node kind {}",
                        cur, other
                    )))
                }
            }
        }
    }

    /// Inserts a promoted separator into the parent chain, splitting
    /// upward as needed.
    fn insert_into_parents(
        &mut self,
        mut path: Vec<PageNo>,
        mut left_no: PageNo,
        mut key: Vec<u8>,
        mut rid: RowId,
        mut right_no: PageNo,
    ) -> Result<(), IndexError> {
        loop {
            let parent_no = match path.pop() {
                None => {
                    // The split node was the root: grow the tree by one level
                    let mut guard = self.pool.new_page()?;
                    let new_root = guard.page_no();
                    let mut node = InternalNode::new(&mut *guard, self.sk());
                    node.init(left_no);
                    node.insert_entry(
                        0,
                        &InternalEntry {
                            key,
                            rid,
                            child: right_no,
                        },
                    );
                    drop(guard);
                    self.root = new_root;
                    self.write_meta()?;
                    return Ok(());
                }
                Some(p) => p,
            };

            let propagate = {
                let mut guard = self.pool.fetch_page_mut(parent_no)?;
                let mut node = InternalNode::new(&mut *guard, self.sk());
                let pos = self.route(&node, &key, rid);

                if node.key_count() < node.capacity() {
                    node.insert_entry(
                        pos,
                        &InternalEntry {
                            key: key.clone(),
                            rid,
                            child: right_no,
                        },
                    );
                    None
                } else {
                    let (first_child, mut entries) = node.entries();
                    entries.insert(
                        pos,
                        InternalEntry {
                            key: key.clone(),
                            rid,
                            child: right_no,
                        },
                    );
                    let mid = entries.len() / 2;
                    let right_entries = entries.split_off(mid + 1);
                    let promoted = match entries.pop() {
                        Some(e) => e,
                        None => {
                            return Err(IndexError::Corrupted(
                                "internal split on empty node".into(),
                            ))
                        }
                    };

                    let mut rguard = self.pool.new_page()?;
                    let new_no = rguard.page_no();
                    let mut rnode = InternalNode::new(&mut *rguard, self.sk());
                    rnode.init(promoted.child);
                    rnode.set_entries(promoted.child, &right_entries);

                    node.set_entries(first_child, &entries);
                    Some((promoted.key, promoted.rid, new_no))
                }
            };

            match propagate {
                None => return Ok(()),
                Some((p_key, p_rid, new_no)) => {
                    key = p_key;
                    rid = p_rid;
                    right_no = new_no;
                    left_no = parent_no;
                }
            }
        }
    }
}
