//! Operator-positioned scan over B+tree leaves.

use std::cmp::Ordering;

use super::error::IndexError;
use super::node::LeafNode;
use super::tree::BPlusTree;
use crate::datum::{compare_typed, CompOp};
use crate::record::RowId;
use crate::storage::{PageNo, Storage};

enum Step {
    Yield,
    Skip,
    Stop,
}

/// Stateful cursor producing [`RowId`]s in key order.
///
/// Positioned at creation time according to the scan operator; each call to
/// [`next_entry`](Self::next_entry) pins at most one leaf page. Entries
/// under the null tag are never produced.
pub struct IndexScanner<'a, S: Storage> {
    tree: &'a BPlusTree<S>,
    op: CompOp,
    /// Bound in stored form (present tag + payload).
    bound: Vec<u8>,
    pos: Option<(PageNo, usize)>,
}

impl<'a, S: Storage> IndexScanner<'a, S> {
    pub(super) fn position(
        tree: &'a BPlusTree<S>,
        op: CompOp,
        value: &[u8],
        value_is_null: bool,
    ) -> Result<Self, IndexError> {
        if !matches!(
            op,
            CompOp::Eq | CompOp::Lt | CompOp::Le | CompOp::Gt | CompOp::Ge
        ) {
            return Err(IndexError::UnsupportedOperator(op));
        }

        // Comparing against NULL holds for no row; the scan is empty.
        if value_is_null {
            return Ok(Self {
                tree,
                op,
                bound: Vec::new(),
                pos: None,
            });
        }

        if value.len() != tree.key_len() {
            return Err(IndexError::InvalidKeyLength {
                expected: tree.key_len(),
                actual: value.len(),
            });
        }

        let bound = tree.stored_key(value, false);
        let pos = match op {
            CompOp::Eq | CompOp::Ge => {
                Some(tree.seek_lower(&bound, RowId::new(0, 0))?)
            }
            CompOp::Gt => {
                Some(tree.seek_lower(&bound, RowId::new(u32::MAX, u32::MAX))?)
            }
            CompOp::Lt | CompOp::Le => Some((tree.leftmost_leaf()?, 0)),
            _ => None,
        };

        Ok(Self {
            tree,
            op,
            bound,
            pos,
        })
    }

    /// Yields the next matching row identifier, or `None` once the scan
    /// predicate ceases to hold or the index is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<RowId>, IndexError> {
        loop {
            let (page_no, idx) = match self.pos {
                Some(p) => p,
                None => return Ok(None),
            };

            let guard = self.tree.pool().fetch_page(page_no)?;
            let leaf = LeafNode::new(&*guard, self.tree.sk());

            if idx >= leaf.key_count() {
                let next = leaf.next_leaf();
                self.pos = if next == 0 { None } else { Some((next, 0)) };
                continue;
            }

            let key = leaf.key(idx);
            if key[0] == 0 {
                // Null rows live under the minimum key; comparison scans
                // pass over them.
                self.pos = Some((page_no, idx + 1));
                continue;
            }

            let ord = compare_typed(self.tree.attr_type(), &key[1..], &self.bound[1..]);
            let step = match self.op {
                CompOp::Eq => match ord {
                    Ordering::Less => Step::Skip,
                    Ordering::Equal => Step::Yield,
                    Ordering::Greater => Step::Stop,
                },
                CompOp::Ge => match ord {
                    Ordering::Less => Step::Skip,
                    _ => Step::Yield,
                },
                CompOp::Gt => match ord {
                    Ordering::Greater => Step::Yield,
                    _ => Step::Skip,
                },
                CompOp::Le => match ord {
                    Ordering::Greater => Step::Stop,
                    _ => Step::Yield,
                },
                CompOp::Lt => match ord {
                    Ordering::Less => Step::Yield,
                    _ => Step::Stop,
                },
                _ => Step::Stop,
            };

            match step {
                Step::Yield => {
                    let rid = leaf.rid(idx);
                    self.pos = Some((page_no, idx + 1));
                    return Ok(Some(rid));
                }
                Step::Skip => {
                    self.pos = Some((page_no, idx + 1));
                }
                Step::Stop => {
                    self.pos = None;
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::AttrType;
    use crate::storage::{BufferPool, MemoryStorage};

    fn key(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn sample_tree() -> BPlusTree<MemoryStorage> {
        let mut tree =
            BPlusTree::init_pool(BufferPool::new(MemoryStorage::new(), 64), AttrType::Int, 4)
                .unwrap();
        for v in [10, 20, 20, 30, 40] {
            let slot = tree_slot(&mut tree, v);
            tree.insert_entry(&key(v), false, RowId::new(1, slot)).unwrap();
        }
        // Two null rows under the minimum key
        tree.insert_entry(&key(0), true, RowId::new(9, 0)).unwrap();
        tree.insert_entry(&key(0), true, RowId::new(9, 1)).unwrap();
        tree
    }

    fn tree_slot(tree: &mut BPlusTree<MemoryStorage>, v: i32) -> u32 {
        // Distinct slots for duplicate keys
        let mut scanner = tree.scan(CompOp::Eq, &key(v), false).unwrap();
        let mut n = 0;
        while scanner.next_entry().unwrap().is_some() {
            n += 1;
        }
        n
    }

    fn values(tree: &BPlusTree<MemoryStorage>, op: CompOp, v: i32) -> Vec<RowId> {
        let mut scanner = tree.scan(op, &key(v), false).unwrap();
        let mut out = Vec::new();
        while let Some(rid) = scanner.next_entry().unwrap() {
            out.push(rid);
        }
        out
    }

    #[test]
    fn test_eq_scan() {
        let tree = sample_tree();
        assert_eq!(values(&tree, CompOp::Eq, 20).len(), 2);
        assert_eq!(values(&tree, CompOp::Eq, 10).len(), 1);
        assert_eq!(values(&tree, CompOp::Eq, 25).len(), 0);
    }

    #[test]
    fn test_range_scans() {
        let tree = sample_tree();
        assert_eq!(values(&tree, CompOp::Gt, 20).len(), 2); // 30, 40
        assert_eq!(values(&tree, CompOp::Ge, 20).len(), 4); // 20, 20, 30, 40
        assert_eq!(values(&tree, CompOp::Lt, 20).len(), 1); // 10
        assert_eq!(values(&tree, CompOp::Le, 20).len(), 3); // 10, 20, 20
        assert_eq!(values(&tree, CompOp::Gt, 40).len(), 0);
        assert_eq!(values(&tree, CompOp::Lt, 10).len(), 0);
    }

    #[test]
    fn test_null_rows_excluded() {
        let tree = sample_tree();
        // The two null entries sort lowest but never surface
        assert_eq!(values(&tree, CompOp::Le, 100).len(), 5);
        assert_eq!(values(&tree, CompOp::Ge, i32::MIN).len(), 5);
    }

    #[test]
    fn test_null_literal_scans_empty() {
        let tree = sample_tree();
        let mut scanner = tree.scan(CompOp::Eq, &[], true).unwrap();
        assert_eq!(scanner.next_entry().unwrap(), None);
    }

    #[test]
    fn test_unsupported_operators() {
        let tree = sample_tree();
        assert!(matches!(
            tree.scan(CompOp::Ne, &key(1), false),
            Err(IndexError::UnsupportedOperator(CompOp::Ne))
        ));
        assert!(matches!(
            tree.scan(CompOp::IsNull, &key(1), false),
            Err(IndexError::UnsupportedOperator(CompOp::IsNull))
        ));
    }
}
