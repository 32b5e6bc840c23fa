//! Self-filter analysis for one query block.
//!
//! A table reference is *scoped* to a requester when every row the block can
//! read from it has the reference's scope key equal to the requester id.
//! That holds when the WHERE predicate pins the key directly, or when a
//! top-level key equality (`a.student_id = s.id`) in WHERE or ON links the
//! reference to another reference that is pinned.

use crate::predicate::{Operand, Predicate};
use crate::query::{QueryBlock, TableRef};
use crate::schema::PolicySchema;

/// Scope keys of a block's table references, resolved against the schema.
pub struct BlockScope<'q, 's> {
    block: &'q QueryBlock,
    keys: Vec<Option<&'s str>>,
}

impl<'q, 's> BlockScope<'q, 's> {
    #[must_use]
    pub fn new(block: &'q QueryBlock, schema: &'s PolicySchema) -> Self {
        let keys = block
            .tables
            .iter()
            .map(|r| schema.scope_key(&r.name))
            .collect();
        Self { block, keys }
    }

    /// The table reference a column operand reads its scope key from.
    ///
    /// A qualified column resolves through the qualifier; an unqualified
    /// one resolves to the only reference whose scope key it names. Any
    /// ambiguity resolves to nothing.
    fn resolve(&self, operand: &Operand) -> Option<usize> {
        let Operand::Column { qualifier, name } = operand else {
            return None;
        };
        let mut hits = self.block.tables.iter().enumerate().filter(|(idx, r)| {
            self.keys[*idx] == Some(name.as_str())
                && qualifier.as_deref().map_or(true, |q| r.answers_to(q))
        });
        let (first, _) = hits.next()?;
        if hits.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    fn pinned_by_filter(&self, idx: usize, id: u64) -> bool {
        self.block
            .filter
            .as_ref()
            .is_some_and(|f| f.pins(id, &|op: &Operand| self.resolve(op) == Some(idx)))
    }

    /// Key equalities usable for propagation: top-level conjuncts of WHERE
    /// and of every ON predicate.
    fn key_links(&self) -> Vec<(usize, usize)> {
        self.block
            .filter
            .iter()
            .chain(self.block.join_conditions.iter())
            .flat_map(Predicate::conjuncts)
            .filter_map(|p| match p {
                Predicate::Equals(left, right) => {
                    Some((self.resolve(left)?, self.resolve(right)?))
                }
                _ => None,
            })
            .collect()
    }

    /// Guarded references (identity or owned) that are not scoped to `id`.
    #[must_use]
    pub fn unscoped(&self, id: u64) -> Vec<&'q TableRef> {
        let count = self.block.tables.len();
        let mut classes = UnionFind::new(count);
        for (a, b) in self.key_links() {
            classes.union(a, b);
        }

        let mut pinned_class = vec![false; count];
        for idx in 0..count {
            if self.keys[idx].is_some() && self.pinned_by_filter(idx, id) {
                let root = classes.find(idx);
                pinned_class[root] = true;
            }
        }

        (0..count)
            .filter(|idx| self.keys[*idx].is_some())
            .filter(|idx| !pinned_class[classes.find(*idx)])
            .map(|idx| &self.block.tables[idx])
            .collect()
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
