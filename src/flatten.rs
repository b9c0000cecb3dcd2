use crate::error::Result;
use crate::period::Period;
use crate::tree::{AccountTree, NodeId, DEFAULT_MAX_DEPTH};
use crate::utils::{ancestor_codes, code_depth};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One analytic (leaf) account line, tagged with its reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    /// Ancestor labels from the local root down to and including the leaf.
    pub path: Vec<String>,
    pub code: String,
    pub label: String,
    pub balance: f64,
    pub period: Period,
    /// Document the leaf was read from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

pub struct AccountTreeFlattener {
    max_depth: usize,
}

impl Default for AccountTreeFlattener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl AccountTreeFlattener {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Depth-first walk from `root`, children in their given order.
    pub fn flatten(&self, tree: &AccountTree, root: NodeId, period: Period) -> Result<Vec<LeafRecord>> {
        tree.node(root)?;
        let mut records = Vec::new();
        let mut path = Vec::new();
        self.walk(tree, root, "", period, &mut path, &mut records, 0);
        Ok(records)
    }

    /// Flattens every root of the tree, in root order.
    pub fn flatten_tree(&self, tree: &AccountTree, period: Period) -> Vec<LeafRecord> {
        let mut records = Vec::new();
        for &root in tree.roots() {
            let mut path = Vec::new();
            self.walk(tree, root, "", period, &mut path, &mut records, 0);
        }
        debug!(
            "Flattened {} nodes into {} leaf records for {}",
            tree.len(),
            records.len(),
            period
        );
        records
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        tree: &AccountTree,
        id: NodeId,
        parent_code: &str,
        period: Period,
        path: &mut Vec<String>,
        out: &mut Vec<LeafRecord>,
        depth: usize,
    ) {
        if depth >= self.max_depth {
            warn!(
                "Depth limit {} reached under [{}]; subtree skipped",
                self.max_depth,
                path.join(" > ")
            );
            return;
        }
        let Some(node) = tree.get(id) else {
            warn!("Dangling child reference {:?} skipped", id);
            return;
        };

        let code = node.code.as_deref().unwrap_or(parent_code);
        path.push(node.label.clone());

        if node.is_leaf() {
            out.push(LeafRecord {
                path: path.clone(),
                code: code.to_string(),
                label: node.label.clone(),
                balance: node.balances.resolve(),
                period,
                source: None,
            });
        } else {
            for &child in &node.children {
                self.walk(tree, child, code, period, path, out, depth + 1);
            }
        }

        path.pop();
    }
}

/// Resolved balances for every code after synthetic backfill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackfillResult {
    pub balances: BTreeMap<String, f64>,
    /// Codes whose balance was missing and was computed from descendants.
    pub backfilled: BTreeSet<String>,
}

/// One input line of the synthetic backfill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackfillEntry<'a> {
    /// An analytic account, under its own or inherited code. Leaves sharing a code all
    /// count towards that code and every ancestor.
    Leaf { code: &'a str, balance: f64 },
    /// A grouping account, with the balance it reports for itself, if any.
    Synthetic { code: &'a str, balance: Option<f64> },
}

/// Fills missing balances of synthetic accounts with the signed sum of their descendant
/// leaves.
///
/// Codes are visited once each, deepest first, so every code passes its leaf subtotal to
/// its nearest coded ancestor before that ancestor is resolved. Explicit synthetic
/// balances are reported as given but never feed the ancestors' sums. A synthetic code
/// repeated with explicit balances reports their sum; one missing occurrence makes it
/// backfilled.
pub fn backfill_synthetic_balances<'a, I>(entries: I) -> BackfillResult
where
    I: IntoIterator<Item = BackfillEntry<'a>>,
{
    let mut leaf_sums: BTreeMap<&str, f64> = BTreeMap::new();
    let mut explicit: BTreeMap<&str, Option<f64>> = BTreeMap::new();
    for entry in entries {
        match entry {
            BackfillEntry::Leaf { code, balance } if !code.is_empty() => {
                *leaf_sums.entry(code).or_insert(0.0) += balance;
            }
            BackfillEntry::Synthetic { code, balance } if !code.is_empty() => {
                let slot = explicit.entry(code).or_insert(Some(0.0));
                *slot = match (*slot, balance) {
                    (Some(total), Some(value)) => Some(total + value),
                    _ => None,
                };
            }
            _ => {}
        }
    }

    let codes: BTreeSet<&str> = leaf_sums.keys().chain(explicit.keys()).copied().collect();
    let parent_of: HashMap<&str, &str> = codes
        .iter()
        .filter_map(|&code| {
            ancestor_codes(code)
                .find(|a| codes.contains(a))
                .map(|parent| (code, parent))
        })
        .collect();

    let mut order: Vec<&str> = codes.iter().copied().collect();
    order.sort_by(|a, b| {
        code_depth(b)
            .cmp(&code_depth(a))
            .then(b.len().cmp(&a.len()))
            .then(a.cmp(b))
    });

    let mut subtotals: HashMap<&str, f64> = leaf_sums.into_iter().collect();
    let mut result = BackfillResult::default();

    for code in order {
        let subtotal = subtotals.get(code).copied().unwrap_or(0.0);
        let resolved = match explicit.get(code) {
            Some(Some(value)) => *value,
            Some(None) => {
                result.backfilled.insert(code.to_string());
                subtotal
            }
            None => subtotal,
        };
        result.balances.insert(code.to_string(), resolved);

        if let Some(parent) = parent_of.get(code) {
            *subtotals.entry(*parent).or_insert(0.0) += subtotal;
        }
    }

    result
}

impl AccountTree {
    /// Backfills every coded node of the tree. Uncoded leaves count under the code they
    /// inherit from their nearest coded ancestor, as in [`AccountTreeFlattener`].
    pub fn backfill(&self) -> BackfillResult {
        let mut entries = Vec::new();
        for &root in self.roots() {
            self.collect_backfill_entries(root, "", 0, &mut entries);
        }
        backfill_synthetic_balances(entries)
    }

    fn collect_backfill_entries<'a>(
        &'a self,
        id: NodeId,
        parent_code: &'a str,
        depth: usize,
        out: &mut Vec<BackfillEntry<'a>>,
    ) {
        if depth >= DEFAULT_MAX_DEPTH {
            warn!("Depth limit {} reached during backfill; subtree skipped", DEFAULT_MAX_DEPTH);
            return;
        }
        let Some(node) = self.get(id) else {
            return;
        };
        let code = node.code.as_deref().unwrap_or(parent_code);

        if node.is_leaf() {
            out.push(BackfillEntry::Leaf {
                code,
                balance: node.balances.resolve(),
            });
            return;
        }
        if let Some(own) = node.code.as_deref() {
            out.push(BackfillEntry::Synthetic {
                code: own,
                balance: node.balances.explicit_balance(),
            });
        }
        for &child in &node.children {
            self.collect_backfill_entries(child, code, depth + 1, out);
        }
    }
}
