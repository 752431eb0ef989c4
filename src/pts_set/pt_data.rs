// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use super::points_to::PointsToSet;
use crate::util::bit_vec::Idx;

/// Points-to data split into a "diff" part awaiting propagation and a "propa" part
/// already folded into callers. `add_pts` checks `propa` first so re-adding an
/// already-propagated object is a no-op; `flush` folds `diff` into `propa` once the
/// worklist has drained it, giving the solver its "true delta" computation.
///
/// K: the pointer handle owning a points-to set. D: the object handle. DS: the
/// points-to-set implementation (`HybridPointsToSet<D>`).
pub struct DiffPTData<K, D, DS> {
    diff_pts_map: HashMap<K, DS>,
    propa_pts_map: HashMap<K, DS>,
    marker: PhantomData<D>,
}

impl<K, D, DS> fmt::Debug for DiffPTData<K, D, DS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "DiffPTData".fmt(f)
    }
}

impl<K, D, DS> Default for DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D, DS> DiffPTData<K, D, DS>
where
    K: Hash + Eq + Copy,
    D: Idx,
    DS: PointsToSet<D> + Clone + fmt::Debug,
{
    pub fn new() -> DiffPTData<K, D, DS> {
        DiffPTData {
            diff_pts_map: HashMap::new(),
            propa_pts_map: HashMap::new(),
            marker: PhantomData,
        }
    }

    /// Adds `elem` to the points-to set owned by `var`. Returns `false` if `elem` is
    /// already propagated (already a stable member of `var`'s points-to set).
    pub fn add_pts(&mut self, var: K, elem: D) -> bool {
        if let Some(propa) = self.propa_pts_map.get(&var) {
            if propa.contains(elem) {
                return false;
            }
        }
        let diff = self.diff_pts_map.entry(var).or_insert_with(DS::new);
        diff.insert(elem)
    }

    /// diff(dst) |= src_ds - propa(dst).
    pub fn union_pts_to(&mut self, dst_var: K, src_ds: &DS) -> bool {
        let propa = self.propa_pts_map.entry(dst_var).or_insert_with(DS::new);
        let mut new = src_ds.clone();
        new.subtract(propa);
        let diff = self.diff_pts_map.entry(dst_var).or_insert_with(DS::new);
        diff.union(&new)
    }

    /// The points-to set actually visible to other components: diff ∪ propa.
    pub fn pts_of(&self, var: K) -> DS {
        let mut out = self.propa_pts_map.get(&var).cloned().unwrap_or_else(DS::new);
        if let Some(diff) = self.diff_pts_map.get(&var) {
            out.union(diff);
        }
        out
    }

    pub fn get_diff_pts(&self, var: K) -> Option<&DS> {
        self.diff_pts_map.get(&var)
    }

    pub fn get_propa_pts(&self, var: K) -> Option<&DS> {
        self.propa_pts_map.get(&var)
    }

    /// Folds `diff(var)` into `propa(var)` and clears `diff(var)`.
    pub fn flush(&mut self, var: K) {
        let Some(diff) = self.diff_pts_map.get_mut(&var) else {
            return;
        };
        let propa = self.propa_pts_map.entry(var).or_insert_with(DS::new);
        propa.union(diff);
        diff.clear();
    }
}
