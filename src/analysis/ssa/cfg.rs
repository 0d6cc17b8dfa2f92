//! Control flow graph view of SSA functions.
//!
//! [`SsaCfg`] derives successor and predecessor lists from block terminators
//! and caches them, together with the reverse postorder of the reachable
//! blocks. [`DominatorTree`] is computed on top of it with the iterative
//! Cooper-Harvey-Kennedy algorithm, which converges in two or three sweeps on
//! the reducible graphs method bodies produce.
//!
//! Both are snapshots: any pass that rewires edges must rebuild them.

use crate::analysis::ssa::SsaFunction;

/// A lightweight control flow graph view of an SSA function.
#[derive(Debug, Clone)]
pub struct SsaCfg {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    reachable: Vec<bool>,
    rpo: Vec<usize>,
}

impl SsaCfg {
    /// Builds the CFG view of `ssa`. Block 0 is the entry.
    #[must_use]
    pub fn from_ssa(ssa: &SsaFunction) -> Self {
        let count = ssa.block_count();
        let successors: Vec<Vec<usize>> = ssa
            .blocks()
            .iter()
            .map(|b| {
                b.successors()
                    .into_iter()
                    .filter(|&s| s < count)
                    .collect()
            })
            .collect();

        // Iterative DFS producing postorder
        let mut reachable = vec![false; count];
        let mut postorder = Vec::with_capacity(count);
        if count > 0 {
            let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
            reachable[0] = true;
            while let Some((node, next)) = stack.pop() {
                if let Some(&succ) = successors[node].get(next) {
                    stack.push((node, next + 1));
                    if !reachable[succ] {
                        reachable[succ] = true;
                        stack.push((succ, 0));
                    }
                } else {
                    postorder.push(node);
                }
            }
        }

        let mut predecessors = vec![Vec::new(); count];
        for (block, succs) in successors.iter().enumerate() {
            if !reachable[block] {
                continue;
            }
            for &succ in succs {
                if !predecessors[succ].contains(&block) {
                    predecessors[succ].push(block);
                }
            }
        }

        postorder.reverse();
        Self {
            successors,
            predecessors,
            reachable,
            rpo: postorder,
        }
    }

    /// Returns the number of blocks, reachable or not.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.successors.len()
    }

    /// Returns the successors of `block`.
    #[must_use]
    pub fn successors(&self, block: usize) -> &[usize] {
        self.successors.get(block).map_or(&[], Vec::as_slice)
    }

    /// Returns the reachable predecessors of `block`.
    #[must_use]
    pub fn predecessors(&self, block: usize) -> &[usize] {
        self.predecessors.get(block).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `block` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, block: usize) -> bool {
        self.reachable.get(block).copied().unwrap_or(false)
    }

    /// Returns the reachable blocks in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[usize] {
        &self.rpo
    }
}

/// Immediate-dominator table of the reachable blocks.
///
/// # Examples
///
/// ```rust
/// use dotinline::analysis::ssa::{DominatorTree, SsaCfg, SsaFunctionBuilder};
///
/// let ssa = SsaFunctionBuilder::new(1).build_with(|f| {
///     let cond = f.arg(0);
///     f.block(0, |b| b.branch(cond, 1, 2));
///     f.block(1, |b| b.jump(3));
///     f.block(2, |b| b.jump(3));
///     f.block(3, |b| b.ret());
/// });
///
/// let dom = DominatorTree::compute(&SsaCfg::from_ssa(&ssa));
/// assert_eq!(dom.immediate_dominator(3), Some(0));
/// assert!(!dom.dominates(1, 3));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    /// Computes the dominator tree of `cfg`.
    #[must_use]
    pub fn compute(cfg: &SsaCfg) -> Self {
        let count = cfg.block_count();
        let mut idom: Vec<Option<usize>> = vec![None; count];
        if count == 0 || !cfg.is_reachable(0) {
            return Self { idom };
        }

        let rpo = cfg.reverse_postorder();
        let mut order = vec![usize::MAX; count];
        for (position, &block) in rpo.iter().enumerate() {
            order[block] = position;
        }

        idom[0] = Some(0);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<usize> = None;
                for &pred in cfg.predecessors(block) {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(&idom, &order, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block] != new_idom {
                    idom[block] = new_idom;
                    changed = true;
                }
            }
        }

        Self { idom }
    }

    fn intersect(idom: &[Option<usize>], order: &[usize], a: usize, b: usize) -> usize {
        let (mut finger1, mut finger2) = (a, b);
        while finger1 != finger2 {
            while order[finger1] > order[finger2] {
                finger1 = idom[finger1].unwrap_or(0);
            }
            while order[finger2] > order[finger1] {
                finger2 = idom[finger2].unwrap_or(0);
            }
        }
        finger1
    }

    /// Returns the immediate dominator of `block`; `None` for the entry and unreachable blocks.
    #[must_use]
    pub fn immediate_dominator(&self, block: usize) -> Option<usize> {
        match self.idom.get(block).copied().flatten() {
            Some(parent) if parent != block => Some(parent),
            _ => None,
        }
    }

    /// Returns `true` if `a` dominates `b` (every block dominates itself).
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if self.idom.get(b).copied().flatten().is_none() {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.immediate_dominator(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: usize, b: usize) -> bool {
        a != b && self.dominates(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::SsaFunctionBuilder;

    fn loop_function() -> SsaFunction {
        SsaFunctionBuilder::new(1).build_with(|f| {
            let cond = f.arg(0);
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.branch(cond, 2, 3));
            f.block(2, |b| b.jump(1));
            f.block(3, |b| b.ret());
            f.block(4, |b| b.jump(3));
        })
    }

    #[test]
    fn test_cfg_predecessors_ignore_unreachable() {
        let cfg = SsaCfg::from_ssa(&loop_function());
        assert_eq!(cfg.predecessors(1), &[0, 2]);
        assert_eq!(cfg.predecessors(3), &[1]);
        assert!(!cfg.is_reachable(4));
        assert_eq!(cfg.reverse_postorder()[0], 0);
        assert_eq!(cfg.reverse_postorder().len(), 4);
    }

    #[test]
    fn test_dominators_loop() {
        let dom = DominatorTree::compute(&SsaCfg::from_ssa(&loop_function()));
        assert_eq!(dom.immediate_dominator(0), None);
        assert_eq!(dom.immediate_dominator(1), Some(0));
        assert_eq!(dom.immediate_dominator(2), Some(1));
        assert_eq!(dom.immediate_dominator(3), Some(1));
        assert!(dom.dominates(1, 2));
        assert!(dom.strictly_dominates(0, 3));
        assert!(!dom.dominates(2, 3));
        assert!(!dom.dominates(0, 4));
    }
}
