//! Linear constraints on degrees of freedom.
//!
//! A constrained DoF obeys
//! ```text
//! x_i = g_i + Σ_k w_ik x_k
//! ```
//! where `g_i` is the inhomogeneity (a prescribed Dirichlet value) and the
//! weighted sum expresses compatibility relations such as hanging nodes.
//!
//! The handler has two states. While *open*, lines are added freely. After
//! [`ConstraintHandler::close`] every line refers only to unconstrained DoFs
//! and the handler can eliminate constrained DoFs during assembly
//! ([`ConstraintHandler::distribute_local_to_global`]) and restore their
//! values after a solve ([`ConstraintHandler::distribute`]).

use crate::error::{Error, Result};
use crate::sparse::GlobalSystem;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

/// One constraint relation x_dof = inhomogeneity + Σ weight · x_column.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLine {
    /// Constrained DoF.
    pub dof: usize,
    /// (column DoF, weight) pairs.
    pub entries: Vec<(usize, f64)>,
    /// Constant part g.
    pub inhomogeneity: f64,
}

impl ConstraintLine {
    /// Homogeneous line with no entries (x_dof = 0).
    pub fn new(dof: usize) -> Self {
        Self {
            dof,
            entries: Vec::new(),
            inhomogeneity: 0.0,
        }
    }

    /// Prescribed value x_dof = value.
    pub fn fixed(dof: usize, value: f64) -> Self {
        Self {
            dof,
            entries: Vec::new(),
            inhomogeneity: value,
        }
    }

    fn merge_entries(&mut self) {
        self.entries.sort_by_key(|&(col, _)| col);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(self.entries.len());
        for &(col, w) in &self.entries {
            match merged.last_mut() {
                Some((last, acc)) if *last == col => *acc += w,
                _ => merged.push((col, w)),
            }
        }
        merged.retain(|&(_, w)| w != 0.0);
        self.entries = merged;
    }
}

/// Lifecycle state of a [`ConstraintHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintState {
    /// Lines may be added; not usable for distribution.
    Open,
    /// Chains resolved; usable for distribution and elimination.
    Closed,
}

/// Set of constraint lines over `n_dofs` unknowns.
#[derive(Debug, Clone)]
pub struct ConstraintHandler {
    n_dofs: usize,
    lines: Vec<ConstraintLine>,
    lookup: HashMap<usize, usize>,
    state: ConstraintState,
}

impl ConstraintHandler {
    /// Empty, open handler.
    pub fn new(n_dofs: usize) -> Self {
        Self {
            n_dofs,
            lines: Vec::new(),
            lookup: HashMap::new(),
            state: ConstraintState::Open,
        }
    }

    /// Remove every line and reopen.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.lookup.clear();
        self.state = ConstraintState::Open;
    }

    /// Current state.
    pub fn state(&self) -> ConstraintState {
        self.state
    }

    /// Whether [`close`](Self::close) has been called since the last change.
    pub fn is_closed(&self) -> bool {
        self.state == ConstraintState::Closed
    }

    /// Number of constrained DoFs.
    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    /// Number of DoFs the handler ranges over.
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    /// Whether `dof` carries a constraint line.
    pub fn is_constrained(&self, dof: usize) -> bool {
        self.lookup.contains_key(&dof)
    }

    /// The line constraining `dof`, if any.
    pub fn line(&self, dof: usize) -> Option<&ConstraintLine> {
        self.lookup.get(&dof).map(|&i| &self.lines[i])
    }

    /// All lines (sorted by DoF once closed).
    pub fn lines(&self) -> &[ConstraintLine] {
        &self.lines
    }

    fn require_open(&self, operation: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Constraint(format!(
                "cannot {} on a closed constraint handler; call clear() first",
                operation
            )));
        }
        Ok(())
    }

    fn require_closed(&self, operation: &str) -> Result<()> {
        if !self.is_closed() {
            return Err(Error::Constraint(format!(
                "cannot {} before the constraint handler is closed",
                operation
            )));
        }
        Ok(())
    }

    fn check_dof(&self, dof: usize) -> Result<()> {
        if dof >= self.n_dofs {
            return Err(Error::Constraint(format!(
                "DoF {} out of range ({} DoFs)",
                dof, self.n_dofs
            )));
        }
        Ok(())
    }

    fn line_mut(&mut self, dof: usize) -> Result<&mut ConstraintLine> {
        let idx = *self
            .lookup
            .get(&dof)
            .ok_or_else(|| Error::Constraint(format!("DoF {} has no constraint line", dof)))?;
        Ok(&mut self.lines[idx])
    }

    /// Start a homogeneous line for `dof`. A DoF that is already constrained
    /// keeps its first line.
    pub fn add_line(&mut self, dof: usize) -> Result<()> {
        self.require_open("add a line")?;
        self.check_dof(dof)?;
        if !self.lookup.contains_key(&dof) {
            self.lookup.insert(dof, self.lines.len());
            self.lines.push(ConstraintLine::new(dof));
        }
        Ok(())
    }

    /// Add `weight · x_column` to the line of `dof`.
    pub fn add_entry(&mut self, dof: usize, column: usize, weight: f64) -> Result<()> {
        self.require_open("add an entry")?;
        self.check_dof(column)?;
        if column == dof {
            return Err(Error::Constraint(format!(
                "DoF {} cannot be constrained to itself",
                dof
            )));
        }
        self.line_mut(dof)?.entries.push((column, weight));
        Ok(())
    }

    /// Set the constant part g of the line of `dof`.
    pub fn set_inhomogeneity(&mut self, dof: usize, value: f64) -> Result<()> {
        self.require_open("set an inhomogeneity")?;
        self.line_mut(dof)?.inhomogeneity = value;
        Ok(())
    }

    /// Add a complete line. A DoF that is already constrained keeps its first line.
    pub fn add_constraint(&mut self, line: ConstraintLine) -> Result<()> {
        self.require_open("add a line")?;
        if self.is_constrained(line.dof) {
            return Ok(());
        }
        self.add_line(line.dof)?;
        for &(column, weight) in &line.entries {
            self.add_entry(line.dof, column, weight)?;
        }
        self.set_inhomogeneity(line.dof, line.inhomogeneity)
    }

    /// Resolve chained lines and switch to the closed state.
    ///
    /// Afterwards no line refers to another constrained DoF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Constraint`] if the relations are cyclic.
    pub fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        // Each pass substitutes one level of chaining; an acyclic set of n
        // lines is resolved after at most n passes.
        let mut passes = 0;
        loop {
            let mut changed = false;
            let snapshot = self.lines.clone();
            for line in self.lines.iter_mut() {
                if !line.entries.iter().any(|(col, _)| self.lookup.contains_key(col)) {
                    continue;
                }
                changed = true;
                let mut expanded = Vec::with_capacity(line.entries.len());
                for &(col, w) in &line.entries {
                    match self.lookup.get(&col) {
                        Some(&target) => {
                            let target = &snapshot[target];
                            line.inhomogeneity += w * target.inhomogeneity;
                            expanded.extend(target.entries.iter().map(|&(c, v)| (c, w * v)));
                        }
                        None => expanded.push((col, w)),
                    }
                }
                line.entries = expanded;
                line.merge_entries();
                if line.entries.iter().any(|&(col, _)| col == line.dof) {
                    return Err(Error::Constraint(format!(
                        "cyclic constraint relation through DoF {}",
                        line.dof
                    )));
                }
            }
            if !changed {
                break;
            }
            passes += 1;
            if passes > self.lines.len() {
                return Err(Error::Constraint(
                    "constraint chains do not terminate (cyclic relations)".into(),
                ));
            }
        }

        for line in self.lines.iter_mut() {
            line.merge_entries();
        }
        self.lines.sort_by_key(|line| line.dof);
        self.lookup = self
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| (line.dof, i))
            .collect();
        self.state = ConstraintState::Closed;
        Ok(())
    }

    /// Drop every inhomogeneity, keeping the constraint structure.
    pub fn make_homogeneous(&mut self) {
        for line in self.lines.iter_mut() {
            line.inhomogeneity = 0.0;
        }
    }

    /// Write x_i = g_i + Σ w_ik x_k into every constrained entry of `vector`.
    pub fn distribute(&self, vector: &mut [f64]) -> Result<()> {
        self.require_closed("distribute")?;
        if vector.len() != self.n_dofs {
            return Err(Error::Constraint(format!(
                "vector has {} entries, expected {}",
                vector.len(),
                self.n_dofs
            )));
        }
        for line in &self.lines {
            let value = line.inhomogeneity
                + line
                    .entries
                    .iter()
                    .map(|&(col, w)| w * vector[col])
                    .sum::<f64>();
            vector[line.dof] = value;
        }
        Ok(())
    }

    /// Targets of a local DoF in the condensed system: itself if free,
    /// otherwise the DoFs its line refers to.
    fn targets(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.line(dof) {
            Some(line) => line.entries.clone(),
            None => vec![(dof, 1.0)],
        }
    }

    /// Scatter a local matrix and right-hand side into the global system,
    /// eliminating constrained rows and columns.
    ///
    /// * Free rows and columns are added directly.
    /// * A constrained column moves `−K_ij g_j` into the right-hand side and
    ///   distributes its weight over the line's entries.
    /// * A constrained row gets a positive diagonal (mean absolute local
    ///   diagonal) with right-hand side `diag · g`, so the condensed system
    ///   stays symmetric positive definite and the solve returns `g` there.
    ///
    /// # Arguments
    ///
    /// * `local_matrix` - Dense local tangent, shape (n, n)
    /// * `local_rhs` - Local residual, length n
    /// * `dofs` - Global DoF index of each local DoF
    /// * `system` - Global system receiving the contribution
    pub fn distribute_local_to_global(
        &self,
        local_matrix: &DMatrix<f64>,
        local_rhs: &DVector<f64>,
        dofs: &[usize],
        system: &mut GlobalSystem,
    ) -> Result<()> {
        self.require_closed("distribute local contributions")?;
        let n = dofs.len();
        if local_matrix.nrows() != n || local_matrix.ncols() != n || local_rhs.len() != n {
            return Err(Error::Assembly(format!(
                "local system is {}x{} with {} rhs entries for {} DoFs",
                local_matrix.nrows(),
                local_matrix.ncols(),
                local_rhs.len(),
                n
            )));
        }

        let targets: Vec<Vec<(usize, f64)>> = dofs.iter().map(|&d| self.targets(d)).collect();
        let inhomogeneities: Vec<f64> = dofs
            .iter()
            .map(|&d| self.line(d).map_or(0.0, |line| line.inhomogeneity))
            .collect();

        for i in 0..n {
            for &(gi, wi) in &targets[i] {
                system.rhs[gi] += wi * local_rhs[i];
                for j in 0..n {
                    let kij = local_matrix[(i, j)];
                    if kij == 0.0 {
                        continue;
                    }
                    for &(gj, wj) in &targets[j] {
                        system.matrix.add(gi, gj, wi * wj * kij);
                    }
                    if inhomogeneities[j] != 0.0 {
                        system.rhs[gi] -= wi * kij * inhomogeneities[j];
                    }
                }
            }
        }

        if dofs.iter().any(|&d| self.is_constrained(d)) {
            let mean_diagonal = (0..n).map(|i| local_matrix[(i, i)].abs()).sum::<f64>() / n as f64;
            let diagonal = if mean_diagonal > 0.0 { mean_diagonal } else { 1.0 };
            for (i, &d) in dofs.iter().enumerate() {
                if self.is_constrained(d) {
                    system.matrix.add(d, d, diagonal);
                    system.rhs[d] += diagonal * inhomogeneities[i];
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_state_rules() {
        let mut constraints = ConstraintHandler::new(4);
        assert_eq!(constraints.state(), ConstraintState::Open);

        let mut v = vec![0.0; 4];
        assert!(matches!(constraints.distribute(&mut v), Err(Error::Constraint(_))));

        constraints.add_line(1).unwrap();
        constraints.close().unwrap();
        assert!(constraints.is_closed());
        assert!(constraints.add_line(2).is_err());
        assert!(constraints.set_inhomogeneity(1, 3.0).is_err());

        constraints.clear();
        assert!(!constraints.is_closed());
        assert_eq!(constraints.n_constraints(), 0);
        assert!(!constraints.is_constrained(1));
    }

    #[test]
    fn test_invalid_lines() {
        let mut constraints = ConstraintHandler::new(3);
        assert!(constraints.add_line(3).is_err());
        assert!(constraints.add_entry(0, 1, 1.0).is_err());
        constraints.add_line(0).unwrap();
        assert!(constraints.add_entry(0, 0, 1.0).is_err());
        assert!(constraints.add_entry(0, 5, 1.0).is_err());
    }

    #[test]
    fn test_distribute_dirichlet_and_hanging() {
        let mut constraints = ConstraintHandler::new(4);
        constraints.add_constraint(ConstraintLine::fixed(0, 2.5)).unwrap();
        constraints.add_line(3).unwrap();
        constraints.add_entry(3, 1, 0.5).unwrap();
        constraints.add_entry(3, 2, 0.5).unwrap();
        constraints.close().unwrap();

        let mut v = vec![100.0, 1.0, 3.0, 100.0];
        constraints.distribute(&mut v).unwrap();
        assert_relative_eq!(v[0], 2.5);
        assert_relative_eq!(v[3], 2.0);
        assert_relative_eq!(v[1], 1.0);
    }

    #[test]
    fn test_first_line_wins() {
        let mut constraints = ConstraintHandler::new(2);
        constraints.add_constraint(ConstraintLine::fixed(1, 1.0)).unwrap();
        constraints.add_constraint(ConstraintLine::fixed(1, 9.0)).unwrap();
        constraints.close().unwrap();
        assert_eq!(constraints.n_constraints(), 1);
        assert_relative_eq!(constraints.line(1).unwrap().inhomogeneity, 1.0);
    }

    #[test]
    fn test_chain_resolution() {
        // x2 = 0.5 x1 + 1, x1 = 2 x0 + 0.5  =>  x2 = x0 + 1.25
        let mut constraints = ConstraintHandler::new(3);
        constraints.add_line(2).unwrap();
        constraints.add_entry(2, 1, 0.5).unwrap();
        constraints.set_inhomogeneity(2, 1.0).unwrap();
        constraints.add_line(1).unwrap();
        constraints.add_entry(1, 0, 2.0).unwrap();
        constraints.set_inhomogeneity(1, 0.5).unwrap();
        constraints.close().unwrap();

        let line = constraints.line(2).unwrap();
        assert_eq!(line.entries, vec![(0, 1.0)]);
        assert_relative_eq!(line.inhomogeneity, 1.25);

        let mut v = vec![4.0, 0.0, 0.0];
        constraints.distribute(&mut v).unwrap();
        assert_relative_eq!(v[1], 8.5);
        assert_relative_eq!(v[2], 5.25);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut constraints = ConstraintHandler::new(2);
        constraints.add_line(0).unwrap();
        constraints.add_entry(0, 1, 1.0).unwrap();
        constraints.add_line(1).unwrap();
        constraints.add_entry(1, 0, 1.0).unwrap();
        assert!(matches!(constraints.close(), Err(Error::Constraint(_))));
    }

    #[test]
    fn test_make_homogeneous_keeps_structure() {
        let mut constraints = ConstraintHandler::new(3);
        constraints.add_constraint(ConstraintLine::fixed(2, 4.0)).unwrap();
        constraints.close().unwrap();
        constraints.make_homogeneous();
        assert!(constraints.is_closed());
        assert!(constraints.is_constrained(2));
        let mut v = vec![1.0, 1.0, 1.0];
        constraints.distribute(&mut v).unwrap();
        assert_relative_eq!(v[2], 0.0);
    }

    #[test]
    fn test_elimination_of_prescribed_dof() {
        // Two-spring chain [2 -1; -1 2] on DoFs 0, 1 with x1 = 3
        let mut constraints = ConstraintHandler::new(2);
        constraints.add_constraint(ConstraintLine::fixed(1, 3.0)).unwrap();
        constraints.close().unwrap();

        let k = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]);
        let r = DVector::from_vec(vec![1.0, 10.0]);
        let mut system = GlobalSystem::new(2);
        constraints
            .distribute_local_to_global(&k, &r, &[0, 1], &mut system)
            .unwrap();

        let dense = DMatrix::from(&system.matrix.to_csr().unwrap());
        assert_relative_eq!(dense[(0, 0)], 2.0);
        assert_relative_eq!(dense[(0, 1)], 0.0);
        assert_relative_eq!(dense[(1, 0)], 0.0);
        assert_relative_eq!(dense[(1, 1)], 2.0);
        // r0 - K01 g1 = 1 + 3
        assert_relative_eq!(system.rhs[0], 4.0);
        assert_relative_eq!(system.rhs[1], 6.0);

        // Condensed solve reproduces the constrained solution
        let x0 = system.rhs[0] / dense[(0, 0)];
        let x1 = system.rhs[1] / dense[(1, 1)];
        assert_relative_eq!(x0, 2.0);
        assert_relative_eq!(x1, 3.0);
    }

    #[test]
    fn test_elimination_with_hanging_node_is_symmetric() {
        let mut constraints = ConstraintHandler::new(3);
        constraints.add_line(2).unwrap();
        constraints.add_entry(2, 0, 0.5).unwrap();
        constraints.add_entry(2, 1, 0.5).unwrap();
        constraints.close().unwrap();

        let k = DMatrix::from_row_slice(3, 3, &[
            4.0, -1.0, -2.0,
            -1.0, 4.0, -1.0,
            -2.0, -1.0, 5.0,
        ]);
        let r = DVector::from_vec(vec![1.0, 0.0, 2.0]);
        let mut system = GlobalSystem::new(3);
        constraints
            .distribute_local_to_global(&k, &r, &[0, 1, 2], &mut system)
            .unwrap();
        let dense = DMatrix::from(&system.matrix.to_csr().unwrap());

        // Condensed K = Cᵀ K C with C = [[1,0],[0,1],[0.5,0.5]]
        let c = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 0.5, 0.5]);
        let expected = c.transpose() * &k * &c;
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(dense[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
        assert_relative_eq!(dense[(0, 1)], dense[(1, 0)]);
        assert_relative_eq!(system.rhs[0], 2.0);
        assert_relative_eq!(system.rhs[1], 1.0);
        assert!(dense[(2, 2)] > 0.0);
    }

    #[test]
    fn test_distribute_local_requires_closed() {
        let constraints = ConstraintHandler::new(1);
        let mut system = GlobalSystem::new(1);
        let result = constraints.distribute_local_to_global(
            &DMatrix::identity(1, 1),
            &DVector::zeros(1),
            &[0],
            &mut system,
        );
        assert!(result.is_err());
    }
}
