//! Mesh data structure and structured mesh generation.
//!
//! Stores nodal coordinates, Lagrange cell connectivity and tagged boundary
//! faces, and implements [`Discretization`] on top of them. DoFs are numbered
//! node-major: node `n` carries DoFs `n·D .. n·D + D`.

use crate::element::{
    gauss_face, gauss_tensor, BoundaryId, CellQuadraturePoint, Discretization, FaceQuadraturePoint,
    FaceSide, GaussPoint, TensorLagrange,
};
use crate::error::{Error, Result};
use crate::tensor::{determinant, Tensor2, Vector};

/// A cell face on the domain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryFace {
    /// Owning cell.
    pub cell: usize,
    /// Reference axis normal to the face.
    pub axis: usize,
    /// End of the reference axis the face lies on.
    pub side: FaceSide,
    /// Boundary indicator.
    pub boundary_id: BoundaryId,
}

/// Shape values and reference gradients tabulated at one quadrature point.
#[derive(Debug, Clone)]
struct Tabulation<const D: usize> {
    point: GaussPoint<D>,
    values: Vec<f64>,
    gradients: Vec<Vector<D>>,
}

/// Finite element mesh of tensor-product Lagrange cells.
#[derive(Debug, Clone)]
pub struct Mesh<const D: usize> {
    /// Nodal coordinates in the reference configuration.
    nodes: Vec<Vector<D>>,
    /// Cell connectivity, lexicographic local node order.
    cells: Vec<Vec<usize>>,
    /// Tagged boundary faces.
    boundary_faces: Vec<BoundaryFace>,
    /// Boundary faces owned by each cell (indices into `boundary_faces`).
    cell_faces: Vec<Vec<usize>>,
    element: TensorLagrange<D>,
    cell_tabulation: Vec<Tabulation<D>>,
    /// Indexed by `2 * axis + side`.
    face_tabulation: Vec<Vec<Tabulation<D>>>,
}

fn side_slot(axis: usize, side: FaceSide) -> usize {
    2 * axis
        + match side {
            FaceSide::Lower => 0,
            FaceSide::Upper => 1,
        }
}

impl<const D: usize> Mesh<D> {
    /// Create an empty mesh whose cells use Lagrange elements of `degree`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unsupported polynomial degree.
    pub fn new(degree: usize) -> Result<Self> {
        let element = TensorLagrange::<D>::new(degree)?;
        let order = element.quadrature_order();

        let tabulate = |points: Vec<GaussPoint<D>>| -> Vec<Tabulation<D>> {
            points
                .into_iter()
                .map(|point| Tabulation {
                    values: element.shape_values(&point.coords),
                    gradients: element.shape_gradients(&point.coords),
                    point,
                })
                .collect()
        };

        let cell_tabulation = tabulate(gauss_tensor::<D>(order)?);
        let mut face_tabulation = Vec::with_capacity(2 * D);
        for axis in 0..D {
            for side in [FaceSide::Lower, FaceSide::Upper] {
                face_tabulation.push(tabulate(gauss_face::<D>(order, axis, side)?));
            }
        }

        Ok(Self {
            nodes: Vec::new(),
            cells: Vec::new(),
            boundary_faces: Vec::new(),
            cell_faces: Vec::new(),
            element,
            cell_tabulation,
            face_tabulation,
        })
    }

    /// Structured mesh of the box `[lower, upper]` with `subdivisions` cells per axis.
    ///
    /// Boundary faces are tagged `2·axis` on the lower end and `2·axis + 1` on
    /// the upper end of each axis; use [`Mesh::set_boundary_ids`] to re-tag.
    ///
    /// # Example
    ///
    /// ```
    /// use hyperfem_core::element::Discretization;
    /// use hyperfem_core::mesh::Mesh;
    /// use nalgebra::Vector2;
    ///
    /// let mesh = Mesh::<2>::hyper_rectangle(
    ///     Vector2::new(0.0, 0.0),
    ///     Vector2::new(2.0, 1.0),
    ///     [4, 2],
    ///     1,
    /// ).unwrap();
    /// assert_eq!(mesh.n_cells(), 8);
    /// assert_eq!(mesh.n_nodes(), 15);
    /// ```
    pub fn hyper_rectangle(
        lower: Vector<D>,
        upper: Vector<D>,
        subdivisions: [usize; D],
        degree: usize,
    ) -> Result<Self> {
        for d in 0..D {
            if !(upper[d] > lower[d]) {
                return Err(Error::Mesh(format!(
                    "box extent along axis {} is empty ({} .. {})",
                    d, lower[d], upper[d]
                )));
            }
            if subdivisions[d] == 0 {
                return Err(Error::Mesh(format!("axis {} has zero subdivisions", d)));
            }
        }

        let mut mesh = Self::new(degree)?;
        let p = degree;

        let mut grid = [0usize; D];
        for d in 0..D {
            grid[d] = subdivisions[d] * p + 1;
        }
        let n_grid_nodes: usize = grid.iter().product();
        let grid_node = |index: &[usize; D]| -> usize {
            index
                .iter()
                .zip(grid.iter())
                .rev()
                .fold(0, |acc, (&i, &n)| acc * n + i)
        };

        mesh.nodes.reserve(n_grid_nodes);
        for flat in 0..n_grid_nodes {
            let mut point = Vector::<D>::zeros();
            let mut rest = flat;
            for d in 0..D {
                let i = rest % grid[d];
                rest /= grid[d];
                point[d] = lower[d] + (upper[d] - lower[d]) * i as f64 / (grid[d] - 1) as f64;
            }
            mesh.add_node(point);
        }

        let n_cells: usize = subdivisions.iter().product();
        for flat in 0..n_cells {
            let mut cell_index = [0usize; D];
            let mut rest = flat;
            for d in 0..D {
                cell_index[d] = rest % subdivisions[d];
                rest /= subdivisions[d];
            }

            let connectivity = (0..mesh.element.n_nodes())
                .map(|local| {
                    let local_index = mesh.element.node_index(local);
                    let mut index = [0usize; D];
                    for d in 0..D {
                        index[d] = cell_index[d] * p + local_index[d];
                    }
                    grid_node(&index)
                })
                .collect();
            let cell = mesh.add_cell(connectivity)?;

            for d in 0..D {
                if cell_index[d] == 0 {
                    mesh.add_boundary_face(cell, d, FaceSide::Lower, (2 * d) as BoundaryId)?;
                }
                if cell_index[d] + 1 == subdivisions[d] {
                    mesh.add_boundary_face(cell, d, FaceSide::Upper, (2 * d + 1) as BoundaryId)?;
                }
            }
        }

        Ok(mesh)
    }

    /// Add a node to the mesh, returning its index.
    pub fn add_node(&mut self, point: Vector<D>) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(point);
        idx
    }

    /// Add a cell to the mesh.
    pub fn add_cell(&mut self, nodes: Vec<usize>) -> Result<usize> {
        let expected = self.element.n_nodes();
        if nodes.len() != expected {
            return Err(Error::Mesh(format!(
                "degree {} cells require {} nodes, got {}",
                self.element.degree(),
                expected,
                nodes.len()
            )));
        }

        for &node_idx in &nodes {
            if node_idx >= self.nodes.len() {
                return Err(Error::Mesh(format!(
                    "Node index {} out of bounds (mesh has {} nodes)",
                    node_idx,
                    self.nodes.len()
                )));
            }
        }

        let idx = self.cells.len();
        self.cells.push(nodes);
        self.cell_faces.push(Vec::new());
        Ok(idx)
    }

    /// Tag a cell face as part of the domain boundary.
    pub fn add_boundary_face(
        &mut self,
        cell: usize,
        axis: usize,
        side: FaceSide,
        boundary_id: BoundaryId,
    ) -> Result<()> {
        if cell >= self.cells.len() {
            return Err(Error::Mesh(format!("cell index {} out of bounds", cell)));
        }
        if axis >= D {
            return Err(Error::Mesh(format!("face axis {} out of range", axis)));
        }
        let existing = self.cell_faces[cell].iter().copied().find(|&f| {
            let face = &self.boundary_faces[f];
            face.axis == axis && face.side == side
        });
        if let Some(f) = existing {
            self.boundary_faces[f].boundary_id = boundary_id;
            return Ok(());
        }
        self.cell_faces[cell].push(self.boundary_faces.len());
        self.boundary_faces.push(BoundaryFace {
            cell,
            axis,
            side,
            boundary_id,
        });
        Ok(())
    }

    /// Re-tag boundary faces by the position of their centre.
    ///
    /// Faces for which `tag` returns `None` keep their current indicator.
    pub fn set_boundary_ids(&mut self, tag: impl Fn(&Vector<D>) -> Option<BoundaryId>) {
        for i in 0..self.boundary_faces.len() {
            let center = self.face_center(&self.boundary_faces[i]);
            if let Some(id) = tag(&center) {
                self.boundary_faces[i].boundary_id = id;
            }
        }
    }

    /// Centre of a boundary face (mean of its nodes).
    pub fn face_center(&self, face: &BoundaryFace) -> Vector<D> {
        let nodes = self.element.face_nodes(face.axis, face.side);
        let sum = nodes
            .iter()
            .fold(Vector::<D>::zeros(), |acc, &k| acc + self.nodes[self.cells[face.cell][k]]);
        sum / nodes.len() as f64
    }

    /// Number of nodes in the mesh.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Nodal coordinates.
    pub fn nodes(&self) -> &[Vector<D>] {
        &self.nodes
    }

    /// Cell connectivity.
    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    /// Tagged boundary faces.
    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary_faces
    }

    /// Get coordinates for a cell's nodes.
    pub fn cell_coords(&self, cell: usize) -> Result<Vec<Vector<D>>> {
        let nodes = self
            .cells
            .get(cell)
            .ok_or_else(|| Error::Mesh(format!("cell index {} out of bounds", cell)))?;
        Ok(nodes.iter().map(|&i| self.nodes[i]).collect())
    }

    /// Compute mesh bounding box.
    pub fn bounds(&self) -> Option<(Vector<D>, Vector<D>)> {
        let first = self.nodes.first()?;
        let mut min = *first;
        let mut max = *first;
        for node in &self.nodes[1..] {
            for i in 0..D {
                min[i] = min[i].min(node[i]);
                max[i] = max[i].max(node[i]);
            }
        }
        Some((min, max))
    }

    /// Jacobian of the reference map, J_ij = Σ_k x_k,i ∂N_k/∂ξ_j.
    fn reference_jacobian(coords: &[Vector<D>], gradients: &[Vector<D>]) -> Tensor2<D> {
        coords
            .iter()
            .zip(gradients.iter())
            .fold(Tensor2::<D>::zeros(), |acc, (x, g)| acc + x * g.transpose())
    }
}

impl<const D: usize> Discretization<D> for Mesh<D> {
    fn degree(&self) -> usize {
        self.element.degree()
    }

    fn n_dofs(&self) -> usize {
        self.nodes.len() * D
    }

    fn n_cells(&self) -> usize {
        self.cells.len()
    }

    fn cell_dof_indices(&self, cell: usize) -> Result<Vec<usize>> {
        let nodes = self
            .cells
            .get(cell)
            .ok_or_else(|| Error::Mesh(format!("cell index {} out of bounds", cell)))?;
        Ok(nodes
            .iter()
            .flat_map(|&node| (0..D).map(move |c| node * D + c))
            .collect())
    }

    fn cell_values(&self, cell: usize) -> Result<Vec<CellQuadraturePoint<D>>> {
        let coords = self.cell_coords(cell)?;
        self.cell_tabulation
            .iter()
            .map(|tab| {
                let jac = Self::reference_jacobian(&coords, &tab.gradients);
                let det = determinant(&jac);
                if det <= 0.0 {
                    return Err(Error::Mesh(format!(
                        "cell {} is inverted or degenerate (det J = {:.3e})",
                        cell, det
                    )));
                }
                let jac_inv_t = jac
                    .try_inverse()
                    .ok_or_else(|| Error::Mesh(format!("cell {} has a singular map", cell)))?
                    .transpose();
                Ok(CellQuadraturePoint {
                    shape_values: tab.values.clone(),
                    shape_gradients: tab.gradients.iter().map(|g| jac_inv_t * g).collect(),
                    jxw: det * tab.point.weight,
                })
            })
            .collect()
    }

    fn boundary_face_values(
        &self,
        cell: usize,
        boundary_id: BoundaryId,
    ) -> Result<Vec<FaceQuadraturePoint<D>>> {
        let faces = self
            .cell_faces
            .get(cell)
            .ok_or_else(|| Error::Mesh(format!("cell index {} out of bounds", cell)))?;
        let mut points = Vec::new();
        for face in faces.iter().map(|&f| &self.boundary_faces[f]) {
            if face.boundary_id != boundary_id {
                continue;
            }
            let coords = self.cell_coords(cell)?;
            let mut reference_normal = Vector::<D>::zeros();
            reference_normal[face.axis] = face.side.coordinate();

            for tab in &self.face_tabulation[side_slot(face.axis, face.side)] {
                let jac = Self::reference_jacobian(&coords, &tab.gradients);
                let det = determinant(&jac);
                let jac_inv = jac.try_inverse().filter(|_| det > 0.0).ok_or_else(|| {
                    Error::Mesh(format!("cell {} is inverted or degenerate", cell))
                })?;
                // Nanson: n dA = det(J) J⁻ᵀ N dA_ref
                let scaled = jac_inv.transpose() * reference_normal * det;
                let area = scaled.norm();
                points.push(FaceQuadraturePoint {
                    shape_values: tab.values.clone(),
                    normal: scaled / area,
                    jxw: area * tab.point.weight,
                });
            }
        }
        Ok(points)
    }

    fn boundary_dofs(&self, boundary_id: BoundaryId, component: usize) -> Vec<usize> {
        if component >= D {
            return Vec::new();
        }
        let mut dofs: Vec<usize> = self
            .boundary_faces
            .iter()
            .filter(|f| f.boundary_id == boundary_id)
            .flat_map(|f| {
                self.element
                    .face_nodes(f.axis, f.side)
                    .into_iter()
                    .map(move |k| self.cells[f.cell][k] * D + component)
            })
            .collect();
        dofs.sort_unstable();
        dofs.dedup();
        dofs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn unit_square(n: usize, degree: usize) -> Mesh<2> {
        Mesh::hyper_rectangle(Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0), [n, n], degree)
            .unwrap()
    }

    #[test]
    fn test_hyper_rectangle_counts() {
        let mesh =
            Mesh::<2>::hyper_rectangle(Vector2::zeros(), Vector2::new(2.0, 3.0), [2, 3], 1).unwrap();
        assert_eq!(mesh.n_nodes(), 12);
        assert_eq!(mesh.n_cells(), 6);
        assert_eq!(mesh.boundary_faces().len(), 10);
        assert_eq!(mesh.n_dofs(), 24);
        assert_eq!(mesh.degree(), 1);

        let mesh = Mesh::<3>::hyper_rectangle(
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
            [2, 1, 1],
            2,
        )
        .unwrap();
        assert_eq!(mesh.n_nodes(), 5 * 3 * 3);
        assert_eq!(mesh.cells()[0].len(), 27);
        assert_eq!(mesh.degree(), 2);
    }

    #[test]
    fn test_invalid_box() {
        assert!(Mesh::<2>::hyper_rectangle(Vector2::zeros(), Vector2::new(1.0, 0.0), [1, 1], 1)
            .is_err());
        assert!(Mesh::<2>::hyper_rectangle(Vector2::zeros(), Vector2::new(1.0, 1.0), [0, 1], 1)
            .is_err());
        assert!(matches!(
            Mesh::<2>::hyper_rectangle(Vector2::zeros(), Vector2::new(1.0, 1.0), [1, 1], 7),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_cell_connectivity() {
        let mut mesh = Mesh::<2>::new(1).unwrap();
        mesh.add_node(Vector2::new(0.0, 0.0));
        mesh.add_node(Vector2::new(1.0, 0.0));
        mesh.add_node(Vector2::new(0.0, 1.0));
        assert!(mesh.add_cell(vec![0, 1, 2]).is_err());
        assert!(mesh.add_cell(vec![0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_cell_volume_sums_to_domain() {
        for degree in 1..=3 {
            let mesh = Mesh::<3>::hyper_rectangle(
                Vector3::new(-1.0, 0.0, 0.0),
                Vector3::new(1.0, 0.5, 3.0),
                [2, 1, 2],
                degree,
            )
            .unwrap();
            let volume: f64 = (0..mesh.n_cells())
                .flat_map(|c| mesh.cell_values(c).unwrap())
                .map(|q| q.jxw)
                .sum();
            assert_relative_eq!(volume, 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_distorted_cell_area() {
        // Trapezoid with corners (0,0), (2,0), (0,1), (1,1): area 1.5
        let mut mesh = Mesh::<2>::new(1).unwrap();
        mesh.add_node(Vector2::new(0.0, 0.0));
        mesh.add_node(Vector2::new(2.0, 0.0));
        mesh.add_node(Vector2::new(0.0, 1.0));
        mesh.add_node(Vector2::new(1.0, 1.0));
        mesh.add_cell(vec![0, 1, 2, 3]).unwrap();

        let values = mesh.cell_values(0).unwrap();
        let area: f64 = values.iter().map(|q| q.jxw).sum();
        assert_relative_eq!(area, 1.5, epsilon = 1e-12);

        // Physical gradients reproduce ∇x = I
        for q in &values {
            let coords = mesh.cell_coords(0).unwrap();
            let grad_x = coords
                .iter()
                .zip(q.shape_gradients.iter())
                .fold(Tensor2::<2>::zeros(), |acc, (x, g)| acc + x * g.transpose());
            assert_relative_eq!(grad_x, Tensor2::<2>::identity(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverted_cell_rejected() {
        let mut mesh = Mesh::<2>::new(1).unwrap();
        mesh.add_node(Vector2::new(1.0, 0.0));
        mesh.add_node(Vector2::new(0.0, 0.0));
        mesh.add_node(Vector2::new(1.0, 1.0));
        mesh.add_node(Vector2::new(0.0, 1.0));
        mesh.add_cell(vec![0, 1, 2, 3]).unwrap();
        assert!(matches!(mesh.cell_values(0), Err(Error::Mesh(_))));
    }

    #[test]
    fn test_boundary_face_normals_and_area() {
        let mesh = Mesh::<3>::hyper_rectangle(
            Vector3::zeros(),
            Vector3::new(2.0, 1.0, 0.5),
            [2, 2, 1],
            1,
        )
        .unwrap();
        // id 1: x = 2 face, area 1 × 0.5
        let mut area = 0.0;
        for cell in 0..mesh.n_cells() {
            for q in mesh.boundary_face_values(cell, 1).unwrap() {
                assert_relative_eq!(q.normal, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
                area += q.jxw;
            }
        }
        assert_relative_eq!(area, 0.5, epsilon = 1e-12);

        // id 4: z = 0 face, outward normal -z
        let q = &mesh.boundary_face_values(0, 4).unwrap()[0];
        assert_relative_eq!(q.normal, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_interior_cell_has_no_boundary_values() {
        let mesh = unit_square(3, 1);
        // Cell (1, 1) is interior
        let values = mesh.boundary_face_values(4, 0).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_boundary_dofs() {
        let mesh = unit_square(2, 2);
        // x = 0 edge carries 2·2 + 1 = 5 nodes
        let dofs = mesh.boundary_dofs(0, 1);
        assert_eq!(dofs.len(), 5);
        assert!(dofs.iter().all(|d| d % 2 == 1));
        assert!(dofs
            .iter()
            .all(|d| mesh.nodes()[d / 2][0].abs() < 1e-12));
        assert!(mesh.boundary_dofs(0, 2).is_empty());
    }

    #[test]
    fn test_set_boundary_ids_by_position() {
        let mut mesh = unit_square(2, 1);
        mesh.set_boundary_ids(|c| {
            if c[0] < 1e-12 {
                Some(5)
            } else if c[0] > 1.0 - 1e-12 {
                Some(6)
            } else {
                None
            }
        });
        assert_eq!(mesh.boundary_dofs(5, 0).len(), 3);
        assert_eq!(mesh.boundary_dofs(6, 0).len(), 3);
        assert!(mesh.boundary_dofs(0, 0).is_empty());
        // y faces keep their generator ids
        assert_eq!(mesh.boundary_dofs(2, 0).len(), 3);
    }

    #[test]
    fn test_cell_dof_indices_node_major() {
        let mesh = unit_square(1, 1);
        assert_eq!(mesh.cell_dof_indices(0).unwrap(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(mesh.cell_dof_indices(1).is_err());
    }

    #[test]
    fn test_bounds() {
        let mesh = Mesh::<2>::hyper_rectangle(
            Vector2::new(-1.0, -2.0),
            Vector2::new(1.0, 2.0),
            [2, 2],
            1,
        )
        .unwrap();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vector2::new(-1.0, -2.0));
        assert_eq!(max, Vector2::new(1.0, 2.0));
        assert!(Mesh::<2>::new(1).unwrap().bounds().is_none());
    }
}
