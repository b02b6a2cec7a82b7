use crate::{
    datatypes::{Element, Material, Model, Node},
    error::{Result, SideriteError},
};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra::{matrix, DVector, SMatrix};
use nalgebra_sparse::{factorization::CscCholesky, CooMatrix, CscMatrix, CsrMatrix};

use argmin::{
    core::{Executor, Operator, State},
    solver::conjugategradient::ConjugateGradient,
};

pub const DOF: usize = 2;
pub const MAX_CG_ITER: u64 = 50_000;
pub const TARGET_CG_COST: f64 = 1e-12;

/// Triangles with an absolute area below this are treated as degenerate.
pub const MIN_ELEMENT_AREA: f64 = 1e-12;

/// Relative residual bound a solution must satisfy to be accepted.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Selects how the constrained system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverBackend {
    /// Sparse direct Cholesky factorization.
    #[default]
    Cholesky,
    /// Iterative conjugate gradient.
    ConjugateGradient,
}

/// Runs multiplication for the conjugate gradient solver.
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(sparse_matvec(self.a, x))
    }
}

/// Computes `A * x` for a CSR matrix and a dense slice.
fn sparse_matvec(a: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
    let offsets = a.row_offsets();
    let cols = a.col_indices();
    let vals = a.values();

    let mut y = vec![0.0; a.nrows()];
    for (row, y_row) in y.iter_mut().enumerate() {
        let mut sum = 0.0;
        for idx in offsets[row]..offsets[row + 1] {
            sum += vals[idx] * x[cols[idx]];
        }
        *y_row = sum;
    }
    y
}

/// Solves a system of equations using the conjugate gradient method.
///
/// This function returns an approximation for x in `Ax=b`.
///
/// # Arguments
/// * `a` - A square positive definite matrix in CSR form
/// * `b` - The right-hand side of the system
///
/// # Returns
/// A DVector that represents `x` from the system
fn run_conjugate_gradient(a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let b_flat: Vec<f64> = b.iter().copied().collect();
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b_flat);
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];

    let operator = ConjugateGradientOperator { a };

    let res = match Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(MAX_CG_ITER)
                .target_cost(TARGET_CG_COST)
        })
        .run()
    {
        Ok(r) => r,
        Err(err) => {
            return Err(SideriteError::SingularSystem(format!(
                "conjugate gradient error: {err}"
            )))
        }
    };

    debug!(
        "conjugate gradient stopped after {} iterations with cost {:.4e}",
        res.state().get_iter(),
        res.state().get_cost()
    );
    if res.state().get_iter() >= MAX_CG_ITER {
        warn!("conjugate gradient hit the iteration cap; the residual check decides acceptance");
    }

    match &res.state().best_param {
        Some(vec) => Ok(DVector::from_vec(vec.clone())),
        None => Err(SideriteError::SingularSystem(
            "conjugate gradient could not produce a solution".to_owned(),
        )),
    }
}

/// Solves the constrained system with a sparse Cholesky factorization.
///
/// The factorization fails on matrices that are not positive definite, which
/// is how an unsolvable system surfaces on this path.
fn solve_direct(stiffness: &CscMatrix<f64>, loads: &DVector<f64>) -> Result<DVector<f64>> {
    let factorization = match CscCholesky::factor(stiffness) {
        Ok(f) => f,
        Err(err) => {
            return Err(SideriteError::SingularSystem(format!(
                "Cholesky factorization failed: {err:?}"
            )))
        }
    };

    let solution = factorization.solve(loads);
    Ok(DVector::from_fn(solution.nrows(), |i, _| solution[(i, 0)]))
}

/// Rejects solutions that do not actually satisfy the system they came from.
///
/// Both backends can return a vector without having converged on one, so the
/// residual and finiteness are checked before any result leaves the solver.
fn check_solution(
    stiffness: &CsrMatrix<f64>,
    loads: &DVector<f64>,
    solution: &DVector<f64>,
) -> Result<()> {
    if solution.iter().any(|u| !u.is_finite()) {
        return Err(SideriteError::SingularSystem(
            "solution contains non-finite displacements".to_owned(),
        ));
    }

    let residual = DVector::from_vec(sparse_matvec(stiffness, solution.as_slice())) - loads;
    let limit = RESIDUAL_TOLERANCE * loads.norm().max(1.0);
    if residual.norm() > limit {
        return Err(SideriteError::SingularSystem(format!(
            "residual {:.4e} exceeds {:.4e}; the system is singular or the solver did not converge",
            residual.norm(),
            limit
        )));
    }

    Ok(())
}

/// Calculates the signed area of the element.
///
/// The sign follows the winding of the connectivity: positive for
/// counter-clockwise triangles. Callers that need the geometric area take the
/// absolute value.
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - A reference to the vector of nodes
///
/// # Returns
/// The signed area of the element
pub fn compute_element_area(element: &Element, nodes: &Vec<Node>) -> f64 {
    let v0 = &nodes[element.nodes[0]].vertex;
    let v1 = &nodes[element.nodes[1]].vertex;
    let v2 = &nodes[element.nodes[2]].vertex;

    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Calculates the strain-displacement matrix of the element.
///
/// Columns are ordered `[ux0, uy0, ux1, uy1, ux2, uy2]`; rows carry the two
/// normal strains and the engineering shear strain.
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - A reference to the vector of nodes
/// * `element_area` - The absolute area of the element
///
/// # Returns
/// A 3x6 strain-displacement matrix
pub fn compute_strain_displacement_matrix(
    element: &Element,
    nodes: &Vec<Node>,
    element_area: f64,
) -> SMatrix<f64, 3, 6> {
    let v0 = &nodes[element.nodes[0]].vertex;
    let v1 = &nodes[element.nodes[1]].vertex;
    let v2 = &nodes[element.nodes[2]].vertex;

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, 6> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * element_area;

    strain_displacement_mat
}

/// Calculates the plane-stress constitutive matrix.
///
/// # Arguments
/// * `material` - The material constants of the model
///
/// # Returns
/// A 3x3 stress-strain matrix
pub fn compute_stress_strain_matrix(material: &Material) -> SMatrix<f64, 3, 3> {
    let poisson_ratio = material.poisson_ratio;

    let mut stress_strain_mat: SMatrix<f64, 3, 3> = matrix![
        1.0, poisson_ratio, 0.0;
        poisson_ratio, 1.0, 0.0;
        0.0, 0.0, (1.0 - poisson_ratio)/2.0;
    ];

    stress_strain_mat *= material.youngs_modulus / (1.0 - f64::powi(poisson_ratio, 2));

    stress_strain_mat
}

/// Computes the stiffness matrix for a given element.
///
/// Fails on degenerate geometry: a triangle whose absolute area falls below
/// [`MIN_ELEMENT_AREA`] has no valid stiffness and would otherwise poison the
/// global system with huge or non-finite entries.
///
/// # Arguments
/// * `index` - The element's index, reported on degeneracy
/// * `element` - The element to target
/// * `nodes` - A reference to the vector of nodes
/// * `material` - The material constants of the model
/// * `part_thickness` - The thickness of the part
///
/// # Returns
/// A 6x6 stiffness matrix for the element
pub fn compute_element_stiffness_matrix(
    index: usize,
    element: &Element,
    nodes: &Vec<Node>,
    material: &Material,
    part_thickness: f64,
) -> Result<SMatrix<f64, 6, 6>> {
    let element_area = compute_element_area(element, nodes).abs();
    if element_area < MIN_ELEMENT_AREA {
        return Err(SideriteError::DegenerateElement {
            index,
            area: element_area,
        });
    }

    let stress_strain_mat = compute_stress_strain_matrix(material);
    let strain_displacement_mat = compute_strain_displacement_matrix(element, nodes, element_area);

    Ok((strain_displacement_mat.transpose() * stress_strain_mat)
        * strain_displacement_mat
        * element_area
        * part_thickness)
}

/// Global DOF indices of an element's three nodes, in node order.
fn element_dofs(element: &Element) -> [usize; 6] {
    let [n0, n1, n2] = element.nodes;
    [
        DOF * n0,
        DOF * n0 + 1,
        DOF * n1,
        DOF * n1 + 1,
        DOF * n2,
        DOF * n2 + 1,
    ]
}

/// Compiles element stiffness matrices into the total stiffness structure.
///
/// Every element contributes its 36 entries as (row, col, value) triplets.
/// Duplicate coordinates are left in place and summed at compression, so the
/// result is independent of element order.
///
/// # Arguments
/// * `nodes` - A reference to the vector of nodes
/// * `elements` - A reference to the vector of elements
/// * `element_stiffness_matrices` - A vector of element stiffness matrices
///     that corresponds to the `elements` vector.
///
/// # Returns
/// The total stiffness matrix in coordinate form
fn build_total_stiffness_matrix(
    nodes: &Vec<Node>,
    elements: &Vec<Element>,
    element_stiffness_matrices: Vec<SMatrix<f64, 6, 6>>,
) -> CooMatrix<f64> {
    let n_dofs = DOF * nodes.len();
    let mut triplets: CooMatrix<f64> = CooMatrix::new(n_dofs, n_dofs);

    let bar = ProgressBar::new(elements.len() as u64);
    for (stiffness_mat, element) in std::iter::zip(element_stiffness_matrices, elements) {
        bar.inc(1);

        let dofs = element_dofs(element);
        for (local_row, &global_row) in dofs.iter().enumerate() {
            for (local_col, &global_col) in dofs.iter().enumerate() {
                triplets.push(global_row, global_col, stiffness_mat[(local_row, local_col)]);
            }
        }
    }
    bar.finish_with_message(format!(
        "folded {} element matrices into the total stiffness matrix",
        elements.len()
    ));

    triplets
}

/// Builds the total stiffness matrix of the model in coordinate form.
///
/// Node `n` owns global DOFs `2n` (x) and `2n + 1` (y). Each element's
/// stiffness is evaluated independently, then all contributions are folded
/// into one coordinate-format accumulator.
///
/// # Arguments
/// * `nodes` - A reference to the vector of nodes
/// * `elements` - A reference to the vector of elements
/// * `material` - The material constants of the model
/// * `part_thickness` - The thickness of the part
///
/// # Returns
/// The unconstrained total stiffness matrix in coordinate form
pub fn assemble_global_stiffness(
    nodes: &Vec<Node>,
    elements: &Vec<Element>,
    material: &Material,
    part_thickness: f64,
) -> Result<CooMatrix<f64>> {
    info!("building element stiffness matrices...");
    let bar = ProgressBar::new(elements.len() as u64);
    let mut element_stiffness_matrices: Vec<SMatrix<f64, 6, 6>> =
        Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        bar.inc(1);

        element_stiffness_matrices.push(compute_element_stiffness_matrix(
            index,
            element,
            nodes,
            material,
            part_thickness,
        )?);
    }
    bar.finish_with_message(format!(
        "built {} element stiffness matrices",
        elements.len()
    ));

    info!("building total stiffness matrix...");
    Ok(build_total_stiffness_matrix(
        nodes,
        elements,
        element_stiffness_matrices,
    ))
}

/// Applies the prescribed displacements to the assembled system.
///
/// Builds the dense load vector from the prescribed nodal forces, then
/// enforces each prescribed displacement DOF algebraically: its row and
/// column entries are dropped before compression, a unit diagonal entry takes
/// their place, and the load entry becomes the prescribed value (zero for the
/// standard clamp). Entries coupling a free row to a fixed column move to the
/// right-hand side. The system keeps its full dimension and its symmetry, and
/// the solved value at a fixed DOF equals the prescription exactly.
///
/// # Arguments
/// * `stiffness` - The unconstrained total stiffness matrix in coordinate form
/// * `nodes` - A reference to the vector of nodes carrying the edge conditions
///
/// # Returns
/// The constrained stiffness matrix and load vector, in that order
pub fn apply_boundary_conditions(
    stiffness: &CooMatrix<f64>,
    nodes: &Vec<Node>,
) -> Result<(CooMatrix<f64>, DVector<f64>)> {
    let n_dofs = DOF * nodes.len();
    if stiffness.nrows() != n_dofs || stiffness.ncols() != n_dofs {
        return Err(SideriteError::InvalidMeshParameters(format!(
            "stiffness matrix is {}x{} but the mesh has {} DOFs",
            stiffness.nrows(),
            stiffness.ncols(),
            n_dofs
        )));
    }

    let mut prescribed: Vec<Option<f64>> = vec![None; n_dofs];
    let mut loads: DVector<f64> = DVector::zeros(n_dofs);
    for (i, node) in nodes.iter().enumerate() {
        prescribed[DOF * i] = node.ux;
        prescribed[DOF * i + 1] = node.uy;

        if let Some(fx) = node.fx {
            loads[DOF * i] = fx;
        }
        if let Some(fy) = node.fy {
            loads[DOF * i + 1] = fy;
        }
    }

    let mut constrained: CooMatrix<f64> = CooMatrix::new(n_dofs, n_dofs);
    for (row, col, &value) in stiffness.triplet_iter() {
        match (prescribed[row], prescribed[col]) {
            (None, None) => constrained.push(row, col, value),
            // The column's displacement is known; its share moves to the RHS.
            (None, Some(displacement)) => loads[row] -= value * displacement,
            // Fixed rows are replaced by the unit diagonal below.
            (Some(_), _) => {}
        }
    }

    let fixed_count = prescribed.iter().flatten().count();
    for (dof, value) in prescribed.iter().enumerate() {
        if let Some(displacement) = value {
            constrained.push(dof, dof, 1.0);
            loads[dof] = *displacement;
        }
    }

    debug!("constrained {} of {} DOFs", fixed_count, n_dofs);

    Ok((constrained, loads))
}

/// Loads the solved displacements into the node objects.
fn load_displacements(nodes: &mut Vec<Node>, displacements: &DVector<f64>) {
    for (i, node) in nodes.iter_mut().enumerate() {
        node.ux = Some(displacements[DOF * i]);
        node.uy = Some(displacements[DOF * i + 1]);
    }
}

/// Fills in the unknown nodal forces from the unconstrained stiffness matrix.
///
/// At a clamped DOF the equilibrium row evaluated at the solved displacements
/// gives the reaction the support supplies.
fn recover_reactions(
    nodes: &mut Vec<Node>,
    stiffness: &CsrMatrix<f64>,
    displacements: &DVector<f64>,
) {
    let forces = sparse_matvec(stiffness, displacements.as_slice());
    for (i, node) in nodes.iter_mut().enumerate() {
        if node.fx.is_none() {
            node.fx = Some(forces[DOF * i]);
        }
        if node.fy.is_none() {
            node.fy = Some(forces[DOF * i + 1]);
        }
    }
}

/// Calculates the stress in each element.
///
/// Per element, strain follows from the solved nodal displacements and stress
/// from the constitutive matrix; the scalar stored on the element is the
/// plane-stress von Mises measure.
///
/// # Arguments
/// * `elements` - A mutable reference to the vector of elements
/// * `nodes` - A reference to the vector of nodes
/// * `material` - The material constants of the model
/// * `displacements` - The solved displacement vector
fn compute_stress(
    elements: &mut Vec<Element>,
    nodes: &Vec<Node>,
    material: &Material,
    displacements: &DVector<f64>,
) -> Result<()> {
    for (index, element) in elements.iter_mut().enumerate() {
        let element_area = compute_element_area(element, nodes).abs();
        if element_area < MIN_ELEMENT_AREA {
            return Err(SideriteError::DegenerateElement {
                index,
                area: element_area,
            });
        }

        let dofs = element_dofs(element);
        let nodal_displacements: SMatrix<f64, 6, 1> =
            SMatrix::from(dofs.map(|dof| displacements[dof]));

        let stress = compute_stress_strain_matrix(material)
            * compute_strain_displacement_matrix(element, nodes, element_area)
            * nodal_displacements;

        let (sx, sy, txy) = (stress[0], stress[1], stress[2]);
        element.stress = Some((sx * sx - sx * sy + sy * sy + 3.0 * txy * txy).sqrt());
    }

    Ok(())
}

/// Runs the solver. Updates values on the nodes and elements vectors and
/// returns the solved displacement vector.
///
/// The stages are: element stiffness evaluation, triplet assembly, constraint
/// application, the linear solve on the chosen backend, a residual acceptance
/// check, and recovery of reactions and element stresses.
///
/// # Arguments
/// * `nodes` - A mutable reference to the vector of nodes
/// * `elements` - A mutable reference to the vector of elements
/// * `model` - The study parameters
/// * `backend` - The linear solver backend to use
///
/// # Returns
/// The displacement vector, ordered `[ux0, uy0, ux1, uy1, ..]`
pub fn run(
    nodes: &mut Vec<Node>,
    elements: &mut Vec<Element>,
    model: &Model,
    backend: SolverBackend,
) -> Result<DVector<f64>> {
    model.material.validate()?;

    let triplets =
        assemble_global_stiffness(nodes, elements, &model.material, model.part_thickness)?;
    let stiffness = CsrMatrix::from(&triplets);
    debug!(
        "total stiffness matrix is {}x{} with {} stored entries",
        stiffness.nrows(),
        stiffness.ncols(),
        stiffness.nnz()
    );

    let (constrained, loads) = apply_boundary_conditions(&triplets, nodes)?;
    let constrained_csr = CsrMatrix::from(&constrained);

    info!("solving {} DOF system...", loads.nrows());
    let start = std::time::Instant::now();
    let displacements = match backend {
        SolverBackend::Cholesky => solve_direct(&CscMatrix::from(&constrained), &loads)?,
        SolverBackend::ConjugateGradient => run_conjugate_gradient(&constrained_csr, &loads)?,
    };
    check_solution(&constrained_csr, &loads, &displacements)?;
    info!("solved system in {:.3} seconds", start.elapsed().as_secs_f32());

    load_displacements(nodes, &displacements);
    recover_reactions(nodes, &stiffness, &displacements);
    compute_stress(elements, nodes, &model.material, &displacements)?;

    Ok(displacements)
}
