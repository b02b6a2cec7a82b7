//! Siderite - plane-stress finite element analysis on structured meshes
//!
//! Solves the classic rectangular plate study: the left edge is clamped, the
//! right edge carries a horizontal traction, and the interior deforms under
//! linear-elastic plane stress. The pipeline is:
//! - Structured triangular meshing of the rectangular domain
//! - Constant strain triangle stiffness and plane-stress constitutive law
//! - Sparse assembly with direct and conjugate gradient solvers
//! - Reaction and von Mises stress recovery
//! - CSV and JSON result output for external visualization
//!
//! # Example
//!
//! ```
//! use siderite::{solve, Model};
//!
//! let model = Model::default();
//! let solution = solve(&model).unwrap();
//! assert_eq!(solution.displacements.len(), 2 * model.num_nodes());
//! ```

pub mod datatypes;
pub mod error;
pub mod mesher;
pub mod post_processor;
pub mod solver;

pub use datatypes::{Element, Material, Model, Node, Solution, Vertex};
pub use error::{Result, SideriteError};
pub use solver::SolverBackend;

/// Runs a complete study on the default solver backend.
///
/// # Arguments
/// * `model` - The study parameters
///
/// # Returns
/// The solved nodes, elements, and displacement vector
pub fn solve(model: &Model) -> Result<Solution> {
    solve_with_backend(model, SolverBackend::default())
}

/// Runs a complete study: meshing, edge conditions, the linear solve, and
/// stress recovery.
///
/// The result is a pure function of the model parameters; repeated runs
/// produce identical displacement vectors.
///
/// # Arguments
/// * `model` - The study parameters
/// * `backend` - The linear solver backend to use
///
/// # Returns
/// The solved nodes, elements, and displacement vector
pub fn solve_with_backend(model: &Model, backend: SolverBackend) -> Result<Solution> {
    let (mut nodes, mut elements) = mesher::generate(model.nx, model.ny, model.lx, model.ly)?;
    mesher::apply_edge_conditions(&mut nodes, model.nx, model.ny, model.traction)?;
    let displacements = solver::run(&mut nodes, &mut elements, model, backend)?;

    Ok(Solution {
        nodes,
        elements,
        displacements,
    })
}
