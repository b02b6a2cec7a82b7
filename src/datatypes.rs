use nalgebra::DVector;

use crate::error::{Result, SideriteError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// A mesh node with its boundary data.
///
/// `Some` marks a value that is known, either prescribed before the solve or
/// filled in by it. `None` marks an unknown: free nodes start with unknown
/// displacements, fixed nodes carry unknown (reaction) forces until the
/// solver recovers them.
#[derive(Debug, Clone)]
pub struct Node {
    pub vertex: Vertex,
    pub ux: Option<f64>,
    pub uy: Option<f64>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

/// A three-node triangular element. Connectivity is counter-clockwise;
/// `stress` holds the recovered von Mises stress after the solve.
#[derive(Debug, Clone)]
pub struct Element {
    pub nodes: [usize; 3],
    pub stress: Option<f64>,
}

/// Linear-elastic material constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

impl Material {
    /// Creates a material, rejecting constants outside the plane-stress range.
    ///
    /// # Arguments
    /// * `youngs_modulus` - Young's modulus, must be positive
    /// * `poisson_ratio` - Poisson's ratio, must lie strictly inside (-1, 0.5)
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Result<Material> {
        let material = Material {
            youngs_modulus,
            poisson_ratio,
        };
        material.validate()?;
        Ok(material)
    }

    /// Checks the constants without consuming the material.
    pub fn validate(&self) -> Result<()> {
        if !(self.youngs_modulus > 0.0) {
            return Err(SideriteError::InvalidMaterialParameters(format!(
                "Young's modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(SideriteError::InvalidMaterialParameters(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        Ok(())
    }
}

/// Parameters of a rectangular plate study.
///
/// The plate spans `[0, lx] x [0, ly]`, divided into `nx * ny` cells of two
/// triangles each. The left edge (x = 0) is clamped; a rightward traction is
/// spread over the right edge (x = lx).
#[derive(Debug, Clone, Copy)]
pub struct Model {
    pub nx: usize,
    pub ny: usize,
    pub lx: f64,
    pub ly: f64,
    pub material: Material,
    pub part_thickness: f64,
    pub traction: f64,
}

impl Model {
    /// Creates a study model, validating resolution, extents, and material.
    ///
    /// Part thickness defaults to 1.0; override it with
    /// [`with_thickness`](Model::with_thickness).
    ///
    /// # Arguments
    /// * `nx` - Number of cells along x, must be nonzero
    /// * `ny` - Number of cells along y, must be nonzero
    /// * `lx` - Plate width, must be positive
    /// * `ly` - Plate height, must be positive
    /// * `material` - Material constants
    /// * `traction` - Total rightward traction on the right edge
    pub fn new(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        material: Material,
        traction: f64,
    ) -> Result<Model> {
        if nx == 0 || ny == 0 {
            return Err(SideriteError::InvalidMeshParameters(format!(
                "cell counts must be nonzero, got nx={nx}, ny={ny}"
            )));
        }
        if !(lx > 0.0 && lx.is_finite()) || !(ly > 0.0 && ly.is_finite()) {
            return Err(SideriteError::InvalidMeshParameters(format!(
                "extents must be positive and finite, got lx={lx}, ly={ly}"
            )));
        }
        material.validate()?;

        Ok(Model {
            nx,
            ny,
            lx,
            ly,
            material,
            part_thickness: 1.0,
            traction,
        })
    }

    /// Sets the part thickness used in the element stiffness matrices.
    ///
    /// Thickness must be positive and finite.
    pub fn with_thickness(mut self, part_thickness: f64) -> Result<Model> {
        if !(part_thickness > 0.0 && part_thickness.is_finite()) {
            return Err(SideriteError::InvalidMeshParameters(format!(
                "part thickness must be positive and finite, got {part_thickness}"
            )));
        }
        self.part_thickness = part_thickness;
        Ok(self)
    }

    /// Total node count of the generated mesh.
    pub fn num_nodes(&self) -> usize {
        (self.nx + 1) * (self.ny + 1)
    }

    /// Total element count of the generated mesh.
    pub fn num_elements(&self) -> usize {
        2 * self.nx * self.ny
    }
}

impl Default for Model {
    /// A 2x2 unit plate in a soft elastic material under a 1e4 traction.
    fn default() -> Model {
        Model {
            nx: 2,
            ny: 2,
            lx: 1.0,
            ly: 1.0,
            material: Material {
                youngs_modulus: 1e6,
                poisson_ratio: 0.3,
            },
            part_thickness: 1.0,
            traction: 10000.0,
        }
    }
}

/// Results of a completed study.
///
/// `displacements` is the flat solution vector ordered
/// `[ux0, uy0, ux1, uy1, ..]`; the same values are mirrored onto the nodes,
/// which additionally carry applied and reaction forces. Elements carry their
/// recovered von Mises stress.
#[derive(Debug, Clone)]
pub struct Solution {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub displacements: DVector<f64>,
}
