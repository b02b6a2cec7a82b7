use thiserror::Error;

/// Errors produced by the meshing, assembly, solve, and output stages.
#[derive(Error, Debug)]
pub enum SideriteError {
    /// Mesh resolution or extents that cannot describe a rectangle.
    #[error("invalid mesh parameters: {0}")]
    InvalidMeshParameters(String),

    /// Material constants outside the physical plane-stress range.
    #[error("invalid material parameters: {0}")]
    InvalidMaterialParameters(String),

    /// A triangle whose vertices are coincident or collinear.
    #[error("degenerate element {index}: area {area:e} is below the minimum")]
    DegenerateElement { index: usize, area: f64 },

    /// The constrained stiffness matrix could not be solved.
    #[error("singular system: {0}")]
    SingularSystem(String),

    /// Results were asked for before the solve produced them.
    #[error("post-processor error: {0}")]
    PostProcessor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SideriteError>;
