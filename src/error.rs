use thiserror::Error;

/// Failures while building lattices and periodic structures.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("Lattice has zero or near-zero volume (det = {det:.3e}).")]
    DegenerateLattice { det: f64 },

    #[error("Invalid lattice angles ({alpha}, {beta}, {gamma}); each must lie in (0, 180).")]
    InvalidAngles { alpha: f64, beta: f64, gamma: f64 },

    #[error("Atom index {index} is out of range for a structure with {len} atoms.")]
    AtomIndex { index: usize, len: usize },
}

/// Failures in the symmetry layer: operator parsing, group lookup and merging.
#[derive(Debug, Error)]
pub enum SymmetryError {
    #[error("Cannot parse symmetry operation '{input}': {reason}")]
    InvalidOperation { input: String, reason: String },

    #[error("Space group {0} is not tabulated.")]
    UnknownSpaceGroup(u16),

    #[error("No merge rule for multiplicity-{multiplicity} orbits of space group {number}.")]
    UnsupportedMerge { number: u16, multiplicity: usize },

    #[error("No special position of space group {number} within {tolerance} Å of the molecule.")]
    NoSpecialSite { number: u16, tolerance: f64 },

    #[error("Symmetry copy {index} requested but the orbit only has {multiplicity} generators.")]
    GeneratorIndex { index: usize, multiplicity: usize },
}

/// Failures while turning a periodic structure into a crystallographic molecular site.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Input cannot be interpreted: {0}")]
    Input(String),

    #[error("Cannot find the space group matching the symmetry operations.")]
    NoSpaceGroup,

    #[error("Molecule of {candidate} atoms does not match the {reference}-atom reference.")]
    ConnectivityMismatch { reference: usize, candidate: usize },

    #[error("Molecule has no atoms.")]
    EmptyMolecule,

    #[error("Site position ({x}, {y}, {z}) is outside the unit cell [0, 1).")]
    InvalidPosition { x: f64, y: f64, z: f64 },

    #[error("Orientation is not a proper rotation (det = {det:.6}).")]
    ImproperRotation { det: f64 },

    #[error("Inconsistent orbit: {0}")]
    InconsistentOrbit(String),

    #[error("Alignment failed: {0}")]
    Alignment(String),

    #[error(transparent)]
    Symmetry(#[from] SymmetryError),

    #[error(transparent)]
    Structure(#[from] StructureError),
}
