use crate::core::structure::{Lattice, MolAtom, Molecule};
use crate::error::{SiteError, SymmetryError};
use crate::symmetry::WyckoffPosition;
use nalgebra::{Matrix3, Vector3};

/// Allowed deviation of `det(R)` from 1 and of `RᵀR` from the identity.
const ROTATION_TOLERANCE: f64 = 1e-3;

// ============================================================================
// ORIENTATION
// ============================================================================

/// Rigid-body rotation applied to the centered molecule of a site.
#[derive(Debug, Clone, PartialEq)]
pub struct Orientation {
    pub matrix: Matrix3<f64>,
}

impl Orientation {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Orthogonal with determinant +1, within [`ROTATION_TOLERANCE`].
    pub fn is_proper(&self) -> bool {
        let orthogonality = (self.matrix.transpose() * self.matrix - Matrix3::identity()).amax();
        (self.determinant() - 1.0).abs() <= ROTATION_TOLERANCE
            && orthogonality <= ROTATION_TOLERANCE
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

// ============================================================================
// SITES
// ============================================================================

/// A molecule placed on a Wyckoff orbit of a lattice.
///
/// Atom positions are `position` (fractional) plus the orientation applied to
/// the centered molecule, converted back to fractional coordinates.
#[derive(Debug, Clone)]
pub struct MolecularSite {
    molecule: Molecule,
    position: Vector3<f64>,
    orientation: Orientation,
    wyckoff: WyckoffPosition,
    lattice: Lattice,
}

impl MolecularSite {
    /// Validates and packages a site. The molecule is centered here if it is not
    /// already.
    pub fn assemble(
        molecule: Molecule,
        position: Vector3<f64>,
        orientation: Orientation,
        wyckoff: WyckoffPosition,
        lattice: Lattice,
    ) -> Result<Self, SiteError> {
        if molecule.is_empty() {
            return Err(SiteError::EmptyMolecule);
        }
        if position.iter().any(|x| !(0.0..1.0).contains(x)) {
            return Err(SiteError::InvalidPosition {
                x: position.x,
                y: position.y,
                z: position.z,
            });
        }
        if !orientation.is_proper() {
            return Err(SiteError::ImproperRotation {
                det: orientation.determinant(),
            });
        }
        if wyckoff.lattice_family() != lattice.family {
            return Err(SiteError::InconsistentOrbit(format!(
                "orbit {} is {} but the lattice is {}",
                wyckoff,
                wyckoff.lattice_family(),
                lattice.family
            )));
        }

        let molecule = if molecule.is_centered() {
            molecule
        } else {
            molecule.centered()
        };
        Ok(Self {
            molecule,
            position,
            orientation,
            wyckoff,
            lattice,
        })
    }

    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    pub fn wyckoff(&self) -> &WyckoffPosition {
        &self.wyckoff
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn multiplicity(&self) -> usize {
        self.wyckoff.multiplicity()
    }

    /// Cartesian -> fractional matrix of the site's lattice.
    pub fn inv_lattice(&self) -> Matrix3<f64> {
        self.lattice.inv_matrix()
    }

    /// Fractional coordinates and species of the asymmetric-unit copy.
    pub fn coords_and_species_first(&self) -> (Vec<Vector3<f64>>, Vec<String>) {
        let coords = self
            .relative_fractional()
            .into_iter()
            .map(|r| self.position + r)
            .collect();
        let species = self.molecule.atoms.iter().map(|a| a.element.clone()).collect();
        (coords, species)
    }

    /// Cartesian molecule of the `id`-th symmetry copy, translated so that its
    /// center lies in the home cell.
    pub fn get_mol_object(&self, id: usize) -> Result<Molecule, SiteError> {
        let op = self.wyckoff.generators.get(id).ok_or(SymmetryError::GeneratorIndex {
            index: id,
            multiplicity: self.multiplicity(),
        })?;

        let center = op.apply(&self.position);
        let shift = -center.map(f64::floor);

        let atoms = self
            .molecule
            .atoms
            .iter()
            .zip(self.relative_fractional())
            .map(|(atom, r)| {
                let frac = op.apply(&(self.position + r)) + shift;
                MolAtom::new(atom.element.clone(), self.lattice.to_cartesian(&frac))
            })
            .collect();
        Ok(Molecule::new(atoms))
    }

    /// Oriented atom offsets from the site center, in fractional coordinates.
    fn relative_fractional(&self) -> Vec<Vector3<f64>> {
        let inv = self.inv_lattice();
        self.molecule
            .atoms
            .iter()
            .map(|a| inv * (self.orientation.matrix * a.position))
            .collect()
    }
}

/// A single atom on a Wyckoff orbit.
#[derive(Debug, Clone)]
pub struct AtomSite {
    pub specie: String,
    pub position: Vector3<f64>,
    pub wyckoff: WyckoffPosition,
}

impl AtomSite {
    pub fn new(
        specie: impl Into<String>,
        position: Vector3<f64>,
        wyckoff: WyckoffPosition,
    ) -> Result<Self, SiteError> {
        if position.iter().any(|x| !(0.0..1.0).contains(x)) {
            return Err(SiteError::InvalidPosition {
                x: position.x,
                y: position.y,
                z: position.z,
            });
        }
        Ok(Self {
            specie: specie.into(),
            position,
            wyckoff,
        })
    }
}
