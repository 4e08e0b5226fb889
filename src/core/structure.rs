use crate::error::StructureError;
use crate::symmetry::{AxisPermutation, LatticeFamily, SymOp};
use nalgebra::{Matrix3, Vector3};
use std::fmt;

/// Fractional coordinates closer than this (per component, minimum image) are
/// treated as the same site when expanding an asymmetric unit.
const DUPLICATE_TOLERANCE: f64 = 1e-3;

/// Distances below this are the query point itself, not a neighbor.
const SELF_DISTANCE: f64 = 1e-8;

/// Reduces a fractional coordinate into `[0, 1)` component-wise.
///
/// Rounding can turn `x - floor(x)` into exactly `1.0` for tiny negative `x`;
/// those components are mapped to `0.0`.
pub fn wrap_fractional(frac: &Vector3<f64>) -> Vector3<f64> {
    frac.map(|x| {
        let w = x - x.floor();
        if w >= 1.0 {
            0.0
        } else {
            w
        }
    })
}

// ============================================================================
// LATTICE
// ============================================================================

/// Periodic cell. Columns of `matrix` are the cell vectors a, b, c.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub matrix: Matrix3<f64>,
    pub reciprocal_matrix: Matrix3<f64>,
    pub family: LatticeFamily,
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, StructureError> {
        let det = matrix.determinant();
        if det.abs() < 1e-6 {
            return Err(StructureError::DegenerateLattice { det });
        }
        let reciprocal_matrix = matrix
            .try_inverse()
            .ok_or(StructureError::DegenerateLattice { det })?
            .transpose();
        Ok(Self {
            matrix,
            reciprocal_matrix,
            family: LatticeFamily::Triclinic,
        })
    }

    pub fn from_parameters(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, StructureError> {
        let in_range = |angle: f64| angle > 0.0 && angle < 180.0;
        if !(in_range(alpha) && in_range(beta) && in_range(gamma)) {
            return Err(StructureError::InvalidAngles { alpha, beta, gamma });
        }

        let alpha_r = alpha.to_radians();
        let beta_r = beta.to_radians();
        let gamma_r = gamma.to_radians();

        let term = 1.0 - alpha_r.cos().powi(2) - beta_r.cos().powi(2) - gamma_r.cos().powi(2)
            + 2.0 * alpha_r.cos() * beta_r.cos() * gamma_r.cos();

        if term <= 0.0 {
            return Err(StructureError::InvalidAngles { alpha, beta, gamma });
        }

        let v_factor = term.sqrt();
        let c_y = c * (alpha_r.cos() - beta_r.cos() * gamma_r.cos()) / gamma_r.sin();
        #[rustfmt::skip]
        let matrix = Matrix3::new(
            a, b * gamma_r.cos(), c * beta_r.cos(),
            0.0, b * gamma_r.sin(), c_y,
            0.0, 0.0, c * v_factor / gamma_r.sin(),
        );
        Self::new(matrix)
    }

    /// Same cell, tagged with the family of the space group it was resolved in.
    pub fn with_family(mut self, family: LatticeFamily) -> Self {
        self.family = family;
        self
    }

    /// Cartesian -> fractional matrix.
    pub fn inv_matrix(&self) -> Matrix3<f64> {
        self.reciprocal_matrix.transpose()
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * frac
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.inv_matrix() * cart
    }

    /// (a, b, c, alpha, beta, gamma) with angles in degrees.
    pub fn to_parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let a = self.matrix.column(0).norm();
        let b = self.matrix.column(1).norm();
        let c = self.matrix.column(2).norm();
        let angle = |i: usize, j: usize, norms: f64| {
            (self.matrix.column(i).dot(&self.matrix.column(j)) / norms)
                .acos()
                .to_degrees()
        };
        let alpha = angle(1, 2, b * c);
        let beta = angle(0, 2, a * c);
        let gamma = angle(0, 1, a * b);
        (a, b, c, alpha, beta, gamma)
    }

    pub fn get_shortest_distance_vector(
        &self,
        f1: &Vector3<f64>,
        f2: &Vector3<f64>,
    ) -> Vector3<f64> {
        let d = (f2 - f1).map(|x| x - x.round());
        self.to_cartesian(&d)
    }

    /// Reorders the cell vectors so that `x_new = Q x_old` for fractional coordinates.
    pub fn permuted(&self, perm: &AxisPermutation) -> Result<Self, StructureError> {
        let q = perm.matrix_f64();
        Ok(Self::new(self.matrix * q.transpose())?.with_family(self.family))
    }

    /// Number of cell repeats along each axis needed to cover a sphere of `radius`.
    fn image_range(&self, radius: f64) -> [i32; 3] {
        // Interplanar spacing along axis i is 1 / |reciprocal column i|.
        [0, 1, 2].map(|i| (radius * self.reciprocal_matrix.column(i).norm()).ceil() as i32 + 1)
    }
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Atom of a periodic structure. Its provenance index is its position in
/// [`Crystal::atoms`].
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: String,
    pub fractional_coords: Vector3<f64>,
}

impl Atom {
    pub fn new(element: impl Into<String>, fractional_coords: Vector3<f64>) -> Self {
        Self {
            element: element.into(),
            fractional_coords,
        }
    }
}

/// One periodic image returned by [`Crystal::neighbors_at`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub image: Vector3<i32>,
    pub position: Vector3<f64>,
    pub distance: f64,
}

/// Energy attached to a structure, in eV.
///
/// CIF headers written by this crate carry the energy per molecule, while
/// structures built in memory usually know the total for the cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellEnergy {
    Total(f64),
    PerMolecule(f64),
}

impl CellEnergy {
    /// Energy of the whole cell holding `molecules` molecules.
    pub fn total(self, molecules: usize) -> f64 {
        match self {
            CellEnergy::Total(e) => e,
            CellEnergy::PerMolecule(e) => e * molecules as f64,
        }
    }
}

/// Periodic structure: lattice, every atom of the cell, and the symmetry
/// operations it was generated with (identity only when unknown).
#[derive(Debug, Clone)]
pub struct Crystal {
    pub lattice: Lattice,
    pub atoms: Vec<Atom>,
    pub symmetry_ops: Vec<SymOp>,
    pub energy: Option<CellEnergy>,
}

impl Crystal {
    /// A P1 structure: atoms are wrapped into the home cell as given.
    pub fn new(lattice: Lattice, atoms: Vec<Atom>) -> Self {
        let atoms = atoms
            .into_iter()
            .map(|a| Atom::new(a.element, wrap_fractional(&a.fractional_coords)))
            .collect();
        Self {
            lattice,
            atoms,
            symmetry_ops: vec![SymOp::identity()],
            energy: None,
        }
    }

    /// Expands an asymmetric unit by `ops`, dropping images that land on an
    /// already generated site of the same element.
    pub fn from_asymmetric_unit(lattice: Lattice, asymmetric: &[Atom], ops: Vec<SymOp>) -> Self {
        let ops = if ops.is_empty() {
            vec![SymOp::identity()]
        } else {
            ops
        };
        let mut atoms: Vec<Atom> = Vec::with_capacity(asymmetric.len() * ops.len());

        for atom in asymmetric {
            for op in &ops {
                let frac = wrap_fractional(&op.apply(&atom.fractional_coords));
                let duplicate = atoms.iter().any(|existing| {
                    existing.element == atom.element
                        && (frac - existing.fractional_coords)
                            .map(|x| (x - x.round()).abs())
                            .max()
                            < DUPLICATE_TOLERANCE
                });
                if !duplicate {
                    atoms.push(Atom::new(atom.element.clone(), frac));
                }
            }
        }

        Self {
            lattice,
            atoms,
            symmetry_ops: ops,
            energy: None,
        }
    }

    /// Sets the total energy of the cell.
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(CellEnergy::Total(energy));
        self
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn cartesian(&self, index: usize) -> Result<Vector3<f64>, StructureError> {
        self.atoms
            .get(index)
            .map(|a| self.lattice.to_cartesian(&a.fractional_coords))
            .ok_or(StructureError::AtomIndex { index, len: self.atoms.len() })
    }

    /// All atom images within `cutoff` Å of the Cartesian point `center`,
    /// excluding the point itself. Order is deterministic: by atom index, then
    /// by image shift.
    pub fn neighbors_at(&self, center: &Vector3<f64>, cutoff: f64) -> Vec<Neighbor> {
        let center_frac = self.lattice.to_fractional(center);
        let home = center_frac.map(|x| x.floor() as i32);
        let [na, nb, nc] = self.lattice.image_range(cutoff);
        let mut neighbors = Vec::new();

        for (index, atom) in self.atoms.iter().enumerate() {
            for i in -na..=na {
                for j in -nb..=nb {
                    for k in -nc..=nc {
                        let image = home + Vector3::new(i, j, k);
                        let frac = atom.fractional_coords + image.map(|v| v as f64);
                        let position = self.lattice.to_cartesian(&frac);
                        let distance = (position - center).norm();
                        if distance > SELF_DISTANCE && distance <= cutoff {
                            neighbors.push(Neighbor {
                                index,
                                image,
                                position,
                                distance,
                            });
                        }
                    }
                }
            }
        }
        neighbors
    }

    /// Re-expresses the structure in a permuted axis setting.
    pub fn permuted(&self, perm: &AxisPermutation) -> Result<Self, StructureError> {
        if perm.is_identity() {
            return Ok(self.clone());
        }
        let q = perm.matrix();
        let qf = perm.matrix_f64();
        Ok(Self {
            lattice: self.lattice.permuted(perm)?,
            atoms: self
                .atoms
                .iter()
                .map(|a| Atom::new(a.element.clone(), wrap_fractional(&(qf * a.fractional_coords))))
                .collect(),
            symmetry_ops: self.symmetry_ops.iter().map(|op| op.transformed(&q)).collect(),
            energy: self.energy,
        })
    }
}

// ============================================================================
// MOLECULES
// ============================================================================

/// Coordinate convention of a [`Molecule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Coordinates as found (e.g. unwrapped images inside a crystal).
    Raw,
    /// Centroid translated to the origin.
    Centered,
}

/// Atom of a finite molecule, in Cartesian coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MolAtom {
    pub element: String,
    pub position: Vector3<f64>,
    /// Index of the atom in the periodic structure it was extracted from.
    pub source_index: Option<usize>,
}

impl MolAtom {
    pub fn new(element: impl Into<String>, position: Vector3<f64>) -> Self {
        Self {
            element: element.into(),
            position,
            source_index: None,
        }
    }
}

/// An ordered, finite molecular fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub atoms: Vec<MolAtom>,
    frame: Frame,
}

impl Molecule {
    pub fn new(atoms: Vec<MolAtom>) -> Self {
        Self { atoms, frame: Frame::Raw }
    }

    pub fn from_species_and_coords<S: AsRef<str>>(species: &[S], coords: &[Vector3<f64>]) -> Self {
        Self::new(
            species
                .iter()
                .zip(coords)
                .map(|(s, c)| MolAtom::new(s.as_ref(), *c))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn is_centered(&self) -> bool {
        self.frame == Frame::Centered
    }

    pub fn species(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.element.as_str()).collect()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn centroid(&self) -> Vector3<f64> {
        if self.atoms.is_empty() {
            return Vector3::zeros();
        }
        self.atoms.iter().map(|a| a.position).sum::<Vector3<f64>>() / self.atoms.len() as f64
    }

    /// Copy with the centroid moved to the origin.
    pub fn centered(&self) -> Self {
        let c = self.centroid();
        Self {
            atoms: self
                .atoms
                .iter()
                .map(|a| MolAtom {
                    position: a.position - c,
                    ..a.clone()
                })
                .collect(),
            frame: Frame::Centered,
        }
    }

    /// Copy whose atom `i` is this molecule's atom `order[i]`.
    pub fn reordered(&self, order: &[usize]) -> Self {
        Self {
            atoms: order.iter().map(|&j| self.atoms[j].clone()).collect(),
            frame: self.frame,
        }
    }
}

/// XYZ rendering, used when reporting molecules for inspection.
impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.atoms.len())?;
        writeln!(f, "{:?} frame", self.frame)?;
        for a in &self.atoms {
            let p = &a.position;
            writeln!(f, "{:<3}{:14.6}{:14.6}{:14.6}", a.element, p.x, p.y, p.z)?;
        }
        Ok(())
    }
}

/// A molecule whose atom order matches a reference molecule index-for-index.
///
/// Only produced by [`crate::analysis::matching::MatchResult::reorder`]; geometric
/// steps after matching accept nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedMolecule(Molecule);

impl AlignedMolecule {
    pub(crate) fn new(molecule: Molecule) -> Self {
        Self(molecule)
    }

    pub fn molecule(&self) -> &Molecule {
        &self.0
    }

    pub fn into_inner(self) -> Molecule {
        self.0
    }
}
