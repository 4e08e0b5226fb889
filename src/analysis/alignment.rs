use crate::core::structure::{AlignedMolecule, MolAtom, Molecule};
use crate::error::SiteError;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// Rigid superposition of a matched molecule onto its reference.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Proper rotation taking the centered candidate onto the centered reference.
    pub rotation: Matrix3<f64>,
    /// Root-mean-square atomic displacement after superposition, in Å.
    pub rmsd: f64,
    /// Candidate after rotation, placed at the reference centroid. For display only.
    pub aligned: Molecule,
}

/// Superimposes `candidate` onto `reference` (centered here if it is not already).
///
/// Uses the Kabsch construction; a reflection in the SVD solution is corrected
/// by flipping the smallest singular direction, so the rotation is always proper.
pub fn align(reference: &Molecule, candidate: &AlignedMolecule) -> Result<Alignment, SiteError> {
    let candidate = candidate.molecule();
    if reference.is_empty() || candidate.is_empty() {
        return Err(SiteError::EmptyMolecule);
    }
    if reference.len() != candidate.len() {
        return Err(SiteError::Alignment(format!(
            "reference has {} atoms but candidate has {}",
            reference.len(),
            candidate.len()
        )));
    }

    let ref_centroid = reference.centroid();
    let from: Vec<Vector3<f64>> = candidate.centered().positions();
    let to: Vec<Vector3<f64>> = reference.positions().iter().map(|p| p - ref_centroid).collect();

    let rotation = kabsch(&from, &to)?;

    let squared: f64 = from
        .iter()
        .zip(&to)
        .map(|(f, t)| (rotation * f - t).norm_squared())
        .sum();
    let rmsd = (squared / from.len() as f64).sqrt();
    debug!(rmsd, "orientation aligned");

    let aligned = Molecule::new(
        candidate
            .atoms
            .iter()
            .zip(&from)
            .map(|(atom, f)| MolAtom {
                position: rotation * f + ref_centroid,
                ..atom.clone()
            })
            .collect(),
    );

    Ok(Alignment { rotation, rmsd, aligned })
}

fn kabsch(from: &[Vector3<f64>], to: &[Vector3<f64>]) -> Result<Matrix3<f64>, SiteError> {
    let h = from
        .iter()
        .zip(to)
        .fold(Matrix3::zeros(), |acc, (f, t)| acc + t * f.transpose());

    let svd = h.svd(true, true);
    let u = svd.u.ok_or_else(|| SiteError::Alignment("SVD did not produce U".into()))?;
    let v_t = svd.v_t.ok_or_else(|| SiteError::Alignment("SVD did not produce Vᵀ".into()))?;

    let d = (u * v_t).determinant();
    let mut correction = Matrix3::identity();
    if d < 0.0 {
        correction[(2, 2)] = -1.0;
    }
    Ok(u * correction * v_t)
}
