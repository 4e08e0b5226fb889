use crate::core::structure::Lattice;
use crate::site::molecular_site::{AtomSite, MolecularSite};
use crate::symmetry::SpaceGroup;

/// Sites of a symmetrized structure. A structure holds one kind or the other.
#[derive(Debug, Clone)]
pub enum SiteCollection {
    Molecular(Vec<MolecularSite>),
    Atomic(Vec<AtomSite>),
}

impl SiteCollection {
    pub fn len(&self) -> usize {
        match self {
            Self::Molecular(sites) => sites.len(),
            Self::Atomic(sites) => sites.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A structure described by its space group and asymmetric-unit sites.
#[derive(Debug, Clone)]
pub struct SymmetrizedCrystal {
    pub group: SpaceGroup,
    pub lattice: Lattice,
    pub sites: SiteCollection,
    /// Total energy of the cell in eV, if known.
    pub energy: Option<f64>,
    /// Molecules per cell for each molecular species; normalizes the energy line.
    pub num_mols: Vec<usize>,
}

impl SymmetrizedCrystal {
    /// A structure holding a single molecular site, with one molecule per
    /// orbit copy.
    pub fn from_molecular_site(group: SpaceGroup, site: MolecularSite) -> Self {
        let lattice = site.lattice().clone();
        let num_mols = vec![site.multiplicity()];
        Self {
            group,
            lattice,
            sites: SiteCollection::Molecular(vec![site]),
            energy: None,
            num_mols,
        }
    }

    pub fn with_energy(mut self, energy: Option<f64>) -> Self {
        self.energy = energy;
        self
    }

    pub fn with_num_mols(mut self, num_mols: Vec<usize>) -> Self {
        self.num_mols = num_mols;
        self
    }

    /// Energy divided by the total molecule count, as written to CIF headers.
    pub fn energy_per_molecule(&self) -> Option<f64> {
        let total: usize = self.num_mols.iter().sum();
        match (self.energy, total) {
            (Some(e), n) if n > 0 => Some(e / n as f64),
            (Some(e), _) => Some(e),
            (None, _) => None,
        }
    }
}
