use crate::core::connectivity::GraphRepresentation;
use crate::core::structure::{AlignedMolecule, Molecule};
use petgraph::algo::subgraph_isomorphisms_iter;
use tracing::{debug, warn};

/// Atom correspondence between a reference and a candidate molecule.
///
/// When `matched`, `candidate[permutation[i]]` corresponds to `reference[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub permutation: Vec<usize>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            permutation: Vec::new(),
        }
    }

    /// Reorders `candidate` into reference order. `None` without a match.
    pub fn reorder(&self, candidate: &Molecule) -> Option<AlignedMolecule> {
        if !self.matched || self.permutation.len() != candidate.len() {
            return None;
        }
        Some(AlignedMolecule::new(candidate.reordered(&self.permutation)))
    }
}

/// Compares molecules by their element-labelled covalent bond graphs.
#[derive(Debug, Clone)]
pub struct MoleculeMatcher {
    tolerance: f64,
}

impl MoleculeMatcher {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn compare(&self, reference: &Molecule, candidate: &Molecule) -> MatchResult {
        if reference.len() != candidate.len() {
            debug!(reference = reference.len(), candidate = candidate.len(), "atom counts differ");
            return MatchResult::no_match();
        }

        let mut ref_species = reference.species();
        let mut cand_species = candidate.species();
        ref_species.sort_unstable();
        cand_species.sort_unstable();
        if ref_species != cand_species {
            debug!("compositions differ");
            return MatchResult::no_match();
        }

        let ref_graph = GraphRepresentation::from_molecule(reference, self.tolerance);
        let cand_graph = GraphRepresentation::from_molecule(candidate, self.tolerance);
        if ref_graph.bond_count() != cand_graph.bond_count() {
            debug!(
                reference = ref_graph.bond_count(),
                candidate = cand_graph.bond_count(),
                "bond counts differ"
            );
            return MatchResult::no_match();
        }
        if ref_graph.find_connected_components().len() > 1 {
            warn!("reference molecule is not a single connected fragment");
        }

        let g0 = &ref_graph.graph;
        let g1 = &cand_graph.graph;
        let mut node_match = |a: &u8, b: &u8| a == b;
        let mut edge_match = |_: &(), _: &()| true;

        // Unknown elements share weight 0, so the labels are re-checked by symbol.
        let same_elements = |mapping: &Vec<usize>| {
            mapping
                .iter()
                .enumerate()
                .all(|(i, &j)| reference.atoms[i].element == candidate.atoms[j].element)
        };

        let permutation = subgraph_isomorphisms_iter(&g0, &g1, &mut node_match, &mut edge_match)
            .and_then(|mut mappings| mappings.find(|m| same_elements(m)));

        match permutation {
            Some(permutation) => MatchResult {
                matched: true,
                permutation,
            },
            None => MatchResult::no_match(),
        }
    }
}
