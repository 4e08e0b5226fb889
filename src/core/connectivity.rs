use crate::chemistry::elements::{atomic_number, is_bonded};
use crate::core::structure::{Crystal, Lattice, MolAtom, Molecule};
use crate::error::StructureError;
use petgraph::graph::{NodeIndex, UnGraph};
use nalgebra::Vector3;
use petgraph::visit::Bfs;
use tracing::{debug, instrument};

/// Radius of the periodic neighbor query around each frontier atom, in Å.
pub const DEFAULT_NEIGHBOR_CUTOFF: f64 = 3.0;

// ============================================================================
// GRAPH REPRESENTATION
// ============================================================================

/// Bond graph of a finite molecule. Node `i` is atom `i`, weighted by its
/// atomic number (0 for unknown elements).
pub struct GraphRepresentation {
    pub graph: UnGraph<u8, ()>,
}

impl GraphRepresentation {
    /// Adds an edge for every atom pair passing the covalent bonding predicate.
    pub fn from_molecule(molecule: &Molecule, tolerance: f64) -> Self {
        let n = molecule.len();
        let mut graph = UnGraph::<u8, ()>::with_capacity(n, n * 2);

        let nodes: Vec<NodeIndex> = molecule
            .atoms
            .iter()
            .map(|a| graph.add_node(atomic_number(&a.element).unwrap_or(0)))
            .collect();

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&molecule.atoms[i], &molecule.atoms[j]);
                let distance = (a.position - b.position).norm();
                if is_bonded(&a.element, &b.element, distance, tolerance) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }
        Self { graph }
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Atom indices of every connected component, each sorted.
    pub fn find_connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.graph.node_count()];
        let mut all_components = Vec::new();

        for i in 0..self.graph.node_count() {
            if visited[i] {
                continue;
            }
            let mut component = Vec::new();
            let mut bfs = Bfs::new(&self.graph, NodeIndex::new(i));
            while let Some(nx) = bfs.next(&self.graph) {
                if !visited[nx.index()] {
                    visited[nx.index()] = true;
                    component.push(nx.index());
                }
            }
            component.sort_unstable();
            all_components.push(component);
        }
        all_components
    }
}

// ============================================================================
// MOLECULE FINDER
// ============================================================================

/// Outcome of one breadth-first search.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub molecule: Molecule,
    /// Number of BFS layers processed, never more than the atom count.
    pub layers: usize,
}

impl Extraction {
    /// The unwrapped fragment in fractional coordinates of `lattice`.
    ///
    /// Components may fall outside `[0, 1)`: atoms keep the image they were
    /// reached through.
    pub fn fractional_coords(&self, lattice: &Lattice) -> Vec<Vector3<f64>> {
        self.molecule.atoms.iter().map(|a| lattice.to_fractional(&a.position)).collect()
    }
}

/// Recovers finite molecules from a periodic crystal by walking covalent bonds
/// across periodic images.
#[derive(Debug, Clone)]
pub struct MoleculeFinder {
    tolerance: f64,
    neighbor_cutoff: f64,
}

impl MoleculeFinder {
    /// `tolerance` scales the covalent-radius sums (`0.2` allows bonds 20% longer).
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            neighbor_cutoff: DEFAULT_NEIGHBOR_CUTOFF,
        }
    }

    pub fn with_neighbor_cutoff(mut self, cutoff: f64) -> Self {
        self.neighbor_cutoff = cutoff;
        self
    }

    /// The molecule connected to atom 0, in Cartesian coordinates of the bonded
    /// images (i.e. unwrapped across cell boundaries).
    pub fn search_molecule(
        &self,
        crystal: &Crystal,
        keep_order: bool,
    ) -> Result<Molecule, StructureError> {
        Ok(self.search_from(crystal, 0, keep_order)?.molecule)
    }

    /// Breadth-first search from `seed`. Atoms come out in visitation order, or
    /// sorted by their index in the crystal when `keep_order` is set.
    #[instrument(level = "debug", skip(self, crystal), fields(atoms = crystal.len()))]
    pub fn search_from(
        &self,
        crystal: &Crystal,
        seed: usize,
        keep_order: bool,
    ) -> Result<Extraction, StructureError> {
        let mut visited = vec![false; crystal.len()];
        self.traverse(crystal, seed, keep_order, &mut visited)
    }

    /// Every molecule in the cell: re-seeds from the lowest unvisited atom until
    /// all atoms are assigned.
    pub fn find_molecules(&self, crystal: &Crystal) -> Result<Vec<Molecule>, StructureError> {
        let mut visited = vec![false; crystal.len()];
        let mut molecules = Vec::new();

        while let Some(seed) = visited.iter().position(|v| !v) {
            let extraction = self.traverse(crystal, seed, true, &mut visited)?;
            molecules.push(extraction.molecule);
        }
        Ok(molecules)
    }

    fn traverse(
        &self,
        crystal: &Crystal,
        seed: usize,
        keep_order: bool,
        visited: &mut [bool],
    ) -> Result<Extraction, StructureError> {
        let seed_position = crystal.cartesian(seed)?;
        visited[seed] = true;

        let mut members = vec![MolAtom {
            element: crystal.atoms[seed].element.clone(),
            position: seed_position,
            source_index: Some(seed),
        }];
        let mut frontier = members.clone();

        // Hard cap: a connected fragment cannot need more layers than atoms.
        let max_layers = crystal.len();
        let mut layers = 0;

        while layers < max_layers {
            let mut next = Vec::new();
            for member in &frontier {
                for neighbor in crystal.neighbors_at(&member.position, self.neighbor_cutoff) {
                    if visited[neighbor.index] {
                        continue;
                    }
                    let element = &crystal.atoms[neighbor.index].element;
                    if is_bonded(&member.element, element, neighbor.distance, self.tolerance) {
                        visited[neighbor.index] = true;
                        next.push(MolAtom {
                            element: element.clone(),
                            position: neighbor.position,
                            source_index: Some(neighbor.index),
                        });
                    }
                }
            }
            layers += 1;

            if next.is_empty() {
                break;
            }
            members.extend(next.iter().cloned());
            frontier = next;
        }

        if keep_order {
            members.sort_by_key(|a| a.source_index);
        }
        debug!(seed, size = members.len(), layers, "molecule extracted");

        Ok(Extraction {
            molecule: Molecule::new(members),
            layers,
        })
    }
}
