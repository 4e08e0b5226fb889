use crate::error::SiteError;
use crate::site::symmetrized::{SiteCollection, SymmetrizedCrystal};
use crate::symmetry::{LatticeFamily, SymOp};
use anyhow::{Context, Result};
use nalgebra::Vector3;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// How [`to_cif`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Truncate and write.
    #[default]
    Create,
    /// Add a new data block after the existing content.
    Append,
}

fn banner() -> String {
    let title = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let rule = "#".repeat(61);
    format!("{rule}\n#{title:^59}#\n{rule}\n")
}

/// Renders `structure` as a CIF data block named `header`.
///
/// With `sym_num = None` the block carries the space group and the asymmetric
/// unit. With `Some(n)` it is a P1 export of the first `n` symmetry copies of
/// every molecular site.
///
/// In monoclinic groups whose first site uses generators other than the
/// tabulated general position (the `n`-glide cell choice), the symbol's `c` is
/// written as `n` and the site's own generators are listed.
pub fn write_cif(
    structure: &SymmetrizedCrystal,
    header: &str,
    sym_num: Option<usize>,
) -> Result<String, SiteError> {
    let group = &structure.group;
    let (mut symbol, number, family, mut ops) = match sym_num {
        None => (
            group.symbol.clone(),
            group.number,
            group.lattice_family,
            group.general_position().generators.clone(),
        ),
        Some(_) => ("P1".to_string(), 1, LatticeFamily::Triclinic, vec![SymOp::identity()]),
    };

    let first_generators = match &structure.sites {
        SiteCollection::Molecular(sites) => sites.first().map(|s| &s.wyckoff().generators),
        SiteCollection::Atomic(sites) => sites.first().map(|s| &s.wyckoff.generators),
    };
    if family == LatticeFamily::Monoclinic {
        if let Some(generators) = first_generators {
            if *generators != ops {
                symbol = symbol.replace('c', "n");
                ops = generators.clone();
                debug!(%symbol, "writing the alternate monoclinic setting");
            }
        }
    }

    let mut out = banner();
    out.push_str(&format!("data_{}\n", header));
    if let Some(energy) = structure.energy_per_molecule() {
        // Debug formatting keeps the decimal point of whole numbers (`-4.0`).
        out.push_str(&format!("#Energy: {:?} eV/cell\n", energy));
    }

    let (a, b, c, alpha, beta, gamma) = structure.lattice.to_parameters();
    out.push_str(&format!("\n_symmetry_space_group_name_H-M '{}'\n", symbol));
    out.push_str(&format!("_symmetry_Int_Tables_number      {:>15}\n", number));
    out.push_str(&format!("_symmetry_cell_setting           {:>15}\n", family.as_str()));
    out.push_str(&format!("_cell_length_a        {:12.6}\n", a));
    out.push_str(&format!("_cell_length_b        {:12.6}\n", b));
    out.push_str(&format!("_cell_length_c        {:12.6}\n", c));
    out.push_str(&format!("_cell_angle_alpha     {:12.6}\n", alpha));
    out.push_str(&format!("_cell_angle_beta      {:12.6}\n", beta));
    out.push_str(&format!("_cell_angle_gamma     {:12.6}\n", gamma));

    out.push_str("\nloop_\n");
    out.push_str(" _symmetry_equiv_pos_site_id\n");
    out.push_str(" _symmetry_equiv_pos_as_xyz\n");
    for (i, op) in ops.iter().enumerate() {
        out.push_str(&format!("{} '{}'\n", i + 1, op.as_xyz_string()));
    }

    out.push_str("\nloop_\n");
    out.push_str(" _atom_site_label\n");
    out.push_str(" _atom_site_fract_x\n");
    out.push_str(" _atom_site_fract_y\n");
    out.push_str(" _atom_site_fract_z\n");
    out.push_str(" _atom_site_occupancy\n");

    for (specie, coord) in atom_rows(structure, sym_num)? {
        out.push_str(&format!(
            "{:<6}  {:12.6}{:12.6}{:12.6} 1\n",
            specie, coord.x, coord.y, coord.z
        ));
    }
    out.push_str("#END\n\n");
    Ok(out)
}

fn atom_rows(
    structure: &SymmetrizedCrystal,
    sym_num: Option<usize>,
) -> Result<Vec<(String, Vector3<f64>)>, SiteError> {
    let mut rows = Vec::new();
    match &structure.sites {
        SiteCollection::Molecular(sites) => {
            for site in sites {
                match sym_num {
                    None => {
                        let (coords, species) = site.coords_and_species_first();
                        rows.extend(species.into_iter().zip(coords));
                    }
                    Some(n) => {
                        let inv = site.inv_lattice();
                        for id in 0..n {
                            let mol = site.get_mol_object(id)?;
                            let atoms = mol.atoms.into_iter();
                            rows.extend(atoms.map(|a| (a.element, inv * a.position)));
                        }
                    }
                }
            }
        }
        SiteCollection::Atomic(sites) => {
            rows.extend(sites.iter().map(|s| (s.specie.clone(), s.position)));
        }
    }
    Ok(rows)
}

/// Writes the CIF block for `structure` to `path`.
pub fn to_cif(
    structure: &SymmetrizedCrystal,
    path: &Path,
    header: &str,
    mode: WriteMode,
    sym_num: Option<usize>,
) -> Result<()> {
    let text = write_cif(structure, header, sym_num)?;

    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Create => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };
    let mut file = options
        .open(path)
        .with_context(|| format!("Could not open {:?} for writing", path))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Could not write CIF to {:?}", path))?;

    info!(?path, ?mode, "CIF written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::{Lattice, Molecule};
    use crate::site::molecular_site::{AtomSite, MolecularSite, Orientation};
    use crate::symmetry::operation::parse_ops;
    use crate::symmetry::SpaceGroup;

    fn single_hydrogen() -> SymmetrizedCrystal {
        let group = SpaceGroup::new(1).unwrap();
        let wp = group.general_position().clone();
        let site = AtomSite::new("H", Vector3::new(0.1, 0.2, 0.3), wp).unwrap();
        SymmetrizedCrystal {
            group,
            lattice: Lattice::from_parameters(10.0, 10.0, 10.0, 90.0, 90.0, 90.0).unwrap(),
            sites: SiteCollection::Atomic(vec![site]),
            energy: None,
            num_mols: Vec::new(),
        }
    }

    fn n_glide_crystal() -> SymmetrizedCrystal {
        let ops = parse_ops(&[
            "x, y, z",
            "-x+1/2, y+1/2, -z+1/2",
            "-x, -y, -z",
            "x+1/2, -y+1/2, z+1/2",
        ])
        .unwrap();
        let (wp, _) = SpaceGroup::from_symops(&ops).unwrap();
        let lattice = Lattice::from_parameters(6.0, 7.0, 8.0, 90.0, 100.0, 90.0)
            .unwrap()
            .with_family(LatticeFamily::Monoclinic);
        let mol = Molecule::from_species_and_coords(
            &["N", "N"],
            &[Vector3::new(-0.55, 0.0, 0.0), Vector3::new(0.55, 0.0, 0.0)],
        );
        let position = Vector3::new(0.2, 0.3, 0.4);
        let site =
            MolecularSite::assemble(mol, position, Orientation::identity(), wp, lattice).unwrap();
        SymmetrizedCrystal::from_molecular_site(SpaceGroup::new(14).unwrap(), site)
    }

    #[test]
    fn p1_single_atom_block() {
        let text = write_cif(&single_hydrogen(), "h", None).unwrap();

        assert!(text.contains("data_h\n"));
        assert!(text.contains("_symmetry_space_group_name_H-M 'P1'\n"));
        assert!(text.contains(&format!("_symmetry_Int_Tables_number      {:>15}\n", 1)));
        assert!(text.contains("_cell_length_a           10.000000\n"));
        assert_eq!(text.matches("'x, y, z'").count(), 1);
        assert!(text.contains("\n1 'x, y, z'\n"));
        assert!(text.contains("H           0.100000    0.200000    0.300000 1\n"));
        assert!(text.ends_with("#END\n\n"));
        assert!(!text.contains("#Energy"));
    }

    #[test]
    fn empty_header_gives_a_bare_data_tag() {
        let text = write_cif(&single_hydrogen(), "", None).unwrap();
        assert!(text.contains("\ndata_\n"));
        assert_eq!(text.matches("'x, y, z'").count(), 1);
        assert_eq!(text.lines().filter(|l| l.ends_with(" 1") && l.starts_with('H')).count(), 1);
        assert!(text.ends_with("#END\n\n"));
    }

    #[test]
    fn n_glide_setting_renames_the_symbol() {
        let text = write_cif(&n_glide_crystal(), "", None).unwrap();
        assert!(text.contains("_symmetry_space_group_name_H-M 'P2_1/n'\n"));
        assert!(text.contains("2 '-x+1/2, y+1/2, -z+1/2'\n"));
        assert!(text.contains("4 'x+1/2, -y+1/2, z+1/2'\n"));
        assert!(text.contains("monoclinic"));
    }

    #[test]
    fn standard_setting_keeps_the_tabulated_operators() {
        let mut crystal = n_glide_crystal();
        let SiteCollection::Molecular(sites) = &crystal.sites else { unreachable!() };
        let site = &sites[0];
        let standard = MolecularSite::assemble(
            site.molecule().clone(),
            *site.position(),
            Orientation::identity(),
            SpaceGroup::new(14).unwrap().general_position().clone(),
            site.lattice().clone(),
        )
        .unwrap();
        crystal.sites = SiteCollection::Molecular(vec![standard]);

        let text = write_cif(&crystal, "", None).unwrap();
        assert!(text.contains("'P2_1/c'"));
        assert!(text.contains("2 '-x, y+1/2, -z+1/2'\n"));
    }

    #[test]
    fn raw_export_lists_every_requested_copy() {
        let text = write_cif(&n_glide_crystal(), "raw", Some(4)).unwrap();
        assert!(text.contains("'P1'"));
        assert!(text.contains("triclinic"));
        assert_eq!(text.matches(" 1\n").count(), 8 + 1);
        assert!(write_cif(&n_glide_crystal(), "raw", Some(5)).is_err());
    }

    #[test]
    fn energy_is_normalised_per_molecule() {
        let crystal = n_glide_crystal().with_energy(Some(-8.0));
        let text = write_cif(&crystal, "e", None).unwrap();
        assert!(text.contains("#Energy: -2.0 eV/cell\n"));
    }
}
