use molecular_crystal_sites::{
    extract_site, extract_structure, parser, to_cif, write_cif, Atom, CellEnergy, Crystal,
    ExtractionConfig, Lattice, Molecule, SiteError, SiteExtractor, SymOp, WriteMode,
};
use nalgebra::Vector3;
use std::fs;

// ============================================================================
// FIXTURES
// ============================================================================

fn water() -> Molecule {
    Molecule::from_species_and_coords(
        &["O", "H", "H"],
        &[Vector3::zeros(), Vector3::new(0.96, 0.0, 0.0), Vector3::new(-0.24, 0.93, 0.0)],
    )
}

fn carbon_dioxide() -> Molecule {
    Molecule::from_species_and_coords(
        &["C", "O", "O"],
        &[Vector3::zeros(), Vector3::new(1.16, 0.0, 0.0), Vector3::new(-1.16, 0.0, 0.0)],
    )
}

/// One water molecule in a 10 Å P1 box.
fn p1_water() -> Crystal {
    let lattice = Lattice::from_parameters(10.0, 10.0, 10.0, 90.0, 90.0, 90.0).unwrap();
    Crystal::new(
        lattice,
        vec![
            Atom::new("O", Vector3::new(0.5, 0.5, 0.5)),
            Atom::new("H", Vector3::new(0.596, 0.5, 0.5)),
            Atom::new("H", Vector3::new(0.476, 0.593, 0.5)),
        ],
    )
}

/// CO2 on the inversion center of P-1: one molecule per cell.
fn p_1_carbon_dioxide() -> Crystal {
    let lattice = Lattice::from_parameters(8.0, 8.0, 8.0, 90.0, 90.0, 90.0).unwrap();
    let ops = vec![SymOp::identity(), SymOp::from_xyz_string("-x, -y, -z").unwrap()];
    let asym = [
        Atom::new("C", Vector3::zeros()),
        Atom::new("O", Vector3::new(0.145, 0.0, 0.0)),
    ];
    Crystal::from_asymmetric_unit(lattice, &asym, ops)
}

/// Two CO2 molecules in general positions of P-1.
fn p_1_carbon_dioxide_pair() -> Crystal {
    let lattice = Lattice::from_parameters(8.0, 8.0, 8.0, 90.0, 90.0, 90.0).unwrap();
    let ops = vec![SymOp::identity(), SymOp::from_xyz_string("-x, -y, -z").unwrap()];
    let asym = [
        Atom::new("C", Vector3::new(0.25, 0.25, 0.25)),
        Atom::new("O", Vector3::new(0.395, 0.25, 0.25)),
        Atom::new("O", Vector3::new(0.105, 0.25, 0.25)),
    ];
    Crystal::from_asymmetric_unit(lattice, &asym, ops)
}

/// Two waters related by a 2_1 screw along c (unique axis c setting).
fn p21_unique_c_water() -> Crystal {
    let lattice = Lattice::from_parameters(7.0, 8.0, 9.0, 90.0, 90.0, 90.0).unwrap();
    let ops = vec![SymOp::identity(), SymOp::from_xyz_string("-x, -y, z+1/2").unwrap()];
    let origin = Vector3::new(1.4, 2.4, 0.9);
    let asym: Vec<Atom> = water()
        .atoms
        .iter()
        .map(|a| Atom::new(a.element.clone(), lattice.to_fractional(&(a.position + origin))))
        .collect();
    Crystal::from_asymmetric_unit(lattice, &asym, ops)
}

// ============================================================================
// PIPELINE
// ============================================================================

#[test]
fn test_p1_water_site_and_report() {
    let (symmetrized, report) =
        extract_structure(p1_water(), water(), &ExtractionConfig::default()).unwrap();

    assert!(report.contains("P1 (1)"));
    assert!(report.contains("1a"));
    assert_eq!(symmetrized.num_mols, vec![1]);

    let site = extract_site(p1_water(), water(), &ExtractionConfig::default()).unwrap();
    assert_eq!(site.wyckoff().label(), "1a");
    assert!((site.position() - Vector3::new(0.524, 0.531, 0.5)).norm() < 1e-9);
    assert!(site.position().iter().all(|x| (0.0..1.0).contains(x)));
}

#[test]
fn test_special_position_merge_in_p_1() {
    let site =
        extract_site(p_1_carbon_dioxide(), carbon_dioxide(), &ExtractionConfig::default()).unwrap();

    assert_eq!(site.wyckoff().number, 2);
    assert_eq!(site.wyckoff().label(), "1a");
    assert!(site.position().norm() < 1e-12);

    // 1 molecule per cell: the merged orbit divides it and is no larger than 2i.
    assert!(site.multiplicity() <= 2);
    assert_eq!(1 % site.multiplicity(), 0);
}

#[test]
fn test_reference_orientation_is_proper() {
    let config = ExtractionConfig {
        use_reference: true,
        ..ExtractionConfig::default()
    };
    let site = extract_site(p_1_carbon_dioxide(), carbon_dioxide(), &config).unwrap();
    assert!((site.orientation().determinant() - 1.0).abs() < 1e-6);
}

#[test]
fn test_mismatched_reference_is_an_error() {
    let err = extract_site(p1_water(), carbon_dioxide(), &ExtractionConfig::default());
    assert!(matches!(err, Err(SiteError::ConnectivityMismatch { reference: 3, candidate: 3 })));
}

#[test]
fn test_unique_axis_c_is_swapped_into_the_standard_setting() {
    let extractor =
        SiteExtractor::new(p21_unique_c_water(), water(), &ExtractionConfig::default()).unwrap();
    assert_eq!(extractor.group().number, 4);
    assert!(!extractor.permutation().is_identity());

    let (symmetrized, _) =
        extract_structure(p21_unique_c_water(), water(), &ExtractionConfig::default()).unwrap();
    let text = write_cif(&symmetrized, "p21", None).unwrap();
    assert!(text.contains("_symmetry_space_group_name_H-M 'P2_1'\n"));
    assert!(text.contains("2 '-x, y+1/2, -z'\n"));
    // The old c axis is the new unique b axis.
    assert!(text.contains(&format!("_cell_length_b        {:12.6}\n", 9.0)));
}

// ============================================================================
// CIF OUTPUT
// ============================================================================

#[test]
fn test_cif_block_layout() {
    let crystal = p_1_carbon_dioxide().with_energy(-10.0);
    let (symmetrized, _) =
        extract_structure(crystal, carbon_dioxide(), &ExtractionConfig::default()).unwrap();
    let text = write_cif(&symmetrized, "co2", None).unwrap();

    let data = text.find("data_co2\n").unwrap();
    let energy = text.find("#Energy: -10.0 eV/cell\n").unwrap();
    let symbol = text.find("_symmetry_space_group_name_H-M 'P-1'").unwrap();
    let ops = text.find("1 'x, y, z'\n2 '-x, -y, -z'\n").unwrap();
    let atoms = text.find("_atom_site_occupancy\n").unwrap();
    assert!(data < energy && energy < symbol && symbol < ops && ops < atoms);
    assert!(text.contains(&format!("_symmetry_cell_setting           {:>15}\n", "triclinic")));
    assert_eq!(text[atoms..].lines().filter(|l| l.ends_with(" 1")).count(), 3);
    assert!(text.ends_with("#END\n\n"));
}

fn energy_line(text: &str) -> &str {
    text.lines().find(|l| l.starts_with("#Energy:")).unwrap()
}

#[test]
fn test_energy_survives_a_write_parse_write_cycle() {
    let config = ExtractionConfig::default();
    let crystal = p_1_carbon_dioxide_pair().with_energy(-8.0);
    let (first, _) = extract_structure(crystal, carbon_dioxide(), &config).unwrap();
    assert_eq!(first.num_mols, vec![2]);
    let first_text = write_cif(&first, "pair", None).unwrap();
    assert_eq!(energy_line(&first_text), "#Energy: -4.0 eV/cell");

    let parsed = parser::from_cif_str(&first_text).unwrap();
    assert_eq!(parsed.energy, Some(CellEnergy::PerMolecule(-4.0)));

    let (second, _) = extract_structure(parsed, carbon_dioxide(), &config).unwrap();
    assert_eq!(second.energy, Some(-8.0));
    let second_text = write_cif(&second, "pair", None).unwrap();
    assert_eq!(energy_line(&second_text), energy_line(&first_text));
}

#[test]
fn test_written_cif_parses_back_to_the_same_cell() {
    let config = ExtractionConfig::default();
    let (symmetrized, _) =
        extract_structure(p_1_carbon_dioxide(), carbon_dioxide(), &config).unwrap();
    let text = write_cif(&symmetrized, "co2", None).unwrap();

    let crystal = parser::from_cif_str(&text).unwrap();
    assert_eq!(crystal.symmetry_ops.len(), 2);
    assert_eq!(crystal.len(), p_1_carbon_dioxide().len());
}

#[test]
fn test_file_sink_create_and_append() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.cif");
    let (symmetrized, _) =
        extract_structure(p1_water(), water(), &ExtractionConfig::default()).unwrap();

    to_cif(&symmetrized, &path, "first", WriteMode::Create, None).unwrap();
    to_cif(&symmetrized, &path, "second", WriteMode::Create, None).unwrap();
    let created = fs::read_to_string(&path).unwrap();
    assert_eq!(created.matches("data_").count(), 1);
    assert!(created.contains("data_second"));

    to_cif(&symmetrized, &path, "third", WriteMode::Append, None).unwrap();
    let appended = fs::read_to_string(&path).unwrap();
    assert_eq!(appended.matches("data_").count(), 2);
    assert!(appended.find("data_second").unwrap() < appended.find("data_third").unwrap());
}

#[test]
fn test_pipeline_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let cif_path = dir.path().join("co2.cif");
    let xyz_path = dir.path().join("co2.xyz");

    let config = ExtractionConfig::default();
    let (symmetrized, _) =
        extract_structure(p_1_carbon_dioxide(), carbon_dioxide(), &config).unwrap();
    to_cif(&symmetrized, &cif_path, "co2", WriteMode::Create, None).unwrap();
    fs::write(&xyz_path, carbon_dioxide().to_string()).unwrap();

    let reference = parser::from_xyz(&xyz_path).unwrap();
    assert_eq!(reference.len(), 3);

    let site = extract_site(cif_path.as_path(), xyz_path.as_path(), &config).unwrap();
    assert_eq!(site.wyckoff().label(), "1a");
}

#[test]
fn test_missing_input_file_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.cif");
    let err = extract_site(missing.as_path(), water(), &ExtractionConfig::default());
    assert!(matches!(err, Err(SiteError::Input(_))));
}

#[test]
fn test_raw_p1_export_of_the_screw_pair() {
    let (symmetrized, _) =
        extract_structure(p21_unique_c_water(), water(), &ExtractionConfig::default()).unwrap();
    let text = write_cif(&symmetrized, "raw", Some(2)).unwrap();

    assert!(text.contains("'P1'"));
    let crystal = parser::from_cif_str(&text).unwrap();
    assert_eq!(crystal.len(), 6);
    assert_eq!(crystal.symmetry_ops, vec![SymOp::identity()]);
}
