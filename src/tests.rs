use crate::{
    diagram::{Diagram, DiagramError, DiagramRecord},
    expression::ExpressionGenerator,
    fermion_line::{assemble, FermionVertexSelection},
    model::Model,
    process::{process_record, DiagramSet, ProcessError},
    GenerationSettings,
};

fn ght() -> Model {
    Model::builtin("ght").unwrap()
}

fn record(yaml: &str) -> DiagramRecord {
    serde_yaml::from_str(yaml).unwrap()
}

fn generate(model: &Model, yaml: &str) -> String {
    process_record(model, &GenerationSettings::default(), &record(yaml))
        .unwrap()
        .expression
}

#[test]
fn yukawa_t_channel_absorbs_the_top_propagator() {
    let expression = generate(
        &ght(),
        r#"
id: tt_hh
external_legs:
  - { particle_name: tbar, leg_index: -1, momentum: p1 }
  - { particle_name: t, leg_index: -2, momentum: p2 }
  - { particle_name: H, leg_index: -3, momentum: p3 }
  - { particle_name: H, leg_index: -4, momentum: p4 }
vertices:
  - { particle_names: [tbar, t, H], leg_indices: [-1, 2, -3], momenta: [p1, -q1, -p3] }
  - { particle_names: [tbar, t, H], leg_indices: [3, -2, -4], momenta: [q1, p2, -p4] }
propagators:
  - { from_index: 3, to_index: 2, momentum: q1, from_particle: tbar, to_particle: t }
"#,
    );
    insta::assert_snapshot!(expression, @"((OpenLine(1,ext1,ext2))*(((-i_)*Y)*(d_(colext1,col2))*(d_(sext1,s2)))*(((i_)*(g(q1,x3,x2) + mt*g(x3,x2))*(Den(q1,mt)))*(d_(i3,i2)))*(((-i_)*Y)*(d_(col3,colext2))*(d_(s3,sext2))))");
}

#[test]
fn s_channel_gluon_between_two_open_lines() {
    let expression = generate(
        &ght(),
        r#"
id: tt_tt_s
vertices:
  - { particle_names: [tbar, t, g], leg_indices: [-1, -2, 1], momenta: [p1, p2, q1] }
  - { particle_names: [g, tbar, t], leg_indices: [2, -3, -4], momenta: [q1, p3, p4] }
propagators:
  - { from_index: 1, to_index: 2, momentum: q1 }
"#,
    );
    // Record order differs from the interaction's, the fermion legs still come
    // first in the rule.
    insta::assert_snapshot!(expression, @"((OpenLine(1,ext1,ext2))*((i_*g)*(g_(1,mu1))*(T(b1,colext1,colext2))))*((OpenLine(2,ext3,ext4))*((i_*g)*(g_(2,mu2))*(T(b2,colext3,colext4))))*((-i_)*(Den(q1,0))*(d_(mu1,mu2))*(d_(b1,b2)))");
}

#[test]
fn gluon_fusion_triangle_is_one_open_line() {
    let model = ght();
    let diagram = Diagram::from_record(
        &model,
        &record(
            r#"
id: gg_h
vertices:
  - { particle_names: [tbar, t, g], leg_indices: [7, 2, -1], momenta: [k, -k-p1, p1] }
  - { particle_names: [tbar, t, g], leg_indices: [3, 4, -2], momenta: [k+p1, -k-p1-p2, p2] }
  - { particle_names: [tbar, t, H], leg_indices: [5, 6, -3], momenta: [k+p1+p2, -k, -p1-p2] }
propagators:
  - { from_index: 3, to_index: 2, momentum: k+p1 }
  - { from_index: 5, to_index: 4, momentum: k+p1+p2 }
  - { from_index: 7, to_index: 6, momentum: k }
"#,
        ),
    )
    .unwrap();

    let assembly = assemble(&diagram, &FermionVertexSelection::BySpin).unwrap();
    assert_eq!(assembly.lines.len(), 1);
    // Every member couples to an external boson.
    assert!(assembly.lines[0].open);
    assert!(assembly.lines[0].external_ids(&diagram).is_empty());
    assert_eq!(assembly.lines[0].vertices, vec![0, 1, 2]);
    assert!(assembly.others.is_empty());

    let settings = GenerationSettings::default();
    let expression = ExpressionGenerator::new(&settings)
        .generate(&diagram)
        .unwrap();
    assert!(expression.starts_with("((OpenLine(1))*("));
    assert_eq!(expression.matches("Den(").count(), 3);
    assert!(expression.contains("g_(1,muext1)"));
    assert!(expression.contains("g_(1,muext2)"));
    assert!(!expression.contains("Tr("));
}

#[test]
fn mismatched_propagator_types_abort_the_diagram() {
    let err = process_record(
        &ght(),
        &GenerationSettings::default(),
        &record(
            r#"
id: bad
vertices:
  - { particle_names: [tbar, t, H], leg_indices: [-1, 2, -3], momenta: [p1, -q1, -p3] }
  - { particle_names: [tbar, t, H], leg_indices: [3, -2, -4], momenta: [q1, p2, -p4] }
propagators:
  - { from_index: 3, to_index: 2, momentum: q1, from_particle: t, to_particle: tbar }
"#,
        ),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Diagram(DiagramError::PropagatorFieldMismatch { propagator: 0, .. })
    ));
    assert!(err.to_string().starts_with("Diagram bad, propagator 0"));
}

#[test]
fn settings_from_yaml() {
    let settings = GenerationSettings::from_yaml_str("{}").unwrap();
    assert_eq!(settings, GenerationSettings::default());
    assert_eq!(settings.trace_symbol, "Tr");
    assert!(settings.include_prefactor);
    assert_eq!(settings.n_cores, 1);

    let settings = GenerationSettings::from_yaml_str(
        "trace_symbol: TR\ninclude_prefactor: false\nfermion_vertices: by_spin\nn_cores: 4\n",
    )
    .unwrap();
    assert_eq!(settings.trace_symbol, "TR");
    assert!(!settings.include_prefactor);
    assert_eq!(settings.fermion_vertices, FermionVertexSelection::BySpin);
    assert_eq!(settings.n_cores, 4);
}

#[test]
fn shipped_files_load() {
    let root = env!("CARGO_MANIFEST_DIR");
    let model = Model::from_file(format!("{}/models/ght.yaml", root)).unwrap();
    assert_eq!(model.name, "ght");
    assert_eq!(model.interactions().len(), 5);
    assert!(Model::from_file(format!("{}/models/missing.yaml", root)).is_err());
    assert!(DiagramSet::from_file(format!("{}/models/missing.yaml", root)).is_err());
}
