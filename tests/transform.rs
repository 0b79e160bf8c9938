mod common;

use mrio_ingest::config::TransformConfig;
use mrio_ingest::model::{CanonicalSystem, IndexLevel, Matrix, MultiIndex, Table, schema};
use mrio_ingest::provenance::ProvenanceLog;
use mrio_ingest::transform::{
    TechnologyAssumption, complete_core, iot_from_sut, leontief_inverse, stressor_coefficients,
    stressor_flows,
};
use mrio_ingest::IngestError;

fn sectors(count: usize) -> MultiIndex {
    let labels: Vec<String> = (0..count).map(|i| format!("s{i}")).collect();
    MultiIndex::from_product(schema::REGION_SECTOR, &[vec!["R".to_string()], labels])
        .expect("index built")
}

fn square(values: Vec<Vec<f64>>) -> Table {
    let index = sectors(values.len());
    Table::new(index.clone(), index, Matrix::from_rows(values).expect("matrix"))
        .expect("table built")
}

fn core(z: Vec<Vec<f64>>, y: Vec<f64>) -> CanonicalSystem {
    let z = square(z);
    let categories = MultiIndex::from_product(
        schema::REGION_CATEGORY,
        &[vec!["R".to_string()], vec!["households".to_string()]],
    )
    .expect("categories");
    let y = Table::new(
        z.index().clone(),
        categories,
        Matrix::new(y.len(), 1, y).expect("matrix"),
    )
    .expect("Y built");
    let mut system = CanonicalSystem::new(ProvenanceLog::new("test"));
    system.z = Some(z);
    system.y = Some(y);
    system
}

#[test]
fn technology_assumptions_are_transposes_of_each_other() {
    let supply = square(vec![
        vec![8.0, 1.0, 0.0],
        vec![0.0, 5.0, 2.0],
        vec![1.0, 0.0, 9.0],
    ]);
    let use_table = square(vec![
        vec![2.0, 1.0, 3.0],
        vec![0.5, 4.0, 1.0],
        vec![1.0, 1.0, 0.0],
    ]);
    let industry = iot_from_sut(&supply, &use_table, TechnologyAssumption::Industry)
        .expect("industry technology");
    let product = iot_from_sut(
        &supply.transpose(),
        &use_table.transpose(),
        TechnologyAssumption::Product,
    )
    .expect("product technology");
    assert!(common::approx_eq(
        industry.values().data(),
        product.values().transpose().data()
    ));
    assert!(common::approx_eq(&[industry.sum()], &[use_table.sum()]));
}

#[test]
fn completed_core_inverts_the_leontief_matrix() {
    let mut system = core(
        vec![
            vec![10.0, 20.0, 5.0],
            vec![4.0, 0.0, 12.0],
            vec![7.0, 3.0, 1.0],
        ],
        vec![65.0, 24.0, 39.0],
    );
    complete_core(&mut system, &TransformConfig::default()).expect("core completed");

    assert_eq!(system.x.as_deref(), Some(&[100.0, 40.0, 50.0][..]));
    let a = system.a.as_ref().expect("A").values();
    assert!(common::approx_eq(&[a.get(0, 1)], &[0.5]));
    let l = system.l.as_ref().expect("L").values();
    let identity = Matrix::identity(3);
    let product = l.matmul(&identity.sub(a).expect("I - A")).expect("L(I - A)");
    assert!(common::approx_eq(product.data(), identity.data()));
    system.validate().expect("joint indexing holds");
}

#[test]
fn existing_accounts_are_kept() {
    let mut system = core(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![1.0, 1.0]);
    system.x = Some(vec![4.0, 4.0]);
    complete_core(&mut system, &TransformConfig::default()).expect("core completed");
    assert_eq!(system.x.as_deref(), Some(&[4.0, 4.0][..]));
    assert_eq!(
        system.a.as_ref().expect("A").values().data(),
        &[0.25, 0.0, 0.0, 0.25]
    );
}

#[test]
fn closed_economy_without_final_demand_is_singular() {
    let mut system = core(vec![vec![1.0, 1.0], vec![1.0, 1.0]], vec![0.0, 0.0]);
    let err = complete_core(&mut system, &TransformConfig::default()).unwrap_err();
    assert!(matches!(err, IngestError::SingularMatrix { .. }));

    let strict = TransformConfig {
        condition_threshold: 1.5,
    };
    let a = square(vec![vec![0.2, 0.3], vec![0.1, 0.4]]);
    assert!(matches!(
        leontief_inverse(&a, &strict),
        Err(IngestError::SingularMatrix { .. })
    ));
    assert!(leontief_inverse(&a, &TransformConfig::default()).is_ok());
}

#[test]
fn stressor_forms_convert_both_ways() {
    let index = sectors(2);
    let stressors = MultiIndex::single(IndexLevel::Stressor, ["CO2"]).expect("stressors");
    let f = Table::new(
        stressors,
        index,
        Matrix::from_rows(vec![vec![6.0, 0.0]]).expect("matrix"),
    )
    .expect("F built");
    let x = [3.0, 0.0];
    let s = stressor_coefficients(&f, &x).expect("S");
    assert_eq!(s.values().data(), &[2.0, 0.0]);
    assert_eq!(stressor_flows(&s, &x).expect("F").values().data(), f.values().data());
    assert_eq!(
        TechnologyAssumption::from_system(TechnologyAssumption::Product.system())
            .expect("known system"),
        TechnologyAssumption::Product
    );
    assert!(TechnologyAssumption::from_system("pxi").is_err());
}
