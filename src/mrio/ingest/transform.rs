//! Supply-use to input-output conversion and the derived core accounts.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::mrio::ingest::config::TransformConfig;
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::model::{CanonicalSystem, Matrix, Table, div0};

/// Technology assumption used to allocate supply to products or industries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnologyAssumption {
    /// Industry technology, yields a product-by-product table.
    Industry,
    /// Product technology, yields an industry-by-industry table.
    Product,
}

impl TechnologyAssumption {
    pub fn system(&self) -> &'static str {
        match self {
            TechnologyAssumption::Industry => "pxp",
            TechnologyAssumption::Product => "ixi",
        }
    }

    pub fn from_system(system: &str) -> Result<Self> {
        match system {
            "pxp" => Ok(TechnologyAssumption::Industry),
            "ixi" => Ok(TechnologyAssumption::Product),
            other => Err(IngestError::InvalidParameter(format!(
                "unknown IO system '{other}', expected pxp or ixi"
            ))),
        }
    }
}

/// Builds the inter-industry flow table `Z` from a supply table `S` and a
/// use table `U`.
///
/// Industry technology computes `transpose(U · (S / (diag(rowsum S) · 1)))`,
/// product technology `(S / (1 · diag(colsum S))) · U`. Zero row or column
/// sums of `S` yield zero shares.
pub fn iot_from_sut(
    supply: &Table,
    use_table: &Table,
    technology: TechnologyAssumption,
) -> Result<Table> {
    let s = supply.values();
    let u = use_table.values();
    match technology {
        TechnologyAssumption::Industry => {
            let row_sums = s.row_sums();
            let denominators = Matrix::diagonal(&row_sums).matmul(&Matrix::from_rows(
                vec![vec![1.0; s.cols()]; s.rows()],
            )?)?;
            let shares = s.div0(&denominators)?;
            let flows = u.matmul(&shares)?.transpose();
            Table::new(supply.columns().clone(), use_table.index().clone(), flows)
        }
        TechnologyAssumption::Product => {
            let col_sums = s.col_sums();
            let denominators = Matrix::from_rows(vec![vec![1.0; s.cols()]; s.rows()])?
                .matmul(&Matrix::diagonal(&col_sums))?;
            let shares = s.div0(&denominators)?;
            let flows = shares.matmul(u)?;
            Table::new(supply.index().clone(), use_table.columns().clone(), flows)
        }
    }
}

/// `x = rowsum(Y) + rowsum(Z)`.
pub fn total_output(z: &Table, y: &Table) -> Result<Vec<f64>> {
    if z.index() != y.index() {
        return Err(IngestError::structure(
            "Y",
            "rows differ from Z, cannot compute total output",
        ));
    }
    Ok(z.values()
        .row_sums()
        .into_iter()
        .zip(y.values().row_sums())
        .map(|(intermediate, final_demand)| intermediate + final_demand)
        .collect())
}

/// `A = Z · diag(1/x)` with zero output giving zero coefficients.
pub fn technical_coefficients(z: &Table, x: &[f64]) -> Result<Table> {
    let inverse: Vec<f64> = x.iter().map(|value| div0(1.0, *value)).collect();
    z.with_values(z.values().scale_columns(&inverse)?)
}

/// Coefficient form of an extension, `S = F · diag(1/x)`.
pub fn stressor_coefficients(f: &Table, x: &[f64]) -> Result<Table> {
    technical_coefficients(f, x)
}

/// Flow form of an extension, `F = S · diag(x)`.
pub fn stressor_flows(s: &Table, x: &[f64]) -> Result<Table> {
    s.with_values(s.values().scale_columns(x)?)
}

/// `L = (I - A)^-1`, rejecting singular or ill-conditioned systems.
#[instrument(level = "debug", skip_all, fields(size = a.shape().0))]
pub fn leontief_inverse(a: &Table, config: &TransformConfig) -> Result<Table> {
    let values = a.values();
    if !values.is_square() {
        return Err(IngestError::structure("A", "technical coefficients are not square"));
    }
    let leontief = Matrix::identity(values.rows()).sub(values)?;
    let Some(inverse) = leontief.inverse()? else {
        return Err(IngestError::SingularMatrix {
            condition: f64::INFINITY,
            threshold: config.condition_threshold,
        });
    };
    let condition = leontief.norm1() * inverse.norm1();
    debug!(condition, "condition number of I - A");
    if !condition.is_finite() || condition > config.condition_threshold {
        return Err(IngestError::SingularMatrix {
            condition,
            threshold: config.condition_threshold,
        });
    }
    a.with_values(inverse)
}

/// Fills `x`, `A` and `L` of a system that carries `Z` and `Y`. Values that
/// are already present are kept.
pub fn complete_core(system: &mut CanonicalSystem, config: &TransformConfig) -> Result<()> {
    let (Some(z), Some(y)) = (&system.z, &system.y) else {
        return Ok(());
    };
    if system.x.is_none() {
        system.x = Some(total_output(z, y)?);
    }
    if system.a.is_none() {
        if let Some(x) = &system.x {
            system.a = Some(technical_coefficients(z, x)?);
        }
    }
    if system.l.is_none() {
        if let Some(a) = &system.a {
            system.l = Some(leontief_inverse(a, config)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrio::ingest::model::{MultiIndex, schema};

    fn labelled(values: Vec<Vec<f64>>) -> Table {
        let sectors: Vec<String> = (0..values.len()).map(|i| format!("s{i}")).collect();
        let index =
            MultiIndex::from_product(schema::REGION_SECTOR, &[vec!["R".into()], sectors]).unwrap();
        Table::new(index.clone(), index, Matrix::from_rows(values).unwrap()).unwrap()
    }

    #[test]
    fn zero_supply_rows_do_not_poison_flows() {
        let supply = labelled(vec![vec![0.0, 0.0], vec![2.0, 2.0]]);
        let use_table = labelled(vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
        for technology in [TechnologyAssumption::Industry, TechnologyAssumption::Product] {
            let z = iot_from_sut(&supply, &use_table, technology).unwrap();
            assert!(z.values().data().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn leontief_of_nilpotent_coefficients() {
        let a = labelled(vec![vec![0.0, 0.5], vec![0.0, 0.0]]);
        let l = leontief_inverse(&a, &TransformConfig::default()).unwrap();
        assert_eq!(l.values().data(), &[1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn coefficients_summing_to_one_are_singular() {
        let a = labelled(vec![vec![0.5, 0.5], vec![0.5, 0.5]]);
        let err = leontief_inverse(&a, &TransformConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::SingularMatrix { .. }));
    }

    #[test]
    fn zero_output_sector_gets_zero_coefficients() {
        let z = labelled(vec![vec![0.0, 1.0], vec![0.0, 0.0]]);
        let a = technical_coefficients(&z, &[0.0, 4.0]).unwrap();
        assert_eq!(a.values().data(), &[0.0, 0.25, 0.0, 0.0]);
    }
}
