//! Immutable configuration handed to the sniffer, the transform and each
//! adapter. Defaults carry the constants of the published releases; every
//! field can be overridden from JSON so adapters can be exercised against
//! synthetic layouts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mrio::ingest::error::Result;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Top-level bundle of every configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub sniff: SniffConfig,
    pub transform: TransformConfig,
    pub exiobase: ExiobaseConfig,
    pub exiobase3: Exiobase3Config,
    pub wiod: WiodConfig,
    pub oecd: OecdConfig,
    pub eora: EoraConfig,
    pub themis: ThemisConfig,
    pub cecilia: CeciliaConfig,
}

impl IngestConfig {
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SniffConfig {
    /// Number of leading lines inspected.
    pub sample_lines: usize,
    /// Candidate field separators, in order of preference on ties.
    pub separators: Vec<char>,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            sample_lines: 20,
            separators: vec!['\t', ',', ';'],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Largest accepted 1-norm condition number of `I - A`.
    pub condition_threshold: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            condition_threshold: 1e12,
        }
    }
}

/// Layout of one sheet of the EXIOBASE 2 characterisation workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterisationSheet {
    pub sheet: String,
    /// Extension the factors apply to.
    pub extension: String,
    /// Rows skipped before the first impact row.
    pub header_rows: usize,
    /// Column holding the impact name.
    pub name_col: usize,
    /// Column holding the unit; factor columns follow it.
    pub unit_col: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExiobaseConfig {
    /// Table key → filename regex when files hold coefficients (A, S).
    pub coefficient_patterns: BTreeMap<String, String>,
    /// Table key → filename regex when files hold flows (Z, F).
    pub flow_patterns: BTreeMap<String, String>,
    pub characterisation_pattern: String,
    pub characterisation_sheets: Vec<CharacterisationSheet>,
    /// Year of the EXIOBASE 1 and 2 releases.
    pub base_year: String,
}

impl Default for ExiobaseConfig {
    fn default() -> Self {
        // Files prefixed with `_` are superseded copies and never match.
        let pattern = |stem: &str| format!(r"(^|[^_])({stem}).*txt$");
        let coefficient_patterns = [
            ("A", "mrIot"),
            ("Y", "mrFinalDemand"),
            ("S_factor_inputs", "mrFactorInputs"),
            ("S_emissions", "mrEmissions"),
            ("S_materials", "mrMaterials"),
            ("S_resources", "mrResources"),
            ("F_Y_resources", "mrFDResources"),
            ("F_Y_emissions", "mrFDEmissions"),
            ("F_Y_materials", "mrFDMaterials"),
        ]
        .iter()
        .map(|(key, stem)| (key.to_string(), pattern(stem)))
        .collect();
        let flow_patterns = [
            ("Z", "mrIot"),
            ("Y", "mrFinalDemand"),
            ("F_factor_inputs", "mrFactorInputs"),
            ("F_emissions", "mrEmissions"),
            ("F_materials", "mrMaterials"),
            ("F_resources", "mrResources"),
            ("F_Y_emissions", "mrFDEmissions"),
            ("F_Y_materials", "mrFDMaterials"),
        ]
        .iter()
        .map(|(key, stem)| (key.to_string(), pattern(stem)))
        .collect();

        let sheet = |sheet: &str, extension: &str, header_rows, name_col, unit_col| {
            CharacterisationSheet {
                sheet: sheet.into(),
                extension: extension.into(),
                header_rows,
                name_col,
                unit_col,
            }
        };

        Self {
            coefficient_patterns,
            flow_patterns,
            characterisation_pattern: r"(^|/)characterisation[^/]*\.xlsx$".into(),
            characterisation_sheets: vec![
                sheet("Q_factorinputs", "factor_inputs", 2, 0, 1),
                sheet("Q_emission", "emissions", 3, 1, 3),
                sheet("Q_materials", "materials", 2, 0, 1),
                sheet("Q_resources", "resources", 3, 0, 1),
            ],
            base_year: "2000".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exiobase3Config {
    pub parameter_file: String,
    pub unit_file: String,
    /// Core table name → file name.
    pub core_files: BTreeMap<String, String>,
    /// Extension table name → file name. `F_hh` is the legacy `F_Y` name.
    pub extension_files: BTreeMap<String, String>,
    /// Region codes of the 3.4 ixi release that deviate from the pxp codes.
    pub region_renames: BTreeMap<String, String>,
    pub monetary_unit: String,
}

impl Default for Exiobase3Config {
    fn default() -> Self {
        Self {
            parameter_file: "file_parameters.json".into(),
            unit_file: "unit.txt".into(),
            core_files: string_map(&[("Z", "Z.txt"), ("A", "A.txt"), ("Y", "Y.txt"), ("x", "x.txt")]),
            extension_files: string_map(&[
                ("F", "F.txt"),
                ("F_Y", "F_Y.txt"),
                ("F_hh", "F_hh.txt"),
                ("S", "S.txt"),
            ]),
            region_renames: string_map(&[
                ("AUS", "AU"),
                ("AUT", "AT"),
                ("BEL", "BE"),
                ("BGR", "BG"),
                ("BRA", "BR"),
                ("CAN", "CA"),
                ("CHE", "CH"),
                ("CHN", "CN"),
                ("CYP", "CY"),
                ("CZE", "CZ"),
                ("DEU", "DE"),
                ("DNK", "DK"),
                ("ESP", "ES"),
                ("EST", "EE"),
                ("FIN", "FI"),
                ("FRA", "FR"),
                ("GBR", "GB"),
                ("GRC", "GR"),
                ("HRV", "HR"),
                ("HUN", "HU"),
                ("IDN", "ID"),
                ("IND", "IN"),
                ("IRL", "IE"),
                ("ITA", "IT"),
                ("JPN", "JP"),
                ("KOR", "KR"),
                ("LTU", "LT"),
                ("LUX", "LU"),
                ("LVA", "LV"),
                ("MEX", "MX"),
                ("MLT", "MT"),
                ("NLD", "NL"),
                ("NOR", "NO"),
                ("POL", "PL"),
                ("PRT", "PT"),
                ("ROM", "RO"),
                ("RUS", "RU"),
                ("SVK", "SK"),
                ("SVN", "SI"),
                ("SWE", "SE"),
                ("TUR", "TR"),
                ("TWN", "TW"),
                ("USA", "US"),
                ("ZAF", "ZA"),
                ("WWA", "WA"),
                ("WWE", "WE"),
                ("WWF", "WF"),
                ("WWL", "WL"),
                ("WWM", "WM"),
            ]),
            monetary_unit: "M.EUR".into(),
        }
    }
}

/// One WIOD environmental account distributed as a folder or zip of
/// per-country workbooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WiodEnvExtension {
    pub key: String,
    pub name: String,
    /// Prefix of the folder or zip in the WIOD root.
    pub prefix: String,
    /// Suffix of the per-country workbooks.
    pub file_suffix: String,
    /// Stressor → unit where the workbooks carry none.
    pub units: BTreeMap<String, String>,
    pub default_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiodSeaConfig {
    pub prefix: String,
    pub suffix: String,
    pub folder: String,
    pub sheet: String,
    /// Variable → unit, in output order.
    pub variables: Vec<(String, String)>,
    pub total_code: String,
    pub rest_of_world: String,
    /// Region whose rows serve as template for a missing rest-of-world block.
    pub template_region: String,
}

impl Default for WiodSeaConfig {
    fn default() -> Self {
        let variables = [
            ("EMP", "thousand persons"),
            ("EMPE", "thousand persons"),
            ("H_EMP", "mill hours"),
            ("H_EMPE", "mill hours"),
        ]
        .iter()
        .map(|(var, unit)| (var.to_string(), unit.to_string()))
        .collect();
        Self {
            prefix: "WIOD_SEA".into(),
            suffix: ".xlsx".into(),
            folder: "SEA".into(),
            sheet: "DATA".into(),
            variables,
            total_code: "TOT".into(),
            rest_of_world: "RoW".into(),
            template_region: "USA".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiodConfig {
    pub workbook_prefix: String,
    pub workbook_suffix: String,
    /// Rows of column 0 holding year, system and unit.
    pub meta_year_row: usize,
    pub meta_system_row: usize,
    pub meta_unit_row: usize,
    /// Leading rows dropped before the header block starts.
    pub empty_top_rows: usize,
    /// The last column holds totals and is removed.
    pub drop_total_column: bool,
    /// Position of each header row/column after the top rows are gone.
    pub code_pos: usize,
    pub name_pos: usize,
    pub region_pos: usize,
    pub c_code_pos: usize,
    /// `c_code` of the last interindustry sector.
    pub last_interindustry_code: String,
    /// `c_code`s of the factor input total rows.
    pub factor_input_totals: Vec<String>,
    pub region_renames: BTreeMap<String, String>,
    pub sea: WiodSeaConfig,
    pub environmental: Vec<WiodEnvExtension>,
    pub household_column: String,
    pub household_category: String,
    /// Sector rows of the environmental workbooks that are discarded.
    pub environmental_drop_rows: Vec<String>,
    pub environmental_sector_prefix: String,
}

impl Default for WiodConfig {
    fn default() -> Self {
        let env = |key: &str, name: &str, units: &[(&str, &str)], default_unit: Option<&str>| {
            WiodEnvExtension {
                key: key.into(),
                name: name.into(),
                prefix: format!("{key}_"),
                file_suffix: ".xls".into(),
                units: string_map(units),
                default_unit: default_unit.map(str::to_string),
            }
        };
        Self {
            workbook_prefix: "wiot".into(),
            workbook_suffix: ".xlsx".into(),
            meta_year_row: 0,
            meta_system_row: 2,
            meta_unit_row: 3,
            empty_top_rows: 2,
            drop_total_column: true,
            code_pos: 0,
            name_pos: 1,
            region_pos: 2,
            c_code_pos: 3,
            last_interindustry_code: "c35".into(),
            factor_input_totals: strings(&["r60", "r69"]),
            region_renames: string_map(&[("ROM", "ROU")]),
            sea: WiodSeaConfig::default(),
            environmental: vec![
                env(
                    "AIR",
                    "Air Emission Accounts",
                    &[
                        ("CO2", "Gg"),
                        ("CH4", "t"),
                        ("N2O", "t"),
                        ("NOx", "t"),
                        ("SOx", "t"),
                        ("CO", "t"),
                        ("NMVOC", "t"),
                        ("NH3", "t"),
                    ],
                    None,
                ),
                env("CO2", "CO2 emissions - per source", &[], Some("Gg")),
                env("EM", "Emission relevant energy use", &[], Some("TJ")),
                env("EU", "Gross energy use", &[], Some("TJ")),
                env("lan", "land use", &[], None),
                env("mat", "material use", &[], None),
                env("wat", "water use", &[], None),
            ],
            household_column: "FC_HH".into(),
            household_category: "c37".into(),
            environmental_drop_rows: strings(&["total", "secTOT", "secQ"]),
            environmental_sector_prefix: "sec".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OecdConfig {
    pub file_prefixes: Vec<String>,
    pub file_extensions: Vec<String>,
    pub total_columns: Vec<String>,
    pub total_rows: Vec<String>,
    /// Must not match any country or industry label.
    pub factor_input_pattern: String,
    pub final_demand_pattern: String,
    pub label_separator: char,
    /// Region assigned to single-part final demand labels (discrepancy).
    pub discrepancy_region: String,
    /// Target region → regex of the sub-region codes folded into it.
    pub aggregations: BTreeMap<String, String>,
    pub monetary_unit: String,
}

impl Default for OecdConfig {
    fn default() -> Self {
        Self {
            file_prefixes: strings(&["ICIO2016_", "ICIO2018_"]),
            file_extensions: strings(&[".csv", ".CSV", ".zip"]),
            total_columns: strings(&["TOTAL"]),
            total_rows: strings(&["OUT", "OUTPUT"]),
            factor_input_pattern: "VALU|TAX".into(),
            final_demand_pattern: "HFCE|NPISH|NPS|GGFC|GFCF|INVNT|INV|DIRP|FD|P33|DISC".into(),
            label_separator: '_',
            discrepancy_region: "ALL".into(),
            aggregations: string_map(&[("CHN", r"^CN\d"), ("MEX", r"^MX\d")]),
            monetary_unit: "Million USD".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EoraConfig {
    pub separator: char,
    /// Region code of the rest-of-world placeholder.
    pub rest_of_world: String,
    pub monetary_unit: String,
    /// Table key → file name template with `{year}` and `{price}`.
    pub data_files: BTreeMap<String, String>,
    /// Label file for the Z, Y, Q and VA axes.
    pub label_files: BTreeMap<String, String>,
}

impl Default for EoraConfig {
    fn default() -> Self {
        Self {
            separator: '\t',
            rest_of_world: "ROW".into(),
            monetary_unit: "Mill USD".into(),
            data_files: string_map(&[
                ("Z", "Eora26_{year}_{price}_T.txt"),
                ("Q", "Eora26_{year}_{price}_Q.txt"),
                ("QY", "Eora26_{year}_{price}_QY.txt"),
                ("VA", "Eora26_{year}_{price}_VA.txt"),
                ("Y", "Eora26_{year}_{price}_FD.txt"),
            ]),
            label_files: string_map(&[
                ("Z", "labels_T.txt"),
                ("Y", "labels_FD.txt"),
                ("Q", "labels_Q.txt"),
                ("VA", "labels_VA.txt"),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemisConfig {
    pub container: String,
    pub labels_workbook: String,
    pub sector_sheet: usize,
    pub impact_sheet: usize,
    pub sector_name_column: String,
    pub sector_region_column: String,
    pub impact_name_column: String,
    /// Index of the foreground slice along the last axis of `S_f`.
    pub foreground_slice: usize,
    pub region_names: BTreeMap<String, String>,
}

impl Default for ThemisConfig {
    fn default() -> Self {
        Self {
            container: "Data/THEMIS2.npz".into(),
            labels_workbook: "Data/THEMIS2_labels.xlsx".into(),
            sector_sheet: 0,
            impact_sheet: 2,
            sector_name_column: "Name".into(),
            sector_region_column: "Region".into(),
            impact_name_column: "FullName".into(),
            foreground_slice: 2,
            region_names: string_map(&[
                ("AME", "Africa and Middle East"),
                ("CN", "China"),
                ("EIT", "Economies in transition"),
                ("IN", "India"),
                ("LA", "Latin America"),
                ("PAC", "OECD Pacific"),
                ("US", "OECD North America"),
                ("RER", "OECD Europe"),
                ("AS", "Rest of developing Asia"),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeciliaConfig {
    pub regions: Vec<String>,
    pub final_demand_categories: Vec<String>,
    pub labels_workbook: String,
    pub labels_sheet: usize,
    /// First row and column of the sector names in the labels sheet.
    pub labels_first_row: usize,
    pub labels_column: usize,
    pub preprocess_folder: String,
    pub aggregated_use: String,
    pub aggregated_supply: String,
    pub aggregated_final_demand: String,
    pub aggregated_materials: String,
    /// Header rows and leading label columns of the aggregated files.
    pub aggregated_skip_rows: usize,
    pub aggregated_first_col: usize,
    pub materials_first_col: usize,
    pub base_year: String,
    pub target_year: String,
}

impl Default for CeciliaConfig {
    fn default() -> Self {
        Self {
            regions: strings(&["EU", "HI", "BX", "WW"]),
            final_demand_categories: strings(&[
                "Final consumption expenditure by households",
                "Final consumption expenditure by non-profit organisations serving households (NPISH)",
                "Final consumption expenditure by government",
                "Gross fixed capital formation",
                "Changes in inventories",
                "Changes in valuables",
                "Export",
            ]),
            labels_workbook: "supply_use_tables_bau_2050.xlsx".into(),
            labels_sheet: 2,
            labels_first_row: 3,
            labels_column: 2,
            preprocess_folder: "preprocess".into(),
            aggregated_use: "mrUseAggregated.txt".into(),
            aggregated_supply: "mrSupplyAggregated.txt".into(),
            aggregated_final_demand: "mrFinalDemandAggregated.txt".into(),
            aggregated_materials: "mrMaterialsAggregated.txt".into(),
            aggregated_skip_rows: 2,
            aggregated_first_col: 3,
            materials_first_col: 2,
            base_year: "2000".into(),
            target_year: "2050".into(),
        }
    }
}
