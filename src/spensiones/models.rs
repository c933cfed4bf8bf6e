// src/spensiones/models.rs
use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

use crate::periods::PeriodToken;

pub const BASE_URL: &str = "https://www.spensiones.cl";

/// Publication cadence of a dataset. Determines which period tokens are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    /// Months published within a year. Empty for annual datasets, whose tokens carry no month.
    pub fn months(self) -> &'static [u32] {
        match self {
            Frequency::Monthly => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            Frequency::Quarterly => &[3, 6, 9, 12],
            Frequency::Annual => &[],
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annual => "annual",
        };
        f.write_str(name)
    }
}

/// Pension fund type (multifondos A to E). Only used by the unit value dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FundType {
    A,
    B,
    #[default]
    C,
    D,
    E,
}

impl FundType {
    pub fn letter(self) -> &'static str {
        match self {
            FundType::A => "A",
            FundType::B => "B",
            FundType::C => "C",
            FundType::D => "D",
            FundType::E => "E",
        }
    }
}

/// How the table documents for a period are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// The period URL returns the table document itself.
    Direct,
    /// The period URL returns an index page linking to one document per cuadro.
    Index(LinkRule),
}

/// Identifies cuadro links on an index page: a CSS selector for the anchors
/// plus a substring the href must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRule {
    pub selector: &'static str,
    pub href_marker: &'static str,
}

/// Immutable description of one published dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub name: &'static str,
    pub frequency: Frequency,
    /// `{base}`, `{periodo}` and `{fondo}` are substituted by [`DatasetDescriptor::url_for`].
    pub url_template: &'static str,
    pub source: SourceShape,
    pub output_subdir: &'static str,
}

impl DatasetDescriptor {
    /// Renders the URL for one period.
    pub fn url_for(&self, token: &PeriodToken, fund: FundType) -> String {
        self.url_template
            .replace("{base}", BASE_URL)
            .replace("{periodo}", token.as_str())
            .replace("{fondo}", fund.letter())
    }
}

pub static CARTERAS_AGREGADAS: DatasetDescriptor = DatasetDescriptor {
    name: "carteras_inversion_agregadas",
    frequency: Frequency::Monthly,
    url_template: "{base}/apps/loadCarteras/loadCarAgr.php?menu=sci&menuN1=estfinfp&menuN2=NOID&orden=20&periodo={periodo}&ext=.php",
    source: SourceShape::Index(LinkRule {
        selector: r#"a[title="Html"][href]"#,
        href_marker: "genera_xsl_v2.0.php",
    }),
    output_subdir: "Carteras_Inversiones_agregadas",
};

pub static CARTERAS_INVERSION: DatasetDescriptor = DatasetDescriptor {
    name: "carteras_inversion",
    frequency: Frequency::Monthly,
    url_template: "{base}/apps/loadCarteras/loadCarInv.php?menu=sci&menuN1=estfinfp&menuN2=NOID&orden=10&periodo={periodo}&ext=.php",
    source: SourceShape::Index(LinkRule {
        selector: r#"a[title="Html"][href]"#,
        href_marker: "genera_desagregada_xsl_v2.0.php",
    }),
    output_subdir: "Carteras_Inversiones",
};

pub static ESTADOS_FINANCIEROS: DatasetDescriptor = DatasetDescriptor {
    name: "eeff",
    frequency: Frequency::Quarterly,
    url_template: "{base}/apps/loadEstadisticas/loadFecuFondo.php?menu=sci&menuN1=estfinfp&menuN2=NOID&orden=30&periodo={periodo}&ext=.php",
    source: SourceShape::Index(LinkRule {
        selector: r#"div.tab-pane[id^="idu_"] a[href*="loadCuadroFecuFondo.php"]"#,
        href_marker: "tipo=html",
    }),
    output_subdir: "Estados_Financieros",
};

// The "xls" endpoint serves an HTML table. fecconf is not validated upstream.
pub static VALORES_CUOTA: DatasetDescriptor = DatasetDescriptor {
    name: "valores_cuota",
    frequency: Frequency::Annual,
    url_template: "{base}/apps/valoresCuotaFondo/vcfAFPxls.php?aaaaini={periodo}&aaaafin={periodo}&tf={fondo}&fecconf={periodo}1231",
    source: SourceShape::Direct,
    output_subdir: "Valores_Cuota",
};

/// Dataset selector exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasetKind {
    /// Aggregated investment portfolios (monthly)
    CarterasAgregadas,
    /// Disaggregated investment portfolios (monthly)
    CarterasInversion,
    /// Fund financial statements (quarterly)
    Eeff,
    /// Fund unit values (annual)
    ValoresCuota,
    /// Both portfolio datasets over the same periods (monthly)
    Ambos,
}

impl DatasetKind {
    /// Datasets the selector downloads, in processing order.
    pub fn descriptors(self) -> Vec<&'static DatasetDescriptor> {
        match self {
            DatasetKind::CarterasAgregadas => vec![&CARTERAS_AGREGADAS],
            DatasetKind::CarterasInversion => vec![&CARTERAS_INVERSION],
            DatasetKind::Eeff => vec![&ESTADOS_FINANCIEROS],
            DatasetKind::ValoresCuota => vec![&VALORES_CUOTA],
            DatasetKind::Ambos => vec![&CARTERAS_AGREGADAS, &CARTERAS_INVERSION],
        }
    }

    /// Publication frequency shared by every dataset of the selector.
    pub fn frequency(self) -> Frequency {
        match self {
            DatasetKind::CarterasAgregadas | DatasetKind::CarterasInversion | DatasetKind::Ambos => {
                Frequency::Monthly
            }
            DatasetKind::Eeff => Frequency::Quarterly,
            DatasetKind::ValoresCuota => Frequency::Annual,
        }
    }
}
