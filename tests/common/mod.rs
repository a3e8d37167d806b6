#![allow(dead_code)]

use std::env;

use ivgmm::data::{IvData, IvDataBuilder};
use ivgmm::table::DataTable;

/// Environment variable pointing at a CSV export of the Griliches (1976) wage data.
pub const GRILICHES_ENV: &str = "GRILICHES76_CSV";

pub const EXOG: [&str; 13] = [
    "const", "s", "iq", "expr", "tenure", "rns", "smsa", "D_67", "D_68", "D_69", "D_70", "D_71",
    "D_73",
];

pub const INSTRUMENTS: [&str; 15] = [
    "const", "expr", "tenure", "rns", "smsa", "D_67", "D_68", "D_69", "D_70", "D_71", "D_73",
    "med", "kww", "age", "mrt",
];

/// Reference estimates for one scenario, in `EXOG` order.
pub struct Golden {
    pub name: &'static str,
    pub params: [f64; 13],
    pub bse: [f64; 13],
}

/// 2SLS as reported by R's `ivreg`.
pub const R_IVREG: Golden = Golden {
    name: "r_ivreg",
    params: [
        4.03350989, 0.17242531, -0.00909883, 0.04928949, 0.04221709, -0.10179345, 0.12611095,
        -0.05961711, 0.04867956, 0.15281763, 0.17443605, 0.09166597, 0.09323977,
    ],
    bse: [
        0.31816162, 0.02091823, 0.00474527, 0.00822543, 0.00891969, 0.03447337, 0.03119615,
        0.05577582, 0.05246796, 0.05201092, 0.06027671, 0.05461436, 0.05767865,
    ],
};

pub const R_IVREG_TVALUES: [f64; 13] = [
    12.6775501, 8.2428242, -1.9174531, 5.9923305, 4.7330205, -2.9528144, 4.0425165, -1.0688701,
    0.9277959, 2.9381834, 2.8939212, 1.6784225, 1.6165385,
];

pub const R_IVREG_PVALUES: [f64; 13] = [
    1.72360000e-33,
    7.57025400e-16,
    5.55625000e-02,
    3.21996700e-09,
    2.64739100e-06,
    3.24794100e-03,
    5.83809900e-05,
    2.85474400e-01,
    3.53813900e-01,
    3.40336100e-03,
    3.91575100e-03,
    9.36840200e-02,
    1.06401300e-01,
];

/// One-step GMM with robust standard errors from Stata's `ivreg2 ... gmm2s`
/// run with the 2SLS weighting matrix.
pub const STATA_ONESTEP: Golden = Golden {
    name: "stata_onestep",
    params: [
        4.03350989, 0.17242531, -0.00909883, 0.04928949, 0.04221709, -0.10179345, 0.12611095,
        -0.05961711, 0.04867956, 0.15281763, 0.17443605, 0.09166597, 0.09323976,
    ],
    bse: [
        0.33503289, 0.02073947, 0.00488624, 0.0080498, 0.00946363, 0.03371053, 0.03081138,
        0.05171372, 0.04981322, 0.0479285, 0.06112515, 0.0554618, 0.06084901,
    ],
};

/// Loads the Griliches data if `GRILICHES76_CSV` is set.
///
/// The file needs the columns `lw`, `s`, `iq`, `expr`, `tenure`, `rns`,
/// `smsa`, `year`, `med`, `kww`, `age` and `mrt`.
pub fn griliches() -> Option<IvData> {
    let path = env::var(GRILICHES_ENV).ok()?;
    let mut table = DataTable::from_path(&path).expect("readable Griliches CSV");
    table.add_indicators("year", "D_").expect("year column");
    table.add_constant("const").expect("fresh constant");

    let data = IvDataBuilder::new(table.vector("lw").expect("lw column"))
        .exog(table.matrix(&EXOG).expect("regressor columns"))
        .instrument(table.matrix(&INSTRUMENTS).expect("instrument columns"))
        .exog_names(EXOG)
        .instrument_names(INSTRUMENTS)
        .build()
        .expect("consistent Griliches data");
    Some(data)
}
