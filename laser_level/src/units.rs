use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

pub const MM_TO_INCH: f64 = 0.0393701;

/// Display and export unit. Measurements are always stored in millimeters.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize,
    Deserialize,
)]
pub enum Units {
    #[default]
    #[strum(to_string = "μm", serialize = "um")]
    #[serde(rename = "μm", alias = "um")]
    Micrometers,
    #[strum(to_string = "mm")]
    #[serde(rename = "mm")]
    Millimeters,
    /// Inches shown with four decimals.
    #[strum(to_string = "0.0000\"")]
    #[serde(rename = "0.0000\"")]
    Inches4,
    /// Inches shown with five decimals.
    #[strum(to_string = "0.00000\"")]
    #[serde(rename = "0.00000\"")]
    Inches5,
}

impl Units {
    pub fn multiplier(self) -> f64 {
        match self {
            Units::Micrometers => 1000.0,
            Units::Millimeters => 1.0,
            Units::Inches4 | Units::Inches5 => MM_TO_INCH,
        }
    }

    pub fn decimals(self) -> usize {
        match self {
            Units::Micrometers | Units::Millimeters => 2,
            Units::Inches4 => 4,
            Units::Inches5 => 5,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Units::Micrometers => "μm",
            Units::Millimeters => "mm",
            Units::Inches4 | Units::Inches5 => "\"",
        }
    }

    /// Converts a millimeter value into this unit.
    pub fn scale(self, value_mm: f64) -> f64 {
        value_mm * self.multiplier()
    }

    /// Formats a millimeter value for display, e.g. `307.29μm` or `0.0121"`.
    pub fn format(self, value_mm: f64) -> String {
        format!(
            "{:.*}{}",
            self.decimals(),
            self.scale(value_mm),
            self.suffix()
        )
    }

    /// Unit name restricted to ASCII, for file headers.
    pub fn ascii_label(self) -> String {
        self.to_string().replace('μ', "u")
    }
}
