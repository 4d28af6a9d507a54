//! English model values to Swedish display strings.
//!
//! Each table is a closed lookup; a value with no entry passes through as-is.

/// Which table to translate through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedField {
    Gender,
    Nationality,
    Disability,
}

/// Nationality placeholder the model uses when it cannot tell.
pub const UNKNOWN_NATIONALITY: &str = "Unknown";

const GENDER: &[(&str, &str)] = &[("male", "Man"), ("female", "Kvinna"), ("other", "Annat")];

const NATIONALITY: &[(&str, &str)] = &[
    ("Swedish", "Sverige"),
    ("Norwegian", "Norge"),
    ("Danish", "Danmark"),
    ("Finnish", "Finland"),
    (UNKNOWN_NATIONALITY, ""),
];

const DISABILITY: &[(&str, &str)] = &[
    ("None", "Inget funktionshinder"),
    ("Mobility impairment", "Rörelsehinder"),
    ("Visual impairment", "Synskada"),
    ("Hearing impairment", "Hörselskada"),
];

/// Values the editor offers for each choice field.
pub const NATIONALITY_CHOICES: &[&str] = &["Sverige", "Norge", "Danmark", "Finland", "Annat"];
pub const GENDER_CHOICES: &[&str] = &["Man", "Kvinna", "Annat"];
pub const DISABILITY_CHOICES: &[&str] = &[
    "Inget funktionshinder",
    "Rörelsehinder",
    "Synskada",
    "Hörselskada",
    "Annat",
];

impl MappedField {
    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Gender => GENDER,
            Self::Nationality => NATIONALITY,
            Self::Disability => DISABILITY,
        }
    }

    pub fn choices(self) -> &'static [&'static str] {
        match self {
            Self::Gender => GENDER_CHOICES,
            Self::Nationality => NATIONALITY_CHOICES,
            Self::Disability => DISABILITY_CHOICES,
        }
    }
}

/// Translate `value` through the table for `field`; unmapped values are returned unchanged.
pub fn to_swedish(value: &str, field: MappedField) -> &str {
    field
        .table()
        .iter()
        .find(|(english, _)| *english == value)
        .map(|(_, swedish)| *swedish)
        .unwrap_or(value)
}
