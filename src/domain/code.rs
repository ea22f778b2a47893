//! The fixed-width segments that make up an [`Identifier`](super::Identifier).
//!
//! Each segment is a validated newtype so that an identifier can only be
//! assembled from parts that already satisfy the grammar.

use std::{fmt, num::NonZeroU32, ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};

/// Error returned when a segment does not satisfy its grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum SegmentError {
    /// Module codes are 2 or 3 ASCII uppercase letters.
    #[error("Invalid module code '{0}': expected 2 or 3 uppercase letters (A-Z)")]
    Module(String),

    /// Company codes are 4 digits in the range `0001..=9999`.
    #[error("Invalid company code '{0}': expected 4 digits between 0001 and 9999")]
    Company(String),

    /// Entity codes are exactly 2 ASCII uppercase letters.
    #[error("Invalid entity code '{0}': expected 2 uppercase letters (A-Z)")]
    Entity(String),

    /// Years are two digits.
    #[error("Invalid year '{0}': expected a value between 00 and 99")]
    Year(String),

    /// Counters are 5 digits in the range `00001..=99999`.
    #[error("Invalid counter '{0}': expected a value between 00001 and 99999")]
    Counter(String),
}

fn is_upper_alpha(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_uppercase())
}

fn is_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// A 2–3 letter code identifying a business module, e.g. `MD` or `ADS`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleCode(String);

impl ModuleCode {
    /// Creates a new `ModuleCode`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Module`] unless the string is 2 or 3 uppercase
    /// ASCII letters.
    pub fn new(s: impl Into<String>) -> Result<Self, SegmentError> {
        let s = s.into();
        if (2..=3).contains(&s.len()) && is_upper_alpha(&s) {
            Ok(Self(s))
        } else {
            Err(SegmentError::Module(s))
        }
    }

    /// The code for modules whose name yields nothing better (`GN`).
    #[must_use]
    pub fn general() -> Self {
        Self(String::from("GN"))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ModuleCode {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for ModuleCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModuleCode {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModuleCode {
    type Error = SegmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleCode> for String {
    fn from(code: ModuleCode) -> Self {
        code.0
    }
}

/// The numeric slot of a company within a module, rendered as 4 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyCode(u16);

impl CompanyCode {
    /// The largest company number that fits in 4 digits.
    pub const MAX: u16 = 9_999;

    /// The company code used when all companies share one slot.
    pub const SHARED: Self = Self(1);

    /// Creates a company code from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Company`] if the value is zero or wider than 4
    /// digits.
    pub fn new(value: u32) -> Result<Self, SegmentError> {
        u16::try_from(value)
            .ok()
            .filter(|v| (1..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| SegmentError::Company(value.to_string()))
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CompanyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for CompanyCode {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !is_digits(s) {
            return Err(SegmentError::Company(s.to_string()));
        }
        let value = s
            .parse::<u32>()
            .map_err(|_| SegmentError::Company(s.to_string()))?;
        Self::new(value).map_err(|_| SegmentError::Company(s.to_string()))
    }
}

impl TryFrom<String> for CompanyCode {
    type Error = SegmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompanyCode> for String {
    fn from(code: CompanyCode) -> Self {
        code.to_string()
    }
}

/// A 2 letter code identifying the kind of entity an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityCode([u8; 2]);

impl EntityCode {
    /// Creates a new `EntityCode`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Entity`] unless the string is exactly 2
    /// uppercase ASCII letters.
    pub fn new(s: &str) -> Result<Self, SegmentError> {
        match s.as_bytes() {
            &[a, b] if a.is_ascii_uppercase() && b.is_ascii_uppercase() => Ok(Self([a, b])),
            _ => Err(SegmentError::Entity(s.to_string())),
        }
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII uppercase letters.
        std::str::from_utf8(&self.0).unwrap_or("XX")
    }

    /// Returns the well-known entity type for this code, if any.
    #[must_use]
    pub fn entity_type(self) -> EntityType {
        EntityType::from_key(self.as_str())
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCode {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityCode {
    type Error = SegmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<EntityCode> for String {
    fn from(code: EntityCode) -> Self {
        code.to_string()
    }
}

/// The kinds of entity that receive identifiers.
///
/// The table is closed: keys that are not recognised resolve to
/// [`EntityType::Other`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// A company registered in a module (`CO`).
    Company,
    /// A customer/client of a company (`CU`).
    Customer,
    /// A staff member (`ST`).
    Staff,
    /// An invoice (`IN`).
    Invoice,
    /// A job or work order (`JO`).
    Job,
    /// A vehicle (`VE`).
    Vehicle,
    /// A piece of equipment (`EQ`).
    Equipment,
    /// Anything not in the table (`XX`).
    Other,
}

impl EntityType {
    /// Every entity type, in table order.
    pub const ALL: [Self; 8] = [
        Self::Company,
        Self::Customer,
        Self::Staff,
        Self::Invoice,
        Self::Job,
        Self::Vehicle,
        Self::Equipment,
        Self::Other,
    ];

    /// Resolves an entity type from its key (`CUSTOMER`) or code (`CU`).
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_uppercase().as_str() {
            "COMPANY" | "CO" => Self::Company,
            "CUSTOMER" | "CLIENT" | "CU" => Self::Customer,
            "STAFF" | "ST" => Self::Staff,
            "INVOICE" | "IN" => Self::Invoice,
            "JOB" | "JO" => Self::Job,
            "VEHICLE" | "VE" => Self::Vehicle,
            "EQUIPMENT" | "EQ" => Self::Equipment,
            _ => Self::Other,
        }
    }

    /// Returns the two letter code for this entity type.
    #[must_use]
    pub const fn code_str(self) -> &'static str {
        match self {
            Self::Company => "CO",
            Self::Customer => "CU",
            Self::Staff => "ST",
            Self::Invoice => "IN",
            Self::Job => "JO",
            Self::Vehicle => "VE",
            Self::Equipment => "EQ",
            Self::Other => "XX",
        }
    }

    /// Returns the [`EntityCode`] for this entity type.
    #[must_use]
    pub const fn code(self) -> EntityCode {
        let bytes = self.code_str().as_bytes();
        EntityCode([bytes[0], bytes[1]])
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code_str())
    }
}

/// The last two digits of the allocation year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Year(u8);

impl Year {
    /// Creates a year from its two digit form.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Year`] if the value is above 99.
    pub fn new(two_digits: u8) -> Result<Self, SegmentError> {
        if two_digits <= 99 {
            Ok(Self(two_digits))
        } else {
            Err(SegmentError::Year(two_digits.to_string()))
        }
    }

    /// Keeps the last two digits of a calendar year, e.g. `2025` → `25`.
    #[must_use]
    pub fn from_calendar(year: i32) -> Self {
        // rem_euclid(100) is always in 0..100
        Self(u8::try_from(year.rem_euclid(100)).unwrap_or(0))
    }

    /// The year of the current UTC date.
    #[must_use]
    pub fn current() -> Self {
        use chrono::Datelike;

        Self::from_calendar(chrono::Utc::now().year())
    }

    /// Returns the two digit value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Year {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 || !is_digits(s) {
            return Err(SegmentError::Year(s.to_string()));
        }
        s.parse::<u8>()
            .map_err(|_| SegmentError::Year(s.to_string()))
            .and_then(Self::new)
    }
}

impl TryFrom<u8> for Year {
    type Error = SegmentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Year> for u8 {
    fn from(year: Year) -> Self {
        year.0
    }
}

/// The sequence number within a partition, rendered as 5 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Counter(NonZeroU32);

impl Counter {
    /// The largest counter that fits in 5 digits.
    pub const MAX: u32 = 99_999;

    /// The first counter issued in every partition.
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    /// Creates a counter from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Counter`] if the value is zero or wider than 5
    /// digits.
    pub fn new(value: u32) -> Result<Self, SegmentError> {
        NonZeroU32::new(value)
            .filter(|v| v.get() <= Self::MAX)
            .map(Self)
            .ok_or_else(|| SegmentError::Counter(value.to_string()))
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Returns the following counter, or `None` once the 5 digits are used up.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::new(self.get() + 1).ok()
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:05}", self.0)
    }
}

impl FromStr for Counter {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 5 || !is_digits(s) {
            return Err(SegmentError::Counter(s.to_string()));
        }
        s.parse::<u32>()
            .map_err(|_| SegmentError::Counter(s.to_string()))
            .and_then(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("MD"; "two letters")]
    #[test_case("ADS"; "three letters")]
    fn module_code_accepts(code: &str) {
        assert_eq!(ModuleCode::new(code).unwrap().as_str(), code);
    }

    #[test_case(""; "empty")]
    #[test_case("M"; "one letter")]
    #[test_case("ABCD"; "four letters")]
    #[test_case("md"; "lowercase")]
    #[test_case("M1"; "digit")]
    fn module_code_rejects(code: &str) {
        assert_eq!(
            ModuleCode::new(code),
            Err(SegmentError::Module(code.to_string()))
        );
    }

    #[test]
    fn company_code_bounds() {
        assert!(CompanyCode::new(0).is_err());
        assert_eq!(CompanyCode::new(1).unwrap().to_string(), "0001");
        assert_eq!(CompanyCode::new(9_999).unwrap().to_string(), "9999");
        assert!(CompanyCode::new(10_000).is_err());
        assert!("001".parse::<CompanyCode>().is_err());
        assert!("0000".parse::<CompanyCode>().is_err());
        assert!("+001".parse::<CompanyCode>().is_err());
    }

    #[test]
    fn counter_pads_to_five_digits() {
        assert_eq!(Counter::new(7).unwrap().to_string(), "00007");
        assert_eq!(Counter::new(99_999).unwrap().to_string(), "99999");
    }

    #[test]
    fn counter_overflow_is_rejected() {
        assert_eq!(
            Counter::new(100_000),
            Err(SegmentError::Counter("100000".to_string()))
        );
        assert_eq!(Counter::new(99_999).unwrap().next(), None);
        assert_eq!(Counter::FIRST.next(), Some(Counter::new(2).unwrap()));
    }

    #[test]
    fn year_keeps_last_two_digits() {
        assert_eq!(Year::from_calendar(2025).to_string(), "25");
        assert_eq!(Year::from_calendar(2100).to_string(), "00");
        assert_eq!(Year::from_calendar(2009).to_string(), "09");
        assert!(Year::new(100).is_err());
    }

    #[test_case("CUSTOMER", EntityType::Customer)]
    #[test_case("customer", EntityType::Customer)]
    #[test_case("CU", EntityType::Customer)]
    #[test_case(" staff ", EntityType::Staff)]
    #[test_case("EQUIPMENT", EntityType::Equipment)]
    #[test_case("SPACESHIP", EntityType::Other)]
    #[test_case("", EntityType::Other)]
    fn entity_type_from_key(key: &str, expected: EntityType) {
        assert_eq!(EntityType::from_key(key), expected);
    }

    #[test]
    fn entity_codes_are_distinct_and_valid() {
        let codes: std::collections::HashSet<_> =
            EntityType::ALL.iter().map(|t| t.code()).collect();
        assert_eq!(codes.len(), EntityType::ALL.len());
        for ty in EntityType::ALL {
            assert_eq!(EntityCode::new(ty.code_str()), Ok(ty.code()));
            assert_eq!(ty.code().entity_type(), ty);
        }
    }
}
