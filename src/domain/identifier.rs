use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::code::{CompanyCode, Counter, EntityCode, EntityType, ModuleCode, Year};

/// The canonical identifier grammar.
///
/// Module codes may be 2 or 3 letters, company codes are always 4 digits. The
/// segment constructors used at allocation time enforce the same rules.
static GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{2,3})-([0-9]{4})-([A-Z]{2})-([0-9]{2})-([0-9]{5})$")
        .unwrap_or_else(|e| unreachable!("identifier grammar is a valid regex: {e}"))
});

/// Error returned when a string is not a well-formed identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("Invalid identifier format: '{0}'")]
pub struct InvalidFormat(pub String);

/// The unit of counter isolation: `(module, company, entity, year)`.
///
/// Every partition owns an independent sequence of counters starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// The module the company belongs to.
    pub module_code: ModuleCode,
    /// The company's slot within the module.
    pub company_code: CompanyCode,
    /// The kind of entity being numbered.
    pub entity_code: EntityCode,
    /// The allocation year.
    pub year: Year,
}

impl Partition {
    /// Creates a partition from its components.
    #[must_use]
    pub const fn new(
        module_code: ModuleCode,
        company_code: CompanyCode,
        entity_code: EntityCode,
        year: Year,
    ) -> Self {
        Self {
            module_code,
            company_code,
            entity_code,
            year,
        }
    }

    /// Returns the string every identifier in this partition starts with.
    ///
    /// For example `MD-0001-CU-25-`.
    #[must_use]
    pub fn prefix(&self) -> String {
        format!(
            "{}-{}-{}-{}-",
            self.module_code, self.company_code, self.entity_code, self.year
        )
    }

    /// Combines the partition with a counter to form an identifier.
    #[must_use]
    pub const fn identifier(self, counter: Counter) -> Identifier {
        Identifier {
            partition: self,
            counter,
        }
    }
}

/// A human-readable identifier for a company or one of its entities.
///
/// Format:
/// `{MODULE}-{COMPANY}-{ENTITY}-{YEAR}-{COUNTER}`, where:
/// - `MODULE` is a 2 or 3 letter module code (e.g. `MD`, `ADS`)
/// - `COMPANY` is the company's 4 digit slot in the module (e.g. `0001`)
/// - `ENTITY` is a 2 letter entity code (e.g. `CU` for customers)
/// - `YEAR` is the last two digits of the allocation year
/// - `COUNTER` is a 5 digit sequence number, unique within the partition
///
/// Examples: `MD-0001-CO-25-00001`, `ADS-0012-IN-24-00310`
///
/// ```
/// use idgen::Identifier;
///
/// let id: Identifier = "MD-0001-CU-25-00007".parse().unwrap();
/// assert_eq!(id.module_code().as_str(), "MD");
/// assert_eq!(id.counter().get(), 7);
/// assert_eq!(id.to_string(), "MD-0001-CU-25-00007");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    partition: Partition,
    counter: Counter,
}

impl Identifier {
    /// Returns the partition the identifier was allocated in.
    #[must_use]
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Returns the module code component.
    #[must_use]
    pub const fn module_code(&self) -> &ModuleCode {
        &self.partition.module_code
    }

    /// Returns the company code component.
    #[must_use]
    pub const fn company_code(&self) -> CompanyCode {
        self.partition.company_code
    }

    /// Returns the entity code component.
    #[must_use]
    pub const fn entity_code(&self) -> EntityCode {
        self.partition.entity_code
    }

    /// Returns the well-known entity type, or [`EntityType::Other`].
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.partition.entity_code.entity_type()
    }

    /// Returns the year component.
    #[must_use]
    pub const fn year(&self) -> Year {
        self.partition.year
    }

    /// Returns the counter component.
    #[must_use]
    pub const fn counter(&self) -> Counter {
        self.counter
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.partition.prefix(), self.counter)
    }
}

impl FromStr for Identifier {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidFormat(s.to_string());
        let captures = GRAMMAR.captures(s).ok_or_else(invalid)?;

        // The regex already pins every segment's shape; the constructors add
        // the range checks (no zero company or counter).
        let module_code = ModuleCode::new(&captures[1]).map_err(|_| invalid())?;
        let company_code = captures[2].parse().map_err(|_| invalid())?;
        let entity_code = captures[3].parse().map_err(|_| invalid())?;
        let year = captures[4].parse().map_err(|_| invalid())?;
        let counter = captures[5].parse().map_err(|_| invalid())?;

        Ok(Partition::new(module_code, company_code, entity_code, year).identifier(counter))
    }
}

impl TryFrom<&str> for Identifier {
    type Error = InvalidFormat;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn partition(module: &str, company: u32, entity: EntityType, year: u8) -> Partition {
        Partition::new(
            ModuleCode::new(module).unwrap(),
            CompanyCode::new(company).unwrap(),
            entity.code(),
            Year::new(year).unwrap(),
        )
    }

    #[test]
    fn parse_decomposes_components() {
        let id = Identifier::try_from("MD-0001-CU-25-00007").unwrap();
        assert_eq!(id.module_code().as_str(), "MD");
        assert_eq!(id.company_code().get(), 1);
        assert_eq!(id.entity_code().as_str(), "CU");
        assert_eq!(id.entity_type(), EntityType::Customer);
        assert_eq!(id.year().get(), 25);
        assert_eq!(id.counter().get(), 7);
    }

    #[test]
    fn three_letter_module_codes_parse() {
        let id = Identifier::try_from("ADS-0042-IN-24-00310").unwrap();
        assert_eq!(id.module_code().as_str(), "ADS");
        assert_eq!(id.company_code().get(), 42);
        assert_eq!(id.entity_type(), EntityType::Invoice);
    }

    #[test]
    fn unknown_entity_codes_parse_as_other() {
        let id = Identifier::try_from("MD-0001-ZZ-25-00001").unwrap();
        assert_eq!(id.entity_code().as_str(), "ZZ");
        assert_eq!(id.entity_type(), EntityType::Other);
    }

    #[test]
    fn format_pads_counter() {
        let id = partition("MD", 1, EntityType::Customer, 25).identifier(Counter::new(7).unwrap());
        assert_eq!(id.to_string(), "MD-0001-CU-25-00007");
    }

    #[test]
    fn prefix_ends_with_separator() {
        assert_eq!(
            partition("PW", 12, EntityType::Staff, 5).prefix(),
            "PW-0012-ST-05-"
        );
    }

    #[test_case("not-an-id"; "free text")]
    #[test_case(""; "empty")]
    #[test_case("MD-0001-CU-25-0007"; "short counter")]
    #[test_case("MD-0001-CU-25-000007"; "long counter")]
    #[test_case("MD-001-CU-25-00007"; "short company")]
    #[test_case("M-0001-CU-25-00007"; "short module")]
    #[test_case("MODS-0001-CU-25-00007"; "long module")]
    #[test_case("md-0001-CU-25-00007"; "lowercase module")]
    #[test_case("MD-0001-C-25-00007"; "short entity")]
    #[test_case("MD-0001-CU-2025-00007"; "four digit year")]
    #[test_case("MD-0001-CU-25-00000"; "zero counter")]
    #[test_case("MD-0000-CU-25-00001"; "zero company")]
    #[test_case("MD_0001_CU_25_00001"; "wrong separator")]
    #[test_case(" MD-0001-CU-25-00001"; "leading whitespace")]
    #[test_case("MD-0001-CU-25-00001\n"; "trailing newline")]
    #[test_case("MD-٠٠٠١-CU-25-00001"; "non ascii digits")]
    fn parse_rejects(input: &str) {
        assert_eq!(
            Identifier::try_from(input),
            Err(InvalidFormat(input.to_string()))
        );
    }

    #[test]
    fn identifiers_sort_by_counter_within_partition() {
        let a = Identifier::try_from("MD-0001-CU-25-00009").unwrap();
        let b = Identifier::try_from("MD-0001-CU-25-00010").unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn serde_uses_string_form() {
        let id = Identifier::try_from("DS-0003-JO-26-00120").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"DS-0003-JO-26-00120\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identifier>("\"DS-3-JO-26-120\"").is_err());
    }

    fn arb_identifier() -> impl Strategy<Value = Identifier> {
        (
            "[A-Z]{2,3}",
            1..=CompanyCode::MAX,
            "[A-Z]{2}",
            0..=99u8,
            1..=Counter::MAX,
        )
            .prop_map(|(module, company, entity, year, counter)| {
                Partition::new(
                    ModuleCode::new(module).unwrap(),
                    CompanyCode::new(u32::from(company)).unwrap(),
                    EntityCode::new(&entity).unwrap(),
                    Year::new(year).unwrap(),
                )
                .identifier(Counter::new(counter).unwrap())
            })
    }

    proptest! {
        #[test]
        fn parse_inverts_format(id in arb_identifier()) {
            let text = id.to_string();
            prop_assert_eq!(Identifier::try_from(text.as_str()).unwrap(), id);
        }
    }
}
