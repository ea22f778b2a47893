//! Mapping free-text module names to [`ModuleCode`]s.
//!
//! Resolution is a pure function of the name and the pattern table:
//!
//! 1. the first pattern whose keywords are all contained in the upper-cased
//!    name wins;
//! 2. otherwise a code is derived from the name itself (first two letters of a
//!    single word, or the initials of up to three words);
//! 3. otherwise the resolver's default code is returned.

use non_empty_string::NonEmptyString;

use crate::domain::code::{ModuleCode, SegmentError};

/// Keyword patterns shipped with the crate.
const BUILTIN_PATTERNS: &[(&[&str], &str)] = &[
    (&["MOBILE", "DETAILING"], "MD"),
    (&["DRUG", "SCREENING"], "DS"),
    (&["ADVANCE", "DNA"], "ADS"),
    (&["PRESSURE", "WASHING"], "PW"),
    (&["WINDOW", "CLEANING"], "WC"),
    (&["LAWN", "CARE"], "LC"),
];

/// Maximum number of initials taken from a multi-word name.
const MAX_INITIALS: usize = 3;

/// A keyword pattern that maps matching module names to a fixed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePattern {
    /// Keywords that must all appear in the module name (case-insensitive).
    keywords: Vec<NonEmptyString>,
    /// The code assigned to matching names.
    code: ModuleCode,
}

impl ModulePattern {
    /// Creates a new pattern.
    ///
    /// Keywords are normalised to uppercase; empty keywords are dropped.
    #[must_use]
    pub fn new<I, S>(keywords: I, code: ModuleCode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .filter_map(|k| NonEmptyString::new(k.as_ref().trim().to_uppercase()).ok())
            .collect();
        Self { keywords, code }
    }

    /// Returns the code assigned by this pattern.
    #[must_use]
    pub const fn code(&self) -> &ModuleCode {
        &self.code
    }

    fn matches(&self, upper_name: &str) -> bool {
        !self.keywords.is_empty()
            && self
                .keywords
                .iter()
                .all(|k| upper_name.contains(k.as_str()))
    }
}

/// Error returned by [`ModuleResolver::resolve_strict`].
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("Invalid module name '{0}': no module code can be derived from it")]
pub struct InvalidModuleName(pub String);

/// Resolves module names to module codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResolver {
    patterns: Vec<ModulePattern>,
    default_code: ModuleCode,
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new(Vec::new(), default_module_code())
    }
}

impl ModuleResolver {
    /// Creates a resolver that consults `patterns` before the built-in table.
    #[must_use]
    pub fn new(patterns: Vec<ModulePattern>, default_code: ModuleCode) -> Self {
        let builtins = BUILTIN_PATTERNS.iter().map(|(keywords, code)| {
            ModulePattern::new(
                keywords.iter().copied(),
                // Built-in codes are 2-3 uppercase letters.
                ModuleCode::new(*code).unwrap_or_else(|_| ModuleCode::general()),
            )
        });
        let patterns = patterns.into_iter().chain(builtins).collect();
        Self {
            patterns,
            default_code,
        }
    }

    /// Returns the code used when nothing else can be derived.
    #[must_use]
    pub const fn default_code(&self) -> &ModuleCode {
        &self.default_code
    }

    /// Resolves a module name to its code.
    ///
    /// This never fails: names from which no code can be derived resolve to
    /// the default code.
    ///
    /// ```
    /// use idgen::ModuleResolver;
    ///
    /// let resolver = ModuleResolver::default();
    /// assert_eq!(resolver.resolve("Mobile Detailing").as_str(), "MD");
    /// assert_eq!(resolver.resolve("Xylophone Services").as_str(), "XS");
    /// assert_eq!(resolver.resolve("").as_str(), "GN");
    /// ```
    #[must_use]
    pub fn resolve(&self, name: &str) -> ModuleCode {
        self.resolve_strict(name)
            .unwrap_or_else(|_| self.default_code.clone())
    }

    /// Accepts either a ready-made module code (`MD`, `ADS`) or a module name.
    ///
    /// Input that already is a valid module code is returned unchanged;
    /// anything else goes through [`ModuleResolver::resolve`].
    #[must_use]
    pub fn resolve_name_or_code(&self, input: &str) -> ModuleCode {
        ModuleCode::new(input.trim()).unwrap_or_else(|_| self.resolve(input))
    }

    /// Like [`ModuleResolver::resolve_name_or_code`], but names that yield no
    /// code are rejected instead of falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidModuleName`] if `input` is neither a module code nor a
    /// resolvable module name.
    pub fn resolve_name_or_code_strict(
        &self,
        input: &str,
    ) -> Result<ModuleCode, InvalidModuleName> {
        ModuleCode::new(input.trim()).or_else(|_| self.resolve_strict(input))
    }

    /// Resolves a module name to its code, failing instead of falling back to
    /// the default.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidModuleName`] if the name matches no pattern and no code
    /// of at least two letters can be derived from it.
    pub fn resolve_strict(&self, name: &str) -> Result<ModuleCode, InvalidModuleName> {
        let upper = name.to_uppercase();

        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(&upper)) {
            return Ok(pattern.code.clone());
        }

        derive_code(&upper).map_err(|_| InvalidModuleName(name.to_string()))
    }
}

/// Derives a code from the alphabetic words of an upper-cased name.
fn derive_code(upper_name: &str) -> Result<ModuleCode, SegmentError> {
    let words: Vec<&str> = upper_name
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let code: String = match words.as_slice() {
        [word] => word.chars().take(2).collect(),
        words => words
            .iter()
            .take(MAX_INITIALS)
            .filter_map(|w| w.chars().next())
            .collect(),
    };

    ModuleCode::new(code)
}

/// The code used for unresolvable module names unless configured otherwise.
pub(crate) fn default_module_code() -> ModuleCode {
    ModuleCode::general()
}
