use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{
    code::{CompanyCode, ModuleCode},
    resolver::{ModulePattern, ModuleResolver, default_module_code},
};

/// How company codes are assigned when a company is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyCodePolicy {
    /// Every company in a module gets its own number, allocated from a
    /// per-module sequence (`0001`, `0002`, ...).
    #[default]
    Sequential,

    /// All companies share the configured `fixed_company_code`.
    Fixed,
}

/// Configuration for identifier allocation.
///
/// This struct holds settings that control how module names are resolved,
/// how company codes are assigned and how hard the allocator tries before
/// giving up on a contended partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Versions", into = "Versions")]
pub struct Config {
    /// The module code used when a module name yields no code.
    default_module_code: ModuleCode,

    /// How company codes are assigned.
    pub company_codes: CompanyCodePolicy,

    /// The company code shared by all companies under
    /// [`CompanyCodePolicy::Fixed`].
    fixed_company_code: CompanyCode,

    /// How many times a contended or busy allocation is retried before the
    /// error is surfaced.
    pub max_retries: u32,

    /// Whether company registration rejects module names from which no code
    /// can be derived, instead of using the default module code.
    pub strict_module_names: bool,

    /// Additional module name patterns, consulted before the built-in table.
    modules: Vec<ModuleEntry>,
}

/// A module pattern as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Keywords that must all appear in the module name.
    pub keywords: Vec<String>,
    /// The module code assigned to matching names.
    pub code: ModuleCode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_module_code: default_module_code(),
            company_codes: CompanyCodePolicy::default(),
            fixed_company_code: CompanyCode::SHARED,
            max_retries: default_max_retries(),
            strict_module_names: false,
            modules: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid (including malformed module or company codes).
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Loads the configuration if the file exists, otherwise returns the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns the module code used when a module name yields no code.
    #[must_use]
    pub const fn default_module_code(&self) -> &ModuleCode {
        &self.default_module_code
    }

    /// Sets the module code used when a module name yields no code.
    pub fn set_default_module_code(&mut self, code: ModuleCode) {
        self.default_module_code = code;
    }

    /// Returns the company code shared under [`CompanyCodePolicy::Fixed`].
    #[must_use]
    pub const fn fixed_company_code(&self) -> CompanyCode {
        self.fixed_company_code
    }

    /// Switches to [`CompanyCodePolicy::Fixed`] with the given shared code.
    pub const fn use_fixed_company_code(&mut self, code: CompanyCode) {
        self.company_codes = CompanyCodePolicy::Fixed;
        self.fixed_company_code = code;
    }

    /// Returns the configured module patterns.
    #[must_use]
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Adds a module pattern.
    ///
    /// If a pattern with the same code already exists it is replaced.
    /// Keywords are normalized to uppercase before adding.
    pub fn add_module<I, S>(&mut self, keywords: I, code: ModuleCode)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_uppercase())
            .collect();
        self.modules.retain(|m| m.code != code);
        self.modules.push(ModuleEntry { keywords, code });
    }

    /// Builds the module resolver described by this configuration.
    #[must_use]
    pub fn resolver(&self) -> ModuleResolver {
        let patterns = self
            .modules
            .iter()
            .map(|m| ModulePattern::new(&m.keywords, m.code.clone()))
            .collect();
        ModuleResolver::new(patterns, self.default_module_code.clone())
    }
}

const fn default_max_retries() -> u32 {
    5
}

fn default_fixed_company_code() -> CompanyCode {
    CompanyCode::SHARED
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_module_code")]
        default_module_code: ModuleCode,

        #[serde(default)]
        company_codes: CompanyCodePolicy,

        #[serde(default = "default_fixed_company_code")]
        fixed_company_code: CompanyCode,

        /// Retry bound for contended allocations.
        #[serde(default = "default_max_retries")]
        max_retries: u32,

        #[serde(default)]
        strict_module_names: bool,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modules: Vec<ModuleEntry>,
    },
}

impl TryFrom<Versions> for Config {
    type Error = String;

    fn try_from(versions: Versions) -> Result<Self, Self::Error> {
        match versions {
            Versions::V1 {
                default_module_code,
                company_codes,
                fixed_company_code,
                max_retries,
                strict_module_names,
                modules,
            } => {
                if let Some(entry) = modules.iter().find(|m| {
                    m.keywords.iter().all(|k| k.trim().is_empty())
                }) {
                    return Err(format!(
                        "module pattern for '{}' has no keywords",
                        entry.code
                    ));
                }
                Ok(Self {
                    default_module_code,
                    company_codes,
                    fixed_company_code,
                    max_retries,
                    strict_module_names,
                    modules,
                })
            }
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            default_module_code: config.default_module_code,
            company_codes: config.company_codes,
            fixed_company_code: config.fixed_company_code,
            max_retries: config.max_retries,
            strict_module_names: config.strict_module_names,
            modules: config.modules,
        }
    }
}
