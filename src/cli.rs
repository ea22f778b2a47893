use std::path::PathBuf;

mod parse;
mod status;
mod terminal;

use clap::ArgAction;
use idgen::{Allocator, Config, EntityType, Identifier, ModuleCode, SqliteStore, Year};
use parse::Parse;
use status::Status;
use tracing::instrument;

/// Parse a four digit calendar year into its two digit identifier form.
fn parse_year(s: &str) -> Result<Year, String> {
    let year: i32 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a calendar year"))?;
    if !(1000..=9999).contains(&year) {
        return Err(format!("'{s}' is not a four digit calendar year"));
    }
    Ok(Year::from_calendar(year))
}

/// Parse an identifier from a string, normalizing to uppercase.
///
/// This is a CLI boundary function that accepts lowercase input
/// and normalizes it before parsing.
fn parse_identifier(s: &str) -> Result<Identifier, String> {
    s.trim()
        .to_uppercase()
        .parse()
        .map_err(|e| format!("{e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The SQLite database holding sequences and issued identifiers
    #[arg(long, default_value = "idgen.sqlite", global = true)]
    db: PathBuf,

    /// The configuration file (defaults are used if it does not exist)
    #[arg(long, default_value = "idgen.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let paths = Paths {
            db: self.db,
            config: self.config,
        };

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(&paths)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

/// Locations of the database and configuration file.
#[derive(Debug, Clone)]
pub struct Paths {
    db: PathBuf,
    config: PathBuf,
}

impl Paths {
    fn config(&self) -> anyhow::Result<Config> {
        Config::load_or_default(&self.config).map_err(anyhow::Error::msg)
    }

    fn store(&self) -> anyhow::Result<SqliteStore> {
        Ok(SqliteStore::open_path(&self.db)?)
    }

    fn allocator(&self) -> anyhow::Result<Allocator<SqliteStore>> {
        let config = self.config()?;
        Ok(Allocator::with_config(self.store()?, &config))
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show allocated sequences (default)
    Status(Status),

    /// Create the configuration file and database
    Init,

    /// Show the module code for a module name
    Resolve(Resolve),

    /// Register a company and print its identifier
    Register(Register),

    /// Allocate identifiers for entities owned by a company
    Issue(Issue),

    /// Validate an identifier and show its components
    Parse(Parse),
}

impl Command {
    fn run(self, paths: &Paths) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(paths)?,
            Self::Init => Init::run(paths)?,
            Self::Resolve(command) => command.run(paths)?,
            Self::Register(command) => command.run(paths)?,
            Self::Issue(command) => command.run(paths)?,
            Self::Parse(command) => command.run()?,
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Init {}

impl Init {
    #[instrument]
    fn run(paths: &Paths) -> anyhow::Result<()> {
        use terminal::Colorize;

        if paths.config.exists() {
            println!(
                "{}",
                format!("Keeping existing {}", paths.config.display()).dim()
            );
        } else {
            Config::default()
                .save(&paths.config)
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", paths.config.display()))?;
            println!("  Created: {}", paths.config.display());
        }

        // Opening the store creates the schema.
        paths.store()?;
        println!("  Ready:   {}", paths.db.display());

        println!();
        println!("Next steps:");
        println!("  idgen register \"Mobile Detailing\"");

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Resolve {
    /// The module name or code, e.g. "Mobile Detailing" or "MD"; an
    /// uppercase 2-3 letter input is taken as a code, as `register` does
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>,

    /// Fail instead of falling back to the default module code
    #[arg(long)]
    strict: bool,
}

impl Resolve {
    #[instrument]
    fn run(self, paths: &Paths) -> anyhow::Result<()> {
        println!("{}", self.code(paths)?);
        Ok(())
    }

    fn code(&self, paths: &Paths) -> anyhow::Result<ModuleCode> {
        let resolver = paths.config()?.resolver();
        let name = self.name.join(" ");

        Ok(if self.strict {
            resolver.resolve_name_or_code_strict(&name)?
        } else {
            resolver.resolve_name_or_code(&name)
        })
    }
}

#[derive(Debug, clap::Parser)]
pub struct Register {
    /// The module name or code, e.g. "Mobile Detailing" or "MD"
    #[arg(required = true, num_args = 1..)]
    module: Vec<String>,

    /// The allocation year (defaults to the current year)
    #[arg(long, value_parser = parse_year)]
    year: Option<Year>,
}

impl Register {
    #[instrument]
    fn run(self, paths: &Paths) -> anyhow::Result<()> {
        use terminal::Colorize;

        let allocator = paths.allocator()?;
        let year = self.year.unwrap_or_else(Year::current);
        let identifier = allocator.register_company(&self.module.join(" "), year)?;

        println!("{}", identifier.to_string().success());
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Issue {
    /// The company identifier, e.g. MD-0001-CO-25-00001
    #[clap(value_parser = parse_identifier)]
    company: Identifier,

    /// The entity type (company, customer, staff, invoice, job, vehicle,
    /// equipment) or its two letter code
    entity: String,

    /// The allocation year (defaults to the current year)
    #[arg(long, value_parser = parse_year)]
    year: Option<Year>,

    /// How many identifiers to allocate
    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,
}

impl Issue {
    #[instrument]
    fn run(self, paths: &Paths) -> anyhow::Result<()> {
        use terminal::Colorize;

        let entity_type = EntityType::from_key(&self.entity);
        if entity_type == EntityType::Other {
            eprintln!(
                "{}",
                format!(
                    "Unknown entity type '{}', using code {}",
                    self.entity,
                    entity_type.code()
                )
                .warning()
            );
        }

        let allocator = paths.allocator()?;
        let year = self.year.unwrap_or_else(Year::current);
        let company = self.company.to_string();

        for _ in 0..self.count {
            let identifier = allocator.allocate_entity(&company, entity_type, year)?;
            println!("{}", identifier.to_string().success());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use idgen::SequenceStore;
    use tempfile::tempdir;

    use super::*;

    fn paths(root: &Path) -> Paths {
        Paths {
            db: root.join("idgen.sqlite"),
            config: root.join("idgen.toml"),
        }
    }

    fn sequences(paths: &Paths) -> Vec<(String, u64)> {
        paths.store().unwrap().sequences().unwrap()
    }

    #[test]
    fn parse_year_accepts_calendar_years() {
        assert_eq!(parse_year("2025").unwrap(), Year::new(25).unwrap());
        assert_eq!(parse_year(" 2100 ").unwrap(), Year::new(0).unwrap());
        assert!(parse_year("25").is_err());
        assert!(parse_year("twenty").is_err());
    }

    #[test]
    fn parse_identifier_normalizes_case() {
        let id = parse_identifier(" md-0001-co-25-00001 ").unwrap();
        assert_eq!(id.to_string(), "MD-0001-CO-25-00001");
        assert!(parse_identifier("md-1").is_err());
    }

    #[test]
    fn init_creates_config_and_database() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());

        Init::run(&paths).unwrap();

        assert_eq!(Config::load(&paths.config).unwrap(), Config::default());
        assert!(paths.db.is_file());

        // A second run keeps the existing configuration.
        let mut config = Config::default();
        config.max_retries = 11;
        config.save(&paths.config).unwrap();
        Init::run(&paths).unwrap();
        assert_eq!(Config::load(&paths.config).unwrap().max_retries, 11);
    }

    #[test]
    fn register_then_issue_allocates_in_sequence() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());
        let year = Year::from_calendar(2025);

        Register {
            module: vec!["Mobile".to_string(), "Detailing".to_string()],
            year: Some(year),
        }
        .run(&paths)
        .unwrap();

        Issue {
            company: parse_identifier("MD-0001-CO-25-00001").unwrap(),
            entity: "customer".to_string(),
            year: Some(year),
            count: 3,
        }
        .run(&paths)
        .unwrap();

        assert_eq!(
            sequences(&paths),
            vec![
                ("MD-0001-CO-25-".to_string(), 1),
                ("MD-0001-CU-25-".to_string(), 3),
                ("MD-companies".to_string(), 1),
            ]
        );
    }

    #[test]
    fn issue_rejects_non_company_identifiers() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());

        let error = Issue {
            company: parse_identifier("MD-0001-CU-25-00001").unwrap(),
            entity: "invoice".to_string(),
            year: None,
            count: 1,
        }
        .run(&paths)
        .unwrap_err();

        assert!(error.to_string().contains("not a company identifier"));
        assert!(sequences(&paths).is_empty());
    }

    #[test]
    fn register_uses_configured_patterns() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());

        let mut config = Config::default();
        config.add_module(["pet", "grooming"], ModuleCode::new("PG").unwrap());
        config.save(&paths.config).unwrap();

        Register {
            module: vec!["Pet Grooming".to_string()],
            year: Some(Year::from_calendar(2026)),
        }
        .run(&paths)
        .unwrap();

        assert_eq!(
            sequences(&paths),
            vec![
                ("PG-0001-CO-26-".to_string(), 1),
                ("PG-companies".to_string(), 1),
            ]
        );
    }

    #[test]
    fn strict_resolve_fails_for_blank_names() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());

        let result = Resolve {
            name: vec!["   ".to_string()],
            strict: true,
        }
        .run(&paths);
        assert!(result.is_err());

        Resolve {
            name: vec!["   ".to_string()],
            strict: false,
        }
        .run(&paths)
        .unwrap();
    }

    #[test]
    fn resolve_and_register_agree_on_codes() {
        let tmp = tempdir().unwrap();
        let paths = paths(tmp.path());

        for strict in [false, true] {
            let code = Resolve {
                name: vec!["CAR".to_string()],
                strict,
            }
            .code(&paths)
            .unwrap();
            assert_eq!(code.as_str(), "CAR");
        }

        Register {
            module: vec!["CAR".to_string()],
            year: Some(Year::from_calendar(2025)),
        }
        .run(&paths)
        .unwrap();
        assert_eq!(sequences(&paths)[0].0, "CAR-0001-CO-25-");
    }
}
