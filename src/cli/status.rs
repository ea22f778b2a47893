use clap::Parser;
use idgen::SequenceStore;
use tracing::instrument;

use super::{Paths, terminal::Colorize};

/// The suffix of the per-module company numbering sequences.
const COMPANY_SEQUENCE_SUFFIX: &str = "-companies";

#[derive(Debug, Parser, Default)]
#[command(about = "Show allocated sequences and their last issued counter")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// The sequences in a store, split by what they number.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    /// Identifier partitions, keyed by prefix.
    partitions: Vec<(String, u64)>,
    /// Company numbering, keyed by module code.
    companies: Vec<(String, u64)>,
}

impl Summary {
    fn new(sequences: Vec<(String, u64)>) -> Self {
        let mut summary = Self::default();
        for (key, last) in sequences {
            match key.strip_suffix(COMPANY_SEQUENCE_SUFFIX) {
                Some(module) => summary.companies.push((module.to_string(), last)),
                None => summary.partitions.push((key, last)),
            }
        }
        summary
    }

    fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.companies.is_empty()
    }

    fn issued(&self) -> u64 {
        self.partitions.iter().map(|(_, last)| last).sum()
    }
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, paths: &Paths) -> anyhow::Result<()> {
        let summary = Summary::new(paths.store()?.sequences()?);

        if summary.is_empty() {
            println!("No identifiers allocated yet. Register a company with 'idgen register'.");
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => Self::output_json(&summary)?,
            OutputFormat::Table => {
                if self.quiet {
                    Self::output_quiet(&summary);
                } else {
                    Self::output_table(&summary);
                }
            }
        }

        Ok(())
    }

    fn output_json(summary: &Summary) -> anyhow::Result<()> {
        use serde_json::json;

        let partitions: Vec<_> = summary
            .partitions
            .iter()
            .map(|(prefix, last)| json!({ "prefix": prefix, "last": last }))
            .collect();

        let companies: Vec<_> = summary
            .companies
            .iter()
            .map(|(module, last)| json!({ "module": module, "last": last }))
            .collect();

        let output = json!({
            "partitions": partitions,
            "companies": companies,
            "issued": summary.issued(),
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_quiet(summary: &Summary) {
        println!(
            "partitions={} modules={} issued={}",
            summary.partitions.len(),
            summary.companies.len(),
            summary.issued()
        );
    }

    fn output_table(summary: &Summary) {
        if !summary.companies.is_empty() {
            println!("Companies per module");
            println!("{}", "────────────────────".dim());
            println!("Module   Last");
            for (module, last) in &summary.companies {
                println!("{:<8} {last:04}", module.info());
            }
            println!();
        }

        println!("Partitions");
        println!("{}", "──────────".dim());
        println!("Prefix           Last");
        for (prefix, last) in &summary.partitions {
            println!("{prefix:<16} {last:05}");
        }
        println!("Total issued     {}", summary.issued().to_string().success());
    }
}
