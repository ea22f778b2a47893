use clap::Parser;
use idgen::{EntityType, Identifier};
use tracing::instrument;

use super::{parse_identifier, status::OutputFormat, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Validate an identifier and show its components")]
pub struct Parse {
    /// The identifier, e.g. MD-0001-CU-25-00042
    id: String,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Parse {
    #[instrument(level = "debug")]
    pub fn run(self) -> anyhow::Result<()> {
        let identifier = parse_identifier(&self.id).map_err(anyhow::Error::msg)?;

        match self.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&describe(&identifier))?);
            }
            OutputFormat::Table => output_table(&identifier),
        }
        Ok(())
    }
}

fn entity_name(entity_type: EntityType) -> String {
    format!("{entity_type:?}").to_lowercase()
}

fn describe(identifier: &Identifier) -> serde_json::Value {
    serde_json::json!({
        "identifier": identifier,
        "module": identifier.module_code().as_str(),
        "company": identifier.company_code().to_string(),
        "entity": identifier.entity_code().as_str(),
        "entity_type": entity_name(identifier.entity_type()),
        "year": identifier.year().to_string(),
        "counter": identifier.counter().get(),
    })
}

fn output_table(identifier: &Identifier) {
    let entity_type = identifier.entity_type();
    let entity = if entity_type == EntityType::Other {
        format!("{} (unknown)", identifier.entity_code()).warning()
    } else {
        format!("{} ({})", identifier.entity_code(), entity_name(entity_type))
    };

    println!("{}", identifier.to_string().info());
    println!("  Module:  {}", identifier.module_code());
    println!("  Company: {}", identifier.company_code());
    println!("  Entity:  {entity}");
    println!("  Year:    {}", identifier.year());
    println!("  Counter: {}", identifier.counter());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_components() {
        let identifier = parse_identifier("ads-0012-in-25-00042").unwrap();

        assert_eq!(
            describe(&identifier),
            serde_json::json!({
                "identifier": "ADS-0012-IN-25-00042",
                "module": "ADS",
                "company": "0012",
                "entity": "IN",
                "entity_type": "invoice",
                "year": "25",
                "counter": 42,
            })
        );
    }

    #[test]
    fn run_rejects_malformed_identifiers() {
        let result = Parse {
            id: "MD-01-CU-25-1".to_string(),
            output: OutputFormat::Table,
        }
        .run();

        assert!(result.is_err());
    }

    #[test]
    fn unknown_entity_codes_still_parse() {
        let identifier = parse_identifier("MD-0001-ZZ-25-00001").unwrap();
        assert_eq!(describe(&identifier)["entity_type"], "other");
    }
}
