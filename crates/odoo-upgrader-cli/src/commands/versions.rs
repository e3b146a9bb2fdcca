use odoo_upgrader_common::SUPPORTED_VERSIONS;

use crate::{CliError, Format};

pub fn handle(format: &Format) -> Result<(), CliError> {
    match format {
        Format::Pretty => {
            println!("Supported target versions:");
            for version in SUPPORTED_VERSIONS {
                println!("  • {version}");
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&SUPPORTED_VERSIONS)?),
    }

    Ok(())
}
