//! Config check command.

use anyhow::Result;
use dashing_core::Config;

use crate::output;

pub fn execute(config: Config) -> Result<()> {
    config.validate()?;
    output::print_config(&config);
    Ok(())
}
