mod cli;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    cli::ringctl_main().context("ringctl failed")?;
    logger::debug!("ringctl done");
    Ok(())
}
