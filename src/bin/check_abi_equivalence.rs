use std::{env, path::PathBuf};

use anyhow::Context;
use savedstate::equivalence::CheckAbiEquivalence;

const USAGE: &str = "usage: check_abi_equivalence <checked-in-dump> <built-dump> [update-task]";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut arguments = env::args_os().skip(1);
    let checked_in_dump = arguments.next().map(PathBuf::from).context(USAGE)?;
    let built_dump = arguments.next().map(PathBuf::from).context(USAGE)?;

    let mut check = CheckAbiEquivalence::new(checked_in_dump, built_dump);
    if let Some(update_task) = arguments.next() {
        check = check.update_task(update_task.to_string_lossy());
    }

    if arguments.next().is_some() {
        anyhow::bail!(USAGE);
    }

    check.execute()?;
    log::info!("{} matches {}", check.built_dump().display(), check.checked_in_dump().display());

    Ok(())
}
