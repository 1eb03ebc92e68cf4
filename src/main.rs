use std::path::PathBuf;

use anyhow::{bail, Context};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        bail!("usage: brushcanvas <input> <output>");
    };
    let (input, output) = (PathBuf::from(input), PathBuf::from(output));

    brushcanvas::run(&input, &output)
        .with_context(|| format!("failed to process {}", input.display()))?;
    Ok(())
}
