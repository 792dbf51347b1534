//! `quill describe` -- print the descriptor of the configured generator.
//!
//! The output is the normalized form (defaults filled in, API key never
//! included) and can be saved and passed back with `--config`.

use clap::Args;

use quill_components::Component;

use super::{GeneratorArgs, build_generator};

/// Arguments for the `quill describe` subcommand.
#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub generator: GeneratorArgs,
}

/// Run the describe command.
pub fn run(args: DescribeArgs) -> anyhow::Result<()> {
    let generator = build_generator(&args.generator)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&generator.to_dict().to_value())?
    );
    Ok(())
}
