//! `quill generate` -- run one prompt through a GPT generator.
//!
//! Prints the generator output (`replies` and `metadata`) as pretty JSON.
//! With `--stream`, fragments are written to stdout as they arrive and the
//! JSON follows once the stream ends.
//!
//! # Example
//!
//! ```text
//! quill generate "What's Natural Language Processing?" --model gpt-4 --max-tokens 64
//! quill generate "Tell me a story" --stream --config generator.toml
//! ```

use clap::Args;
use tracing::info;

use super::{GeneratorArgs, build_generator};

/// Arguments for the `quill generate` subcommand.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Prompt to send.
    pub prompt: String,

    #[command(flatten)]
    pub generator: GeneratorArgs,
}

/// Run the generate command.
pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let generator = build_generator(&args.generator)?;
    let streaming = generator.streaming_callback().is_some();

    info!(model = %generator.model_name(), streaming, "generating");
    let output = generator.run(&args.prompt).await?;

    if streaming {
        println!();
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
