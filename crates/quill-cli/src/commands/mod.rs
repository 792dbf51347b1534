//! CLI command implementations for `quill`.
//!
//! - [`generate`] -- Run one prompt through a generator.
//! - [`describe`] -- Show the generator descriptor.
//!
//! Both commands build their generator the same way: start from the
//! descriptor in `--config` (or an empty one), apply flag overrides on top,
//! then hand the result to `GptGenerator::from_dict`.

pub mod describe;
pub mod generate;

use std::path::Path;

use anyhow::Context;
use clap::Args;
use serde_json::{Map, Value};

use quill_components::callbacks::DEFAULT_STREAMING_CALLBACK;
use quill_components::{CallbackRegistry, Component, ComponentDescriptor, GptGenerator};

/// Generator options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GeneratorArgs {
    /// Descriptor file (JSON, or TOML with a `.toml` extension).
    #[arg(short, long)]
    pub config: Option<String>,

    /// Model name (default: gpt-3.5-turbo).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of the chat completion API.
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// System prompt sent before the user prompt.
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Maximum number of tokens to generate.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Stream fragments to stdout as they arrive.
    #[arg(long)]
    pub stream: bool,
}

/// Parse a descriptor from file contents. `.toml` paths are read as TOML,
/// everything else as JSON.
pub fn parse_descriptor(path: &Path, contents: &str) -> anyhow::Result<ComponentDescriptor> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let descriptor = if is_toml {
        toml::from_str(contents)
            .with_context(|| format!("failed to parse TOML descriptor {}", path.display()))?
    } else {
        serde_json::from_str(contents)
            .with_context(|| format!("failed to parse JSON descriptor {}", path.display()))?
    };
    Ok(descriptor)
}

/// Load the descriptor named by `--config`.
pub fn load_descriptor(path_str: &str) -> anyhow::Result<ComponentDescriptor> {
    let path = Path::new(path_str);
    if !path.exists() {
        anyhow::bail!("config file not found: {path_str}");
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {path_str}"))?;
    parse_descriptor(path, &contents)
}

/// Resolve the descriptor from `--config` plus flag overrides.
pub fn resolve_descriptor(args: &GeneratorArgs) -> anyhow::Result<ComponentDescriptor> {
    let mut descriptor = match args.config.as_deref() {
        Some(path) => load_descriptor(path)?,
        None => ComponentDescriptor::new(GptGenerator::TYPE_NAME, Map::new()),
    };
    apply_overrides(&mut descriptor.init_parameters, args);
    Ok(descriptor)
}

/// Flags win over values from the descriptor file.
fn apply_overrides(params: &mut Map<String, Value>, args: &GeneratorArgs) {
    if let Some(model) = &args.model {
        params.insert("model_name".into(), Value::from(model.as_str()));
    }
    if let Some(url) = &args.api_base_url {
        params.insert("api_base_url".into(), Value::from(url.as_str()));
    }
    if let Some(system_prompt) = &args.system_prompt {
        params.insert("system_prompt".into(), Value::from(system_prompt.as_str()));
    }
    if let Some(max_tokens) = args.max_tokens {
        params.insert("max_tokens".into(), Value::from(max_tokens));
    }
    if let Some(temperature) = args.temperature {
        params.insert("temperature".into(), Value::from(temperature));
    }
    if args.stream {
        params.insert(
            "streaming_callback".into(),
            Value::from(DEFAULT_STREAMING_CALLBACK),
        );
    }
}

/// Build the generator described by `args`.
pub fn build_generator(args: &GeneratorArgs) -> anyhow::Result<GptGenerator> {
    let descriptor = resolve_descriptor(args)?;
    let generator = GptGenerator::from_dict(descriptor, &CallbackRegistry::with_builtins())?;
    tracing::debug!(generator = ?generator, "generator ready");
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use quill_llm::OPENAI_API_KEY_ENV;
    use serde_json::json;

    #[test]
    fn parse_json_descriptor() {
        let descriptor = parse_descriptor(
            Path::new("gen.json"),
            r#"{"type": "GptGenerator", "init_parameters": {"model_name": "gpt-4", "max_tokens": 10}}"#,
        )
        .unwrap();
        assert_eq!(descriptor.type_name, "GptGenerator");
        assert_eq!(descriptor.init_parameters["max_tokens"], json!(10));
    }

    #[test]
    fn parse_toml_descriptor() {
        let contents = r#"
type = "GptGenerator"

[init_parameters]
model_name = "gpt-4"
system_prompt = "You are terse."
temperature = 0.2
"#;
        let descriptor = parse_descriptor(Path::new("gen.TOML"), contents).unwrap();
        assert_eq!(
            Value::Object(descriptor.init_parameters),
            json!({"model_name": "gpt-4", "system_prompt": "You are terse.", "temperature": 0.2})
        );
    }

    #[test]
    fn parse_invalid_descriptor_names_file() {
        let err = parse_descriptor(Path::new("broken.json"), "{not json").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn missing_config_file_fails() {
        let err = load_descriptor("/nonexistent/quill/gen.json").unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"type": "GptGenerator", "init_parameters": {{"model_name": "gpt-4", "max_tokens": 10}}}}"#
        )
        .unwrap();

        let args = GeneratorArgs {
            config: Some(file.path().to_string_lossy().into_owned()),
            max_tokens: Some(64),
            stream: true,
            ..Default::default()
        };
        let descriptor = resolve_descriptor(&args).unwrap();

        assert_eq!(
            Value::Object(descriptor.init_parameters),
            json!({
                "model_name": "gpt-4",
                "max_tokens": 64,
                "streaming_callback": DEFAULT_STREAMING_CALLBACK
            })
        );
    }

    #[test]
    fn build_generator_from_flags() {
        let args = GeneratorArgs {
            model: Some("gpt-4".into()),
            api_base_url: Some("http://localhost:8080/v1".into()),
            temperature: Some(0.5),
            stream: true,
            ..Default::default()
        };

        let generator = temp_env::with_var(OPENAI_API_KEY_ENV, Some("fake-api-key"), || {
            build_generator(&args).unwrap()
        });

        assert_eq!(generator.model_name(), "gpt-4");
        assert_eq!(generator.api_base_url(), "http://localhost:8080/v1");
        assert_eq!(generator.generation_kwargs()["temperature"], json!(0.5));
        assert_eq!(
            generator.streaming_callback().map(|cb| cb.reference()),
            Some(DEFAULT_STREAMING_CALLBACK)
        );
    }

    #[test]
    fn build_generator_without_key_fails() {
        let err = temp_env::with_var_unset(OPENAI_API_KEY_ENV, || {
            build_generator(&GeneratorArgs::default()).unwrap_err()
        });
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
