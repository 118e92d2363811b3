use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use flashcard_ai_client::config::ClientConfig;
use flashcard_ai_client::{FlashcardGenerator, GenerationService, InMemoryGenerationStore, OpenRouterClient};
use std::fs;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flashcard_ai_client::init_logging();

    let matches = Command::new("flashcard-ai-client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate study flashcard proposals from a text file")
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("FILE")
                .help("Text file with the source material")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("ID")
                .help("Model to use, e.g. openai/gpt-4o-mini")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON file with client configuration")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("ID")
                .help("User the generation is recorded for")
                .default_value("local")
                .action(ArgAction::Set),
        )
        .get_matches();

    let input: &String = matches.get_one("input").context("--input is required")?;
    let source_text =
        fs::read_to_string(input).with_context(|| format!("failed to read source text from {}", input))?;

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
            serde_json::from_str::<ClientConfig>(&raw).with_context(|| format!("invalid config in {}", path))?
        }
        None => ClientConfig::default(),
    };
    if let Some(model) = matches.get_one::<String>("model") {
        config = config.with_default_model(model.clone());
    }

    let client = OpenRouterClient::new(&config).context("failed to configure the OpenRouter client")?;
    let service = GenerationService::new(
        FlashcardGenerator::new(client),
        Arc::new(InMemoryGenerationStore::new()),
    );

    let user: &String = matches.get_one("user").context("--user has a default")?;
    let outcome = service.generate(user, &source_text).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
