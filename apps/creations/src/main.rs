mod config;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    FileInput, GeminiGenerationClient, GenerationConfig, GenerationService, HttpExampleSource,
    SessionController,
};
use shared::{
    domain::{Creation, CreationId},
    error::{AppException, ErrorCode},
};
use storage::{
    CreationStore, CredentialStore, KeyValueStore, MemoryKeyValueStore, NameLocalizer,
    SqliteKeyValueStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "creations", about = "Turn prompts and files into interactive web pages")]
struct Cli {
    /// Settings file; defaults to ./creations.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Keep history and credential in memory for this run only.
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new creation from a prompt or a file.
    Generate {
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Revise a creation from history; the result is saved as a new entry.
    Revise {
        id: String,
        instruction: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    List,
    Show {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Delete {
        id: String,
    },
    Import {
        path: PathBuf,
    },
    Export {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    #[command(subcommand)]
    Credential(CredentialCommand),
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
    Set {
        key: String,
        #[arg(long)]
        skip_validation: bool,
    },
    Validate {
        key: Option<String>,
    },
    Clear,
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<AppException>() {
        Some(app) => {
            eprintln!("error: {}", app.message);
            if app.code == ErrorCode::CredentialRequired {
                eprintln!("hint: run `creations credential set <key>` to store an API key");
            }
        }
        None => eprintln!("error: {err:#}"),
    }
}

struct Runtime {
    settings: Settings,
    kv: Arc<dyn KeyValueStore>,
    credentials: CredentialStore,
    client: Arc<GeminiGenerationClient>,
}

impl Runtime {
    async fn open(cli: &Cli) -> Result<Self> {
        let settings = load_settings(cli.config.as_deref())?;

        let kv: Arc<dyn KeyValueStore> = if cli.ephemeral {
            Arc::new(MemoryKeyValueStore::new())
        } else {
            let database_url = normalize_database_url(&settings.database_url);
            info!("using local store {database_url}");
            Arc::new(SqliteKeyValueStore::new(&database_url).await?)
        };
        let credentials = CredentialStore::new(Arc::clone(&kv));

        let client = Arc::new(GeminiGenerationClient::new(GenerationConfig {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            output_language: settings.output_language.clone(),
        }));

        Ok(Self {
            settings,
            kv,
            credentials,
            client,
        })
    }

    /// The configured key wins over the stored one.
    async fn load_credential(&self) -> Result<()> {
        let credential = match &self.settings.api_key {
            Some(key) => Some(key.clone()),
            None => self.credentials.load().await?,
        };
        if let Some(credential) = credential {
            self.client.set_credential(credential).await;
        }
        Ok(())
    }

    async fn controller(&self) -> Result<SessionController> {
        self.load_credential().await?;
        let generator: Arc<dyn GenerationService> = self.client.clone();
        let mut controller =
            SessionController::new(CreationStore::new(Arc::clone(&self.kv)), generator);

        let examples = HttpExampleSource::new(self.settings.example_urls.clone());
        let localizer: NameLocalizer = self.settings.example_names.clone().into_iter().collect();
        controller.initialize(&examples, &localizer).await;
        Ok(controller)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let runtime = Runtime::open(&cli).await?;

    match cli.command {
        Command::Credential(command) => run_credential(&runtime, command).await,
        Command::Generate { prompt, file, out } => {
            let mut controller = runtime.controller().await?;
            let file = match file {
                Some(path) => Some(read_file_input(&path).await?),
                None => None,
            };
            let creation = controller
                .create(prompt.unwrap_or_default(), file)
                .await
                .map_err(AppException::from)?;
            present(&creation, out.as_deref()).await
        }
        Command::Revise {
            id,
            instruction,
            out,
        } => {
            let mut controller = runtime.controller().await?;
            controller
                .select(&CreationId::from(id))
                .map_err(AppException::from)?;
            let creation = controller
                .revise(instruction)
                .await
                .map_err(AppException::from)?;
            present(&creation, out.as_deref()).await
        }
        Command::List => {
            let controller = runtime.controller().await?;
            if controller.history().is_empty() {
                println!("No creations yet.");
            }
            for creation in controller.history() {
                println!(
                    "{}  {}  {}",
                    creation.id,
                    creation.timestamp.format("%Y-%m-%d %H:%M"),
                    creation.name
                );
            }
            Ok(())
        }
        Command::Show { id, out } => {
            let mut controller = runtime.controller().await?;
            let creation = controller
                .select(&CreationId::from(id))
                .map_err(AppException::from)?;
            match out {
                Some(path) => write_output(&path, creation.html.as_bytes()).await,
                None => {
                    println!("{}", creation.html);
                    Ok(())
                }
            }
        }
        Command::Delete { id } => {
            let mut controller = runtime.controller().await?;
            let id = CreationId::from(id);
            if !controller.store().contains(&id) {
                bail!("no creation with id {id} in history");
            }
            let remaining = controller.delete(&id).await.len();
            println!("Deleted {id}; {remaining} creations remain.");
            Ok(())
        }
        Command::Import { path } => {
            let mut controller = runtime.controller().await?;
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let creation = controller
                .import(&raw)
                .await
                .map_err(AppException::from)?;
            println!("Imported {}  {}", creation.id, creation.name);
            Ok(())
        }
        Command::Export { id, out } => {
            let controller = runtime.controller().await?;
            let id = CreationId::from(id);
            let bytes = controller.export(&id).map_err(AppException::from)?;
            let path = match out {
                Some(path) => path,
                None => {
                    let creation = controller
                        .store()
                        .get(&id)
                        .context("creation disappeared during export")?;
                    PathBuf::from(CreationStore::export_file_name(creation))
                }
            };
            write_output(&path, &bytes).await
        }
    }
}

async fn run_credential(runtime: &Runtime, command: CredentialCommand) -> Result<()> {
    match command {
        CredentialCommand::Set {
            key,
            skip_validation,
        } => {
            if !skip_validation && !runtime.client.validate_credential(&key).await {
                bail!("the generation service did not accept this key; pass --skip-validation to store it anyway");
            }
            runtime.credentials.save(&key).await?;
            println!("API key stored.");
        }
        CredentialCommand::Validate { key } => {
            let key = match key {
                Some(key) => Some(key),
                None => match &runtime.settings.api_key {
                    Some(key) => Some(key.clone()),
                    None => runtime.credentials.load().await?,
                },
            };
            let Some(key) = key else {
                bail!("no API key given or stored");
            };
            if runtime.client.validate_credential(&key).await {
                println!("API key is valid.");
            } else {
                bail!("API key was rejected or the service is unreachable");
            }
        }
        CredentialCommand::Clear => {
            runtime.credentials.clear().await?;
            runtime.client.clear_credential().await;
            println!("Stored API key removed.");
        }
        CredentialCommand::Status => {
            let stored = runtime.credentials.load().await?.is_some();
            let configured = runtime.settings.api_key.is_some();
            match (configured, stored) {
                (true, _) => println!("API key provided by configuration."),
                (false, true) => println!("API key stored locally."),
                (false, false) => println!("No API key configured."),
            }
        }
    }
    Ok(())
}

async fn read_file_input(path: &Path) -> Result<FileInput> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    let mut input = FileInput::new(bytes, mime_type.essence_str());
    if let Some(name) = path.file_name() {
        input = input.with_file_name(name.to_string_lossy());
    }
    Ok(input)
}

async fn present(creation: &Creation, out: Option<&Path>) -> Result<()> {
    println!("{}  {}", creation.id, creation.name);
    if let Some(path) = out {
        write_output(path, creation.html.as_bytes()).await?;
    }
    Ok(())
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
