//! artifact-publisher CLI
//!
//! Authenticated publish/fetch workflow for npm packages in GCP Artifact Registry

use anyhow::Result;
use artifact_publisher::core::{
    ConfigLoadOptions, ConfigLoader, CredentialConfig, CredentialSource, NpmConfig,
    RegistryConfig, VersionList, VersionRequest, WorkflowConfig, WorkflowError,
};
use artifact_publisher::orchestration::{OutputFormat, PublishOptions, Reporter, Workflow};
use artifact_publisher::security::SecureTokenManager;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Publish, install and fetch npm packages in GCP Artifact Registry
#[derive(Parser)]
#[command(name = "artifact-publisher")]
#[command(version)]
#[command(about = "Authenticated npm workflow for GCP Artifact Registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    project_path: Option<PathBuf>,

    /// Registry URL, e.g. https://us-central1-npm.pkg.dev/my-project/my-repo/
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Package scope, e.g. @observability
    #[arg(long, global = true)]
    scope: Option<String>,

    /// Where the access token comes from
    #[arg(long, global = true, value_enum)]
    credentials: Option<CredentialsArg>,

    /// Environment variable named in .npmrc (and read by --credentials env)
    #[arg(long, global = true)]
    token_env: Option<String>,

    /// Timeout for registry requests and commands, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Never prompt (CI/CD)
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CredentialsArg {
    Gcloud,
    Env,
}

#[derive(Subcommand)]
enum Commands {
    /// List published versions of a package
    Versions {
        /// Package name, e.g. @observability/react-app
        package: String,
    },

    /// Install a package into the project
    Install {
        package: String,

        /// Version, range or dist-tag (prompted for when omitted; empty = latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Download a package and extract it
    Fetch {
        package: String,

        /// Version, range or dist-tag (prompted for when omitted; empty = latest)
        #[arg(long)]
        version: Option<String>,

        /// Extraction directory (default: fetched-package)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Pack a package directory and publish it
    Publish {
        /// Package directory (defaults to the project directory)
        #[arg(value_name = "PACKAGE_DIR")]
        package_dir: Option<PathBuf>,

        /// Pack and report without uploading
        #[arg(long)]
        dry_run: bool,

        /// Publish as 0.1.<unix timestamp>
        #[arg(long)]
        auto_version: bool,

        /// Publish under a different package name
        #[arg(long)]
        name: Option<String>,

        /// dist-tag for the new version
        #[arg(long)]
        tag: Option<String>,
    },

    /// Write the project's .npmrc only
    Configure,

    /// Compress a directory and upload it to a generic repository
    PushArtifact {
        /// Directory to compress
        source_dir: PathBuf,

        /// Artifact name (a timestamp is appended)
        #[arg(long)]
        name: String,

        /// <location>-docker.pkg.dev/<project>/<repository>
        #[arg(long)]
        repository: Option<String>,
    },
}

impl Cli {
    /// Configuration layer built from command-line flags
    fn config_overrides(&self) -> WorkflowConfig {
        let registry = (self.registry.is_some() || self.scope.is_some()).then(|| RegistryConfig {
            url: self.registry.clone(),
            scope: self.scope.clone(),
        });
        let credentials = self.credentials.map(|source| CredentialConfig {
            provider: Some(match source {
                CredentialsArg::Gcloud => CredentialSource::Gcloud,
                CredentialsArg::Env => CredentialSource::Env,
            }),
            env_var: None,
        });
        let npm = self.token_env.as_ref().map(|token_env| NpmConfig {
            token_env: Some(token_env.clone()),
            tag: None,
        });

        WorkflowConfig {
            registry,
            credentials,
            npm,
            timeout: self.timeout,
            ..Default::default()
        }
    }

    fn interactive(&self) -> bool {
        !self.non_interactive && !self.json && std::io::stdin().is_terminal()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_path = cli
        .project_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let options = ConfigLoadOptions::from_process(&project_path, Some(cli.config_overrides()));
    let config = match ConfigLoader::load(options).await {
        Ok(config) => config,
        Err(e) => return Ok(report_setup_error(format, e)),
    };

    let validation = ConfigLoader::validate(&config);
    if !cli.json {
        for warning in &validation.warnings {
            eprintln!("⚠️  {}: {}", warning.field, warning.message);
        }
    }
    // push-artifact talks to gcloud only and has no use for the npm registry URL
    if !matches!(cli.command, Commands::PushArtifact { .. }) {
        if let Err(e) = ConfigLoader::require_valid(&config) {
            return Ok(report_setup_error(format, e));
        }
    }

    if !cli.json {
        println!("\n📦 artifact-publisher\n");
    }

    let interactive = cli.interactive();
    let mut workflow = Workflow::from_config(&project_path, config).with_progress(!cli.json);

    let exit_code = match cli.command {
        Commands::Versions { package } => {
            let outcome = workflow.list_versions(&package).await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
        Commands::Install { package, version } => {
            let version = resolve_version_arg(version, interactive).await?;
            let outcome = workflow.install(&package, version).await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
        Commands::Fetch {
            package,
            version,
            output_dir,
        } => {
            let version = resolve_version_arg(version, interactive).await?;
            let outcome = workflow
                .fetch_archive(&package, version, output_dir.as_deref())
                .await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
        Commands::Publish {
            package_dir,
            dry_run,
            auto_version,
            name,
            tag,
        } => {
            let options = PublishOptions {
                dry_run,
                auto_version,
                name_override: name,
                tag,
            };
            let outcome = workflow.publish(package_dir.as_deref(), options).await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
        Commands::Configure => {
            let outcome = workflow.configure().await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
        Commands::PushArtifact {
            source_dir,
            name,
            repository,
        } => {
            let outcome = workflow
                .push_artifact(&source_dir, &name, repository.as_deref())
                .await;
            Reporter::new(format, workflow.token_manager()).report(&outcome)
        }
    };

    Ok(exit_code)
}

fn report_setup_error(format: OutputFormat, error: WorkflowError) -> i32 {
    let masker = SecureTokenManager::new();
    Reporter::new(format, &masker).report::<VersionList>(&Err(error))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("artifact_publisher={}", default_level))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Use the flag when given, otherwise ask (interactive sessions only)
async fn resolve_version_arg(flag: Option<String>, interactive: bool) -> Result<VersionRequest> {
    if flag.is_some() || !interactive {
        return Ok(VersionRequest::parse(flag.as_deref()));
    }

    let answer = prompt("Version (leave empty for latest): ").await?;
    Ok(VersionRequest::parse(Some(&answer)))
}

async fn prompt(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes()).await?;
    stdout.flush().await?;

    let mut reader = BufReader::new(io::stdin());
    let mut answer = String::new();
    reader.read_line(&mut answer).await?;

    Ok(answer.trim().to_string())
}
