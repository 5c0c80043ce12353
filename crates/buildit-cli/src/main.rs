//! BuildIt CLI tool.

use clap::{Parser, Subcommand};

mod client;
mod commands;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "buildit")]
#[command(about = "BuildIt CI/CD CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "BUILDIT_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Operator bearer token
    #[arg(long, env = "BUILDIT_API_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage repositories
    Apps {
        #[command(subcommand)]
        command: AppCommands,
    },
    /// Manage builds
    Builds {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Manage preview launches
    Launches {
        #[command(subcommand)]
        command: LaunchCommands,
    },
    /// Manage job definitions
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Inspect job runs
    JobRuns {
        #[command(subcommand)]
        command: JobRunCommands,
    },
}

#[derive(Subcommand)]
enum AppCommands {
    /// Search the repository catalog
    List {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one repository with its latest build and launch
    Show { id: String },
    /// Register a new repository and enqueue ingestion
    Create {
        name: String,
        repo_url: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        dockerfile_path: Option<String>,
    },
    /// Re-queue ingestion for a repository
    Retry { id: String },
    /// Show ingestion history for a repository
    History { id: String },
    /// List builds for a repository
    Builds {
        id: String,
        #[arg(long, default_value = "20")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
}

#[derive(Subcommand)]
enum BuildCommands {
    /// Create a new build derived from a failed one
    Retry { id: String },
    /// Show build logs
    Logs { id: String },
}

#[derive(Subcommand)]
enum LaunchCommands {
    /// Start a preview launch for a repository
    Start { repository_id: String },
    /// List recent launches for a repository
    List { app_id: String },
    /// Stop a launch
    Stop { app_id: String, launch_id: String },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List job definitions
    List,
    /// Enqueue a job run
    Run {
        slug: String,
        /// JSON-encoded parameters object
        #[arg(long)]
        parameters: Option<String>,
    },
    /// Regenerate a job's bundle from stored source suggestions
    RegenerateBundle { slug: String },
}

#[derive(Subcommand)]
enum JobRunCommands {
    /// List job runs
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        job: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url, cli.token);

    match cli.command {
        Commands::Apps { command } => match command {
            AppCommands::List { q, status } => commands::apps::list(&client, q, status).await?,
            AppCommands::Show { id } => commands::apps::show(&client, &id).await?,
            AppCommands::Create {
                name,
                repo_url,
                description,
                dockerfile_path,
            } => {
                commands::apps::create(&client, &name, &repo_url, description, dockerfile_path)
                    .await?
            }
            AppCommands::Retry { id } => commands::apps::retry(&client, &id).await?,
            AppCommands::History { id } => commands::apps::history(&client, &id).await?,
            AppCommands::Builds { id, limit, offset } => {
                commands::apps::builds(&client, &id, limit, offset).await?
            }
        },
        Commands::Builds { command } => match command {
            BuildCommands::Retry { id } => commands::builds::retry(&client, &id).await?,
            BuildCommands::Logs { id } => commands::builds::logs(&client, &id).await?,
        },
        Commands::Launches { command } => match command {
            LaunchCommands::Start { repository_id } => {
                commands::launches::start(&client, &repository_id).await?
            }
            LaunchCommands::List { app_id } => commands::launches::list(&client, &app_id).await?,
            LaunchCommands::Stop { app_id, launch_id } => {
                commands::launches::stop(&client, &app_id, &launch_id).await?
            }
        },
        Commands::Jobs { command } => match command {
            JobCommands::List => commands::jobs::list(&client).await?,
            JobCommands::Run { slug, parameters } => {
                commands::jobs::run(&client, &slug, parameters).await?
            }
            JobCommands::RegenerateBundle { slug } => {
                commands::jobs::regenerate_bundle(&client, &slug).await?
            }
        },
        Commands::JobRuns { command } => match command {
            JobRunCommands::List { status, job, limit } => {
                commands::job_runs::list(&client, status, job, limit).await?
            }
        },
    }

    Ok(())
}
