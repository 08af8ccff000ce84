use anyhow::Result;
use clap::{Parser, Subcommand};
use log_rag::commands::{check, ingest_file, query, reindex, show_status, summary};
use log_rag::config::{Config, run_interactive_config, show_config};
use log_rag::context::AppContext;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "log-rag")]
#[command(about = "Semantic search and question answering over ingested log files")]
#[command(version)]
struct Cli {
    /// Directory holding the config, database and vector index (default: ~/.log-rag)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding model and answer generation
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Parse a .csv or .txt log file, store it and index its entries
    Ingest {
        /// Path to the log file
        file: PathBuf,
    },
    /// Ask a question about the ingested logs
    Query {
        /// The question in natural language
        question: String,
        /// Number of matching entries to show
        #[arg(long)]
        limit: Option<usize>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the vector index from every stored entry
    Reindex,
    /// Compare the database with the vector index
    Check {
        /// Remove orphaned vectors and index missing entries
        #[arg(long)]
        fix: bool,
    },
    /// Summarize recent incidents, patterns and recommended actions
    Summary {
        /// Only summarize entries from this ingested file ID
        #[arg(long)]
        file: Option<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show database and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&data_dir)?;
        } else {
            run_interactive_config(&data_dir)?;
        }
        return Ok(());
    }

    let ctx = AppContext::initialize(Config::load(&data_dir)?).await?;

    let result = match cli.command {
        Commands::Ingest { file } => ingest_file(&ctx, &file).await,
        Commands::Query {
            question,
            limit,
            json,
        } => query(&ctx, &question, limit, json).await,
        Commands::Reindex => reindex(&ctx).await,
        Commands::Check { fix } => check(&ctx, fix).await,
        Commands::Summary { file, json } => summary(&ctx, file.as_deref(), json).await,
        Commands::Status => show_status(&ctx).await,
        Commands::Config { .. } => Ok(()),
    };

    ctx.shutdown()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["log-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.data_dir, None);
        }
    }

    #[test]
    fn ingest_command_with_file() {
        let cli = Cli::try_parse_from(["log-rag", "ingest", "logs/plant.csv"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { file } = parsed.command {
                assert_eq!(file, PathBuf::from("logs/plant.csv"));
            } else {
                panic!("expected ingest command");
            }
        }
    }

    #[test]
    fn query_command_with_options() {
        let cli = Cli::try_parse_from([
            "log-rag",
            "query",
            "Were there pressure drops?",
            "--limit",
            "5",
            "--json",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query {
                question,
                limit,
                json,
            } = parsed.command
            {
                assert_eq!(question, "Were there pressure drops?");
                assert_eq!(limit, Some(5));
                assert!(json);
            } else {
                panic!("expected query command");
            }
        }
    }

    #[test]
    fn query_defaults() {
        let cli = Cli::try_parse_from(["log-rag", "query", "disk"]);
        if let Ok(Cli {
            command: Commands::Query { limit, json, .. },
            ..
        }) = cli
        {
            assert_eq!(limit, None);
            assert!(!json);
        } else {
            panic!("expected query command");
        }
    }

    #[test]
    fn data_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["log-rag", "check", "--fix", "--data-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/rag")));
            assert!(matches!(parsed.command, Commands::Check { fix: true }));
        }
    }

    #[test]
    fn summary_command_defaults() {
        let cli = Cli::try_parse_from(["log-rag", "summary"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Summary { file, json } = parsed.command {
                assert_eq!(file, None);
                assert!(!json);
            } else {
                panic!("expected summary command");
            }
        }
    }

    #[test]
    fn summary_command_with_file_and_json() {
        let cli = Cli::try_parse_from(["log-rag", "summary", "--file", "file_1234abcd", "--json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Summary { file, json } = parsed.command {
                assert_eq!(file.as_deref(), Some("file_1234abcd"));
                assert!(json);
            } else {
                panic!("expected summary command");
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["log-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Config { show: true }));
        }
    }

    #[test]
    fn query_requires_question() {
        let cli = Cli::try_parse_from(["log-rag", "query"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["log-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["log-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
