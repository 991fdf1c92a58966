use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

use mail_triage::classify::gemini::GeminiClassifier;
use mail_triage::config::{Config, load_config, load_settings, resolve_db_path};
use mail_triage::mail::imap_client::{ImapConnector, ImapFetcher};
use mail_triage::pipeline::Pipeline;
use mail_triage::store::repo::EmailRepository;
use mail_triage::store::sqlite::EmailStore;
use mail_triage::web::{App, serve};

#[derive(Parser)]
#[command(name = "mail_triage")]
#[command(about = "Classify recent inbox mail with an LLM and list it by urgency", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web page (default)
    Serve {
        /// Address to listen on, overrides bind_addr from the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one fetch/classify/store cycle and exit
    Sync {
        /// How many of the newest messages to fetch, overrides fetch_limit
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print stored emails in priority order
    List,

    /// Delete every stored email
    ClearDb,
}

type ImapPipeline = Pipeline<ImapFetcher<ImapConnector>, GeminiClassifier>;

fn build_pipeline(cfg: &Config) -> Result<ImapPipeline> {
    let fetcher = ImapFetcher::new(
        ImapConnector::from_config(cfg),
        cfg.settings.mailbox.clone(),
        cfg.settings.search_query.clone(),
    );
    Ok(Pipeline::new(fetcher, GeminiClassifier::from_config(cfg)?))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.cmd.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = EmailStore::open(&resolve_db_path(&cfg.settings)?)?;
            let addr = bind.unwrap_or_else(|| cfg.settings.bind_addr.clone());
            let mut app = App::new(build_pipeline(&cfg)?, store, cfg.settings.fetch_limit)?;
            serve(&mut app, &addr)
        }

        Command::Sync { limit } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let mut store = EmailStore::open(&resolve_db_path(&cfg.settings)?)?;
            let report = build_pipeline(&cfg)?
                .run_cycle(&mut store, limit.unwrap_or(cfg.settings.fetch_limit))?;
            println!("{report}");
            Ok(())
        }

        Command::List => {
            let settings = load_settings().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = EmailStore::open(&resolve_db_path(&settings)?)?;
            for e in store.list_all_ordered()? {
                println!(
                    "[{:<6}] {}  {:<26} {} | {}",
                    e.urgency.as_str(),
                    e.received_date,
                    e.category.label(),
                    e.sender,
                    e.summary
                );
            }
            Ok(())
        }

        Command::ClearDb => {
            let settings = load_settings().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = EmailStore::open(&resolve_db_path(&settings)?)?;
            let removed = store.clear_all()?;
            println!("Database cleared ({removed} rows)");
            Ok(())
        }
    }
}
