mod config;
mod coordinator;
mod editor;
mod gateway;
mod intake;
mod logging;
mod models;
mod reconcile;
mod tui;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use coordinator::{Coordinator, Stage};
use gateway::{BackendGateway, HttpGateway};
use models::ContactRecord;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Draft, review and send personalized outreach from the terminal")]
struct Cli {
    /// Backend base URL (overrides config file and OUTREACH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the outreach board (default)
    Tui,

    /// Enrich one person and print the drafted record
    Add {
        /// Pasted person info
        text: Option<String>,

        /// Read the person info from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },

    /// List the people the backend finds for a company page
    Company {
        /// Company LinkedIn URL
        url: String,

        /// Company email domain
        #[arg(short, long, default_value = "")]
        domain: String,
    },

    /// List completed outreach
    Completed,

    /// Send outreach for a record saved as JSON
    Send {
        /// Path to the record JSON (as printed by `add --json`)
        record: PathBuf,

        /// File whose contents replace the email body
        #[arg(short, long)]
        body: Option<PathBuf>,
    },

    /// Show the resolved configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = Config::load(cli.config.as_deref(), cli.api_url.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Tui);

    // The board owns the terminal, so its logs go to a file
    let _guard = match command {
        Commands::Tui => Some(logging::init_file(&config.log_path())?),
        _ => {
            logging::init_stderr();
            None
        }
    };

    if let Commands::Config = command {
        println!("Config file: {}", config_path.display());
        if !config_path.exists() {
            println!("(not found, using defaults)");
        }
        println!("Log file: {}\n", config.log_path().display());
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let gateway = HttpGateway::new(&config.api_url, config.request_timeout())
        .with_context(|| format!("Invalid backend URL: {}", config.api_url))?;
    tracing::debug!(base = %gateway.base_url(), "using backend");

    match command {
        Commands::Tui | Commands::Config => {
            let gateway: Arc<dyn BackendGateway> = Arc::new(gateway);
            tui::run_board(
                runtime.handle().clone(),
                gateway,
                &config.api_url,
                config.refresh_interval(),
            )?;
        }

        Commands::Add { text, file, json } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => return Err(anyhow!("Provide person info as an argument or with --file")),
            };
            if text.trim().is_empty() {
                return Err(anyhow!("Person info is empty"));
            }

            println!("Gathering information (this can take a minute)...");
            let mut outreach = Coordinator::new();
            let id = outreach.create_draft_input_entry();
            runtime.block_on(outreach.submit_draft_input_entry(&gateway, &id, &text));
            check(&outreach)?;

            let record = outreach
                .review()
                .first()
                .ok_or_else(|| anyhow!("Backend returned no record"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                print_record(record);
            }
        }

        Commands::Company { url, domain } => {
            let mut outreach = Coordinator::new();
            runtime.block_on(outreach.submit_company_batch(&gateway, &url, &domain));
            check(&outreach)?;

            let drafts = outreach.drafts();
            if drafts.is_empty() {
                println!("No people found.");
            } else {
                println!("{:<4} {:<30} {:<50}", "#", "NAME", "PROFILE");
                println!("{}", "-".repeat(84));
                for (i, draft) in drafts.iter().enumerate() {
                    let preview = intake::preview(&draft.text);
                    println!(
                        "{:<4} {:<30} {:<50}",
                        i + 1,
                        intake::truncate_chars(preview.name.as_deref().unwrap_or("-"), 28),
                        intake::truncate_chars(preview.profile_link.as_deref().unwrap_or("-"), 50)
                    );
                }
            }
        }

        Commands::Completed => {
            let mut outreach = Coordinator::new();
            runtime.block_on(outreach.refresh_completed(&gateway));
            // Refresh failures only reach the log
            if outreach.last_refresh().is_none() {
                return Err(anyhow!("Failed to fetch completed records"));
            }

            let records = outreach.completed();
            if records.is_empty() {
                println!("No completed outreach.");
            } else {
                println!("{:<26} {:<20} {:<30} {:<4}", "NAME", "DOMAIN", "EMAILED", "DM");
                println!("{}", "-".repeat(84));
                for record in records {
                    let emailed = record.email_sent.as_deref().unwrap_or_default().join(", ");
                    let dm = match record.twitter_message_sent {
                        Some(true) => "yes",
                        _ => "no",
                    };
                    println!(
                        "{:<26} {:<20} {:<30} {:<4}",
                        intake::truncate_chars(record.display_name(), 24),
                        intake::truncate_chars(&record.effective_domain().unwrap_or_default(), 18),
                        intake::truncate_chars(&emailed, 28),
                        dm
                    );
                }
            }
        }

        Commands::Send { record, body } => {
            let text = std::fs::read_to_string(&record)
                .with_context(|| format!("Failed to read {}", record.display()))?;
            let person: ContactRecord = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a contact record", record.display()))?;

            let final_body = match body {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?
                    .trim_end()
                    .to_string(),
                None => person.body().unwrap_or_default().to_string(),
            };

            let mut outreach = Coordinator::new();
            let key = outreach.adopt_for_review(person);
            check(&outreach)?;
            let key = key.ok_or_else(|| anyhow!("Record could not be loaded for review"))?;

            runtime.block_on(outreach.confirm_send(&gateway, &key, &final_body));
            check(&outreach)?;

            if let Some(notice) = outreach.notice() {
                println!("{}", notice);
            }
            if outreach.stage_of(&key) != Some(Stage::Completed) {
                println!("Not fully delivered; the record stays in review.");
            }
        }
    }

    Ok(())
}

fn print_record(record: &ContactRecord) {
    println!("Name: {}", record.display_name());
    if let Some(domain) = record.effective_domain() {
        println!("Domain: {}", domain);
    }
    if let Some(link) = &record.profile_link {
        println!("LinkedIn: {}", link);
    }
    if let Some(handle) = &record.twitter_handle {
        println!("Twitter: @{}", handle.trim_start_matches('@'));
    }
    if !record.possible_emails.is_empty() {
        println!("Possible emails: {}", record.possible_emails.join(", "));
    }
    if let Some(insights) = &record.insights {
        println!("\n--- Insights ---\n{}", textwrap::fill(insights, 80));
    }
    match record.body() {
        Some(body) => println!("\n--- Email Draft ---\n{}", body),
        None => println!("\n(no email draft returned)"),
    }
}

/// Turns whatever landed in the coordinator's error slot into a command failure.
fn check(outreach: &Coordinator) -> Result<()> {
    match outreach.error() {
        Some(error) => Err(anyhow!("{}", error)),
        None => Ok(()),
    }
}
