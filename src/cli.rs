// CLI module - command-line argument parsing and handlers
//
// Session commands run against a `SessionController` that has already
// resumed any stored session. Config commands never touch the network:
// - config --show: Display effective configuration
// - config --reset: Regenerate config file with defaults
// - config --edit: Open config file in $EDITOR
// - config --path: Print config file location

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::process::Command;

use ecoreceipt::chat::{Speaker, SUGGESTED_QUESTIONS};
use ecoreceipt::config::{Config, VERSION};
use ecoreceipt::models::Receipt;
use ecoreceipt::receipts::{ReceiptQuery, SortOrder};
use ecoreceipt::session::{AuthError, SessionController, SessionState};
use ecoreceipt::util::fit_width;

/// EcoReceipt - paperless receipts from the terminal
#[derive(Parser)]
#[command(name = "ecoreceipt")]
#[command(version = VERSION)]
#[command(about = "Command-line client for the EcoReceipt API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show who is signed in
    Status,

    /// Environmental impact, spending and recent receipts
    Dashboard,

    /// List receipts
    Receipts {
        /// Only retailers containing this text (case-insensitive)
        #[arg(long, default_value = "")]
        search: String,

        /// newest, oldest, highest or lowest
        #[arg(long, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
    },

    /// Show one receipt with its line items
    Receipt { id: String },

    /// Delete a receipt
    Delete { id: String },

    /// Scan a receipt (OCR) and save the result
    Scan,

    /// Interactive chat with the Eco Assistant
    Chat,

    /// Ask the Eco Assistant a single question
    Ask { text: String },

    /// Ask one of the suggested questions (1-4); lists them when omitted
    Suggest { number: Option<usize> },

    /// Check that the API is reachable
    Health,

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

impl Commands {
    /// Commands that only make sense with a signed-in session
    fn requires_session(&self) -> bool {
        !matches!(
            self,
            Commands::Login { .. }
                | Commands::Register { .. }
                | Commands::Logout
                | Commands::Status
                | Commands::Health
                | Commands::Config { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session commands
// ─────────────────────────────────────────────────────────────────────────────

pub async fn run(command: Commands, ctl: &mut SessionController) -> Result<()> {
    // Resume may already have hit a 401
    report_teardown(ctl);

    if command.requires_session() && !ctl.is_active() {
        bail!("Not signed in. Run `ecoreceipt login` first.");
    }

    let result = dispatch(command, ctl).await;
    report_teardown(ctl);
    result
}

fn report_teardown(ctl: &mut SessionController) {
    if ctl.take_teardown() {
        eprintln!("Your session has expired. Run `ecoreceipt login` to sign in again.");
    }
}

async fn dispatch(command: Commands, ctl: &mut SessionController) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let email = value_or_prompt(email, "Email")?;
            let password = value_or_prompt(password, "Password")?;
            report_auth(ctl.login(&email, &password).await)
        }
        Commands::Register {
            email,
            password,
            name,
        } => {
            let name = value_or_prompt(name, "Name")?;
            let email = value_or_prompt(email, "Email")?;
            let password = value_or_prompt(password, "Password")?;
            report_auth(ctl.register(&email, &password, &name).await)
        }
        Commands::Logout => {
            ctl.logout();
            println!("Signed out.");
            Ok(())
        }
        Commands::Status => {
            match ctl.state() {
                SessionState::Active(session) => {
                    println!("Signed in as {} (id {})", session.display_name, session.user_id);
                    if let Some(email) = &session.email {
                        println!("Email: {}", email);
                    }
                }
                _ => println!("Not signed in."),
            }
            Ok(())
        }
        Commands::Dashboard => {
            print_dashboard(ctl);
            Ok(())
        }
        Commands::Receipts { search, sort } => {
            let query = ReceiptQuery::new(search, sort);
            let receipts = query.apply(ctl.dashboard().receipts());
            if receipts.is_empty() {
                println!("No receipts found.");
            } else {
                print_receipt_table(&receipts);
            }
            Ok(())
        }
        Commands::Receipt { id } => {
            let receipt = ctl
                .call(|api| async move { api.get_receipt(&id).await })
                .await?;
            match receipt {
                Some(receipt) => print_receipt(&receipt),
                None => println!("Receipt not found."),
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let target = id.clone();
            let deleted = ctl
                .call(|api| async move { api.delete_receipt(&target).await })
                .await?;
            if deleted {
                println!("Deleted receipt {}.", id);
                ctl.refresh_dashboard().await;
            } else {
                println!("Receipt {} not found.", id);
            }
            Ok(())
        }
        Commands::Scan => scan(ctl).await,
        Commands::Chat => chat_loop(ctl).await,
        Commands::Ask { text } => {
            match ctl.send_chat(&text).await {
                Some(reply) => println!("{}", reply),
                None => bail!("Nothing to ask."),
            }
            Ok(())
        }
        Commands::Suggest { number } => {
            let Some(number) = number else {
                for (i, question) in SUGGESTED_QUESTIONS.iter().enumerate() {
                    println!("{}. {}", i + 1, question);
                }
                return Ok(());
            };
            let Some(question) = number.checked_sub(1).and_then(|i| SUGGESTED_QUESTIONS.get(i))
            else {
                bail!(
                    "Pick a suggestion between 1 and {}",
                    SUGGESTED_QUESTIONS.len()
                );
            };
            println!("> {}", question);
            if let Some(reply) = ctl.suggest_question(question).await {
                println!("{}", reply);
            }
            Ok(())
        }
        Commands::Health => {
            let health = ctl.api().health().await.context("API is not reachable")?;
            println!("{}: {}", health.status, health.message);
            Ok(())
        }
        Commands::Config {
            show,
            reset,
            edit,
            path,
        } => {
            handle_config(show, reset, edit, path);
            Ok(())
        }
    }
}

fn report_auth<T>(result: Result<T, AuthError>) -> Result<()> {
    match result {
        Ok(_) => {
            println!("Signed in.");
            Ok(())
        }
        Err(AuthError::Rejected(detail)) => bail!("Sign-in failed: {}", detail),
        Err(e) => Err(e).context("Sign-in failed"),
    }
}

async fn scan(ctl: &mut SessionController) -> Result<()> {
    let ocr = ctl
        .call(|api| async move { api.process_receipt_ocr().await })
        .await?;
    let Some(ocr) = ocr else {
        bail!("Scanning failed.");
    };
    if !ocr.message.is_empty() {
        println!("{}", ocr.message);
    }

    let draft = ocr.parsed_receipt;
    let created = ctl
        .call(|api| async move { api.create_receipt(&draft).await })
        .await?;
    let Some(receipt) = created else {
        bail!("Could not save the scanned receipt.");
    };

    print_receipt(&receipt);
    ctl.refresh_dashboard().await;
    Ok(())
}

async fn chat_loop(ctl: &mut SessionController) -> Result<()> {
    if let Some(turn) = ctl.transcript().last() {
        println!("{}", turn.text);
    }
    println!("(empty line or Ctrl-D to quit)");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            break;
        }

        if let Some(reply) = ctl.send_chat(text).await {
            println!("{}", reply);
        }
        if !ctl.is_active() {
            break;
        }
    }

    let questions = ctl
        .transcript()
        .turns()
        .iter()
        .filter(|turn| turn.speaker == Speaker::User)
        .count();
    tracing::debug!("Chat ended after {} questions", questions);
    Ok(())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    eprint!("{}: ", label);
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))?;
    let input = input.trim().to_string();
    if input.is_empty() {
        bail!("{} is required", label);
    }
    Ok(input)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_dashboard(ctl: &SessionController) {
    let dashboard = ctl.dashboard();

    match dashboard.impact() {
        Some(impact) => {
            println!("Environmental impact");
            println!("  Trees saved:   {:.2}", impact.trees_saved);
            println!("  Water saved:   {:.1} L", impact.water_saved_liters);
            println!("  CO2 reduced:   {:.2} kg", impact.co2_reduced_kg);
        }
        None => println!("Environmental impact: unavailable"),
    }
    println!();

    match dashboard.analytics() {
        Some(analytics) => {
            println!("Spending: ${:.2} total", analytics.total_spent);
            for (category, amount) in analytics.top_categories() {
                println!("  {} ${:>9.2}", fit_width(category, 20), amount);
            }
        }
        None => println!("Spending: unavailable"),
    }
    println!();

    let query = ReceiptQuery::default();
    let recent: Vec<&Receipt> = query
        .apply(dashboard.receipts())
        .into_iter()
        .take(5)
        .collect();
    println!("Recent receipts ({} total)", dashboard.receipts().len());
    if !recent.is_empty() {
        print_receipt_table(&recent);
    }

    if let Some(at) = dashboard.refreshed_at() {
        println!();
        println!("Updated {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

fn print_receipt_table(receipts: &[&Receipt]) {
    println!(
        "{}  {}  {}  {}  {:>10}",
        fit_width("ID", 10),
        fit_width("DATE", 10),
        fit_width("RETAILER", 24),
        fit_width("CATEGORY", 14),
        "TOTAL"
    );
    for receipt in receipts {
        println!(
            "{}  {}  {}  {}  {:>10}",
            fit_width(&receipt.id, 10),
            fit_width(&receipt.date, 10),
            fit_width(&receipt.retailer, 24),
            fit_width(&receipt.category, 14),
            format!("${:.2}", receipt.total)
        );
    }
}

fn print_receipt(receipt: &Receipt) {
    println!("{} ({})", receipt.retailer, receipt.category);
    println!("{} {}  id {}", receipt.date, receipt.time, receipt.id);
    println!("{} items", receipt.unit_count());
    println!();
    for item in &receipt.line_items {
        println!(
            "  {} x{:<3} ${:>8.2}",
            fit_width(&item.name, 28),
            item.quantity,
            item.unit_price * f64::from(item.quantity)
        );
    }
    println!();
    println!("  {} ${:>8.2}", fit_width("Subtotal", 33), receipt.subtotal);
    println!("  {} ${:>8.2}", fit_width("Tax", 33), receipt.tax);
    println!("  {} ${:>8.2}", fit_width("Total", 33), receipt.total);
    if !receipt.is_balanced() {
        tracing::warn!("Receipt {} totals do not add up", receipt.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config commands
// ─────────────────────────────────────────────────────────────────────────────

pub fn handle_config(show: bool, reset: bool, edit: bool, path: bool) {
    if path {
        handle_config_path();
    } else if show {
        handle_config_show();
    } else if reset {
        handle_config_reset();
    } else if edit {
        handle_config_edit();
    } else {
        println!("Usage: ecoreceipt config [--show|--reset|--edit|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --edit    Open config file in $EDITOR");
        println!("  --path    Show config file path");
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return;
        }
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}

fn handle_config_edit() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "nano".to_string()
            }
        });

    println!("Opening {} with {}", path.display(), editor);

    match Command::new(&editor).arg(&path).status() {
        Ok(s) if s.success() => {}
        Ok(s) => {
            eprintln!("Editor exited with status: {}", s);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to launch editor '{}': {}", editor, e);
            eprintln!("Set $EDITOR environment variable to your preferred editor");
            std::process::exit(1);
        }
    }
}
