use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use mail_triage::auth::token_manager::TokenManager;
use mail_triage::config::{Config, default_config_path, load_config, write_template};
use mail_triage::daemon::{DaemonConfig, Scheduler};
use mail_triage::health;
use mail_triage::mail::gmail::GmailClient;
use mail_triage::notify::build_sink;
use mail_triage::rules::classifier::Classifier;
use mail_triage::store::state::StateStore;
use mail_triage::store::stats::StatsStore;

#[derive(Parser)]
#[command(name = "mail-triage")]
#[command(about = "Watch a mailbox, categorize new mail, notify and auto-reply", long_about = None)]
struct Cli {
    /// Config file (defaults to the per-user config dir when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling service until interrupted
    Run,

    /// Authenticate and run a single cycle
    Once,

    /// Exit 0 if the last completed cycle is recent enough, 1 otherwise
    Health,

    /// Print a JSON summary of the persisted state and stats
    Status,

    /// Show which category the rule table assigns
    Classify {
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        snippet: String,
        #[arg(long, default_value = "")]
        sender: String,
    },

    /// Write a template config file
    InitConfig {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let load = || {
        load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e:#}"))
    };

    match cli.cmd {
        Command::Run => serve(load()?, false),
        Command::Once => serve(load()?, true),

        Command::Health => {
            let cfg = load()?;
            let h = health::check(&cfg, Utc::now());
            println!("{h}");
            std::process::exit(if h.is_ok() { 0 } else { 1 });
        }

        Command::Status => {
            let cfg = load()?;
            let s = health::summary(
                &cfg.state_path(),
                &cfg.stats_path(),
                cfg.stale_after(),
                Utc::now(),
            );
            println!("{}", serde_json::to_string_pretty(&s)?);
            Ok(())
        }

        Command::Classify {
            subject,
            snippet,
            sender,
        } => {
            let cfg = load()?;
            let classifier = Classifier::new(cfg.rule_table()?);
            println!("{}", classifier.classify(&subject, &snippet, &sender));
            Ok(())
        }

        Command::InitConfig { path } => {
            let path = path.or(cli.config.clone()).unwrap_or_else(default_config_path);
            write_template(&path)?;
            println!("Wrote template config to {}", path.display());
            Ok(())
        }
    }
}

fn serve(cfg: Config, once: bool) -> Result<()> {
    let classifier = Classifier::new(cfg.rule_table()?);
    let gmail = GmailClient::new(
        Box::new(TokenManager::from_config(&cfg)),
        cfg.request_timeout(),
    )?;
    let sink = build_sink(&cfg)?;
    let (state, _) = StateStore::load(cfg.state_path());
    let (stats, _) = StatsStore::load(cfg.stats_path());

    log::info!("Mail triage service starting");
    log::info!(
        "Webhook notifications: {}",
        if cfg.webhook_url.is_empty() {
            "disabled"
        } else {
            "enabled"
        }
    );

    let mut scheduler = Scheduler::new(
        &gmail,
        sink.as_ref(),
        &classifier,
        state,
        stats,
        DaemonConfig {
            interval: cfg.check_interval(),
            max_results: cfg.max_results,
            reply_from: cfg.reply_from.clone(),
        },
    );

    if once {
        scheduler.authenticate()?;
        let report = scheduler.run_cycle()?;
        log::info!(
            "Cycle done: {} listed, {} dispatched",
            report.listed,
            report.dispatched.len()
        );
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    scheduler.run(&running)
}
