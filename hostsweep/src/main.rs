use clap::ArgMatches;
use colored::Colorize;
use hostsweep::command_argument_builder;
use hostsweep::handlers::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(quiet))),
        )
        .with_target(false)
        .init();

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    if let Err(e) = dispatch(&chosen_command, quiet).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

fn default_filter(quiet: bool) -> &'static str {
    if quiet { "warn" } else { "info" }
}

async fn dispatch(matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let db = db_path(matches);
    match matches.subcommand() {
        Some(("init", primary_command)) => handle_init(&db, primary_command),
        Some(("wordlist", primary_command)) => match primary_command.subcommand() {
            Some(("add", secondary_command)) => handle_wordlist_add(&db, secondary_command),
            Some(("list", secondary_command)) => handle_wordlist_list(&db, secondary_command),
            Some(("default", secondary_command)) => handle_wordlist_default(&db, secondary_command),
            Some(("dedupe", secondary_command)) => handle_wordlist_dedupe(&db, secondary_command),
            Some(("remove", secondary_command)) => handle_wordlist_remove(&db, secondary_command),
            Some(("orphans", secondary_command)) => {
                handle_wordlist_orphans(&db, secondary_command)
            }
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("run", primary_command)) => handle_run(&db, primary_command, quiet).await,
        Some(("status", primary_command)) => handle_status(&db, primary_command),
        Some(("results", primary_command)) => handle_results(&db, primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
