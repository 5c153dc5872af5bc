use clap::{arg, command};

pub const DEFAULT_DB_PATH: &str = "~/.config/hostsweep/hostsweep.db";

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("hostsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("hostsweep")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Location of the hostsweep database")
                .default_value(DEFAULT_DB_PATH),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Creates the hostsweep database and installs the default wordlist")
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing database without asking")
                        .required(false),
                ),
        )
        .subcommand(
            command!("wordlist")
                .about("Manage stored wordlists")
                .subcommand_required(true)
                .subcommand(
                    command!("add")
                        .about("Import a wordlist file")
                        .arg(
                            arg!(<FILE>)
                                .help("Path of the wordlist to import")
                                .value_parser(clap::value_parser!(std::path::PathBuf)),
                        )
                        .arg(
                            arg!(-n --"name" <NAME>)
                                .required(false)
                                .help("Display name (default: the file name)"),
                        )
                        .arg(
                            arg!(--"type" <TYPE>)
                                .required(false)
                                .help("Wordlist type")
                                .value_parser(["subdomain", "username", "password"])
                                .default_value("subdomain"),
                        )
                        .arg(
                            arg!(--"default")
                                .required(false)
                                .help("Make this the default list of its type")
                                .action(clap::ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    command!("list").about("List stored wordlists").arg(
                        arg!(--"type" <TYPE>)
                            .required(false)
                            .help("Only show lists of this type")
                            .value_parser(["subdomain", "username", "password"]),
                    ),
                )
                .subcommand(
                    command!("default")
                        .about("Make a wordlist the default of its type")
                        .arg(arg!(<ID>).value_parser(clap::value_parser!(i64))),
                )
                .subcommand(
                    command!("dedupe")
                        .about("Remove repeated entries from a wordlist in place")
                        .arg(arg!(<ID>).value_parser(clap::value_parser!(i64))),
                )
                .subcommand(
                    command!("remove")
                        .about("Delete a wordlist record and its file")
                        .arg(arg!(<ID>).value_parser(clap::value_parser!(i64)))
                        .arg(
                            arg!(--"keep-file")
                                .required(false)
                                .help("Leave the file on disk")
                                .action(clap::ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    command!("orphans")
                        .about("Find wordlist files that no record points at")
                        .arg(
                            arg!(--"delete")
                                .required(false)
                                .help("Delete the files that were found")
                                .action(clap::ArgAction::SetTrue),
                        ),
                ),
        )
        .subcommand(
            command!("run")
                .about(
                    "Enumerate subdomains of a domain: DNS pre-filter, then HEAD, OPTIONS and \
                limited GET probing",
                )
                .arg(
                    arg!(-d --"domain" <DOMAIN>)
                        .required(true)
                        .help("The base domain to enumerate"),
                )
                .arg(
                    arg!(-w --"wordlist" <ID>)
                        .required(false)
                        .help("Wordlist id (default: the default subdomain list)")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum concurrent requests (default: MAX_CONCURRENT_REQUESTS or 50)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"batch-size" <SIZE>)
                        .required(false)
                        .help("Candidates per batch")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"no-get-fallback")
                        .required(false)
                        .help("Never fall back to a limited GET")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"dns" <BACKEND>)
                        .required(false)
                        .help("DNS pre-filter backend")
                        .value_parser(["resolver", "system", "static", "off"]),
                )
                .arg(
                    arg!(--"resolve" <HOST_ADDR>)
                        .required(false)
                        .help("Pin a host to an address, host=ip[:port] (repeatable)")
                        .action(clap::ArgAction::Append),
                ),
        )
        .subcommand(
            command!("status")
                .about("Show a run, or the most recent runs")
                .arg(
                    arg!([RUN_ID])
                        .required(false)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(
            command!("results")
                .about("Report the live hosts of a run")
                .arg(arg!(<RUN_ID>).value_parser(clap::value_parser!(i64)))
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
