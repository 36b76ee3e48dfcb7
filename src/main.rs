use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::net::SocketAddr;
use std::process;
use tokio::io::AsyncReadExt;

use portsweep::{
    bot::TelegramBot,
    config::{BotConfig, MalformedLinePolicy, ScanConfig},
    health::HealthServer,
    output::StdoutSink,
    scanner::ScanEngine,
    ScanError,
};

fn cli() -> Command {
    Command::new("portsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Batched TCP liveness sweeps over CIDR ranges")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Load scan settings from a TOML file (default: ~/.portsweep.toml)")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("TCP port probed on every address [default: 8080]")
                .value_parser(clap::value_parser!(u16))
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Connect timeout per probe in milliseconds [default: 1000]")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("concurrency")
                .short('b')
                .long("concurrency")
                .value_name("N")
                .help("Probes in flight at once [default: 100]")
                .value_parser(clap::value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("flush")
                .long("flush")
                .value_name("N")
                .help("Live hosts per reply chunk, at most 100 [default: 20]")
                .value_parser(clap::value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("max-targets")
                .long("max-targets")
                .value_name("N")
                .help("Largest number of addresses one request may expand to [default: 65536]")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("skip-malformed")
                .long("skip-malformed")
                .help("Skip unparseable lines instead of rejecting the request")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan targets once and print live hosts")
                .arg(
                    Arg::new("targets")
                        .value_name("TARGET")
                        .help("CIDR ranges or addresses; read from stdin when omitted")
                        .num_args(0..),
                )
                .arg(
                    Arg::new("greppable")
                        .short('g')
                        .long("greppable")
                        .help("Only print live addresses, one per line")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the scan summary as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("bot")
                .about("Serve scan requests over Telegram (needs TELEGRAM_TOKEN)"),
        )
}

/// Config file first, then command line overrides
fn scan_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(&port) = matches.get_one::<u16>("port") {
        config = config.with_port(port);
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config = config.with_timeout(timeout);
    }
    if let Some(&concurrency) = matches.get_one::<usize>("concurrency") {
        config = config.with_concurrency(concurrency);
    }
    if let Some(&flush) = matches.get_one::<usize>("flush") {
        config = config.with_flush_threshold(flush);
    }
    if let Some(&max_targets) = matches.get_one::<u64>("max-targets") {
        config = config.with_max_targets(max_targets);
    }
    if matches.get_flag("skip-malformed") {
        config = config.with_malformed_lines(MalformedLinePolicy::Skip);
    }

    config.validate()?;
    Ok(config)
}

async fn run_scan(matches: &ArgMatches, config: ScanConfig) -> anyhow::Result<()> {
    let raw_text = match matches.get_many::<String>("targets") {
        Some(targets) => targets.cloned().collect::<Vec<_>>().join("\n"),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("reading targets from stdin")?;
            input
        }
    };

    let greppable = matches.get_flag("greppable");
    if !greppable {
        println!(
            "{} port {} | {} at a time | {}ms timeout",
            "[~]".bright_blue(),
            config.port.to_string().bright_cyan().bold(),
            config.concurrency,
            config.timeout
        );
    }

    let engine = ScanEngine::new(config)?;
    let mut sink = StdoutSink::new(greppable);
    let summary = engine.run(&raw_text, &mut sink).await?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string(&summary)?);
    } else if !greppable {
        println!("{} {}", "[~]".bright_blue(), summary);
    }
    Ok(())
}

async fn run_bot(config: ScanConfig) -> anyhow::Result<()> {
    let bot_config = match BotConfig::from_env() {
        Ok(bot_config) => bot_config,
        Err(e) => {
            log::error!("FATAL ERROR: {}", e);
            process::exit(1);
        }
    };

    let health = HealthServer::bind(SocketAddr::from(([0, 0, 0, 0], bot_config.health_port)))
        .context("starting health check server")?;

    let bot = TelegramBot::new(&bot_config.token, config)?;
    log::info!("Fast Bot is running...");

    tokio::select! {
        result = bot.run() => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }

    tokio::task::spawn_blocking(move || health.shutdown()).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();

    let result = match scan_config(&matches) {
        Ok(config) => match matches.subcommand() {
            Some(("scan", sub)) => run_scan(sub, config).await,
            Some(("bot", _)) => run_bot(config).await,
            _ => unreachable!("subcommand is required"),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if !already_reported(&e) {
            log::error!("{:#}", e);
        }
        process::exit(1);
    }
}

/// Input errors were already printed as the scan's error reply
fn already_reported(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<ScanError>(), Some(e) if e.is_input_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let matches = cli()
            .try_get_matches_from([
                "portsweep",
                "--config",
                "/nonexistent/portsweep.toml",
                "scan",
                "10.0.0.0/30",
            ])
            .unwrap();
        assert!(scan_config(&matches).is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        let config_path = file.path().to_str().unwrap();
        let matches = cli()
            .try_get_matches_from([
                "portsweep",
                "--config",
                config_path,
                "scan",
                "-p",
                "22",
                "--concurrency",
                "2",
                "--flush",
                "10",
                "--skip-malformed",
                "--json",
                "10.0.0.0/30",
                "8.8.8.8",
            ])
            .unwrap();
        let config = scan_config(&matches).unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.flush_threshold, 10);
        assert_eq!(config.timeout, 1000);
        assert_eq!(config.malformed_lines, MalformedLinePolicy::Skip);

        let (_, sub) = matches.subcommand().unwrap();
        let targets: Vec<&String> = sub.get_many::<String>("targets").unwrap().collect();
        assert_eq!(targets, ["10.0.0.0/30", "8.8.8.8"]);
        assert!(sub.get_flag("json"));
    }

    #[test]
    fn test_input_errors_are_not_logged_twice() {
        let input: anyhow::Error = ScanError::InvalidTarget("not-an-ip".to_string()).into();
        assert!(already_reported(&input));

        let empty: anyhow::Error = ScanError::EmptyRequest.into();
        assert!(already_reported(&empty));

        let network: anyhow::Error = ScanError::NetworkError("reset".to_string()).into();
        assert!(!already_reported(&network));

        assert!(!already_reported(&anyhow::anyhow!("reading targets from stdin")));
    }
}
