use std::{error::Error, process, sync::Arc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use artifact_sanity::{
    cli::{Cli, Commands, parse_args},
    config::{Overrides, Settings},
    host::SystemHost,
    sanity::ArtifactSanity,
    verify::VerificationReport,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    if let Err(err) = run(args) {
        error!("{err}");
        eprintln!("artifact-sanity: {err}");
        process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    register_signal_handler()?;

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply(&Overrides::from(args.command.install_args()))?;

    let host = Arc::new(SystemHost::new()?);
    let mut sanity = ArtifactSanity::new(host, settings).with_log_follower(!args.no_follow_logs);

    let reports = match args.command {
        Commands::Select(_) => {
            let (platform, variant) = sanity.select()?;
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "platform": platform.to_string(),
                        "variant": variant.to_string(),
                    })
                );
            } else {
                println!("{variant}");
            }
            return Ok(());
        }
        Commands::Install(_) => vec![sanity.install_and_verify()?],
        Commands::StopStart(_) => vec![sanity.stop_start_and_verify()?],
        Commands::Restart(_) => vec![sanity.restart_and_verify()?],
        Commands::All(_) => vec![
            sanity.install_and_verify()?,
            sanity.stop_start_and_verify()?,
            sanity.restart_and_verify()?,
        ],
    };

    if args.json {
        print_reports(&reports)?;
    }
    info!("All checks passed");
    Ok(())
}

fn print_reports(reports: &[VerificationReport]) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(reports)?);
    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn register_signal_handler() -> Result<(), Box<dyn Error>> {
    ctrlc::set_handler(move || {
        eprintln!("artifact-sanity interrupted, leaving the host as it is");
        process::exit(130);
    })?;

    Ok(())
}
