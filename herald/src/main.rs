use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use fanout::{Attachment, DispatchReport, NotificationRequest};
use tracing::{error, info};

use herald::Error;
use herald::cli::{Args, Commands, OutputFormat};
use herald::config::AppConfig;
use herald::logging::{LoggingOptions, init_logging};
use herald::output::{CheckReport, render_check, render_outcome};
use herald::service::{NotificationService, Outcome};
use herald::utils::filename::attachment_basename;

const EXIT_ERROR: u8 = 1;
const EXIT_CHANNEL_FAILURE: u8 = 2;

const EXPECTED_EVENT_NAME: &str = "repository_dispatch";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match init_logging(&LoggingOptions {
        verbose: args.verbose,
        json: args.json_logs,
        log_dir: args.log_dir.clone(),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            if let (OutputFormat::Json, Some(Error::Dispatch(dispatch))) =
                (args.output, e.downcast_ref::<Error>())
            {
                let report = DispatchReport::rejected(dispatch);
                if let Ok(text) = serde_json::to_string_pretty(&report) {
                    println!("{text}");
                }
            }
            error!("{:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let config = AppConfig::from_env()?;

    let outcome = match &args.command {
        Commands::Check => {
            let statuses = config.channels.statuses();
            let report = CheckReport {
                channels: &statuses,
                issues: config.validate(),
                credentials: config.credentials(),
            };
            print!("{}", render_check(&report, args.output)?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Send {
            title,
            content,
            source,
            attachments,
        } => {
            let mut request = NotificationRequest::new(title, content);
            if let Some(source) = source {
                request = request.with_source(source);
            }
            for path in attachments {
                request = request.with_attachment(read_attachment(path).await?);
            }
            warn_on_issues(&config);
            NotificationService::new(&config).send(request).await?
        }
        Commands::Event { path } => {
            if let Ok(name) = std::env::var("GITHUB_EVENT_NAME")
                && !name.is_empty()
                && name != EXPECTED_EVENT_NAME
            {
                bail!("unsupported event {name:?}, expected {EXPECTED_EVENT_NAME}");
            }
            let path = path
                .clone()
                .context("no event file given and GITHUB_EVENT_PATH is not set")?;
            let request = read_event(&path, &config).await?;
            warn_on_issues(&config);
            NotificationService::new(&config).handle_event(request).await?
        }
    };

    print!("{}", render_outcome(&outcome, args.output)?);

    let failed = matches!(&outcome, Outcome::Delivered { report } if report.failed_count > 0);
    if failed && args.strict {
        return Ok(ExitCode::from(EXIT_CHANNEL_FAILURE));
    }
    Ok(ExitCode::SUCCESS)
}

fn warn_on_issues(config: &AppConfig) {
    for issue in config.validate() {
        tracing::warn!(key = %issue.key, "{}", issue.message);
    }
}

async fn read_event(path: &Path, config: &AppConfig) -> anyhow::Result<NotificationRequest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading event file {}", path.display()))?;
    info!(path = %path.display(), "Processing event");
    Ok(herald::payload::from_json_str(&text, &config.behavior.attachments_dir).await?)
}

async fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading attachment {}", path.display()))?;
    let name = attachment_basename(&path.to_string_lossy())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    Ok(Attachment::new(name, data))
}
