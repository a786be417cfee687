mod cli;

use std::io::Write;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use vulnrelay::config::{HttpOptions, UploadTarget};
use vulnrelay::error::EXIT_CONFIG;
use vulnrelay::output;
use vulnrelay::secret::Secret;
use vulnrelay::{Relay, RunConfig};

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(args.verbose.tracing_level_filter().into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_config(args: &Cli) -> RunConfig {
    RunConfig {
        pipeline_file: args.pipeline.clone(),
        workdir: args.workdir.clone(),
        target: UploadTarget {
            backend_url: args.backend_url.clone(),
            token: Secret::new(args.backend_token.clone()),
            product_name: args.product_name.clone(),
            engagement_name: args.engagement_name.clone(),
            tags: args.tags.clone(),
            test_id: args.test_id.clone().filter(|t| !t.is_empty()),
        },
        http: HttpOptions {
            timeout: Duration::from_secs(args.http_timeout),
            upload_retries: args.upload_retries,
            ..Default::default()
        },
    }
}

async fn run(args: Cli) -> anyhow::Result<i32> {
    let relay = match Relay::prepare(run_config(&args), |key| std::env::var(key).ok()) {
        Ok(relay) => relay,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(EXIT_CONFIG);
        }
    };

    if args.check {
        let mut stdout = std::io::stdout().lock();
        output::write_plan(relay.pipeline(), &mut stdout)?;
        stdout.flush()?;
        return Ok(0);
    }

    let report = relay.run().await;

    let mut stdout = std::io::stdout().lock();
    output::formatter(args.json).write_report(&report, &mut stdout)?;
    stdout.flush()?;

    if let Some(err) = &report.failure {
        eprintln!("error: {err}");
    }
    Ok(report.exit_code())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}
