use clap::Parser;
use tokio_util::sync::CancellationToken;

use polyjudge::config::CliArgs;
use polyjudge::passk::{self, Metrics};
use polyjudge::problem::load_problems;
use polyjudge::{open_store, run_benchmark};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config()?;

    if cli.flush_data {
        let store = open_store(&config)?;
        store.flush()?;
    }

    let metrics = if cli.reduce_only {
        let store = open_store(&config)?;
        passk::reduce_store(&store, &config.k)?
    } else {
        let Some(path) = &cli.problems_path else {
            if cli.flush_data {
                return Ok(());
            }
            anyhow::bail!("No problems given, pass --problems or --reduce-only");
        };
        let problems = load_problems(path)?;
        log::info!("Loaded {} problems from {path}", problems.len());

        let shutdown_token = CancellationToken::new();
        let benchmark = run_benchmark(&config, problems, shutdown_token.clone());
        tokio::pin!(benchmark);

        // ======= EXECUTION START, WAITING FOR COMPLETION OR SHUTDOWN ======

        let outcome = tokio::select! {
            res = &mut benchmark => res,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl-c received, shutting down...");
                shutdown_token.cancel();
                benchmark.await
            }
        };
        let (_, metrics) = outcome?;
        metrics
    };

    report(&metrics, cli.output.as_deref())?;
    log::info!("Done");
    Ok(())
}

fn report(metrics: &Metrics, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    for (key, value) in metrics {
        log::info!("{key}: {value:.4}");
    }
    let json = serde_json::to_string_pretty(metrics)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)?;
            log::info!("Metrics written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
