//! Lonewolf - Client-Side Router
//!
//! Loads an application configuration, navigates to each location given on
//! the command line and prints the mounted markup.
//!
//! Usage: `lonewolf <app.json> [location ...]`

use lonewolf::{App, AppConfig, NAME, RenderOutcome, VERSION};
use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("lonewolf=info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(config_path) = args.first() else {
        eprintln!("{NAME} v{VERSION}");
        eprintln!("usage: lonewolf <app.json> [location ...]");
        return ExitCode::from(2);
    };

    match run(config_path, &args[1..]).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str, locations: &[String]) -> lonewolf::Result<()> {
    let config = AppConfig::from_file(config_path)?;
    let app = App::from_config(config)?;
    log::info!(target: "lonewolf::cli", "{NAME} v{VERSION} loaded {config_path}");

    let first = app.start().await?;
    print_outcome(&app, "start", first.settle().await)?;
    for location in locations {
        let outcome = app.navigate(location).await?;
        print_outcome(&app, location, outcome.settle().await)?;
    }
    Ok(())
}

fn print_outcome(
    app: &App,
    label: &str,
    outcome: lonewolf::Result<Option<RenderOutcome>>,
) -> lonewolf::Result<()> {
    match outcome {
        Ok(Some(RenderOutcome::Rendered { route, .. })) => {
            println!("<!-- {label}: {route} \"{}\" -->", app.title());
            println!("{}", app.mount_html().unwrap_or_default());
            Ok(())
        }
        Ok(Some(other)) => {
            println!("<!-- {label}: {other:?} -->");
            Ok(())
        }
        Ok(None) => {
            println!("<!-- {label}: nothing rendered -->");
            Ok(())
        }
        Err(e) if e.is_halt() => Ok(()),
        Err(e) => {
            log::warn!(target: "lonewolf::cli", "{label}: {e}");
            Err(e)
        }
    }
}
