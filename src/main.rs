//! # TusaBot Deploy Entry Point
//!
//! Redeploys the bot service: stops it, syncs the checkout, restores its
//! configuration, installs dependencies, applies schema migrations and starts
//! it again.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tusabot_ops::config::DeployConfig;
use tusabot_ops::deploy::{DeployReport, Deployer, StepOutcome, SystemCommandRunner};
use tusabot_ops::utils::mask::mask_url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tusabot_ops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let command = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("deploy");

    if matches!(command, "help" | "-h") || args.iter().any(|a| a == "--help") {
        print_help();
        return Ok(());
    }

    // Load configuration
    dotenvy::dotenv().ok();
    let config = DeployConfig::from_env()?;

    info!("TusaBot deploy v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded - Service: {}, Checkout: {}, Database: {}",
        config.service,
        config.checkout_dir.display(),
        mask_url(&config.database.database_url)
    );

    let deployer = Deployer::new(config, Arc::new(SystemCommandRunner));

    match command {
        "deploy" => {
            let report = deployer.run().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            std::process::exit(report.exit_code());
        }
        "status" => {
            let output = deployer.service_status().await?;
            println!("{}", output.stdout.trim_end());
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_report(report: &DeployReport) {
    println!("🚀 Deployment {} of {}", report.run_id, report.service);
    for step in &report.steps {
        let icon = match step.outcome {
            StepOutcome::Succeeded => "✅",
            StepOutcome::Tolerated => "⚠️ ",
            StepOutcome::Failed => "❌",
            StepOutcome::Skipped => "⏭️ ",
        };
        match &step.detail {
            Some(detail) => println!("  {icon} [{}] {} - {}", step.state, step.step, detail),
            None => println!("  {icon} [{}] {}", step.state, step.step),
        }
    }

    if let Some(status) = &report.supervisor_status {
        println!();
        println!("📋 Service status:");
        println!("{status}");
    }

    println!();
    if report.succeeded() {
        println!("✅ Deployment finished: {}", report.final_state);
    } else {
        println!("❌ Deployment finished with errors: {}", report.final_state);
        println!("💡 Nothing was rolled back. Configuration backups are kept in the backup directory.");
    }
}

fn print_help() {
    println!("🎉 TusaBot - Deployment Tool");
    println!();
    println!("USAGE:");
    println!("    tusabot-deploy [COMMAND] [--json]");
    println!();
    println!("COMMANDS:");
    println!("    deploy    Stop, sync, migrate and restart the service (default)");
    println!("    status    Show the supervisor's status for the service");
    println!("    help      Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    DEPLOY_CHECKOUT_DIR           Working copy of the bot (default: /opt/tusabot)");
    println!("    DEPLOY_SERVICE                Supervisor unit name (default: tusabot)");
    println!("    DEPLOY_REMOTE, DEPLOY_BRANCH  Revision to deploy (default: origin, main)");
    println!("    DEPLOY_ENV_FILE               Environment file, relative to the checkout (default: .env, empty disables)");
    println!("    DEPLOY_BACKUP_DIR             Where the environment file is copied aside (default: system temp dir)");
    println!("    DEPLOY_INSTALL_CMD            Dependency install command (default: venv/bin/pip install -r requirements.txt)");
    println!("    DEPLOY_MIGRATIONS_DIR         Migrations, relative to the checkout (default: migrations)");
    println!("    DEPLOY_ON_MIGRATION_FAILURE   continue | abort (default: continue)");
    println!("    DATABASE_URL                  Target database (default: sqlite:./data/largent.db)");
    println!("    DB_NAME, DB_DIR, DB_HOST, DB_PORT, DB_USER, DB_PASSWORD");
    println!("                                  Database settings; the service's environment file takes precedence");
    println!();
}
