//! worunie-deploy - single-host redeployment orchestrator
//!
//! Usage:
//! - Plain redeploy: `worunie-deploy`
//! - Rebuild from scratch: `worunie-deploy --no-cache`
//! - Also remove stale images and build cache: `worunie-deploy --purge`
//!
//! Configuration is environment-driven (WORUNIE_* variables); the
//! required Slack secrets must be present in the invoking environment.

use worunie_deploy::{render_summary, DeployStatus, EnvConfig, RunOptions};

/// Parse command line arguments
fn parse_args() -> RunOptions {
    let args: Vec<String> = std::env::args().collect();
    let mut options = RunOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--purge" => {
                options.purge = true;
                i += 1;
            }
            "--no-cache" => {
                options.no_cache = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(2);
            }
        }
    }

    options
}

fn print_help() {
    println!("worunie-deploy - single-host redeployment orchestrator");
    println!();
    println!("USAGE:");
    println!("    worunie-deploy [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --purge      Remove owned images and prune build cache before rebuilding");
    println!("    --no-cache   Build without cache and pull fresh base images");
    println!("    -h, --help   Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    WORUNIE_WORK_DIR          Working tree (default .)");
    println!("    WORUNIE_COMPOSE_FILE      Compose file (default docker-compose.yml)");
    println!("    WORUNIE_DATA_FILE         Persisted data file (default data/teams.db)");
    println!("    WORUNIE_NAME_PATTERNS     Owned container/image name patterns (default worunie)");
    println!("    WORUNIE_GIT_REMOTE        Source remote (default origin)");
    println!("    WORUNIE_GIT_BRANCH        Source branch (default main)");
    println!("    WORUNIE_REQUIRED_SECRETS  Secrets to validate and materialize");
    println!("                              (default SLACK_SIGNING_SECRET,SLACK_BOT_TOKEN)");
    println!("    WORUNIE_HEALTH_URL        Health endpoint, or 'none' to disable");
    println!();
    println!("EXAMPLES:");
    println!("    worunie-deploy                    # Plain redeploy");
    println!("    worunie-deploy --no-cache         # Full rebuild");
    println!("    worunie-deploy --purge --no-cache # Rebuild and clean stale images");
}

fn main() {
    let options = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let exit_code = rt.block_on(async {
        let config = EnvConfig::from_env();
        let report = worunie_deploy::run(&config, options).await;

        print!("{}", render_summary(&report));
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }

        match report.status {
            DeployStatus::Success => 0,
            _ => 1,
        }
    });

    std::process::exit(exit_code);
}
