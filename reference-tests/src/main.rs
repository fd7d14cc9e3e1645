//! Reference test binary entry point
//!
//! Builds and runs every reference scenario.

use reference_tests::scenarios::all_scenarios;
use reference_tests::ScenarioResult;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    tracing::info!("Force Pipeline Reference Suite");
    tracing::info!("==============================");

    let scenarios = match all_scenarios() {
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("ERROR building scenarios: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Found {} reference scenarios", scenarios.len());

    // Run all scenarios
    let mut results: Vec<ScenarioResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for scenario in scenarios {
        match scenario.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running scenario {}: {}", scenario.name, e);
                failed_count += 1;
            }
        }
    }

    // Print overall summary
    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Total scenarios: {}", results.len());
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    // Exit with error code if any scenario failed
    if failed_count > 0 {
        std::process::exit(1);
    }
}
