use bec_scan::auth::TokenProvider;
use bec_scan::fetch::PageFetcher;
use bec_scan::{output, progress, Config, ScanDriver};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bec_scan=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("[FATAL] {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!(
        "[INFO] Strict local matching (no $search). Window: last {} days.",
        config.days_back
    );
    println!(
        "[INFO] Caps: MAX_SCAN={}, MAX_RESULTS={}\n",
        config.max_scan, config.max_results
    );

    let http = reqwest::blocking::Client::new();
    let token = TokenProvider::new(&config, &http).get_token()?;

    let pages = PageFetcher::new(&config, &http, token)?;
    let mut progress = progress::for_environment();
    let outcome = ScanDriver::new(&config).run(pages, progress.as_mut())?;

    if output::persist_if_any(&outcome.matches, &config.output_path)? {
        println!(
            "\n[DONE] Printed {} matches (scanned {} msgs) and saved to {}",
            outcome.matches.len(),
            outcome.scanned,
            config.output_path.display()
        );
    } else {
        println!("\n[DONE] No matches found (scanned {} msgs).", outcome.scanned);
    }

    println!("\nNotes:");
    println!("  - Progress shows ALL messages scanned.");
    println!("  - Only qualifying emails are printed/saved.");
    println!("  - Tune speed/scope with DAYS_BACK, MAX_SCAN, MAX_RESULTS env vars.");

    Ok(())
}
