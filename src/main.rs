use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rendergap::domain::models::{HttpErrorPolicy, JobResult, JobSettings, UrlAnalysis, WaitStrategy};
use rendergap::service::JobRunner;
use rendergap::storage::{FileStorage, OutputFormat, Storage};

/// Compare server-delivered HTML with JavaScript-rendered page content.
#[derive(Debug, Parser)]
#[command(name = "rendergap", version, about)]
struct Cli {
    /// Text file containing one URL per line
    #[arg(value_name = "INPUT_FILE")]
    input_file: PathBuf,

    /// Directory to save output files
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Maximum number of URLs to process concurrently
    #[arg(short, long, value_name = "N", default_value_t = 3)]
    concurrency: usize,

    /// Timeout in seconds for each fetch and render
    #[arg(short, long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,

    /// Wait strategy for JS rendering
    #[arg(short = 'w', long, value_enum, default_value_t = WaitStrategy::NetworkIdle)]
    wait_strategy: WaitStrategy,

    /// Custom User-Agent header, applied to both fetch variants
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Treat 4xx/5xx raw responses as failures instead of observed results
    #[arg(long, default_value_t = false)]
    http_errors_as_failures: bool,

    /// Keep cookie/consent banners in the extracted content
    #[arg(long, default_value_t = false)]
    keep_consent_banners: bool,
}

impl Cli {
    fn settings(&self) -> JobSettings {
        JobSettings {
            max_concurrency: self.concurrency,
            timeout_secs: self.timeout,
            wait_strategy: self.wait_strategy,
            user_agent: self.user_agent.clone(),
            http_error_policy: if self.http_errors_as_failures {
                HttpErrorPolicy::Fail
            } else {
                HttpErrorPolicy::Observe
            },
            strip_consent_banners: !self.keep_consent_banners,
        }
    }
}

/// Initialize logging with tracing_subscriber.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("headless_chrome=warn".parse().unwrap())
                .add_directive("rendergap=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .compact()
        .with_target(false)
        .with_ansi(true)
        .init();
}

fn read_urls(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Could not read {}: {e}", path.display()))?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        anyhow::bail!("No URLs found in {}", path.display());
    }
    Ok(urls)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let urls = match read_urls(&cli.input_file) {
        Ok(urls) => urls,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Found {} URLs to process\n", urls.len());

    let runner = match JobRunner::new(cli.settings()) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Error: could not start the analysis pipeline: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, finishing in-flight URLs");
            cancel_flag.store(true, Ordering::Relaxed);
        }
    });

    let result = runner.run(&urls, cancel).await;
    print_results_summary(&result);

    let storage = FileStorage::new(&cli.output_dir);
    match storage.save(&result, cli.format, None) {
        Ok(path) => println!("\nResults saved to: {}", path.display()),
        Err(e) => {
            eprintln!("Failed to save results: {e}");
            return ExitCode::FAILURE;
        }
    }

    if result.urls_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

const RULE: &str = "================================================================================";

/// Human-readable run summary: overall statistics, then details for each
/// URL with differences, then failed URLs.
fn print_results_summary(result: &JobResult) {
    println!("\n{RULE}");
    println!("RENDER GAP REPORT");
    println!("{RULE}\n");
    println!("URLs Processed: {}", result.urls_processed);
    println!("URLs Succeeded: {}", result.urls_succeeded);
    println!("URLs Failed:    {}", result.urls_failed);
    println!("Success Rate:   {}%", result.success_rate());
    println!("Duration:       {:.1} seconds", result.duration_secs());

    let with_differences = result.analyses_with_differences();
    println!(
        "\nDifferences Detected: {} / {} URLs\n",
        with_differences.len(),
        result.urls_processed
    );

    if with_differences.is_empty() && result.urls_failed == 0 {
        println!("No content differences detected.");
        println!("All URLs deliver identical content with and without JavaScript.");
        return;
    }

    for (i, analysis) in with_differences.iter().enumerate() {
        print_analysis(i + 1, analysis);
    }

    let failed = result.failed_analyses();
    if !failed.is_empty() {
        println!("{RULE}");
        println!("FAILED URLS ({})", failed.len());
        println!("{RULE}\n");
        for (i, analysis) in failed.iter().enumerate() {
            println!("[{}] {}", i + 1, analysis.url);
            if let Some(error) = &analysis.error {
                println!("    {error}");
            }
            println!();
        }
    }
}

fn print_analysis(index: usize, analysis: &UrlAnalysis) {
    println!("[{index}] {}", analysis.url);
    println!("    Final URL: {}", analysis.final_url);
    println!("    HTTP Status: {}", analysis.http_status);

    let Some(diff) = &analysis.differences else {
        return;
    };

    println!("    Word Count:");
    println!("      Without JS: {}", diff.raw_word_count);
    println!("      With JS:    {}", diff.rendered_word_count);
    println!(
        "      Delta:      {:+} ({:+.1}%)",
        diff.word_count_delta(),
        diff.word_count_percentage_change()
    );
    println!(
        "      Invisible without JS: {:.1}%",
        diff.content_invisible_without_js_percentage()
    );

    print_blocks(
        "Content visible ONLY with JavaScript",
        &diff.text_only_with_js,
    );
    print_blocks(
        "Content visible ONLY without JavaScript",
        &diff.text_only_without_js,
    );
    print_blocks(
        "Headings MISSING without JavaScript",
        &diff.headings_missing_without_js,
    );

    if !diff.internal_links_missing_without_js.is_empty() {
        println!(
            "    Internal links MISSING without JavaScript ({}):",
            diff.internal_links_missing_without_js.len()
        );
        for link in diff.internal_links_missing_without_js.iter().take(5) {
            println!("      - {} -> {}", link.anchor_text, link.href);
        }
        let rest = diff.internal_links_missing_without_js.len().saturating_sub(5);
        if rest > 0 {
            println!("      ... and {rest} more links");
        }
    }

    println!();
}

fn print_blocks(label: &str, blocks: &[String]) {
    if blocks.is_empty() {
        return;
    }
    println!("    {label} ({}):", blocks.len());
    for block in blocks.iter().take(5) {
        if block.len() > 100 {
            let cut: String = block.chars().take(100).collect();
            println!("      - {cut}...");
        } else {
            println!("      - {block}");
        }
    }
    let rest = blocks.len().saturating_sub(5);
    if rest > 0 {
        println!("      ... and {rest} more blocks");
    }
}
