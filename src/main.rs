// src/main.rs
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use chromiumoxide::{
    Browser, BrowserConfig, Page, browser::HeadlessMode,
    cdp::browser_protocol::network::CookieParam, handler::viewport::Viewport,
};
use clap::Parser;
use futures::StreamExt;
use sysinfo::{ProcessesToUpdate, System, get_current_pid};
use tokio::{
    signal,
    time::{Duration, sleep},
};

mod collector;
mod export;
mod js_scripts;

use collector::{ChatMessage, ChatSource, Collector, CollectorOptions};

const BASE_URL: &str = "https://weverse.io/";
const CHAT_SLOT_SELECTOR: &str = "#wev-previous-chat-list-slot";

#[derive(Parser)]
struct Args {
    /// Weverse VOD/live-replay URL whose chat should be dumped.
    #[arg(long)]
    url: String,

    /// File holding one "name=value; name2=value2" line of weverse.io cookies.
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Output path; defaults to weverse_chat_<timestamp>.json.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Wait after each scroll before re-reading the chat panel.
    #[arg(long, default_value_t = 500)]
    settle_delay_ms: u64,

    #[arg(long, default_value_t = 600)]
    max_rounds: usize,

    /// Unchanged rounds before the chat counts as fully revealed.
    #[arg(long, default_value_t = 8)]
    stability_threshold: usize,

    /// Run with a visible browser window.
    #[arg(long)]
    with_head: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let is_running = Arc::new(AtomicBool::new(true));
    tokio::spawn(handle_signals(Arc::clone(&is_running)));

    let (mut browser, mut handler) = Browser::launch(config_browser(args.with_head)?).await?;
    tokio::spawn(async move { while handler.next().await.is_some() {} });

    // Cookies must exist before the player page loads, or the VOD shows the
    // logged-out chat. Visit the base domain first, as the site expects.
    let page = browser.new_page(BASE_URL).await?;
    page.wait_for_navigation_response().await?;

    if let Some(cookie_file) = &args.cookie_file {
        let count = load_cookies(&page, cookie_file).await?;
        println!("🍪 Installed {count} cookies for weverse.io");
    }

    page.goto(args.url.as_str()).await?;
    page.wait_for_navigation_response().await?;

    let title: String = page
        .evaluate(js_scripts::PAGE_TITLE)
        .await?
        .into_value()
        .unwrap_or_default();
    println!("📺 {title}");

    if let Err(err) = disable_autoplay(&page).await {
        println!("⚠️ Autoplay suppression failed: {err:#}");
    }

    match seek_to_end_and_pause(&page).await {
        Ok(true) => println!("⏩ Video pinned to its end and paused"),
        Ok(false) => {}
        Err(err) => println!("⚠️ Seek/pause failed: {err:#}"),
    }

    wait_for_selector(&page, CHAT_SLOT_SELECTOR).await?;

    let usage_logger = spawn_usage_logger(Arc::clone(&is_running));

    let collector = Collector::new(CollectorOptions {
        settle_delay: Duration::from_millis(args.settle_delay_ms),
        max_rounds: args.max_rounds,
        stability_threshold: args.stability_threshold,
    });
    let mut panel = LiveChatPanel { page: page.clone() };
    let report = collector.collect(&mut panel, &is_running).await;

    usage_logger.abort();

    if !report.converged && report.rounds == args.max_rounds {
        println!("⏱️ Round budget exhausted before the chat stabilized; exporting anyway");
    }

    let output = args.output.unwrap_or_else(export::default_output_path);
    export::write_json(&output, &report.messages)?;
    println!(
        "💾 Wrote {} unique messages to {}",
        report.messages.len(),
        output.display()
    );

    page.close().await.ok();
    browser.close().await.ok();
    let _ = browser.kill().await;

    Ok(())
}

async fn handle_signals(is_running: Arc<AtomicBool>) {
    signal::ctrl_c().await.expect("Failed to handle Ctrl+C");
    is_running.store(false, Ordering::SeqCst);
    println!("Graceful shutdown triggered");
}

fn config_browser(with_head: bool) -> Result<BrowserConfig> {
    let headless = if with_head {
        HeadlessMode::False
    } else {
        HeadlessMode::True
    };
    BrowserConfig::builder()
        .no_sandbox()
        .headless_mode(headless)
        .args([
            "--no-startup-window",
            "--remote-debugging-port=0",
            "--disable-popup-blocking",
            "--disable-crash-reporter",
            "--disable-sync-preferences",
            "--disable-background-timer-throttling",
            "--disable-renderer-backgrounding",
            "--no-sandbox",
            "--disable-extensions",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--disable-setuid-sandbox",
            "--disable-accelerated-2d-canvas",
            "--disable-web-security",
            "--disable-default-apps",
            "--disable-sync",
            "--disable-translate",
            "--metrics-recording-only",
            "--mute-audio",
            "--no-first-run",
            "--disable-backgrounding-occluded-windows",
            "--disable-blink-features=AutomationControlled", // Hides automation
            "--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
              AppleWebKit/537.36 (KHTML, like Gecko) \
              Chrome/133.0.0.0 Safari/537.36",
        ])
        .viewport(Some(Viewport {
            width: 1280,
            height: 720,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        }))
        .build()
        .map_err(|err| anyhow::anyhow!(err))
}

async fn wait_for_selector(page: &Page, selector: &str) -> Result<()> {
    for _ in 0..10 {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        sleep(Duration::from_secs(2)).await;
    }
    anyhow::bail!("selector `{}` not found", selector)
}

/// Parses a single-line "name=value; name2=value2" cookie dump and installs
/// every entry for the weverse.io domain.
async fn load_cookies(page: &Page, cookie_file: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(cookie_file)
        .with_context(|| format!("reading cookie file {}", cookie_file.display()))?;

    let mut cookies = Vec::new();
    for entry in raw.trim().split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, value)) = entry.split_once('=') else {
            continue;
        };
        let cookie = CookieParam::builder()
            .name(name.trim())
            .value(value.trim())
            .domain(".weverse.io")
            .path("/")
            .build()
            .map_err(|err| anyhow::anyhow!("bad cookie entry `{name}`: {err}"))?;
        cookies.push(cookie);
    }
    anyhow::ensure!(
        !cookies.is_empty(),
        "no cookies parsed from {}",
        cookie_file.display()
    );

    let count = cookies.len();
    page.set_cookies(cookies).await?;
    Ok(count)
}

#[derive(Debug, Default, serde::Deserialize)]
struct ToggleSweep {
    found: u64,
    changed: u64,
}

/// Switches the player's autoplay toggle off and leaves a MutationObserver
/// in the page that flips it back off whenever the site re-checks it.
async fn disable_autoplay(page: &Page) -> Result<()> {
    let sweep: ToggleSweep = page
        .evaluate(js_scripts::AUTOPLAY_FORCE_OFF)
        .await?
        .into_value()
        .unwrap_or_default();
    if sweep.found == 0 {
        println!("⚠️ No autoplay toggle found; the switch markup may have changed");
    } else {
        println!(
            "🔕 Autoplay toggles: {} found, {} switched off",
            sweep.found, sweep.changed
        );
    }
    page.evaluate(js_scripts::AUTOPLAY_OBSERVER).await?;
    Ok(())
}

/// Seeks the VOD to its very end and pauses it. The player may ignore seeks
/// while buffering and restart playback on its own, so this retries and
/// installs a play-event guard that re-pins the position.
async fn seek_to_end_and_pause(page: &Page) -> Result<bool> {
    let mut duration: f64 = page
        .evaluate(js_scripts::VIDEO_DURATION)
        .await?
        .into_value()
        .unwrap_or(-1.0);
    if duration < 0.0 {
        println!("No <video> tag found. Continuing...");
        return Ok(false);
    }

    page.evaluate(js_scripts::INSTALL_PAUSE_GUARD).await?;

    // Metadata may not be loaded yet.
    for _ in 0..30 {
        if duration > 0.0 {
            break;
        }
        sleep(Duration::from_millis(200)).await;
        duration = page
            .evaluate(js_scripts::VIDEO_DURATION)
            .await?
            .into_value()
            .unwrap_or(-1.0);
    }
    if duration <= 0.0 {
        println!("No usable video duration found. Continuing without seeking.");
        return Ok(false);
    }

    for attempt in 1..=20 {
        page.evaluate(js_scripts::SEEK_TO_END).await?;
        sleep(Duration::from_millis(150)).await;

        let paused: bool = page
            .evaluate(js_scripts::PAUSE_VIDEO)
            .await?
            .into_value()
            .unwrap_or(false);

        // Re-assert the end position after pausing.
        sleep(Duration::from_millis(100)).await;
        page.evaluate(js_scripts::SEEK_TO_END).await?;

        println!("Seek/pause attempt {attempt}: paused={paused}, duration={duration:.1}s");

        if paused {
            sleep(Duration::from_millis(300)).await;
            let _: bool = page
                .evaluate(js_scripts::PAUSE_VIDEO)
                .await?
                .into_value()
                .unwrap_or(false);
            page.evaluate(js_scripts::SEEK_TO_END).await?;
            return Ok(true);
        }

        sleep(Duration::from_millis(300)).await;
    }

    println!("⚠️ Could not reliably pause the video; collecting chat anyway");
    Ok(false)
}

/// The production `ChatSource`: the previous-chat panel of the open page.
struct LiveChatPanel {
    page: Page,
}

impl ChatSource for LiveChatPanel {
    async fn advance(&mut self) -> Result<()> {
        let scrolled: bool = self
            .page
            .evaluate(js_scripts::SCROLL_CHAT_TO_BOTTOM)
            .await?
            .into_value()
            .unwrap_or(false);
        anyhow::ensure!(scrolled, "chat slot `{}` not found", CHAT_SLOT_SELECTOR);
        Ok(())
    }

    async fn visible_rows(&mut self) -> Result<Vec<ChatMessage>> {
        let rows: Vec<ChatMessage> = self
            .page
            .evaluate(js_scripts::EXTRACT_CHAT_ROWS)
            .await?
            .into_value()?;
        Ok(rows)
    }
}

fn spawn_usage_logger(is_running: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sys = System::new_all();
        while is_running.load(Ordering::SeqCst) {
            let current_pid = get_current_pid().expect("Failed to get current PID");
            sys.refresh_processes(ProcessesToUpdate::Some(&[current_pid]), true);
            log_rust_usage(&sys);
            sleep(Duration::from_secs(10)).await;
        }
    })
}

/// Logs resource usage for the current Rust process using sysinfo.
fn log_rust_usage(sys: &System) {
    let current_pid = get_current_pid().expect("Failed to get current PID");
    if let Some(process) = sys.process(current_pid) {
        println!(
            "💻 Rust Process - CPU: {:.2}%, Memory: {} KB",
            process.cpu_usage(),
            process.memory()
        );
    } else {
        println!("Could not retrieve Rust process info.");
    }
}
