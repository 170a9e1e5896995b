use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use timetrack_core::classify::BrowserSet;
use timetrack_core::governor::Governor;
use timetrack_core::inspect::{FocusInspector, TabResolver};
use timetrack_core::tracker::{RunEnd, Sampler, DEFAULT_POLL_PERIOD};

mod idle;
mod notify;
#[cfg(any(target_os = "macos", test))]
mod osascript;
mod sink;
#[cfg(windows)]
mod win;

use idle::{IdleCutoff, SystemIdle};
use notify::DesktopNotifier;
use sink::HttpSink;

#[cfg(target_os = "macos")]
const FOCUS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "focus_collector", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:17700
    #[arg(long, default_value = "http://127.0.0.1:17700")]
    core_url: String,

    /// Poll interval (milliseconds).
    #[arg(long, default_value_t = DEFAULT_POLL_PERIOD.as_millis() as u64)]
    poll_ms: u64,

    /// Consecutive permission failures before tracking halts.
    #[arg(long, default_value_t = timetrack_core::governor::DEFAULT_PERMISSION_THRESHOLD)]
    permission_threshold: u32,

    /// How long to wait for a browser to report its active tab (milliseconds).
    #[arg(long, default_value_t = 1500)]
    tab_timeout_ms: u64,

    /// Send window and page titles and full page URLs. Disable via
    /// `--send-title=false`; websites are then reported by origin only.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    send_title: bool,

    /// Extra browser to resolve tabs for (owner name, bundle id or exe). Repeatable.
    #[arg(long = "browser")]
    browsers: Vec<String>,

    /// Treat the machine as idle after this many seconds without input. 0 disables.
    #[arg(long, default_value_t = 5 * 60)]
    idle_cutoff_seconds: u64,

    /// Show a desktop notification when tracking halts. Disable via `--notify=false`.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    notify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "focus_collector=info,timetrack_core=info".into()),
        )
        .init();

    let args = Args::parse();

    #[cfg(windows)]
    {
        // A second collector would double-count every second.
        let _guard = match win::single_instance() {
            Ok(g) => g,
            Err(e) => {
                info!("focus_collector already running; exit ({e})");
                return Ok(());
            }
        };
        track(&args, win::WinFocus, timetrack_core::inspect::NoTabs).await
    }

    #[cfg(target_os = "macos")]
    {
        track(
            &args,
            osascript::MacFocus::new(FOCUS_TIMEOUT),
            osascript::MacTabs::new(Duration::from_millis(args.tab_timeout_ms)),
        )
        .await
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    {
        eprintln!("focus_collector supports Windows and macOS only.");
        eprintln!("Core URL would be: {}", args.core_url);
        Ok(())
    }
}

#[cfg_attr(not(any(windows, target_os = "macos")), allow(dead_code))]
async fn track<I, R>(args: &Args, inspector: I, resolver: R) -> anyhow::Result<()>
where
    I: FocusInspector,
    R: TabResolver,
{
    let browsers = args
        .browsers
        .iter()
        .fold(BrowserSet::default(), |set, b| set.with_extra(b));
    let sink = HttpSink::new(&args.core_url, args.send_title)?;
    let sampler = Sampler::new(
        browsers,
        IdleCutoff::new(inspector, SystemIdle, args.idle_cutoff_seconds),
        resolver,
        sink,
        Governor::new(args.permission_threshold),
        chrono::Local,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    info!("sending intervals to {}", args.core_url);
    let notifier = DesktopNotifier {
        enabled: args.notify,
    };
    let period = Duration::from_millis(args.poll_ms.max(100));
    match sampler.run(period, &notifier, cancel).await {
        RunEnd::Stopped => Ok(()),
        RunEnd::Halted => anyhow::bail!("tracking halted: focus inspection permission denied"),
    }
}
