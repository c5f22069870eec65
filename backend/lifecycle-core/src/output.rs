use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, info, trace};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child as TokioChild;
use tokio::spawn as TokioSpawn;

const BANNER_PATTERN: &str =
    r"(?i)tcp server running at (?P<url>tcp://(?P<host>[^\s:/]+):(?P<port>\d+))";
const BANNER_CAPTURE_URL: &str = "url";
const STDERR_TAIL_LINES: usize = 20;

static BANNER_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn get_banner_regex() -> &'static Regex {
    BANNER_REGEX.get_or_init(|| Regex::new(BANNER_PATTERN).expect("valid regex pattern"))
}

/// Pull the announced endpoint out of one line of server output.
pub(crate) fn parse_banner(line: &str) -> Option<String> {
    get_banner_regex()
        .captures(line)
        .and_then(|cap| cap.name(BANNER_CAPTURE_URL))
        .map(|m| m.as_str().to_string())
}

/// Drains a child's stdout/stderr into the log.
///
/// Remembers the first banner seen on stdout and the last few stderr lines,
/// which end up in `ProcessExited` errors.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputMonitor {
    announced: Arc<OnceLock<String>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl OutputMonitor {
    pub(crate) fn attach(child: &mut TokioChild, label: String) -> Self {
        let monitor = Self::default();

        if let Some(stdout) = child.stdout.take() {
            let announced = Arc::clone(&monitor.announced);
            let label = label.clone();
            TokioSpawn(forward_lines(stdout, move |line| {
                debug!("[{label}] {line}");
                if announced.get().is_none()
                    && let Some(url) = parse_banner(&line)
                {
                    info!("[{label}] announced {url}");
                    let _ = announced.set(url);
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&monitor.stderr_tail);
            TokioSpawn(forward_lines(stderr, move |line| {
                debug!("[{label}] stderr: {line}");
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }));
        }

        monitor
    }

    pub(crate) fn announced_url(&self) -> Option<String> {
        self.announced.get().cloned()
    }

    pub(crate) fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join(" | "))
            .unwrap_or_default()
    }
}

async fn forward_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => on_line(line),
            Ok(None) => break,
            Err(e) => {
                trace!("Stopped reading server output: {e}");
                break;
            }
        }
    }
}
