//! Terminal progress indicator shown while the CLI waits on Endeavor.

use std::future::Future;
use std::io::{IsTerminal, Write};
use std::time::Duration;

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const INTERVAL: Duration = Duration::from_millis(80);

/// Clears the current line and returns to its start.
const CLEAR_LINE: &str = "\x1b[2K\r";

/// Await `fut` while drawing a spinner labelled `message` on stderr.
///
/// When stderr is not a terminal the future is awaited as is, so piped
/// output and logs stay clean.
pub async fn wrap<F: Future>(message: &str, fut: F) -> F::Output {
    let stderr = std::io::stderr();
    if !stderr.is_terminal() {
        return fut.await;
    }
    spin(&mut &stderr, message, fut).await
}

/// Redraw a frame on every tick until `fut` resolves, then wipe the line.
async fn spin<W: Write, F: Future>(out: &mut W, message: &str, fut: F) -> F::Output {
    tokio::pin!(fut);
    let mut ticker = tokio::time::interval(INTERVAL);
    let mut ticks = 0usize;

    let output = loop {
        tokio::select! {
            biased;
            output = &mut fut => break output,
            _ = ticker.tick() => {
                let frame = FRAMES[ticks % FRAMES.len()];
                ticks += 1;
                let _ = write!(out, "{CLEAR_LINE}{frame} {message}");
                let _ = out.flush();
            }
        }
    };

    let _ = write!(out, "{CLEAR_LINE}");
    let _ = out.flush();
    output
}
