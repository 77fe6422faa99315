use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub mod command;
pub mod info;
pub mod map;
pub mod nalu;

/// Adds a ticking spinner to `multi` when progress display is enabled.
pub(crate) fn spinner(multi: Option<&MultiProgress>, message: &str) -> Result<Option<ProgressBar>> {
    let Some(multi) = multi else {
        return Ok(None);
    };

    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message.to_string());

    Ok(Some(pb))
}

/// Prints through the spinner, if any, so output and spinner don't interleave.
pub(crate) fn suspend<F: FnOnce()>(pb: Option<&ProgressBar>, f: F) {
    match pb {
        Some(pb) => pb.suspend(f),
        None => f(),
    }
}
