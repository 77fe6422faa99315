/// `HH:MM:SS.mmm`, with as many hour digits as needed past 99.
pub fn time_str(sec: f64) -> String {
    let ms = (sec.max(0.0) * 1000f64).round();
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// `ticks` of a `timescale` Hz clock as a time string.
pub fn ticks_str(ticks: i64, timescale: u32) -> String {
    if timescale == 0 {
        return ticks.to_string();
    }

    let secs = ticks as f64 / timescale as f64;
    if secs < 0.0 {
        format!("-{}", time_str(-secs))
    } else {
        time_str(secs)
    }
}
