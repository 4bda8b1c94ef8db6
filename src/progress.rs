use std::io::Write;

/// Receives progress of a long-running step, e.g. an audio download.
pub trait ProgressSink: Send + Sync {
    fn update(&self, stage: &str, done: u64, total: Option<u64>);

    /// Returns the indicator to its idle state.
    fn reset(&self);
}

/// Discards all progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _stage: &str, _done: u64, _total: Option<u64>) {}
    fn reset(&self) {}
}

/// Resets the sink when dropped, whichever way the step ends.
pub struct ProgressGuard<'a> {
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink }
    }

    pub fn update(&self, stage: &str, done: u64, total: Option<u64>) {
        self.sink.update(stage, done, total);
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.sink.reset();
    }
}

/// Single-line progress on stdout.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn update(&self, stage: &str, done: u64, total: Option<u64>) {
        match total {
            Some(total) if total > 0 => print!(
                "\x1b[2K\r{}: {} of {} ({:.0}%)",
                stage,
                format_bytes(done),
                format_bytes(total),
                done as f64 * 100.0 / total as f64
            ),
            _ => print!("\x1b[2K\r{}: {}", stage, format_bytes(done)),
        }
        let _ = std::io::stdout().lock().flush();
    }

    fn reset(&self) {
        print!("\x1b[2K\r");
        let _ = std::io::stdout().lock().flush();
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let mut suffix = "B";

    for next in ["KiB", "MiB", "GiB", "TiB"] {
        if bytes <= 1024.0 {
            break;
        }
        bytes /= 1024.0;
        suffix = next;
    }

    format!("{:.2} {}", bytes, suffix)
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Records every call, for asserting on progress behaviour.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub updates: Mutex<Vec<(String, u64, Option<u64>)>>,
        pub resets: Mutex<usize>,
    }

    impl ProgressSink for RecordingProgress {
        fn update(&self, stage: &str, done: u64, total: Option<u64>) {
            self.updates.lock().push((stage.to_string(), done, total));
        }

        fn reset(&self) {
            *self.resets.lock() += 1;
        }
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn guard_resets_on_drop() {
        let sink = RecordingProgress::default();
        {
            let guard = ProgressGuard::new(&sink);
            guard.update("Downloading", 10, Some(100));
        }
        assert_eq!(sink.updates.lock().len(), 1);
        assert_eq!(*sink.resets.lock(), 1);
    }
}
