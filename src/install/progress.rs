//! Step progress display for long-running install phases

use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Shows a spinner per install step and a ✓/✗ line when it finishes
#[derive(Debug, Clone)]
pub struct StepReporter {
    visible: bool,
}

impl StepReporter {
    /// Spinners on stderr
    pub fn spinner() -> Self {
        Self { visible: true }
    }

    /// No terminal output; used by library callers and tests
    pub fn hidden() -> Self {
        Self { visible: false }
    }

    fn start(&self, message: &str) -> ProgressBar {
        if !self.visible {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    fn finish<T, E>(pb: &ProgressBar, message: &str, result: &Result<T, E>) {
        match result {
            Ok(_) => pb.finish_with_message(format!("✓ {message}")),
            Err(_) => pb.abandon_with_message(format!("✗ {message}")),
        }
    }

    pub fn step<T, E, F>(&self, message: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let pb = self.start(message);
        let result = f();
        Self::finish(&pb, message, &result);
        result
    }

    pub async fn step_async<T, E, Fut>(&self, message: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let pb = self.start(message);
        let result = fut.await;
        Self::finish(&pb, message, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_step_passes_result_through() {
        let reporter = StepReporter::hidden();
        assert_eq!(reporter.step("ok", || Ok::<_, ()>(7)), Ok(7));
        assert_eq!(reporter.step("err", || Err::<(), _>("boom")), Err("boom"));
    }

    #[tokio::test]
    async fn hidden_async_step_passes_result_through() {
        let reporter = StepReporter::hidden();
        let out = reporter.step_async("ok", async { Ok::<_, ()>("done") }).await;
        assert_eq!(out, Ok("done"));
    }
}
