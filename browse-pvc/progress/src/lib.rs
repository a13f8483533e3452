use std::time::Duration;

use enum_dispatch::enum_dispatch;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;

pub mod messages;

/// Selects how progress is reported: `std` (spinners), `simple`, `json` or `off`.
pub const BROWSE_PVC_PROGRESS_ENV: &str = "BROWSE_PVC_PROGRESS_MODE";

/// Reports the stages a browse run goes through before the shell is attached.
///
/// Everything goes to stderr, stdout is left for the output of a user supplied command. Nothing
/// may be reported once the terminal is in raw mode.
#[enum_dispatch]
pub trait Progress: Sized {
    /// Starts a nested stage.
    fn subtask(&self, text: &str) -> Self;

    fn success(&mut self, msg: Option<&str>);

    fn failure(&mut self, msg: Option<&str>);

    fn warning(&self, msg: &str);

    fn info(&self, msg: &str);
}

#[derive(Debug)]
#[enum_dispatch(Progress)]
pub enum ProgressTracker {
    SpinnerProgress(SpinnerProgress),
    SimpleProgress(SimpleProgress),
    JsonProgress(JsonProgress),
    NullProgress(NullProgress),
}

impl ProgressTracker {
    /// Tracker picked by [`BROWSE_PVC_PROGRESS_ENV`], spinners when it is unset or unknown.
    pub fn from_env(text: &str) -> Self {
        std::env::var(BROWSE_PVC_PROGRESS_ENV)
            .ok()
            .and_then(|mode| Self::from_mode(&mode, text))
            .unwrap_or_else(|| SpinnerProgress::new(text).into())
    }

    fn from_mode(mode: &str, text: &str) -> Option<Self> {
        Some(match mode {
            "std" | "standard" => SpinnerProgress::new(text).into(),
            "simple" | "dumb" => SimpleProgress::new(text, Sink::Stderr).into(),
            "json" => JsonProgress::new(text, Sink::Stderr).into(),
            "off" => NullProgress.into(),
            _ => return None,
        })
    }
}

/// Where the line based trackers write.
#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    #[cfg(test)]
    Captured(std::sync::Arc<std::sync::Mutex<Vec<String>>>),
}

impl Sink {
    fn line(&self, line: &str) {
        match self {
            Sink::Stderr => eprintln!("{line}"),
            #[cfg(test)]
            Sink::Captured(lines) => lines.lock().unwrap().push(line.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn subtask(&self, _: &str) -> Self {
        NullProgress
    }

    fn success(&mut self, _: Option<&str>) {}

    fn failure(&mut self, _: Option<&str>) {}

    fn warning(&self, _: &str) {}

    fn info(&self, _: &str) {}
}

/// One line per event, for terminals that can't redraw.
#[derive(Debug)]
pub struct SimpleProgress {
    sink: Sink,
    depth: usize,
}

impl SimpleProgress {
    fn new(text: &str, sink: Sink) -> Self {
        let progress = SimpleProgress { sink, depth: 0 };
        progress.line(text);
        progress
    }

    fn line(&self, text: &str) {
        self.sink
            .line(&format!("{}{text}", "  ".repeat(self.depth)));
    }
}

impl Progress for SimpleProgress {
    fn subtask(&self, text: &str) -> Self {
        let stage = SimpleProgress {
            sink: self.sink.clone(),
            depth: self.depth + 1,
        };
        stage.line(text);
        stage
    }

    fn success(&mut self, msg: Option<&str>) {
        if let Some(msg) = msg {
            self.line(&format!("✓ {msg}"));
        }
    }

    fn failure(&mut self, msg: Option<&str>) {
        if let Some(msg) = msg {
            self.line(&format!("x {msg}"));
        }
    }

    fn warning(&self, msg: &str) {
        self.line(&format!("! {msg}"));
    }

    fn info(&self, msg: &str) {
        self.line(&format!("* {msg}"));
    }
}

/// Events a [`JsonProgress`] emits, one JSON object per line.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ProgressEvent<'a> {
    StageStarted {
        stage: &'a str,
        parent: Option<&'a str>,
    },
    StageFinished {
        stage: &'a str,
        success: bool,
        message: Option<&'a str>,
    },
    Warning {
        stage: &'a str,
        message: &'a str,
    },
    Info {
        stage: &'a str,
        message: &'a str,
    },
}

/// Machine readable progress. A stage dropped before it finished is reported as failed.
#[derive(Debug)]
pub struct JsonProgress {
    sink: Sink,
    stage: String,
    finished: bool,
}

impl JsonProgress {
    fn new(text: &str, sink: Sink) -> Self {
        Self::start(sink, text, None)
    }

    fn start(sink: Sink, stage: &str, parent: Option<&str>) -> Self {
        let progress = JsonProgress {
            sink,
            stage: stage.to_string(),
            finished: false,
        };
        progress.emit(&ProgressEvent::StageStarted { stage, parent });
        progress
    }

    fn emit(&self, event: &ProgressEvent<'_>) {
        if let Ok(line) = serde_json::to_string(event) {
            self.sink.line(&line);
        }
    }

    fn finish(&mut self, success: bool, message: Option<&str>) {
        if self.finished {
            return;
        }

        self.finished = true;
        self.emit(&ProgressEvent::StageFinished {
            stage: &self.stage,
            success,
            message,
        });
    }
}

impl Progress for JsonProgress {
    fn subtask(&self, text: &str) -> Self {
        JsonProgress::start(self.sink.clone(), text, Some(&self.stage))
    }

    fn success(&mut self, msg: Option<&str>) {
        self.finish(true, msg);
    }

    fn failure(&mut self, msg: Option<&str>) {
        self.finish(false, msg);
    }

    fn warning(&self, msg: &str) {
        self.emit(&ProgressEvent::Warning {
            stage: &self.stage,
            message: msg,
        });
    }

    fn info(&self, msg: &str) {
        self.emit(&ProgressEvent::Info {
            stage: &self.stage,
            message: msg,
        });
    }
}

impl Drop for JsonProgress {
    fn drop(&mut self) {
        self.finish(false, None);
    }
}

const TICK: Duration = Duration::from_millis(100);

/// Spinners on stderr, nested stages are indented under their parent.
#[derive(Debug)]
pub struct SpinnerProgress {
    root: MultiProgress,
    bar: ProgressBar,
    depth: usize,
    finished: bool,
}

impl SpinnerProgress {
    fn new(text: &str) -> Self {
        let root = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        Self::start(root, text, 0)
    }

    fn start(root: MultiProgress, text: &str, depth: usize) -> Self {
        let style = ProgressStyle::default_spinner()
            .template(&format!("{}{{spinner}} {{msg}}", "  ".repeat(depth)))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let bar = root.add(ProgressBar::new_spinner().with_style(style));
        bar.set_message(text.to_string());
        bar.enable_steady_tick(TICK);

        SpinnerProgress {
            root,
            bar,
            depth,
            finished: false,
        }
    }

    fn note(&self, line: String) {
        let _ = self.root.println(&line);
        self.bar.set_message(line);
    }
}

impl Progress for SpinnerProgress {
    fn subtask(&self, text: &str) -> Self {
        SpinnerProgress::start(self.root.clone(), text, self.depth + 1)
    }

    fn success(&mut self, msg: Option<&str>) {
        self.finished = true;
        let msg = msg.map_or_else(|| self.bar.message(), ToString::to_string);
        self.bar.finish_with_message(format!("✓ {msg}"));
    }

    fn failure(&mut self, msg: Option<&str>) {
        self.finished = true;
        let msg = msg.map_or_else(|| self.bar.message(), ToString::to_string);
        self.bar.abandon_with_message(format!("x {msg}"));
    }

    fn warning(&self, msg: &str) {
        self.note(format!("! {msg}"));
    }

    fn info(&self, msg: &str) {
        self.note(format!("* {msg}"));
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if !self.finished {
            self.failure(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;

    fn captured() -> (Sink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        (Sink::Captured(lines.clone()), lines)
    }

    #[rstest]
    #[case::spinner("std", true)]
    #[case::simple("simple", true)]
    #[case::dumb("dumb", true)]
    #[case::json("json", true)]
    #[case::off("off", true)]
    #[case::unknown("fancy", false)]
    #[case::empty("", false)]
    fn mode_parsing(#[case] mode: &str, #[case] recognized: bool) {
        assert_eq!(
            ProgressTracker::from_mode(mode, "kubectl browse-pvc").is_some(),
            recognized
        );
    }

    #[test]
    fn simple_stages_are_indented() {
        let (sink, lines) = captured();

        let root = SimpleProgress::new("kubectl browse-pvc", sink);
        let mut stage = root.subtask("waiting for job to start...");
        stage.warning("job is slow");
        stage.success(Some("job is active"));

        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "kubectl browse-pvc",
                "  waiting for job to start...",
                "  ! job is slow",
                "  ✓ job is active",
            ]
        );
    }

    #[test]
    fn json_stage_events() {
        let (sink, lines) = captured();

        let root = JsonProgress::new("kubectl browse-pvc", sink);
        let mut stage = root.subtask("looking for job pod...");
        stage.info("found 1 pod");
        stage.success(Some("found job pod"));
        drop(stage);

        let events: Vec<Value> = lines
            .lock()
            .unwrap()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                json!({ "event": "stage_started", "stage": "kubectl browse-pvc", "parent": null }),
                json!({ "event": "stage_started", "stage": "looking for job pod...", "parent": "kubectl browse-pvc" }),
                json!({ "event": "info", "stage": "looking for job pod...", "message": "found 1 pod" }),
                json!({ "event": "stage_finished", "stage": "looking for job pod...", "success": true, "message": "found job pod" }),
            ]
        );
    }

    #[test]
    fn unfinished_json_stage_fails_on_drop() {
        let (sink, lines) = captured();

        let stage = JsonProgress::new("waiting for pod to be ready...", sink);
        drop(stage);

        let last: Value = serde_json::from_str(lines.lock().unwrap().last().unwrap()).unwrap();
        assert_eq!(
            last,
            json!({
                "event": "stage_finished",
                "stage": "waiting for pod to be ready...",
                "success": false,
                "message": null,
            })
        );
    }

    #[test]
    fn json_stage_finishes_once() {
        let (sink, lines) = captured();

        let mut stage = JsonProgress::new("waiting for job to finish...", sink);
        stage.failure(Some("timed out"));
        stage.success(None);
        drop(stage);

        assert_eq!(lines.lock().unwrap().len(), 2);
    }
}
