//! External-program action adapter.
//!
//! [`ProgramAdapter`] performs each primitive by running the argv template
//! configured for it in [`ActionConfig`], e.g. `xdotool click 1`.  Templates
//! may contain the placeholders below, substituted per call:
//!
//! | Placeholder | Value                                          |
//! |-------------|------------------------------------------------|
//! | `{x}`       | pointer x in pixels (`x * (screen_width - 1)`) |
//! | `{y}`       | pointer y in pixels                            |
//! | `{amount}`  | scroll amount, rounded to a whole notch (≥ 1)  |
//!
//! The program runs with stdin and stdout detached; a non-zero exit status is
//! reported with the captured stderr.  A program still running after
//! `actions.timeout_ms` is killed and reported as [`AdapterError::Timeout`],
//! so one hung helper cannot stall the commands queued behind it.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use gestura_types::ScrollDirection;
use gestura_types::config::ActionConfig;
use tracing::{debug, warn};

use crate::action::{ActionAdapter, AdapterError};

pub struct ProgramAdapter {
    config: ActionConfig,
}

impl ProgramAdapter {
    pub fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    fn to_pixels(normalized: f64, extent: u32) -> i64 {
        let max = f64::from(extent.saturating_sub(1));
        (normalized.clamp(0.0, 1.0) * max).round() as i64
    }

    /// Substitute placeholders into `template`.  Returns `(program, args)`.
    fn render(
        template: &[String],
        vars: &[(&str, String)],
    ) -> Result<(String, Vec<String>), AdapterError> {
        let substitute = |part: &String| {
            vars.iter().fold(part.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        };
        let mut parts = template.iter().map(substitute);
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AdapterError::Other("empty action template".to_string()))?;
        Ok((program, parts.collect()))
    }

    fn run(&self, action: &str, template: &[String], vars: &[(&str, String)]) -> Result<(), AdapterError> {
        let (program, args) = Self::render(template, vars)?;
        debug!(action, program = %program, ?args, "running action program");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AdapterError::Spawn {
                program: program.clone(),
                source,
            })?;

        let timeout = self.config.timeout();
        let status = match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(action, program = %program, ?timeout, "action program timed out; killing");
                // The child may have exited between the last poll and now.
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::Timeout { program, timeout });
            }
            Err(e) => {
                let _ = child.kill();
                return Err(AdapterError::Other(format!("waiting for '{program}' failed: {e}")));
            }
        };

        if status.success() {
            return Ok(());
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        Err(AdapterError::ExitStatus {
            program,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

const POLL_STEP: Duration = Duration::from_millis(5);

/// Poll `child` until it exits or `timeout` elapses.  `Ok(None)` means the
/// deadline passed with the child still running.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_STEP.min(deadline - now));
    }
}

impl ActionAdapter for ProgramAdapter {
    fn name(&self) -> &str {
        "program"
    }

    fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), AdapterError> {
        let vars = [
            ("x", Self::to_pixels(x, self.config.screen_width).to_string()),
            ("y", Self::to_pixels(y, self.config.screen_height).to_string()),
        ];
        self.run("move_pointer", &self.config.move_pointer, &vars)
    }

    fn click_left(&mut self) -> Result<(), AdapterError> {
        self.run("click_left", &self.config.click_left, &[])
    }

    fn click_right(&mut self) -> Result<(), AdapterError> {
        self.run("click_right", &self.config.click_right, &[])
    }

    fn double_click(&mut self) -> Result<(), AdapterError> {
        self.run("double_click", &self.config.double_click, &[])
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: f64) -> Result<(), AdapterError> {
        let notches = amount.round().max(1.0) as u64;
        let vars = [("amount", notches.to_string())];
        match direction {
            ScrollDirection::Up => self.run("scroll_up", &self.config.scroll_up, &vars),
            ScrollDirection::Down => self.run("scroll_down", &self.config.scroll_down, &vars),
        }
    }

    fn volume_up(&mut self) -> Result<(), AdapterError> {
        self.run("volume_up", &self.config.volume_up, &[])
    }

    fn volume_down(&mut self) -> Result<(), AdapterError> {
        self.run("volume_down", &self.config.volume_down, &[])
    }

    fn toggle_mute(&mut self) -> Result<(), AdapterError> {
        self.run("toggle_mute", &self.config.toggle_mute, &[])
    }

    fn lock_screen(&mut self) -> Result<(), AdapterError> {
        self.run("lock_screen", &self.config.lock_screen, &[])
    }
}
