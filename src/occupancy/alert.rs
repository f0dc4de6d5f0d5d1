use crate::error::ProcessError;
use crate::occupancy::OccupancyEvent;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Program and arguments of the external alert helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// A running alert process as seen by the supervisor.
pub trait AlertChild: Send {
    /// Queue one progress value for the process input.
    fn send_progress(&mut self, value: u32) -> Result<(), ProcessError>;
    /// Close the input channel and request termination.
    fn terminate(&mut self);
}

pub trait AlertLauncher: Send {
    /// Spawn a new process. Exit must be reported on `events` as
    /// [`OccupancyEvent::AlertExited`] tagged with `generation`.
    fn launch(
        &mut self,
        generation: u64,
        events: mpsc::UnboundedSender<OccupancyEvent>,
    ) -> Result<Box<dyn AlertChild>, ProcessError>;
}

struct RunningAlert {
    generation: u64,
    child: Box<dyn AlertChild>,
}

/// Single alert-process slot: absent or running.
///
/// Without a launcher the slot stays absent and every start is skipped.
pub struct AlertSupervisor {
    launcher: Option<Box<dyn AlertLauncher>>,
    events: mpsc::UnboundedSender<OccupancyEvent>,
    slot: Option<RunningAlert>,
    generation: u64,
}

impl AlertSupervisor {
    pub fn new(
        launcher: Box<dyn AlertLauncher>,
        events: mpsc::UnboundedSender<OccupancyEvent>,
    ) -> Self {
        Self {
            launcher: Some(launcher),
            events,
            slot: None,
            generation: 0,
        }
    }

    pub fn disabled(events: mpsc::UnboundedSender<OccupancyEvent>) -> Self {
        Self {
            launcher: None,
            events,
            slot: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_some()
    }

    pub fn start(&mut self) {
        if self.slot.is_some() {
            debug!("Alert process already running");
            return;
        }

        let Some(launcher) = self.launcher.as_mut() else {
            warn!("No alert command configured, alert process not started");
            return;
        };

        self.generation += 1;
        match launcher.launch(self.generation, self.events.clone()) {
            Ok(child) => {
                info!(generation = self.generation, "Alert process started");
                self.slot = Some(RunningAlert {
                    generation: self.generation,
                    child,
                });
            }
            Err(err) => {
                error!(error = %err, "Failed to start alert process");
            }
        }
    }

    /// Safe to call when nothing is running.
    pub fn stop(&mut self) {
        if let Some(mut running) = self.slot.take() {
            running.child.terminate();
            info!(generation = running.generation, "Alert process stopped");
        }
    }

    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    pub fn signal(&mut self, value: u32) {
        let Some(running) = self.slot.as_mut() else {
            return;
        };
        if let Err(err) = running.child.send_progress(value) {
            warn!(
                generation = running.generation,
                value,
                error = %err,
                "Failed to write progress to alert process"
            );
        }
    }

    /// Clears the slot when the exited process is still the current one.
    pub fn handle_exit(&mut self, generation: u64, code: Option<i32>) {
        match &self.slot {
            Some(running) if running.generation == generation => {
                info!(generation, code = ?code, "Alert process exited, slot cleared");
                self.slot = None;
            }
            _ => debug!(generation, code = ?code, "Ignoring exit of a replaced alert process"),
        }
    }
}

impl Drop for AlertSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the configured command with piped input.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    command: AlertCommand,
}

impl CommandLauncher {
    pub fn new(command: AlertCommand) -> Self {
        Self { command }
    }
}

impl AlertLauncher for CommandLauncher {
    fn launch(
        &mut self,
        generation: u64,
        events: mpsc::UnboundedSender<OccupancyEvent>,
    ) -> Result<Box<dyn AlertChild>, ProcessError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdin = child.stdin.take().ok_or(ProcessError::MissingStdin)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, generation));
        }

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_progress(stdin, input_rx, generation));

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_exit(child, kill_rx, generation, events));

        debug!(generation, pid = ?pid, program = %self.command.program, "Spawned alert process");
        Ok(Box::new(ProcessChild {
            input: Some(input_tx),
            kill: Some(kill_tx),
        }))
    }
}

struct ProcessChild {
    input: Option<mpsc::UnboundedSender<u32>>,
    kill: Option<oneshot::Sender<()>>,
}

impl AlertChild for ProcessChild {
    fn send_progress(&mut self, value: u32) -> Result<(), ProcessError> {
        let input = self.input.as_ref().ok_or(ProcessError::Input)?;
        input.send(value).map_err(|_| ProcessError::Input)
    }

    fn terminate(&mut self) {
        // Dropping the sender lets the writer task flush and close stdin.
        self.input = None;
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

async fn write_progress(
    mut stdin: ChildStdin,
    mut values: mpsc::UnboundedReceiver<u32>,
    generation: u64,
) {
    while let Some(value) = values.recv().await {
        let line = format!("{value}\n");
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            warn!(generation, error = %err, "Alert process input closed");
            return;
        }
        if let Err(err) = stdin.flush().await {
            warn!(generation, error = %err, "Failed to flush alert process input");
            return;
        }
    }
}

async fn log_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(generation, stderr = %line, "Alert process stderr"),
            Ok(None) => return,
            Err(err) => {
                debug!(generation, error = %err, "Stopped reading alert process stderr");
                return;
            }
        }
    }
}

async fn watch_exit(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    generation: u64,
    events: mpsc::UnboundedSender<OccupancyEvent>,
) {
    let (status, requested) = tokio::select! {
        status = child.wait() => (status, false),
        // A dropped sender counts as a stop request too.
        _ = kill => {
            if let Err(err) = child.start_kill() {
                debug!(generation, error = %err, "Alert process already gone");
            }
            (child.wait().await, true)
        }
    };

    let code = match status {
        Ok(status) => {
            report_exit(status, requested, generation);
            status.code()
        }
        Err(err) => {
            error!(generation, error = %err, "Failed to wait for alert process");
            None
        }
    };

    let _ = events.send(OccupancyEvent::AlertExited { generation, code });
}

fn report_exit(status: ExitStatus, requested: bool, generation: u64) {
    if requested {
        info!(generation, status = %status, "Alert process terminated");
    } else if status.success() {
        info!(generation, "Alert process exited");
    } else {
        let err = ProcessError::Exited {
            code: status.code(),
        };
        warn!(generation, error = %err, "Alert process exited unexpectedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupancy::mock::MockAlertLauncher;

    fn supervisor(
        launcher: MockAlertLauncher,
    ) -> (AlertSupervisor, mpsc::UnboundedReceiver<OccupancyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AlertSupervisor::new(Box::new(launcher), tx), rx)
    }

    #[test]
    fn start_is_noop_while_running() {
        let launcher = MockAlertLauncher::new();
        let log = launcher.log();
        let (mut alert, _rx) = supervisor(launcher);

        alert.start();
        alert.start();

        assert!(alert.is_running());
        assert_eq!(log.launches(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let launcher = MockAlertLauncher::new();
        let log = launcher.log();
        let (mut alert, _rx) = supervisor(launcher);

        alert.stop();
        alert.start();
        alert.stop();
        alert.stop();

        assert!(!alert.is_running());
        assert_eq!(log.terminations(), 1);
    }

    #[test]
    fn signal_without_process_is_ignored() {
        let launcher = MockAlertLauncher::new();
        let log = launcher.log();
        let (mut alert, _rx) = supervisor(launcher);

        alert.signal(5);

        assert!(log.progress_values().is_empty());
    }

    #[test]
    fn spawn_failure_leaves_slot_empty_for_retry() {
        let launcher = MockAlertLauncher::failing();
        let log = launcher.log();
        let (mut alert, _rx) = supervisor(launcher);

        alert.start();
        assert!(!alert.is_running());

        log.set_fail_launch(false);
        alert.start();
        assert!(alert.is_running());
        assert_eq!(log.launches(), 1);
    }

    #[test]
    fn disabled_supervisor_never_launches() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut alert = AlertSupervisor::disabled(tx);

        alert.start();
        alert.restart();
        alert.signal(3);

        assert!(!alert.is_running());
        alert.stop();
    }

    #[test]
    fn exit_of_current_generation_clears_slot() {
        let launcher = MockAlertLauncher::new();
        let (mut alert, _rx) = supervisor(launcher);

        alert.start();
        alert.handle_exit(1, Some(1));

        assert!(!alert.is_running());
    }

    #[test]
    fn exit_of_replaced_generation_is_ignored() {
        let launcher = MockAlertLauncher::new();
        let (mut alert, _rx) = supervisor(launcher);

        alert.start();
        alert.restart();
        alert.handle_exit(1, Some(0));

        assert!(alert.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_launcher_feeds_stdin_and_reports_exit()
    -> Result<(), Box<dyn std::error::Error>> {
        let file_name = format!("sensor-hub-alert-{}.txt", std::process::id());
        let path = std::env::temp_dir().join(file_name);
        let script = format!("head -n 3 > {}", path.display());
        let mut launcher = CommandLauncher::new(AlertCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut child = launcher.launch(7, tx)?;
        child.send_progress(1)?;
        child.send_progress(2)?;
        child.send_progress(0)?;

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await?;
        assert!(matches!(
            event,
            Some(OccupancyEvent::AlertExited {
                generation: 7,
                code: Some(0)
            })
        ));

        let written = std::fs::read_to_string(&path)?;
        let _ = std::fs::remove_file(&path);
        assert_eq!(written, "1\n2\n0\n");

        child.terminate();
        Ok(())
    }
}
