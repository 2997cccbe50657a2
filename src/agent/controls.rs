//! Pause, single-step and exit controls for a running agent
//!
//! A listener thread only flips flags; the step loop reads them at its
//! checkpoints between steps. The listener owns the terminal: while a prompt
//! is waiting for an answer, the next line goes to the prompt instead.

use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A key understood by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    /// Space: toggle pause
    TogglePause,
    /// `]`: run steps back to back
    Continuous,
    /// `[`: run one step, then pause
    Step,
    /// `/`: finish the current step and stop
    Exit,
}

impl ControlKey {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            ' ' => Some(ControlKey::TogglePause),
            ']' => Some(ControlKey::Continuous),
            '[' => Some(ControlKey::Step),
            '/' => Some(ControlKey::Exit),
            _ => None,
        }
    }
}

/// Listener side of a prompt channel
pub struct PromptSender {
    prompting: Arc<AtomicBool>,
    lines: Sender<String>,
}

impl PromptSender {
    /// Whether a prompt is blocked waiting for a line
    pub fn is_waiting(&self) -> bool {
        self.prompting.load(Ordering::SeqCst)
    }

    /// Hand `line` to a waiting prompt; gives it back when nobody waits
    fn offer(&self, line: String) -> Option<String> {
        // one line per wait
        if !self.prompting.swap(false, Ordering::SeqCst) {
            return Some(line);
        }
        self.lines.send(line).err().map(|e| e.0)
    }
}

/// Terminal lines read on behalf of a prompt
///
/// Reads block until the listener forwards a line; once the listener is
/// gone the input is at its end.
pub struct PromptLines {
    prompting: Arc<AtomicBool>,
    lines: Receiver<String>,
    pending: Vec<u8>,
    pos: usize,
}

pub fn prompt_channel() -> (PromptSender, PromptLines) {
    let prompting = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    (
        PromptSender {
            prompting: prompting.clone(),
            lines: tx,
        },
        PromptLines {
            prompting,
            lines: rx,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

impl Read for PromptLines {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for PromptLines {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.pending.len() {
            self.prompting.store(true, Ordering::SeqCst);
            let line = self.lines.recv();
            self.prompting.store(false, Ordering::SeqCst);
            let Ok(line) = line else {
                return Ok(&[]);
            };
            self.pending = line.into_bytes();
            self.pending.push(b'\n');
            self.pos = 0;
        }
        Ok(&self.pending[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.pending.len());
    }
}

#[derive(Clone)]
pub struct RunControls {
    paused: Arc<AtomicBool>,
    continuous: Arc<AtomicBool>,
    step_requested: Arc<AtomicBool>,
    exit: Arc<AtomicBool>,
}

impl Default for RunControls {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControls {
    /// Unpaused, continuous
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            continuous: Arc::new(AtomicBool::new(true)),
            step_requested: Arc::new(AtomicBool::new(false)),
            exit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn apply(&self, key: ControlKey) {
        match key {
            ControlKey::TogglePause => {
                let was = self.paused.fetch_xor(true, Ordering::SeqCst);
                info!(paused = !was, "pause toggled");
            }
            ControlKey::Continuous => {
                self.continuous.store(true, Ordering::SeqCst);
                self.paused.store(false, Ordering::SeqCst);
                info!("continuous mode");
            }
            ControlKey::Step => {
                self.continuous.store(false, Ordering::SeqCst);
                self.step_requested.store(true, Ordering::SeqCst);
                info!("single step requested");
            }
            ControlKey::Exit => {
                self.exit.store(true, Ordering::SeqCst);
                info!("exit requested");
            }
        }
    }

    pub fn request_exit(&self) {
        self.apply(ControlKey::Exit);
    }

    pub fn should_exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous.load(Ordering::SeqCst)
    }

    /// Whether the next step may start now; consumes a pending single step
    pub fn may_proceed(&self) -> bool {
        if self.should_exit() {
            return false;
        }
        if self.step_requested.swap(false, Ordering::SeqCst) {
            return true;
        }
        self.is_continuous() && !self.is_paused()
    }

    /// Block until the next step may start; false means exit was requested
    pub fn checkpoint(&self) -> bool {
        loop {
            if self.should_exit() {
                return false;
            }
            if self.may_proceed() {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Feed every recognised key of each input line into the flags
    ///
    /// Lines a waiting prompt takes are not read as keys. Returns when the
    /// input ends or exit is requested.
    pub fn listen<R: BufRead>(&self, input: R, prompts: Option<&PromptSender>) {
        for line in input.lines() {
            let Ok(line) = line else { break };
            let line = match prompts {
                Some(prompts) => match prompts.offer(line) {
                    Some(line) => line,
                    None => continue,
                },
                None => line,
            };
            // an empty line is a bare space press on line-buffered terminals
            if line.is_empty() {
                self.apply(ControlKey::TogglePause);
            }
            for key in line.chars().filter_map(ControlKey::from_char) {
                self.apply(key);
            }
            if self.should_exit() {
                break;
            }
        }
    }

    /// Start a background thread listening on stdin
    ///
    /// Anything else that reads the terminal while the agent runs (the human
    /// guide) must read from the returned `PromptLines`.
    pub fn spawn_stdin_listener(&self) -> (JoinHandle<()>, PromptLines) {
        let (sender, prompts) = prompt_channel();
        let controls = self.clone();
        let handle = thread::spawn(move || {
            controls.listen(io::stdin().lock(), Some(&sender));
        });
        (handle, prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_key_mapping() {
        assert_eq!(ControlKey::from_char(' '), Some(ControlKey::TogglePause));
        assert_eq!(ControlKey::from_char(']'), Some(ControlKey::Continuous));
        assert_eq!(ControlKey::from_char('['), Some(ControlKey::Step));
        assert_eq!(ControlKey::from_char('/'), Some(ControlKey::Exit));
        assert_eq!(ControlKey::from_char('x'), None);
    }

    #[test]
    fn test_step_mode_runs_one_step_at_a_time() {
        let controls = RunControls::new();
        assert!(controls.may_proceed());

        controls.apply(ControlKey::Step);
        assert!(controls.may_proceed());
        assert!(!controls.may_proceed());

        controls.apply(ControlKey::Continuous);
        assert!(controls.may_proceed());
        assert!(controls.may_proceed());
    }

    #[test]
    fn test_pause_toggles() {
        let controls = RunControls::new();
        controls.apply(ControlKey::TogglePause);
        assert!(!controls.may_proceed());
        controls.apply(ControlKey::TogglePause);
        assert!(controls.may_proceed());
    }

    #[test]
    fn test_listener_stops_on_exit() {
        let controls = RunControls::new();
        controls.listen(Cursor::new(" \n/\n]\n"), None);
        assert!(controls.should_exit());
        assert!(!controls.checkpoint());
        // the line after the exit key was not read
        assert!(controls.is_paused());
    }

    #[test]
    fn test_waiting_prompt_takes_one_line() {
        let controls = RunControls::new();
        let (sender, mut prompt) = prompt_channel();
        let waiting = thread::spawn(move || {
            let mut line = String::new();
            prompt.read_line(&mut line).map(|_| line)
        });
        while !sender.is_waiting() {
            thread::sleep(Duration::from_millis(1));
        }

        controls.listen(Cursor::new("2\n/\n"), Some(&sender));
        assert_eq!(waiting.join().unwrap().unwrap(), "2\n");
        // the exit key after the answer still reached the controls
        assert!(controls.should_exit());
    }

    #[test]
    fn test_lines_without_prompt_are_keys() {
        let controls = RunControls::new();
        let (sender, _prompt) = prompt_channel();
        controls.listen(Cursor::new("\n"), Some(&sender));
        assert!(controls.is_paused());
    }

    #[test]
    fn test_prompt_ends_with_listener() {
        let (sender, mut prompt) = prompt_channel();
        drop(sender);
        let mut line = String::new();
        assert_eq!(prompt.read_line(&mut line).unwrap(), 0);
    }
}
