// src/trigger.rs
use log::{info, warn};

/// Downstream action fired once per blink chunk. Fire-and-forget.
pub trait ActionTrigger {
    fn fire(&mut self);
}

/// Only logs the detection.
#[derive(Debug, Default)]
pub struct LogTrigger;

impl ActionTrigger for LogTrigger {
    fn fire(&mut self) {
        info!("Blink detected");
    }
}

/// Synthesizes a space-bar press and release.
#[derive(Debug, Default)]
pub struct KeyPressTrigger {
    warned: bool,
}

impl KeyPressTrigger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionTrigger for KeyPressTrigger {
    fn fire(&mut self) {
        match press_space() {
            Ok(()) => info!("Blink detected, space pressed"),
            Err(reason) => {
                if !self.warned {
                    warn!("key press unavailable ({reason}); blinks will only be logged");
                    self.warned = true;
                }
                info!("Blink detected");
            }
        }
    }
}

#[cfg(windows)]
fn press_space() -> Result<(), String> {
    use std::mem::{size_of, zeroed};
    use winapi::um::winuser::{
        SendInput, INPUT, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, VK_SPACE,
    };
    // Safety: INPUT is plain data; the keyboard arm is the one written.
    unsafe {
        let mut inputs: [INPUT; 2] = zeroed();
        for (input, flags) in inputs.iter_mut().zip([0, KEYEVENTF_KEYUP]) {
            input.type_ = INPUT_KEYBOARD;
            *input.u.ki_mut() = KEYBDINPUT {
                wVk: VK_SPACE as u16,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            };
        }
        let sent = SendInput(2, inputs.as_mut_ptr(), size_of::<INPUT>() as i32);
        if sent == 2 {
            Ok(())
        } else {
            Err(format!("SendInput injected {sent} of 2 events"))
        }
    }
}

#[cfg(not(windows))]
fn press_space() -> Result<(), String> {
    Err("synthetic key presses are only supported on Windows".into())
}

/// Counts fires; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    fired: usize,
}

impl RecordingTrigger {
    pub fn fired(&self) -> usize {
        self.fired
    }
}

impl ActionTrigger for RecordingTrigger {
    fn fire(&mut self) {
        self.fired += 1;
    }
}
