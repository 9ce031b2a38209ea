// src/motion/homing.rs - textual homing-sequence interpreter
//
// Sequence grammar (one command at a time, ';'/'#' separate commands):
//   <axis letter X|Y|Z><+|-><digits?>   relative seek move; distance defaults
//                                       to the axis max range, feedrate to
//                                       max speed / 10
//     R<1-9>                            feedrate multiplier n/10 of max speed
//     S<sel>[!]                         endstop test: selector 'X' picks the
//                                       max endstop, anything else the min
//                                       endstop; '!' tests NOT-hit instead of
//                                       hit. R and S may appear in any order
//                                       after the distance.
//   <axis letter>=H                     set current position as home for axis
//   $                                   sequence finished, homed ok
//
// Each seek move is tagged with a numbered command index; the next command is
// not issued until the actuator reports that index complete. An overall
// timeout abandons the sequence and reports not homed.

use std::time::{Duration, Instant};

use super::MAX_AXES;
use super::axes_params::AxesParams;
use super::axis_values::{AxisEndstopChecks, AxisFloats, EndstopCondition};
use super::command::{MoveCommand, MoveType};

/// Numbered command indices for homing moves start here.
pub const HOMING_BASE_COMMAND_INDEX: i32 = 10_000;

const MAX_HOMING_SECS_DEFAULT: u64 = 1000;

/// What the helper should do next on behalf of the homing sequence.
#[derive(Debug, Clone)]
pub enum HomingAction {
    Move(MoveCommand),
    SetHome(usize),
}

#[derive(Debug)]
pub struct MotionHoming {
    sequence: String,
    str_pos: usize,
    homing_in_progress: bool,
    is_homed_ok: bool,
    command_in_progress: bool,
    cur_command_index: i32,
    max_duration: Duration,
    started_at: Option<Instant>,
    axes_to_home: [bool; MAX_AXES],
}

impl Default for MotionHoming {
    fn default() -> Self {
        Self {
            sequence: String::new(),
            str_pos: 0,
            homing_in_progress: false,
            is_homed_ok: false,
            command_in_progress: false,
            cur_command_index: HOMING_BASE_COMMAND_INDEX,
            max_duration: Duration::from_secs(MAX_HOMING_SECS_DEFAULT),
            started_at: None,
            axes_to_home: [false; MAX_AXES],
        }
    }
}

impl MotionHoming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, sequence: &str, max_duration_secs: u64) {
        self.sequence = sequence.to_string();
        self.max_duration = Duration::from_secs(if max_duration_secs == 0 {
            MAX_HOMING_SECS_DEFAULT
        } else {
            max_duration_secs
        });
        self.str_pos = 0;
        self.command_in_progress = false;
        tracing::info!("homing: sequence {:?}", self.sequence);
    }

    pub fn is_homing_in_progress(&self) -> bool {
        self.homing_in_progress
    }

    pub fn is_homed_ok(&self) -> bool {
        self.is_homed_ok
    }

    /// Begin the configured sequence for the selected axes.
    pub fn start(&mut self, axes_to_home: [bool; MAX_AXES]) {
        self.axes_to_home = axes_to_home;
        self.str_pos = 0;
        self.homing_in_progress = true;
        self.command_in_progress = false;
        self.is_homed_ok = false;
        self.started_at = Some(Instant::now());
        tracing::info!("homing: start, seq = {:?}", self.sequence);
    }

    /// Drive the sequence forward. Returns at most one action per call; the
    /// caller executes it and keeps calling service on its normal cadence.
    pub fn service(
        &mut self,
        axes_params: &AxesParams,
        last_completed_index: i32,
    ) -> Option<HomingAction> {
        if !self.homing_in_progress {
            return None;
        }

        // Overall timeout, checked even while a command is still running.
        if let Some(started) = self.started_at {
            if started.elapsed() > self.max_duration {
                tracing::warn!("homing: timed out");
                self.is_homed_ok = false;
                self.homing_in_progress = false;
                self.command_in_progress = false;
                return None;
            }
        }

        if self.command_in_progress {
            if last_completed_index != self.cur_command_index {
                return None;
            }
            self.command_in_progress = false;
        }

        let action = self.extract_next_command(axes_params);
        if action.is_none() && !self.command_in_progress {
            // Sequence exhausted (is_homed_ok only set by '$').
            self.homing_in_progress = false;
        }
        action
    }

    fn peek(&self) -> Option<char> {
        self.sequence[self.str_pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.str_pos += ch.len_utf8();
        }
    }

    /// Parse an unsigned decimal number (digits and '.') at the cursor.
    fn parse_number(&mut self) -> Option<f32> {
        let start = self.str_pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                self.bump();
            } else {
                break;
            }
        }
        if self.str_pos > start {
            self.sequence[start..self.str_pos].parse().ok()
        } else {
            None
        }
    }

    fn axis_index_for(ch: char) -> Option<usize> {
        match ch.to_ascii_uppercase() {
            'X' => Some(0),
            'Y' => Some(1),
            'Z' => Some(2),
            _ => None,
        }
    }

    fn extract_next_command(&mut self, axes_params: &AxesParams) -> Option<HomingAction> {
        while let Some(ch) = self.peek() {
            if ch == '$' {
                self.bump();
                tracing::info!("homing: homed ok");
                self.is_homed_ok = true;
                self.homing_in_progress = false;
                self.command_in_progress = false;
                return None;
            }
            if let Some(axis_idx) = Self::axis_index_for(ch) {
                self.bump();
                match self.peek() {
                    Some(sign @ ('+' | '-')) => {
                        self.bump();
                        if let Some(action) = self.parse_seek_move(axes_params, axis_idx, sign) {
                            return Some(action);
                        }
                        continue;
                    }
                    Some('=') => {
                        self.bump();
                        if matches!(self.peek(), Some('H' | 'h')) {
                            self.bump();
                            tracing::info!("homing: setting at home for axis {axis_idx}");
                            return Some(HomingAction::SetHome(axis_idx));
                        }
                        continue;
                    }
                    _ => continue,
                }
            }
            // Separators and anything unrecognized.
            self.bump();
        }
        None
    }

    /// Parse the remainder of a seek move after the sign and return the
    /// command, or None if this axis is not being homed.
    fn parse_seek_move(
        &mut self,
        axes_params: &AxesParams,
        axis_idx: usize,
        sign: char,
    ) -> Option<HomingAction> {
        let axis = axes_params.axis(axis_idx);
        let mut dist_mm = self.parse_number().unwrap_or_else(|| axis.max_range_mm());
        if sign == '-' {
            dist_mm = -dist_mm;
        }
        let mut feedrate = axis.max_speed_mmps / 10.0;
        let mut endstops = AxisEndstopChecks::none();

        // Suffix options in any order up to the next separator; unknown
        // characters are skipped.
        loop {
            match self.peek() {
                None | Some(';' | '#' | '$' | '=') => break,
                Some('R' | 'r') => {
                    self.bump();
                    if let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
                        if (1..=9).contains(&digit) {
                            feedrate = axis.max_speed_mmps * digit as f32 / 10.0;
                            self.bump();
                        }
                    }
                }
                Some('S' | 's') => {
                    self.bump();
                    // One selector character is consumed (unless it would be
                    // a separator); 'X' picks the max endstop.
                    let mut endstop_idx = AxisEndstopChecks::MIN_ENDSTOP;
                    match self.peek() {
                        Some(sel) if !matches!(sel, ';' | '#' | '$' | '=') => {
                            if matches!(sel, 'X' | 'x') {
                                endstop_idx = AxisEndstopChecks::MAX_ENDSTOP;
                            }
                            self.bump();
                        }
                        _ => {}
                    }
                    let condition = if matches!(self.peek(), Some('!')) {
                        self.bump();
                        EndstopCondition::NotHit
                    } else {
                        EndstopCondition::Hit
                    };
                    endstops.set(axis_idx, endstop_idx, condition);
                }
                Some(_) => self.bump(),
            }
        }

        if !self.axes_to_home[axis_idx] {
            tracing::info!("homing: axis {axis_idx} in sequence but not required to home");
            return None;
        }

        let mut target = AxisFloats::new();
        target.set(axis_idx, dist_mm);
        self.cur_command_index += 1;
        self.command_in_progress = true;
        let command = MoveCommand {
            target,
            feedrate_mmps: Some(feedrate),
            move_type: Some(MoveType::Relative),
            endstops,
            allow_out_of_bounds: true,
            dont_split: true,
            numbered_index: Some(self.cur_command_index),
            is_homing: true,
        };
        tracing::debug!(
            "homing: axis {axis_idx} seek {dist_mm}mm at {feedrate}mm/s idx {}",
            self.cur_command_index
        );
        Some(HomingAction::Move(command))
    }
}
