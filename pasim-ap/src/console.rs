//! Operator console
//!
//! Line commands read from stdin, and plain-text rendering of events and
//! status for the terminal.

use crate::playback::{EffectParamsUpdate, SpeakerPosition};
use crate::simulator::SimulatorStatus;
use pasim_common::events::SimEvent;
use std::fmt::Write;

pub const HELP: &str = "\
commands:
  toggle                 start the day, then pause/resume
  pause | resume         clock transport (pause also pauses audio)
  speed N                clock multiplier
  jump HH:MM             move the clock
  stage SUBJECT          jump to the start of a period
  volume V               0.0 - 1.0
  pos X Y Z              speaker position
  fx reverb=..,delay=..,feedback=..,threshold=..
  spatial                toggle spatial processing
  reset-fx               restore default effects
  listen PATH | none     attach or remove the listening broadcast track
  status [json]          show clock and playback state
  quit";

/// One operator command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Toggle,
    Pause,
    Resume,
    Speed(u32),
    Jump(String),
    Stage(String),
    Volume(f32),
    Position(SpeakerPosition),
    Effects(EffectParamsUpdate),
    Spatial,
    ResetEffects,
    Listen(Option<String>),
    Status,
    StatusJson,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };

        let need = |what: &str| -> Result<&str, String> {
            if rest.is_empty() {
                Err(format!("'{}' needs {}", word, what))
            } else {
                Ok(rest)
            }
        };

        let command = match word {
            "toggle" | "t" => Command::Toggle,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "speed" => {
                let n: u32 = need("a number")?
                    .parse()
                    .map_err(|_| format!("invalid speed '{}'", rest))?;
                if n == 0 {
                    return Err("speed must be at least 1".to_string());
                }
                Command::Speed(n)
            }
            "jump" => Command::Jump(need("HH:MM")?.to_string()),
            "stage" => Command::Stage(need("a subject")?.to_string()),
            "volume" | "vol" => {
                let v: f32 = need("a value")?
                    .parse()
                    .map_err(|_| format!("invalid volume '{}'", rest))?;
                Command::Volume(v)
            }
            "pos" => {
                let axes: Vec<f32> = need("X Y Z")?
                    .split_whitespace()
                    .map(|s| s.parse::<f32>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| format!("invalid position '{}'", rest))?;
                match axes.as_slice() {
                    [x, y, z] => Command::Position(SpeakerPosition::new(*x, *y, *z)),
                    _ => return Err("position needs exactly three numbers".to_string()),
                }
            }
            "fx" => Command::Effects(EffectParamsUpdate::parse(need("parameters")?)?),
            "spatial" => Command::Spatial,
            "reset-fx" => Command::ResetEffects,
            "listen" => match need("a path or 'none'")? {
                "none" => Command::Listen(None),
                path => Command::Listen(Some(path.to_string())),
            },
            "status" | "s" => match rest {
                "" => Command::Status,
                "json" => Command::StatusJson,
                other => return Err(format!("unknown status format '{}'", other)),
            },
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(Some(command))
    }
}

/// Terminal notification for an event
pub fn notification(event: &SimEvent) -> String {
    match event {
        SimEvent::Announcement { title, at } => format!("[{}] 🔔 {}", at, title),
        SimEvent::ExamStarted { subject, at } => format!("[{}] 📝 {} 시험 시작", at, subject),
        SimEvent::PlaybackFailed { title, reason } => {
            format!("오디오 재생 실패: {} ({})", title, reason)
        }
        SimEvent::PlaybackStateChanged {
            old_state,
            new_state,
        } => format!("playback {} -> {}", old_state, new_state),
        SimEvent::TrackLoaded {
            title,
            duration_secs,
        } => format!("현재 방송: {} ({:.1}s)", title, duration_secs),
        SimEvent::StageChanged { stage } => format!("stage: {}", stage),
        SimEvent::ClockJumped { to } => format!("clock -> {}", to),
        SimEvent::ListeningTrackChanged { resource } => match resource {
            Some(r) => format!("듣기 방송 파일: {}", r),
            None => "듣기 방송 파일 제거".to_string(),
        },
    }
}

/// Multi-line status block
pub fn format_status(status: &SimulatorStatus) -> String {
    let clock = &status.clock;
    let playback = &status.playback;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}  x{}  {}  {}",
        clock.current_time.format("%H:%M:%S"),
        clock.speed,
        if clock.is_running { "running" } else { "paused" },
        clock.current_stage
    );
    let _ = writeln!(
        out,
        "progress {:.1}%  events {}/{} fired",
        status.progress_percent, clock.fired_events, clock.registered_events
    );
    if let Some(remaining) = &status.remaining {
        let _ = writeln!(out, "{}: {}", remaining.subject, remaining.label);
    }
    let _ = writeln!(
        out,
        "현재 방송: {}  {:.1}/{:.1}s  {}",
        playback.title.as_deref().unwrap_or("없음"),
        playback.position_secs,
        playback.duration_secs,
        if playback.is_playing { "playing" } else { "stopped" }
    );
    let fx = &playback.effects;
    let _ = write!(
        out,
        "volume {:.2}  spatial {}  pos ({}, {}, {})  reverb {:.2} delay {:.2} feedback {:.2} threshold {:.0}dB",
        playback.volume,
        if playback.spatial_enabled { "on" } else { "off" },
        playback.position.x,
        playback.position.y,
        playback.position.z,
        fx.reverb_mix,
        fx.delay_mix,
        fx.delay_feedback,
        fx.compressor_threshold
    );
    for (subject, resource) in &status.listening {
        let _ = write!(out, "\n{} 듣기 방송: {}", subject, resource);
    }
    out
}
