//! Line-based control surface
//!
//! Each stdin line is one command. Commands map one-to-one onto the session's
//! control and query operations; nothing here changes session state on its own.
//!
//! | Line | Operation |
//! |------|-----------|
//! | `calibrate` | `trigger_calibration` |
//! | `start` | `start_session` |
//! | `stop` | `stop_session` |
//! | `restart` | `restart_session` |
//! | `difficulty <0..1>` | `set_difficulty` |
//! | `export [dir]` | `export_session` |
//! | `status` | `snapshot` |
//! | `quit` | leave the tick loop |

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use kneeguard_core::{KneeGuardResult, ReadingSource, Session, SmoothnessAnalyzer};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Calibrate,
    Start,
    Stop,
    Restart,
    Difficulty(f64),
    Export(Option<PathBuf>),
    Status,
    Quit,
}

impl ControlCommand {
    /// Parse one input line; blank lines yield `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("calibrate", None) => Self::Calibrate,
            ("start", None) => Self::Start,
            ("stop", None) => Self::Stop,
            ("restart", None) => Self::Restart,
            ("difficulty", Some(value)) => {
                Self::Difficulty(value.parse().map_err(|_| format!("'{value}' is not a number"))?)
            }
            ("difficulty", None) => return Err("difficulty needs a value between 0 and 1".into()),
            ("export", dir) => Self::Export(dir.map(PathBuf::from)),
            ("status", None) => Self::Status,
            ("quit" | "exit", None) => Self::Quit,
            (other, _) => return Err(format!("unknown command '{other}'")),
        };
        Ok(Some(command))
    }

    /// Run against `session`; returns `false` when the loop should exit
    pub fn apply<R, A>(&self, session: &mut Session<R, A>, default_export_dir: &Path) -> KneeGuardResult<bool>
    where
        R: ReadingSource,
        A: SmoothnessAnalyzer,
    {
        match self {
            Self::Calibrate => session.trigger_calibration()?,
            Self::Start => session.start_session()?,
            Self::Stop => session.stop_session()?,
            Self::Restart => session.restart_session(),
            Self::Difficulty(value) => session.set_difficulty(*value)?,
            Self::Export(dir) => {
                let path = session.export_session(dir.as_deref().unwrap_or(default_export_dir))?;
                info!("Session exported to {}", path.display());
            }
            Self::Status => {
                let snapshot = session.snapshot();
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(text) => println!("{text}"),
                    Err(err) => warn!("Cannot render status: {}", err),
                }
            }
            Self::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Read commands from `input` on a background thread
///
/// End of input sends `Quit`. The thread is not joined; it ends with the process
/// or when the receiver goes away.
pub fn spawn_reader<I>(input: I, commands: Sender<ControlCommand>) -> std::io::Result<()>
where
    I: BufRead + Send + 'static,
{
    thread::Builder::new().name("kneeguard-stdin".into()).spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            match ControlCommand::parse(&line) {
                Ok(Some(command)) => {
                    debug!("Command: {:?}", command);
                    if commands.send(command).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("{}", err),
            }
        }
        let _ = commands.send(ControlCommand::Quit);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    use kneeguard_core::{DisabledAnalyzer, FixedTime, KneeGuardError, LatestReadingCache, SessionConfig};

    #[test]
    fn parses_every_command() {
        assert_eq!(ControlCommand::parse("calibrate"), Ok(Some(ControlCommand::Calibrate)));
        assert_eq!(ControlCommand::parse("  START "), Ok(Some(ControlCommand::Start)));
        assert_eq!(ControlCommand::parse("difficulty 0.25"), Ok(Some(ControlCommand::Difficulty(0.25))));
        assert_eq!(ControlCommand::parse("export"), Ok(Some(ControlCommand::Export(None))));
        assert_eq!(
            ControlCommand::parse("export /tmp/out"),
            Ok(Some(ControlCommand::Export(Some(PathBuf::from("/tmp/out")))))
        );
        assert_eq!(ControlCommand::parse("exit"), Ok(Some(ControlCommand::Quit)));
        assert_eq!(ControlCommand::parse(""), Ok(None));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(ControlCommand::parse("difficulty").is_err());
        assert!(ControlCommand::parse("difficulty hard").is_err());
        assert!(ControlCommand::parse("start now please").is_err());
        assert!(ControlCommand::parse("jump").is_err());
    }

    #[test]
    fn commands_reach_the_session() {
        let cache = Arc::new(LatestReadingCache::new());
        let mut session =
            Session::new(SessionConfig::default(), cache, DisabledAnalyzer, Box::new(FixedTime::new(0))).unwrap();
        let dir = Path::new(".");

        assert_eq!(
            ControlCommand::Start.apply(&mut session, dir),
            Err(KneeGuardError::InvalidTransition { action: "start", phase: "uncalibrated" })
        );
        assert_eq!(ControlCommand::Difficulty(0.8).apply(&mut session, dir), Ok(true));
        assert_eq!(session.snapshot().difficulty, 0.8);
        assert_eq!(ControlCommand::Quit.apply(&mut session, dir), Ok(false));
    }

    #[test]
    fn reader_ends_with_quit() {
        let (tx, rx) = crossbeam_channel::unbounded();
        spawn_reader(Cursor::new(b"calibrate\n\nbogus\nstart\n".to_vec()), tx).unwrap();

        let received: Vec<ControlCommand> =
            (0..3).map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap()).collect();
        assert_eq!(received, vec![ControlCommand::Calibrate, ControlCommand::Start, ControlCommand::Quit]);
    }
}
