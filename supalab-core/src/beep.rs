//! Recurring "beep" timer used to check that background output and the
//! prompt get along.
//!
//! Every running beep owns a [`StopFlag`]. The ticking task and the task
//! waiting for the total duration both watch the flag, so `beep stop`
//! ends a beep at its next await point.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::stop_flag::StopFlag;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_MESSAGE: &str = "beep";
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

const TIME: &str = r"(?:\d+(?:\.\d+)?|\.\d+)[smhSMH]?";

#[derive(Debug, Clone, PartialEq)]
pub struct BeepSpec {
    pub interval: Duration,
    pub duration: Duration,
    pub message: String,
}

impl Default for BeepSpec {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            duration: DEFAULT_DURATION,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeepCommand {
    Start(BeepSpec),
    Stop(u32),
    StopAll,
}

struct BeepPatterns {
    stop_one: Regex,
    full: Regex,
    interval_duration: Regex,
    interval_message: Regex,
    interval_only: Regex,
}

fn patterns() -> &'static BeepPatterns {
    static PATTERNS: OnceLock<BeepPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |s: String| Regex::new(&s).expect("valid beep regex");
        BeepPatterns {
            stop_one: re(r"^stop\s+(\d+)$".to_string()),
            full: re(format!(r"^({TIME})\s+({TIME})\s+(\S.*)$")),
            interval_duration: re(format!(r"^({TIME})\s+({TIME})$")),
            interval_message: re(format!(r"^({TIME})\s+([^\d\s].*)$")),
            interval_only: re(format!(r"^({TIME})$")),
        }
    })
}

/// Parse `1.5`, `30s`, `2m` or `1h` into a duration.
pub fn parse_time(s: &str) -> Option<Duration> {
    let (number, multiplier) = match s.chars().last()?.to_ascii_lowercase() {
        's' => (&s[..s.len() - 1], 1.0),
        'm' => (&s[..s.len() - 1], 60.0),
        'h' => (&s[..s.len() - 1], 3600.0),
        _ => (s, 1.0),
    };
    let seconds: f64 = number.parse().ok()?;
    Duration::try_from_secs_f64(seconds * multiplier).ok()
}

/// Interpret the argument string of `dev beep`.
pub fn parse_beep_args(args: &str) -> BeepCommand {
    let args = args.trim();
    let p = patterns();

    if let Some(caps) = p.stop_one.captures(args) {
        if let Ok(id) = caps[1].parse() {
            return BeepCommand::Stop(id);
        }
    }
    if args == "stop" {
        return BeepCommand::StopAll;
    }

    let mut spec = BeepSpec::default();
    let time = |s: &str, fallback: Duration| parse_time(s).unwrap_or(fallback);

    if let Some(caps) = p.full.captures(args) {
        spec.interval = time(&caps[1], DEFAULT_INTERVAL);
        spec.duration = time(&caps[2], DEFAULT_DURATION);
        spec.message = caps[3].to_string();
    } else if let Some(caps) = p.interval_duration.captures(args) {
        spec.interval = time(&caps[1], DEFAULT_INTERVAL);
        spec.duration = time(&caps[2], DEFAULT_DURATION);
    } else if let Some(caps) = p.interval_message.captures(args) {
        spec.interval = time(&caps[1], DEFAULT_INTERVAL);
        spec.message = caps[2].to_string();
    } else if let Some(caps) = p.interval_only.captures(args) {
        spec.interval = time(&caps[1], DEFAULT_INTERVAL);
    }
    spec.interval = spec.interval.max(MIN_INTERVAL);

    BeepCommand::Start(spec)
}

/// Where beep lines go.
pub type BeepSink = Arc<dyn Fn(String) + Send + Sync>;

/// Running beeps by id.
#[derive(Clone, Default)]
pub struct BeepRegistry {
    beeps: Arc<Mutex<BTreeMap<u32, StopFlag>>>,
}

impl BeepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the lowest free id.
    fn allocate(&self) -> (u32, StopFlag) {
        let mut beeps = self.beeps.lock().unwrap_or_else(|e| e.into_inner());
        let id = (0..)
            .find(|id| !beeps.contains_key(id))
            .unwrap_or_default();
        let flag = StopFlag::new();
        beeps.insert(id, flag.clone());
        (id, flag)
    }

    fn release(&self, id: u32) {
        let mut beeps = self.beeps.lock().unwrap_or_else(|e| e.into_inner());
        beeps.remove(&id);
    }

    /// Returns `false` when no beep with this id is running.
    pub fn stop(&self, id: u32) -> bool {
        let beeps = self.beeps.lock().unwrap_or_else(|e| e.into_inner());
        match beeps.get(&id) {
            Some(flag) => {
                flag.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let beeps = self.beeps.lock().unwrap_or_else(|e| e.into_inner());
        for flag in beeps.values() {
            flag.stop();
        }
    }

    pub fn active_ids(&self) -> Vec<u32> {
        let beeps = self.beeps.lock().unwrap_or_else(|e| e.into_inner());
        beeps.keys().copied().collect()
    }

    /// Start a beep in the background. The returned task finishes when the
    /// duration has elapsed or the beep was stopped; its id is free again
    /// afterwards.
    pub fn start(&self, spec: BeepSpec, sink: BeepSink) -> (u32, JoinHandle<()>) {
        let (id, flag) = self.allocate();
        let registry = self.clone();

        let handle = tokio::spawn(async move {
            debug!("Beep {} started: {:?}", id, spec);
            let ticker = {
                let flag = flag.clone();
                let interval = spec.interval;
                let message = spec.message.clone();
                tokio::spawn(async move {
                    let mut seq = 1u64;
                    while !flag.is_stopped() {
                        sink(format!("{id}: beep_seq={seq} {message}"));
                        seq += 1;
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {}
                            _ = flag.wait() => break,
                        }
                    }
                })
            };

            tokio::select! {
                _ = tokio::time::sleep(spec.duration) => {}
                _ = flag.wait() => {}
            }
            flag.stop();
            let _ = ticker.await;
            registry.release(id);
            debug!("Beep {} finished", id);
        });

        (id, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(interval: f64, duration: f64, message: &str) -> BeepCommand {
        BeepCommand::Start(BeepSpec {
            interval: Duration::from_secs_f64(interval),
            duration: Duration::from_secs_f64(duration),
            message: message.to_string(),
        })
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_time("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_time(".5s"), Some(Duration::from_millis(500)));
        assert_eq!(parse_time("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_time("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_time("x"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_parse_stop() {
        assert_eq!(parse_beep_args(" stop 3"), BeepCommand::Stop(3));
        assert_eq!(parse_beep_args("stop"), BeepCommand::StopAll);
    }

    #[test]
    fn test_parse_start_forms() {
        assert_eq!(parse_beep_args(""), start(1.0, 10.0, "beep"));
        assert_eq!(parse_beep_args("2"), start(2.0, 10.0, "beep"));
        assert_eq!(parse_beep_args("2 5"), start(2.0, 5.0, "beep"));
        assert_eq!(parse_beep_args("2 hello there"), start(2.0, 10.0, "hello there"));
        assert_eq!(parse_beep_args("0.5 1m wake up"), start(0.5, 60.0, "wake up"));
        assert_eq!(parse_beep_args("nonsense"), start(1.0, 10.0, "beep"));
    }

    #[test]
    fn test_interval_is_clamped() {
        assert_eq!(parse_beep_args("0 2"), start(0.1, 2.0, "beep"));
    }

    #[tokio::test]
    async fn test_beep_prints_and_frees_id() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink: BeepSink = {
            let lines = lines.clone();
            Arc::new(move |line| lines.lock().unwrap().push(line))
        };
        let registry = BeepRegistry::new();
        let spec = BeepSpec {
            interval: Duration::from_millis(100),
            duration: Duration::from_millis(250),
            message: "hi".to_string(),
        };

        let (id, handle) = registry.start(spec, sink);
        assert_eq!(id, 0);
        assert_eq!(registry.active_ids(), vec![0]);
        handle.await.unwrap();

        let lines = lines.lock().unwrap();
        assert!(lines.len() >= 2, "got {:?}", *lines);
        assert_eq!(lines[0], "0: beep_seq=1 hi");
        assert_eq!(lines[1], "0: beep_seq=2 hi");
        assert!(registry.active_ids().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_beep_early_and_ids_are_reused() {
        let sink: BeepSink = Arc::new(|_| {});
        let registry = BeepRegistry::new();
        let long = BeepSpec {
            interval: Duration::from_millis(100),
            duration: Duration::from_secs(60),
            message: "long".to_string(),
        };

        let (first, first_handle) = registry.start(long.clone(), sink.clone());
        let (second, second_handle) = registry.start(long.clone(), sink.clone());
        assert_eq!((first, second), (0, 1));

        assert!(registry.stop(0));
        assert!(!registry.stop(7));
        tokio::time::timeout(Duration::from_secs(1), first_handle)
            .await
            .expect("stopped beep finishes")
            .unwrap();

        let (third, third_handle) = registry.start(long, sink);
        assert_eq!(third, 0);

        registry.stop_all();
        for handle in [second_handle, third_handle] {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("stopped beep finishes")
                .unwrap();
        }
        assert!(registry.active_ids().is_empty());
    }
}
