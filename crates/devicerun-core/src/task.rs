//! Task specifications, the typed task catalogue, and executor results.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A named task with loosely typed parameters, as produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, e.g. `browser_search`.
    pub name: String,

    /// Task parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl TaskSpec {
    /// Create a TaskSpec without parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Builder method to add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Direction of a scroll gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

impl ScrollDirection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "down" => Some(Self::Down),
            "up" => Some(Self::Up),
            _ => None,
        }
    }
}

/// Bounds for repeated primitives.
pub const MIN_REPEAT: u32 = 1;
pub const MAX_REPEAT: u32 = 10;

/// The closed set of primitives the executor knows how to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    BrowserSearch { query: String },
    OpenSettings,
    Scroll { direction: ScrollDirection, count: u32 },
    Screenshot { filename: String },
    OpenApp { package: String, activity: Option<String> },
    OpenUrl { url: String },
    Tap { x: u32, y: u32 },
    Swipe { x1: u32, y1: u32, x2: u32, y2: u32 },
    TypeText { text: String },
    NavHome,
    NavBack,
    NavRecents,
    OpenNotifications,
    Wifi { enabled: bool },
}

impl TaskKind {
    /// Resolve a [`TaskSpec`], filling defaults for absent parameters.
    pub fn from_spec(spec: &TaskSpec) -> Result<Self, CoreError> {
        let p = Params {
            task: &spec.name,
            map: &spec.params,
        };
        let kind = match spec.name.as_str() {
            "browser_search" => Self::BrowserSearch {
                query: p.string("query", "qualgent test")?,
            },
            "open_settings" => Self::OpenSettings,
            "scroll" => {
                let raw = p.string("direction", "down")?;
                let direction = ScrollDirection::parse(&raw).unwrap_or_else(|| {
                    warn!(direction = %raw, "Unknown scroll direction, scrolling down");
                    ScrollDirection::Down
                });
                Self::Scroll {
                    direction,
                    count: p.repeat("count", 2)?,
                }
            }
            "screenshot" => {
                let filename = p.string("filename", "shot_1.png")?;
                if filename.contains('/') || filename.contains('\\') || filename.starts_with('.')
                {
                    return Err(p.invalid("filename", "must be a plain file name".to_string()));
                }
                Self::Screenshot { filename }
            }
            "open_app" => {
                let package = p.string("package", "")?.trim().to_string();
                if package.is_empty() {
                    return Err(p.invalid("package", "missing package".to_string()));
                }
                let activity = p.string("activity", "")?.trim().to_string();
                Self::OpenApp {
                    package,
                    activity: (!activity.is_empty()).then_some(activity),
                }
            }
            "open_url" => Self::OpenUrl {
                url: p.string("url", "https://www.google.com")?,
            },
            "tap" => Self::Tap {
                x: p.uint("x", 500)?,
                y: p.uint("y", 1000)?,
            },
            "swipe" => Self::Swipe {
                x1: p.uint("x1", 500)?,
                y1: p.uint("y1", 1600)?,
                x2: p.uint("x2", 500)?,
                y2: p.uint("y2", 600)?,
            },
            "type_text" => Self::TypeText {
                text: p.string("text", "hello world")?,
            },
            "nav_home" => Self::NavHome,
            "nav_back" => Self::NavBack,
            "nav_recents" => Self::NavRecents,
            "open_notifications" => Self::OpenNotifications,
            "wifi" => Self::Wifi {
                enabled: p.flag("enabled", true),
            },
            other => return Err(CoreError::UnknownTask(other.to_string())),
        };
        Ok(kind)
    }

    /// Canonical task name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrowserSearch { .. } => "browser_search",
            Self::OpenSettings => "open_settings",
            Self::Scroll { .. } => "scroll",
            Self::Screenshot { .. } => "screenshot",
            Self::OpenApp { .. } => "open_app",
            Self::OpenUrl { .. } => "open_url",
            Self::Tap { .. } => "tap",
            Self::Swipe { .. } => "swipe",
            Self::TypeText { .. } => "type_text",
            Self::NavHome => "nav_home",
            Self::NavBack => "nav_back",
            Self::NavRecents => "nav_recents",
            Self::OpenNotifications => "open_notifications",
            Self::Wifi { .. } => "wifi",
        }
    }

    /// Whether the screen must be woken before the primitive runs.
    ///
    /// Key events and system toggles work with the screen off.
    pub fn needs_wake(&self) -> bool {
        !matches!(
            self,
            Self::NavHome
                | Self::NavBack
                | Self::NavRecents
                | Self::OpenNotifications
                | Self::Wifi { .. }
        )
    }

    /// How many trailing characters of backend output to keep in details.
    pub fn detail_limit(&self) -> usize {
        match self {
            Self::BrowserSearch { .. }
            | Self::OpenSettings
            | Self::OpenApp { .. }
            | Self::OpenUrl { .. } => 500,
            Self::Scroll { .. }
            | Self::Screenshot { .. }
            | Self::Tap { .. }
            | Self::Swipe { .. }
            | Self::TypeText { .. } => 200,
            Self::NavHome
            | Self::NavBack
            | Self::NavRecents
            | Self::OpenNotifications
            | Self::Wifi { .. } => 100,
        }
    }
}

/// Typed accessors over a parameter map.
struct Params<'a> {
    task: &'a str,
    map: &'a Map<String, Value>,
}

impl Params<'_> {
    fn invalid(&self, param: &str, reason: String) -> CoreError {
        CoreError::InvalidParam {
            task: self.task.to_string(),
            param: param.to_string(),
            reason,
        }
    }

    fn string(&self, key: &str, default: &str) -> Result<String, CoreError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(other) => Err(self.invalid(key, format!("expected a string, got {other}"))),
        }
    }

    /// Accepts integers and numeric strings.
    fn uint(&self, key: &str, default: u32) -> Result<u32, CoreError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    self.invalid(key, format!("expected a non-negative integer, got {n}"))
                }),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .map_err(|e| self.invalid(key, format!("'{s}': {e}"))),
            Some(other) => {
                Err(self.invalid(key, format!("expected a non-negative integer, got {other}")))
            }
        }
    }

    /// A repeat count: any number, truncated toward zero and clamped to
    /// `MIN_REPEAT..=MAX_REPEAT`.
    fn repeat(&self, key: &str, default: u32) -> Result<u32, CoreError> {
        let value = match self.map.get(key) {
            None | Some(Value::Null) => return Ok(default),
            Some(Value::Number(n)) => n.as_i64().map(|v| v as f64).or_else(|| n.as_f64()),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        match value {
            Some(v) if v.is_finite() => {
                let clamped = v.trunc().clamp(f64::from(MIN_REPEAT), f64::from(MAX_REPEAT));
                Ok(clamped as u32)
            }
            _ => {
                let got = self.map.get(key).map(Value::to_string).unwrap_or_default();
                Err(self.invalid(key, format!("expected a number, got {got}")))
            }
        }
    }

    /// Truthiness: `false`, `0`, `""` and `null` are false.
    fn flag(&self, key: &str, default: bool) -> bool {
        match self.map.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) => false,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }
}

/// Outcome of a single executor invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether every required primitive succeeded.
    pub success: bool,

    /// Wall clock from pre-flight start, millisecond precision.
    pub latency_sec: f64,

    /// Task name as requested.
    pub task: String,

    /// Bounded tail of backend output or the failure reason.
    pub details: String,

    /// A backend call timed out or the task ran past the slow threshold.
    pub timeout: bool,
}

impl TaskResult {
    /// A failed result.
    pub fn failed(task: impl Into<String>, details: impl Into<String>, latency_sec: f64) -> Self {
        Self {
            success: false,
            latency_sec,
            task: task.into(),
            details: details.into(),
            timeout: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_task() {
        let err = TaskKind::from_spec(&TaskSpec::new("fly_to_moon")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownTask(_)));
        assert_eq!(err.to_string(), "Unknown task: fly_to_moon");
    }

    #[test]
    fn test_defaults_applied() {
        let kind = TaskKind::from_spec(&TaskSpec::new("swipe")).unwrap();
        assert_eq!(
            kind,
            TaskKind::Swipe {
                x1: 500,
                y1: 1600,
                x2: 500,
                y2: 600
            }
        );
        let kind = TaskKind::from_spec(&TaskSpec::new("browser_search")).unwrap();
        assert_eq!(
            kind,
            TaskKind::BrowserSearch {
                query: "qualgent test".to_string()
            }
        );
    }

    #[test]
    fn test_scroll_count_is_clamped() {
        let spec = TaskSpec::new("scroll").with_param("count", 50);
        assert!(matches!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Scroll { count: 10, .. }
        ));
        let spec = TaskSpec::new("scroll").with_param("count", 0);
        assert!(matches!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Scroll { count: 1, .. }
        ));
    }

    #[test]
    fn test_scroll_tolerates_loose_input() {
        let cases = [
            (json!(-3), 1),
            (json!(3.0), 3),
            (json!(4.7), 4),
            (json!("5"), 5),
            (json!(u64::MAX), 10),
        ];
        for (count, expected) in cases {
            let spec = TaskSpec::new("scroll").with_param("count", count.clone());
            assert_eq!(
                TaskKind::from_spec(&spec).unwrap(),
                TaskKind::Scroll {
                    direction: ScrollDirection::Down,
                    count: expected
                },
                "count {count}"
            );
        }

        let spec = TaskSpec::new("scroll")
            .with_param("direction", "left")
            .with_param("count", 2);
        assert_eq!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Scroll {
                direction: ScrollDirection::Down,
                count: 2
            }
        );

        let spec = TaskSpec::new("scroll").with_param("count", "many");
        assert!(matches!(
            TaskKind::from_spec(&spec).unwrap_err(),
            CoreError::InvalidParam { .. }
        ));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let spec = TaskSpec::new("tap").with_param("x", "120").with_param("y", 340);
        assert_eq!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Tap { x: 120, y: 340 }
        );
    }

    #[test]
    fn test_invalid_coordinate() {
        let spec = TaskSpec::new("tap").with_param("x", "left");
        let err = TaskKind::from_spec(&spec).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParam { ref param, .. } if param == "x"));
    }

    #[test]
    fn test_open_app_requires_package() {
        let err = TaskKind::from_spec(&TaskSpec::new("open_app")).unwrap_err();
        assert!(err.to_string().contains("missing package"));

        let spec = TaskSpec::new("open_app")
            .with_param("package", "com.android.chrome")
            .with_param("activity", "");
        assert_eq!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::OpenApp {
                package: "com.android.chrome".to_string(),
                activity: None
            }
        );
    }

    #[test]
    fn test_screenshot_rejects_paths() {
        let spec = TaskSpec::new("screenshot").with_param("filename", "../etc/passwd");
        assert!(TaskKind::from_spec(&spec).is_err());
    }

    #[test]
    fn test_wifi_flag_truthiness() {
        let spec = TaskSpec::new("wifi").with_param("enabled", 0);
        assert_eq!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Wifi { enabled: false }
        );
        let spec = TaskSpec::new("wifi");
        assert_eq!(
            TaskKind::from_spec(&spec).unwrap(),
            TaskKind::Wifi { enabled: true }
        );
    }

    #[test]
    fn test_nav_tasks_skip_wake() {
        assert_eq!(TaskKind::NavBack.name(), "nav_back");
        assert!(!TaskKind::NavBack.needs_wake());
        assert!(TaskKind::OpenSettings.needs_wake());
    }
}
