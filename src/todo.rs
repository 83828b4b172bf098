// todo.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: None,
            completed: false,
            date: None,
            time: None,
            recurrence: None,
            is_remote: false,
        }
    }

    pub fn with_schedule(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self.time = Some(time.into());
        self
    }
}

/// Recurrence labels offered by the editor. Stored on the task as text only;
/// reminders are always one-shot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Recurrence {
    #[default]
    None,
    Every5Minutes,
    Every15Minutes,
    Every30Minutes,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub const ALL: [Recurrence; 8] = [
        Recurrence::None,
        Recurrence::Every5Minutes,
        Recurrence::Every15Minutes,
        Recurrence::Every30Minutes,
        Recurrence::Hourly,
        Recurrence::Daily,
        Recurrence::Weekly,
        Recurrence::Monthly,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Recurrence::None => "None",
            Recurrence::Every5Minutes => "Every 5 minutes",
            Recurrence::Every15Minutes => "Every 15 minutes",
            Recurrence::Every30Minutes => "Every 30 minutes",
            Recurrence::Hourly => "Hourly",
            Recurrence::Daily => "Daily",
            Recurrence::Weekly => "Weekly",
            Recurrence::Monthly => "Monthly",
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|r| *r == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.label() == s)
            .ok_or_else(|| format!("Unknown recurrence '{}'", s))
    }
}
