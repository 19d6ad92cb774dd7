//! Wire-level browser actions.
//!
//! Actions cross the environment boundary as JSON objects with an `action`
//! discriminator. They are parsed into a tagged enum up front so every
//! downstream match (execution, substitution, rendering) is exhaustive.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Scroll direction for [`Action::Scroll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// One browser action chosen by the agent.
///
/// The wire form is `{"action": "<discriminator>", ...fields}`. Unknown
/// discriminators fail at parse time rather than deep inside a session.
/// `done`/`end` are accepted as aliases of `terminate` since models use
/// them interchangeably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click {
        target: String,
    },
    Type {
        target: String,
        text: String,
    },
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    Wait {
        duration_ms: u64,
    },
    Read {
        duration_ms: u64,
    },
    Hover {
        target: String,
    },
    GotoUrl {
        url: String,
    },
    Back,
    #[serde(alias = "done", alias = "end")]
    Terminate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Action {
    /// Wire discriminator for this action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::Read { .. } => "read",
            Action::Hover { .. } => "hover",
            Action::GotoUrl { .. } => "goto_url",
            Action::Back => "back",
            Action::Terminate { .. } => "terminate",
        }
    }

    /// True for actions that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Terminate { .. })
    }

    /// Parse an action from a wire JSON value, validating the discriminator.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Short human-readable rendering used as memory content.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { target } => format!("Clicked '{}'", target),
            Action::Type { target, text } => format!("Typed '{}' into '{}'", text, target),
            Action::Scroll { direction, amount } => {
                let dir = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                };
                format!("Scrolled {} by {}px", dir, amount)
            }
            Action::Wait { duration_ms } => format!("Paused for {}ms", duration_ms),
            Action::Read { duration_ms } => format!("Read the page for {}ms", duration_ms),
            Action::Hover { target } => format!("Hovered over '{}'", target),
            Action::GotoUrl { url } => format!("Navigated to {}", url),
            Action::Back => "Went back to the previous page".to_string(),
            Action::Terminate { reason } => match reason {
                Some(r) => format!("Ended the session: {}", r),
                None => "Ended the session".to_string(),
            },
        }
    }
}
