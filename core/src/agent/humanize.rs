//! Human-noise substitution for planned actions.
//!
//! Real visitors stall, skim, and wander. With substitution enabled, a
//! planned action is occasionally swapped for a read pause, an idle wait, a
//! scroll, or a hover before it reaches the environment. Terminal actions
//! pass through untouched, and a distraction is never the same kind as the
//! action the visitor just performed.

use rand::Rng;
use tracing::debug;

use crate::action::{Action, ScrollDirection};
use crate::agent::config::HumanizeConfig;

/// Maybe replace a planned action with a human-like distraction.
///
/// Returns the planned action unchanged when substitution is disabled, the
/// probability roll misses, the action is terminal, or the rolled distraction
/// would repeat the previous action's kind.
pub fn substitute_action<R: Rng>(
    config: &HumanizeConfig,
    rng: &mut R,
    planned: &Action,
    previous: Option<&Action>,
    clickables: &[String],
) -> Action {
    if !config.enabled || planned.is_terminal() {
        return planned.clone();
    }
    if rng.gen::<f64>() >= config.substitution_prob {
        return planned.clone();
    }

    let total =
        config.read_weight + config.wait_weight + config.scroll_weight + config.hover_weight;
    if total <= 0.0 {
        return planned.clone();
    }

    let previous_name = previous.map(Action::name);
    let roll = rng.gen::<f64>() * total;

    let substituted = if roll < config.read_weight {
        if previous_name == Some("read") {
            return planned.clone();
        }
        Action::Read {
            duration_ms: rng.gen_range(config.read_ms_min..=config.read_ms_max),
        }
    } else if roll < config.read_weight + config.wait_weight {
        if previous_name == Some("wait") {
            return planned.clone();
        }
        Action::Wait {
            duration_ms: rng.gen_range(config.wait_ms_min..=config.wait_ms_max),
        }
    } else if roll < config.read_weight + config.wait_weight + config.scroll_weight {
        if previous_name == Some("scroll") {
            return planned.clone();
        }
        let direction = if rng.gen::<f64>() < config.scroll_down_bias {
            ScrollDirection::Down
        } else {
            ScrollDirection::Up
        };
        Action::Scroll {
            direction,
            amount: rng.gen_range(config.scroll_px_min..=config.scroll_px_max),
        }
    } else {
        if previous_name == Some("hover") || clickables.is_empty() {
            return planned.clone();
        }
        let target = clickables[rng.gen_range(0..clickables.len())].clone();
        Action::Hover { target }
    };

    debug!(
        target = "humanize",
        planned = planned.name(),
        substituted = substituted.name(),
        "Swapped planned action for a distraction"
    );
    substituted
}
