//! Keyword extraction from reasoning-model suggestions.
//!
//! The reasoning model answers in free text ("The path ahead looks clear, go
//! forward").  Only a handful of direction words are recognised; anything
//! else yields no command.  Halting words are checked first so that "stop,
//! don't go forward" halts.  Common inflections count ("forwards",
//! "leftward", "waiting"); words that merely start with a keyword
//! ("backpack", "leftover") do not.

use rover_types::{Action, RoverCommand};

/// Keyword groups in match priority order.
const KEYWORDS: &[(Action, &[&str])] = &[
    (Action::Stop, &["stop", "wait"]),
    (Action::Forward, &["forward", "ahead"]),
    (Action::Backward, &["back", "backward", "reverse"]),
    (Action::Left, &["left"]),
    (Action::Right, &["right"]),
];

/// Endings accepted after a keyword.
const INFLECTIONS: &[&str] = &["", "s", "ward", "wards", "ing", "ed", "ped", "ping"];

fn is_keyword(word: &str, key: &str) -> bool {
    word.strip_prefix(key)
        .is_some_and(|rest| INFLECTIONS.contains(&rest))
}

/// Map suggestion text to an [`Action`], if it names one.
///
/// ```
/// use rover_runtime::suggestion::parse_action;
/// use rover_types::Action;
///
/// assert_eq!(parse_action("Turn LEFT to avoid the chair."), Some(Action::Left));
/// assert_eq!(parse_action("Wait, then go forward"), Some(Action::Stop));
/// assert_eq!(parse_action("Looks like a kitchen"), None);
/// ```
pub fn parse_action(text: &str) -> Option<Action> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    KEYWORDS
        .iter()
        .find(|(_, keys)| {
            words
                .iter()
                .any(|w| keys.iter().any(|key| is_keyword(w, key)))
        })
        .map(|(action, _)| *action)
}

/// Suggestion text as a command at `speed` (STOP always at zero).
pub fn suggestion_command(text: &str, speed: i32) -> Option<RoverCommand> {
    parse_action(text).map(|action| match action {
        Action::Stop => RoverCommand::stop(),
        other => RoverCommand::new(other, speed),
    })
}
