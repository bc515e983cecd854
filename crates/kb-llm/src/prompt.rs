//! Instruction prompts for the keyboard's rewrite and reply actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the keyboard asks the model to do with the user's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Rewrite the text in place.
    Enhance,
    /// Answer a received message.
    Reply,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Enhance, Mode::Reply];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enhance => "enhance",
            Self::Reply => "reply",
        }
    }

    /// Token budget used by the keyboard for this mode.
    pub fn default_max_tokens(self) -> u32 {
        match self {
            Self::Enhance => 100,
            Self::Reply => 160,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Formal,
    Friendly,
    Lovely,
    Concise,
    Technical,
}

impl Style {
    pub const ALL: [Style; 5] = [
        Style::Formal,
        Style::Friendly,
        Style::Lovely,
        Style::Concise,
        Style::Technical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Friendly => "friendly",
            Self::Lovely => "lovely",
            Self::Concise => "concise",
            Self::Technical => "technical",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
}

impl FromStr for Mode {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseNameError {
                kind: "mode",
                value: s.to_string(),
            })
    }
}

impl FromStr for Style {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseNameError {
                kind: "style",
                value: s.to_string(),
            })
    }
}

/// Wrap the user's `text` in the instruction for `mode`. `{STYLE}` is a
/// literal placeholder the model resolves from the trailing `{STYLE}:` tag.
pub fn build_prompt(text: &str, mode: Mode, style: Style) -> String {
    match mode {
        Mode::Enhance => format!(
            "You are a concise editor. Improve clarity and tone to {{STYLE}}. Keep meaning. \
             Keep similar length. Output only the revised text. \
             TEXT: <<<{text}>>> {{STYLE}}: {style}"
        ),
        Mode::Reply => format!(
            "You write short {{STYLE}} replies. Read the message and produce a direct reply \
             in 1-4 sentences. No greetings if it\u{2019}s chat. \
             MESSAGE: <<<{text}>>> {{STYLE}}: {style}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhance_prompt_wraps_text() {
        let prompt = build_prompt("hey can u send it", Mode::Enhance, Style::Formal);
        assert!(prompt.starts_with("You are a concise editor."));
        assert!(prompt.contains("TEXT: <<<hey can u send it>>>"));
        assert!(prompt.ends_with("{STYLE}: formal"));
    }

    #[test]
    fn reply_prompt_wraps_message() {
        let prompt = build_prompt("Dinner at 8?", Mode::Reply, Style::Friendly);
        assert!(prompt.starts_with("You write short {STYLE} replies."));
        assert!(prompt.contains("MESSAGE: <<<Dinner at 8?>>>"));
        assert!(prompt.ends_with("{STYLE}: friendly"));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("Reply".parse::<Mode>().unwrap(), Mode::Reply);
        assert_eq!(" TECHNICAL ".parse::<Style>().unwrap(), Style::Technical);
        assert!("shout".parse::<Style>().is_err());
    }

    #[test]
    fn reply_gets_the_larger_budget() {
        assert!(Mode::Reply.default_max_tokens() > Mode::Enhance.default_max_tokens());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Style::Lovely).unwrap(), "\"lovely\"");
        let mode: Mode = serde_json::from_str("\"enhance\"").unwrap();
        assert_eq!(mode, Mode::Enhance);
    }
}
