use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_PROMPT_CHARS: usize = 10;
pub const MAX_PROMPT_CHARS: usize = 1000;

static UNSAFE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<script.*?</script>",
        r"(?i)eval\s*\(",
        r"(?i)new\s+Function",
        r"(?i)document\.write",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    Empty,
    TooShort,
    TooLong,
    UnsafeContent,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationReason::Empty => "empty",
            ValidationReason::TooShort => "too short",
            ValidationReason::TooLong => "too long",
            ValidationReason::UnsafeContent => "unsafe content",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid prompt: {0}")]
    ValidationFailed(ValidationReason),
}

impl ValidationError {
    pub fn reason(&self) -> ValidationReason {
        match self {
            ValidationError::ValidationFailed(r) => *r,
        }
    }
}

pub fn validate(prompt: &str) -> Result<(), ValidationError> {
    check(prompt, MIN_PROMPT_CHARS)
}

/// Follow-up feedback is often a few words ("Dark mode"), so only the
/// emptiness, length ceiling and denylist checks apply.
pub fn validate_feedback(feedback: &str) -> Result<(), ValidationError> {
    check(feedback, 1)
}

fn check(text: &str, min_chars: usize) -> Result<(), ValidationError> {
    let fail = |r| Err(ValidationError::ValidationFailed(r));
    if text.trim().is_empty() {
        return fail(ValidationReason::Empty);
    }
    let len = text.chars().count();
    if len < min_chars {
        return fail(ValidationReason::TooShort);
    }
    if len > MAX_PROMPT_CHARS {
        return fail(ValidationReason::TooLong);
    }
    if UNSAFE_PATTERNS.iter().any(|re| re.is_match(text)) {
        return fail(ValidationReason::UnsafeContent);
    }
    Ok(())
}

/// Optional requirement clauses a user can tick on top of their prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Enhancement {
    Responsive,
    Animated,
    Accessible,
    Interactive,
    Styled,
    Optimized,
    DarkMode,
    I18n,
}

impl Enhancement {
    pub fn text(self) -> &'static str {
        match self {
            Enhancement::Responsive => "Make this component fully responsive for mobile, tablet, and desktop",
            Enhancement::Animated => "Add smooth animations and transitions to improve user experience",
            Enhancement::Accessible => {
                "Improve accessibility with ARIA labels, keyboard navigation, and screen reader support"
            }
            Enhancement::Interactive => "Add more interactive elements and user feedback",
            Enhancement::Styled => "Enhance the visual design with modern styling and better typography",
            Enhancement::Optimized => "Optimize performance with lazy loading and efficient rendering",
            Enhancement::DarkMode => "Add dark mode support with a toggle switch",
            Enhancement::I18n => "Add internationalization support with language switching",
        }
    }
}

impl FromStr for Enhancement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "responsive" => Ok(Enhancement::Responsive),
            "animated" => Ok(Enhancement::Animated),
            "accessible" => Ok(Enhancement::Accessible),
            "interactive" => Ok(Enhancement::Interactive),
            "styled" => Ok(Enhancement::Styled),
            "optimized" => Ok(Enhancement::Optimized),
            "darkMode" => Ok(Enhancement::DarkMode),
            "i18n" => Ok(Enhancement::I18n),
            other => Err(format!("unknown enhancement: {other}")),
        }
    }
}

pub fn enhance(base_prompt: &str, selected: &[Enhancement]) -> String {
    let lower = base_prompt.to_lowercase();
    let mut enhanced = base_prompt.to_string();

    if !lower.contains("responsive") {
        enhanced.push_str("\n- Make it responsive for all screen sizes");
    }
    if !lower.contains("style") && !lower.contains("design") {
        enhanced.push_str("\n- Use modern, clean design with good typography");
    }
    if !lower.contains("interactive") {
        enhanced.push_str("\n- Include appropriate interactive elements");
    }

    for e in selected {
        enhanced.push_str("\n- ");
        enhanced.push_str(e.text());
    }
    enhanced
}

/// Maps enhancement keys to the catalog; unknown keys are skipped.
pub fn parse_enhancements<S: AsRef<str>>(keys: &[S]) -> Vec<Enhancement> {
    keys.iter().filter_map(|k| k.as_ref().parse().ok()).collect()
}

/// The current code travels to the model as a separate system message, so it is
/// not repeated in this text.
pub fn build_iteration_prompt(original_prompt: &str, feedback: &str, _current_code: &str) -> String {
    format!(
        "Original request: {original_prompt}\n\n\
         User feedback: {feedback}\n\n\
         Please update the component based on the feedback while maintaining all existing functionality.\n\
         Focus on the specific changes requested."
    )
}
