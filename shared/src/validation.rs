//! Field rules applied before any quest or profile write.
//!
//! Every predicate here is pure. The store never re-checks these rules, so
//! callers must run them at the write boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::QuestDraft;

pub const MAX_TITLE_CHARS: usize = 36;
pub const MAX_USER_NAME_CHARS: usize = 24;
pub const MAX_SIGN_UP_NAME_CHARS: usize = 36;
pub const MIN_DIFFICULTY: i32 = 1;
pub const MAX_DIFFICULTY: i32 = 5;

/// Upper bound on description length. The quick-add form and the full
/// creation flow use different limits for the same field.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptionPolicy {
    pub max_chars: usize,
}

impl DescriptionPolicy {
    pub const SIMPLE: Self = Self { max_chars: 256 };
    pub const EXTENDED: Self = Self { max_chars: 1000 };

    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for DescriptionPolicy {
    fn default() -> Self {
        Self::EXTENDED
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is blank")]
    BlankTitle,
    #[error("title has {len} characters, max {max}")]
    TitleTooLong { len: usize, max: usize },
    #[error("title must contain a letter and only letters, digits and spaces")]
    InvalidTitleCharacters,
    #[error("description has {len} characters, max {max}")]
    DescriptionTooLong { len: usize, max: usize },
    #[error("description must contain a letter and only letters, digits, spaces and ' . !")]
    InvalidDescriptionCharacters,
    #[error("difficulty {0} is outside 1..=5")]
    DifficultyOutOfRange(i32),
    #[error("user name must be 1..={max} letters, digits or spaces with at least one letter")]
    InvalidUserName { max: usize },
}

fn is_title_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' '
}

fn is_description_char(c: char) -> bool {
    is_title_char(c) || matches!(c, '\'' | '.' | '!')
}

/// Whole-string match: non-empty, at least one ASCII letter, every char allowed.
fn matches_text_rule(text: &str, allowed: fn(char) -> bool) -> bool {
    !text.is_empty() && text.chars().any(|c| c.is_ascii_alphabetic()) && text.chars().all(allowed)
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[must_use]
pub fn is_valid_title(text: &str) -> bool {
    text.is_empty() || matches_text_rule(text, is_title_char)
}

#[must_use]
pub fn is_valid_description(text: &str) -> bool {
    text.is_empty() || matches_text_rule(text, is_description_char)
}

/// Same diagnostics as [`validate_quest_details`], with the first failing rule.
pub fn check_quest_details(
    draft: &QuestDraft,
    policy: DescriptionPolicy,
) -> Result<(), ValidationError> {
    if is_blank(&draft.title) {
        return Err(ValidationError::BlankTitle);
    }
    if !is_valid_title(&draft.title) {
        return Err(ValidationError::InvalidTitleCharacters);
    }
    if !(is_valid_description(&draft.description) || is_blank(&draft.description)) {
        return Err(ValidationError::InvalidDescriptionCharacters);
    }
    let title_len = char_len(&draft.title);
    if title_len > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong {
            len: title_len,
            max: MAX_TITLE_CHARS,
        });
    }
    let description_len = char_len(&draft.description);
    if description_len > policy.max_chars {
        return Err(ValidationError::DescriptionTooLong {
            len: description_len,
            max: policy.max_chars,
        });
    }
    Ok(())
}

#[must_use]
pub fn validate_quest_details(draft: &QuestDraft, policy: DescriptionPolicy) -> bool {
    check_quest_details(draft, policy).is_ok()
}

pub fn check_difficulty(difficulty: i32) -> Result<(), ValidationError> {
    if (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        Ok(())
    } else {
        Err(ValidationError::DifficultyOutOfRange(difficulty))
    }
}

fn is_valid_name(name: &str, max: usize) -> bool {
    !is_blank(name) && matches_text_rule(name, is_title_char) && char_len(name) <= max
}

/// Display name as edited on the settings screen.
#[must_use]
pub fn is_valid_user_name(name: &str) -> bool {
    is_valid_name(name, MAX_USER_NAME_CHARS)
}

/// Display name as entered during sign-up, which allows a longer name.
#[must_use]
pub fn is_valid_sign_up_name(name: &str) -> bool {
    is_valid_name(name, MAX_SIGN_UP_NAME_CHARS)
}
