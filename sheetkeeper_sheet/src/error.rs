// Errors raised when a character setter is handed a name outside the
// reference tables.

/// A setter argument did not match any known stat or skill.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SheetError {
    #[error("no such stat: {0}")]
    UnknownStat(String),

    #[error("no such skill: {0}")]
    UnknownSkill(String),
}
