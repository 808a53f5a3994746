use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Server-driven lifecycle of a bulk user import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportState {
    Uploaded,
    /// Reported by some platform versions once a preview is ready for review.
    Draft,
    PreviewPending,
    PreviewComplete,
    PreviewFailed,
    ImportPending,
    ImportComplete,
    ImportFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized import state '{0}'")]
pub struct UnknownImportState(pub String);

impl ImportState {
    pub const ALL: [ImportState; 8] = [
        ImportState::Uploaded,
        ImportState::Draft,
        ImportState::PreviewPending,
        ImportState::PreviewComplete,
        ImportState::PreviewFailed,
        ImportState::ImportPending,
        ImportState::ImportComplete,
        ImportState::ImportFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImportState::Uploaded => "UPLOADED",
            ImportState::Draft => "DRAFT",
            ImportState::PreviewPending => "PREVIEW_PENDING",
            ImportState::PreviewComplete => "PREVIEW_COMPLETE",
            ImportState::PreviewFailed => "PREVIEW_FAILED",
            ImportState::ImportPending => "IMPORT_PENDING",
            ImportState::ImportComplete => "IMPORT_COMPLETE",
            ImportState::ImportFailed => "IMPORT_FAILED",
        }
    }

    /// States the platform may move to from `self`.
    pub fn successors(self) -> &'static [ImportState] {
        use ImportState::*;
        match self {
            Uploaded => &[PreviewPending, ImportPending],
            PreviewPending => &[PreviewComplete, Draft, PreviewFailed],
            PreviewComplete | Draft => &[ImportPending, PreviewPending],
            ImportPending => &[ImportComplete, ImportFailed],
            PreviewFailed | ImportComplete | ImportFailed => &[],
        }
    }

    pub fn can_transition_to(self, next: ImportState) -> bool {
        self == next || self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// A preview the commit step may start from.
    pub fn is_preview_ready(self) -> bool {
        matches!(self, ImportState::PreviewComplete | ImportState::Draft)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportState {
    type Err = UnknownImportState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownImportState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_state() {
        for state in ImportState::ALL {
            assert_eq!(state.as_str().parse::<ImportState>(), Ok(state));
        }
        assert_eq!(
            "import_complete".parse::<ImportState>(),
            Ok(ImportState::ImportComplete)
        );
    }

    #[test]
    fn test_unknown_state_rejected() {
        assert_eq!(
            "EXPLODED".parse::<ImportState>(),
            Err(UnknownImportState("EXPLODED".to_string()))
        );
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ImportState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                ImportState::PreviewFailed,
                ImportState::ImportComplete,
                ImportState::ImportFailed
            ]
        );
    }

    #[test]
    fn test_transition_table() {
        use ImportState::*;
        assert!(Uploaded.can_transition_to(PreviewPending));
        assert!(PreviewPending.can_transition_to(Draft));
        assert!(Draft.can_transition_to(ImportPending));
        assert!(ImportPending.can_transition_to(ImportComplete));
        assert!(ImportPending.can_transition_to(ImportPending));
        assert!(!ImportComplete.can_transition_to(ImportPending));
        assert!(!PreviewPending.can_transition_to(ImportComplete));
        assert!(Draft.is_preview_ready());
        assert!(!PreviewPending.is_preview_ready());
    }
}
