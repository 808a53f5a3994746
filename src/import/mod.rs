//! # CSV Import Orchestrator
//!
//! Drives one remote bulk-import job from upload to completion:
//! upload, configure a delta mapping, preview, commit. The platform moves the
//! job between [`ImportState`]s on its own; this side only requests the next
//! phase and polls.
//!
//! Preview polling that runs out of attempts is not fatal: the commit is
//! requested anyway. Commit polling that runs out of attempts reports success
//! with a warning, since the remote job keeps running independently.

pub mod state;

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::ImportConfig;
use crate::platform::{PlatformClient, PlatformError};

pub use state::{ImportState, UnknownImportState};

const UPLOAD_FILENAME: &str = "merge_data_import.csv";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No CSV content provided")]
    EmptyCsv,

    #[error("Failed to get import ID from upload response")]
    MissingImportId,

    #[error("Preview failed: {errors}")]
    PreviewFailed { import_id: String, errors: Value },

    #[error("Import failed: {errors}")]
    ImportFailed { import_id: String, errors: Value },

    #[error("import {import_id}: {source}")]
    UnrecognizedState {
        import_id: String,
        #[source]
        source: UnknownImportState,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ImportError {
    /// Remote-supplied error payload, verbatim.
    pub fn remote_errors(&self) -> Option<&Value> {
        match self {
            ImportError::PreviewFailed { errors, .. } | ImportError::ImportFailed { errors, .. } => {
                Some(errors)
            }
            _ => None,
        }
    }
}

/// Outcome reported to the caller of [`ImportOrchestrator::import_users`].
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub import_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Poll cadence and budgets for each phase.
#[derive(Debug, Clone, Copy)]
pub struct ImportPolicy {
    pub preview_poll: Duration,
    pub preview_max_polls: u32,
    pub commit_poll: Duration,
    pub commit_max_polls: u32,
}

impl From<&ImportConfig> for ImportPolicy {
    fn from(config: &ImportConfig) -> Self {
        Self {
            preview_poll: Duration::from_millis(config.preview_poll_ms),
            preview_max_polls: config.preview_max_polls,
            commit_poll: Duration::from_millis(config.commit_poll_ms),
            commit_max_polls: config.commit_max_polls,
        }
    }
}

enum Phase {
    Preview,
    Commit,
}

enum PollOutcome {
    Reached { stats: Option<Value> },
    Exhausted { last: Option<ImportState> },
}

pub struct ImportOrchestrator {
    client: PlatformClient,
    identifier_field: String,
    policy: ImportPolicy,
}

impl ImportOrchestrator {
    pub fn new(
        client: PlatformClient,
        identifier_field: impl Into<String>,
        policy: ImportPolicy,
    ) -> Self {
        Self {
            client,
            identifier_field: identifier_field.into(),
            policy,
        }
    }

    /// Mapping body for the configure step: delta mode keyed on the primary key.
    pub fn mapping_config(&self, field_mappings: &Map<String, Value>) -> Value {
        let mut mapping = Map::new();
        mapping.insert(
            "identifier".to_string(),
            Value::String(self.identifier_field.clone()),
        );
        for (field, target) in field_mappings {
            mapping.insert(field.clone(), target.clone());
        }
        json!({ "delta": true, "mapping": mapping })
    }

    /// Upload `csv_content` and drive the resulting import job to an outcome.
    pub async fn import_users(
        &self,
        csv_content: &str,
        field_mappings: &Map<String, Value>,
    ) -> Result<ImportResult, ImportError> {
        if csv_content.trim().is_empty() {
            return Err(ImportError::EmptyCsv);
        }

        info!(
            bytes = csv_content.len(),
            fields = field_mappings.len(),
            "Starting CSV import upload"
        );
        let receipt = self.client.upload_csv(csv_content, UPLOAD_FILENAME).await?;
        let import_id = receipt.import_id.ok_or(ImportError::MissingImportId)?;
        info!(import_id = %import_id, "CSV uploaded");

        self.client
            .configure_import(&import_id, &self.mapping_config(field_mappings))
            .await?;

        self.client
            .request_import_state(&import_id, ImportState::PreviewPending.as_str())
            .await?;
        match self.poll(&import_id, Phase::Preview).await? {
            PollOutcome::Reached { .. } => info!(import_id = %import_id, "Import preview ready"),
            PollOutcome::Exhausted { last } => warn!(
                import_id = %import_id,
                last_state = ?last,
                polls = self.policy.preview_max_polls,
                "Preview did not finish within budget; committing anyway"
            ),
        }

        self.client
            .request_import_state(&import_id, ImportState::ImportPending.as_str())
            .await?;
        match self.poll(&import_id, Phase::Commit).await? {
            PollOutcome::Reached { stats } => {
                info!(import_id = %import_id, "Import completed");
                Ok(ImportResult {
                    success: true,
                    import_id,
                    message: "User data imported successfully".to_string(),
                    stats: Some(stats.unwrap_or_else(|| json!({}))),
                    warning: None,
                })
            }
            PollOutcome::Exhausted { last } => {
                warn!(
                    import_id = %import_id,
                    last_state = ?last,
                    "Import still processing after polling budget"
                );
                Ok(ImportResult {
                    success: true,
                    import_id,
                    message: "Import started - check the platform studio for status".to_string(),
                    stats: None,
                    warning: Some("Import is still processing".to_string()),
                })
            }
        }
    }

    async fn poll(&self, import_id: &str, phase: Phase) -> Result<PollOutcome, ImportError> {
        let (interval, max_polls) = match phase {
            Phase::Preview => (self.policy.preview_poll, self.policy.preview_max_polls),
            Phase::Commit => (self.policy.commit_poll, self.policy.commit_max_polls),
        };
        let mut last: Option<ImportState> = None;

        for _ in 0..max_polls {
            tokio::time::sleep(interval).await;

            let status = self.client.import_status(import_id).await?;
            let Some(raw_state) = status.state.as_deref() else {
                continue;
            };
            let state: ImportState =
                raw_state
                    .parse()
                    .map_err(|source| ImportError::UnrecognizedState {
                        import_id: import_id.to_string(),
                        source,
                    })?;

            if let Some(previous) = last
                && !previous.can_transition_to(state)
            {
                warn!(
                    import_id,
                    from = %previous,
                    to = %state,
                    "Unexpected import state transition"
                );
            }
            last = Some(state);

            let errors = || status.errors.clone().unwrap_or_else(|| json!({}));
            match phase {
                Phase::Preview if state.is_preview_ready() => {
                    return Ok(PollOutcome::Reached { stats: None });
                }
                Phase::Preview if state == ImportState::PreviewFailed => {
                    return Err(ImportError::PreviewFailed {
                        import_id: import_id.to_string(),
                        errors: errors(),
                    });
                }
                Phase::Commit if state == ImportState::ImportComplete => {
                    return Ok(PollOutcome::Reached {
                        stats: status.stats.clone(),
                    });
                }
                Phase::Commit if state == ImportState::ImportFailed => {
                    return Err(ImportError::ImportFailed {
                        import_id: import_id.to_string(),
                        errors: errors(),
                    });
                }
                _ => {}
            }
        }

        Ok(PollOutcome::Exhausted { last })
    }
}
