//! Finding the per-store project installations a task list goes into.
//!
//! Projects are not linked to stores by id; they are recognised by a display
//! title of the form `Store #<id>`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::platform::{PlatformClient, PlatformError};

/// A store whose project installation was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInstallation {
    pub store_id: String,
    pub installation_id: String,
}

/// Store id named by a project title such as `Store #104`, `store 104` or
/// `STORE#104`.
pub fn store_id_from_title(title: &str) -> Option<&str> {
    static STORE_TITLE: OnceLock<Regex> = OnceLock::new();
    let pattern = STORE_TITLE.get_or_init(|| {
        Regex::new(r"(?i)^Store\s*#?\s*(\w+)$").expect("store title pattern compiles")
    });

    pattern
        .captures(title)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str())
}

/// Match installation titles against `store_ids`, in `store_ids` order.
///
/// When two installations carry the same store title the later one wins.
pub fn match_projects<'a, I>(titles: I, store_ids: &[String]) -> Vec<ProjectInstallation>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut by_store: HashMap<&str, &str> = HashMap::new();
    for (installation_id, title) in titles {
        if let Some(store_id) = store_id_from_title(title)
            && store_ids.iter().any(|wanted| wanted == store_id)
        {
            by_store.insert(store_id, installation_id);
        }
    }

    let mut matched = Vec::with_capacity(by_store.len());
    for store_id in store_ids {
        if matched
            .iter()
            .any(|found: &ProjectInstallation| &found.store_id == store_id)
        {
            continue;
        }
        if let Some(installation_id) = by_store.get(store_id.as_str()) {
            matched.push(ProjectInstallation {
                store_id: store_id.clone(),
                installation_id: installation_id.to_string(),
            });
        }
    }
    matched
}

/// Page through every installation in the space and keep the projects of
/// `store_ids`. Stores without a project are logged and left out.
pub async fn discover_projects(
    client: &PlatformClient,
    space_id: &str,
    store_ids: &[String],
) -> Result<Vec<ProjectInstallation>, PlatformError> {
    info!(stores = store_ids.len(), "Discovering store projects");
    let installations = client.list_all_installations(space_id).await?;

    let projects = match_projects(
        installations
            .iter()
            .filter_map(|inst| Some((inst.id.as_str(), inst.title()?))),
        store_ids,
    );

    for store_id in store_ids {
        if !projects.iter().any(|p| &p.store_id == store_id) {
            warn!(store_id = %store_id, "No project installation found for store; skipping");
        }
    }
    info!(
        found = projects.len(),
        scanned = installations.len(),
        "Store project discovery finished"
    );
    Ok(projects)
}
