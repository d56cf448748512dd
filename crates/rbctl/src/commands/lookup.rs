use anyhow::{Context, Result};
use relaybridge::EventIdentityStore;
use serde::Serialize;

use crate::output::{list_or_dash, Output, Report};
use crate::storage::Storage;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupResult {
    scope: String,
    query: String,
    direction: &'static str,
    ids: Vec<String>,
}

impl Report for LookupResult {
    fn human(&self) -> String {
        let arrow = if self.direction == "localToRemote" { "->" } else { "<-" };
        format!("[{}] {} {} {}", self.scope, self.query, arrow, list_or_dash(&self.ids))
    }
}

/// Query the local/remote event map
pub async fn run(
    scope: &str,
    local: Option<&str>,
    remote: Option<&str>,
    storage: &Storage,
    output: &Output,
) -> Result<()> {
    let store = storage.identities();
    let result = match (local, remote) {
        (Some(local), _) => LookupResult {
            scope: scope.to_string(),
            query: local.to_string(),
            direction: "localToRemote",
            ids: store
                .get_remote_ids(scope, local)
                .await
                .context("Failed to read event map")?,
        },
        (None, Some(remote)) => LookupResult {
            scope: scope.to_string(),
            query: remote.to_string(),
            direction: "remoteToLocal",
            ids: store
                .get_local_ids(scope, remote)
                .await
                .context("Failed to read event map")?,
        },
        (None, None) => anyhow::bail!("Pass --local or --remote"),
    };

    output.report("lookup", &result);
    Ok(())
}
