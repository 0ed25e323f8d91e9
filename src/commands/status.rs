// ABOUTME: status command - summarizes the persisted sheet snapshot
// ABOUTME: Reads only the local state file, never the store or the sheet

use anyhow::Result;

use super::print_json;
use crate::config::SyncConfig;
use crate::sync::SheetState;

pub async fn status(config: &SyncConfig) -> Result<()> {
    let path = config.state_path();
    if !path.exists() {
        return print_json(&serde_json::json!({
            "state_file": path,
            "initialized": false,
        }));
    }

    let state = SheetState::load(&path).await?;
    print_json(&serde_json::json!({
        "state_file": path,
        "initialized": true,
        "spreadsheet_id": state.spreadsheet_id,
        "range": state.range,
        "database_url": state.database_url,
        "rows": state.previous.len(),
        "last_inbound_at": state.last_inbound_at,
        "last_outbound_at": state.last_outbound_at,
        "updated_at": state.updated_at,
    }))
}
