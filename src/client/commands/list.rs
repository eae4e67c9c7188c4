use anyhow::Result;
use tabled::Tabled;

use crate::client::commands::table_format::format_table_with_count;
use crate::client::hpc::HpcInterface;
use crate::client::session::Session;
use crate::client::session_store::SessionStore;

pub const NO_SESSIONS_MESSAGE: &str = "No RStudio servers are running";

#[derive(Tabled, Debug, Clone, PartialEq, Eq)]
pub struct SessionTableRow {
    #[tabled(rename = "Job ID")]
    pub job_id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "URL")]
    pub url: String,
    #[tabled(rename = "Token")]
    pub token: String,
}

impl From<&Session> for SessionTableRow {
    fn from(session: &Session) -> Self {
        Self {
            job_id: session.job_id.clone(),
            name: session.job_name.clone(),
            url: session.url_or_empty().to_string(),
            token: session.token_or_empty().to_string(),
        }
    }
}

/// Active sessions as table rows, ordered by job ID
pub fn session_rows(store: &SessionStore, hpc: &dyn HpcInterface) -> Result<Vec<SessionTableRow>> {
    let mut rows: Vec<SessionTableRow> = store
        .list_sessions(hpc)?
        .map(|s| SessionTableRow::from(&s))
        .collect();
    rows.sort_by(|a, b| {
        let key = |id: &str| id.parse::<u64>().ok();
        key(&a.job_id)
            .cmp(&key(&b.job_id))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
    Ok(rows)
}

/// What `list` prints for `rows`
pub fn render_sessions(rows: &[SessionTableRow]) -> String {
    if rows.is_empty() {
        return NO_SESSIONS_MESSAGE.to_string();
    }
    format_table_with_count("Active RStudio Servers", rows, "servers")
}

pub fn handle_list(store: &SessionStore, hpc: &dyn HpcInterface) -> Result<()> {
    let rows = session_rows(store, hpc)?;
    println!("{}", render_sessions(&rows));
    Ok(())
}
