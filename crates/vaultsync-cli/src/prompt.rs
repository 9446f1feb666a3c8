//! Terminal conflict prompt
//!
//! Shows both versions of a conflicted file and reads one of
//! `l`(ocal) / `r`(emote) / `m`(erge) from stdin. EOF or anything
//! unrecognized counts as a dismissal.

use vaultsync_core::ports::{ConflictChoice, ConflictPrompt};
use vaultsync_core::VaultPath;

pub struct TerminalPrompt;

#[async_trait::async_trait]
impl ConflictPrompt for TerminalPrompt {
    async fn ask_conflict(
        &self,
        path: &VaultPath,
        local_text: &str,
        remote_text: &str,
    ) -> anyhow::Result<Option<ConflictChoice>> {
        let path = path.to_string();
        let local = truncate(local_text);
        let remote = truncate(remote_text);

        // Blocking stdin read off the runtime
        let answer = tokio::task::spawn_blocking(move || {
            println!("\nConflict in {path}");
            println!("--- local ---------------------------------");
            println!("{local}");
            println!("--- remote --------------------------------");
            println!("{remote}");
            println!("-------------------------------------------");
            println!("Keep [l]ocal, keep [r]emote, or [m]erge? ");

            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim().to_lowercase()),
            }
        })
        .await?;

        Ok(match answer.as_deref() {
            Some("l") | Some("local") => Some(ConflictChoice::KeepLocal),
            Some("r") | Some("remote") => Some(ConflictChoice::KeepRemote),
            Some("m") | Some("merge") => Some(ConflictChoice::Merge),
            _ => None,
        })
    }
}

fn truncate(text: &str) -> String {
    const MAX_LINES: usize = 20;
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= MAX_LINES {
        text.to_string()
    } else {
        let mut shown = lines[..MAX_LINES].join("\n");
        shown.push_str(&format!("\n... ({} more lines)", lines.len() - MAX_LINES));
        shown
    }
}
