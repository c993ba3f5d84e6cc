//! User command - account lifecycle administration

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, parse_user_id};
use crate::output;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Soft-close an account. Its records are kept.
    Close {
        /// User ID to close
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Close { user_id, json } => {
            let user_id = parse_user_id(&user_id)?;
            let ctx = get_context()?;
            ctx.auth_service.close_account(&user_id)?;

            if json {
                println!("{}", serde_json::json!({"user_id": user_id, "closed": true}));
            } else {
                output::success(&format!("Closed account {}", user_id));
            }
        }
    }
    Ok(())
}
