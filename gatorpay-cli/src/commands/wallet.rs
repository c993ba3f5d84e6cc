//! Wallet command - freeze and unfreeze wallets

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, parse_user_id};
use crate::output;

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Refuse all deposits and withdrawals for a user's wallet
    Freeze {
        /// User ID owning the wallet
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Allow deposits and withdrawals again
    Unfreeze {
        /// User ID owning the wallet
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: WalletCommands) -> Result<()> {
    let (user_id, active, json) = match command {
        WalletCommands::Freeze { user_id, json } => (user_id, false, json),
        WalletCommands::Unfreeze { user_id, json } => (user_id, true, json),
    };
    let user_id = parse_user_id(&user_id)?;

    let ctx = get_context()?;
    let wallet = ctx.wallet_service.set_active(&user_id, active)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wallet)?);
    } else if wallet.is_active {
        output::success(&format!("Wallet {} is active", wallet.id));
    } else {
        output::warning(&format!("Wallet {} is frozen", wallet.id));
    }
    Ok(())
}
