use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::SyncConfig;
use crate::remote::{AdminClient, AdminTokenService, TokenStore};

#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    command: TokenCommands,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Log in to the admin API and store the returned token
    Issue {
        #[arg(long, env = "ENTITY_SYNC_ADMIN_USERNAME")]
        username: String,
        #[arg(long, env = "ENTITY_SYNC_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show where the token is stored and whether one is present
    Show,
}

pub async fn token(config: &SyncConfig, args: TokenArgs) -> Result<()> {
    let store = TokenStore::new(config.token_file()?);
    match args.command {
        TokenCommands::Issue { username, password } => {
            let client = AdminClient::new(config.admin_api_url()?, config.request_timeout())?;
            let service = AdminTokenService::new(client, store.clone());
            service.generate_permanent_token(&username, &password).await?;
            println!("Admin token stored at {}", store.path().display());
        }
        TokenCommands::Show => match store.load()? {
            Some(_) => println!("Admin token present at {}", store.path().display()),
            None => println!("No admin token stored at {}", store.path().display()),
        },
    }
    Ok(())
}
