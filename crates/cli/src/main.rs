//! ShopEZ CLI - Inspect and edit carts, browse the catalog.
//!
//! # Usage
//!
//! ```bash
//! # List catalog products
//! shopez products
//!
//! # Show the signed-in user's cart
//! shopez cart show
//!
//! # Follow the cart live until Ctrl-C
//! shopez cart watch
//!
//! # Add two units of product 7
//! shopez cart add 7 -q 2
//!
//! # Set the quantity of product 7 (0 removes it)
//! shopez cart set 7 1
//!
//! # Remove product 7
//! shopez cart remove 7
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPEZ_FIREBASE_DATABASE_URL` - Realtime Database root (required)
//! - `SHOPEZ_FIREBASE_ID_TOKEN` - ID token for the signed-in user
//! - `SHOPEZ_USER_ID` - User whose cart the `cart` commands act on
//! - `SHOPEZ_CATALOG_URL` - Catalog API root

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use shopez_cart::CartSyncConfig;
use shopez_core::ProductId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "shopez")]
#[command(author, version, about = "ShopEZ cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog products
    Products,
    /// Inspect or edit the signed-in user's cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart once
    Show,
    /// Print the cart on every change until interrupted
    Watch,
    /// Add a catalog product, merging with an existing line
    Add {
        /// Catalog product id
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Overwrite a line's quantity (0 or less removes it)
    Set {
        /// Product id of the line
        product: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Product id of the line
        product: String,
    },
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CartSyncConfig::from_env()?;

    match cli.command {
        Commands::Products => commands::products::list(&config).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&config).await?,
            CartAction::Watch => commands::cart::watch(&config).await?,
            CartAction::Add { product, quantity } => {
                commands::cart::add(&config, &ProductId::new(product), quantity).await?;
            }
            CartAction::Set { product, quantity } => {
                commands::cart::set(&config, &ProductId::new(product), quantity).await?;
            }
            CartAction::Remove { product } => {
                commands::cart::remove(&config, &ProductId::new(product)).await?;
            }
        },
    }
    Ok(())
}
