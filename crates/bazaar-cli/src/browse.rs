//! `browse` and `session` command handlers.
//!
//! `browse` drives a [`ListingSession`] against a running server and prints
//! each newly revealed slice of the listing, the way a "load more" button
//! would reveal it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bazaar_client::{
    ApiClient, CategorySelector, FileTokenStore, ListingSession, RevealController, RevealState,
    DEFAULT_TIMEOUT_SECS,
};
use bazaar_core::{
    CategoryRank, ListingConfig, ListingKind, OrderCard, ProductCard, SortKey, VendorCard,
};
use clap::{Args, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListingArg {
    /// Customer shop grid
    Shop,
    /// One vendor's public storefront (needs --vendor)
    Storefront,
    /// Signed-in vendor's own products
    Products,
    /// Signed-in vendor's orders
    Orders,
    /// Public vendor directory
    Vendors,
}

impl From<ListingArg> for ListingKind {
    fn from(arg: ListingArg) -> Self {
        match arg {
            ListingArg::Shop => ListingKind::Shop,
            ListingArg::Storefront => ListingKind::VendorStorefront,
            ListingArg::Products => ListingKind::VendorProducts,
            ListingArg::Orders => ListingKind::VendorOrders,
            ListingArg::Vendors => ListingKind::VendorDirectory,
        }
    }
}

#[derive(Debug, Args)]
pub struct BrowseArgs {
    #[arg(long, value_enum, default_value_t = ListingArg::Shop)]
    pub listing: ListingArg,
    /// featured, newest, price-low, price-high or rating
    #[arg(long, default_value = "featured")]
    pub sort: String,
    /// Category rank (super, main, sub, mini)
    #[arg(long, requires = "category")]
    pub rank: Option<String>,
    /// Category slug at the given rank
    #[arg(long, requires = "rank")]
    pub category: Option<String>,
    /// Dashboard status filter
    #[arg(long)]
    pub status: Option<String>,
    /// Product name search
    #[arg(long, short = 'q')]
    pub search: Option<String>,
    /// Vendor slug for the storefront listing
    #[arg(long)]
    pub vendor: Option<String>,
    /// Maximum number of reveal steps
    #[arg(long, default_value_t = 3)]
    pub pages: usize,
    #[arg(long, env = "BAZAAR_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,
    #[arg(long, env = "BAZAAR_TOKEN_FILE", default_value = ".bazaar/session.json")]
    pub token_file: PathBuf,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    /// Sign in with username or email
    Login {
        #[arg(long)]
        login: String,
        #[arg(long, env = "BAZAAR_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with a code emailed to you
    Otp {
        #[command(subcommand)]
        command: OtpCommands,
    },
    /// Rate a product from 1 to 5 stars as the signed-in user
    Rate {
        slug: String,
        #[arg(long, value_parser = clap::value_parser!(i16).range(1..=5))]
        stars: i16,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Exchange the saved refresh token for a new pair
    Refresh,
    /// Forget the saved session
    Logout,
    /// Print the saved user
    Show,
}

#[derive(Debug, Subcommand)]
pub enum OtpCommands {
    /// Email a one-time code and print the temp token to verify it with
    Request {
        #[arg(long)]
        email: String,
    },
    /// Exchange the temp token and emailed code for a session
    Verify {
        #[arg(long, env = "BAZAAR_OTP_TOKEN", hide_env_values = true)]
        temp_token: String,
        #[arg(long)]
        code: String,
    },
}

/// Resolves the listing preset, filling the storefront slug.
pub(crate) fn listing_config(args: &BrowseArgs) -> anyhow::Result<ListingConfig> {
    let kind = ListingKind::from(args.listing);
    let config = ListingConfig::preset(kind);
    match (kind, args.vendor.as_deref()) {
        (ListingKind::VendorStorefront, Some(slug)) => Ok(config.with_slug(slug)),
        (ListingKind::VendorStorefront, None) => {
            anyhow::bail!("--vendor is required for the storefront listing")
        }
        _ => Ok(config),
    }
}

pub(crate) fn category_selector(args: &BrowseArgs) -> anyhow::Result<Option<CategorySelector>> {
    let (Some(rank), Some(slug)) = (args.rank.as_deref(), args.category.as_deref()) else {
        return Ok(None);
    };
    let rank: CategoryRank = rank.parse()?;
    Ok(Some(CategorySelector {
        rank,
        slug: slug.trim().to_string(),
    }))
}

fn session_client(
    api_url: &str,
    token_file: PathBuf,
    timeout_secs: u64,
) -> anyhow::Result<ApiClient> {
    let store = Arc::new(FileTokenStore::new(token_file));
    Ok(ApiClient::new(api_url, timeout_secs, store)?)
}

/// # Errors
///
/// Returns an error for invalid arguments or when a fetch fails after retries.
pub(crate) async fn run_browse(args: &BrowseArgs) -> anyhow::Result<()> {
    let config = listing_config(args)?;
    let client = session_client(&args.api_url, args.token_file.clone(), args.timeout_secs)?;

    match config.kind {
        ListingKind::Shop | ListingKind::VendorStorefront | ListingKind::VendorProducts => {
            reveal::<ProductCard>(&client, config, args, product_line).await
        }
        ListingKind::VendorOrders => reveal::<OrderCard>(&client, config, args, order_line).await,
        ListingKind::VendorDirectory => {
            reveal::<VendorCard>(&client, config, args, vendor_line).await
        }
    }
}

async fn reveal<T>(
    client: &ApiClient,
    config: ListingConfig,
    args: &BrowseArgs,
    render: fn(&T) -> String,
) -> anyhow::Result<()>
where
    T: DeserializeOwned + Send + 'static,
{
    let source = client.page_source::<T>(&config);
    let controller = RevealController::new(config)
        .with_query(category_selector(args)?, SortKey::parse(&args.sort))
        .with_status(args.status.clone())
        .with_search(args.search.clone());
    let mut session = ListingSession::from_controller(controller, source)
        .with_timeout(Duration::from_secs(args.timeout_secs));

    session.start();
    let mut printed = 0;
    let mut state = session.settle().await;
    for step in 1..=args.pages {
        if let Some(err) = session.controller().last_error() {
            anyhow::bail!("listing fetch failed: {err}");
        }
        for item in &session.items()[printed..] {
            println!("{}", render(item));
        }
        printed = session.items().len();

        if step == args.pages || !session.load_more() {
            break;
        }
        state = session.settle().await;
    }

    println!(
        "showing {printed} of {} ({})",
        session.controller().total_matched(),
        state_label(state)
    );
    Ok(())
}

fn state_label(state: RevealState) -> &'static str {
    match state {
        RevealState::Idle => "idle",
        RevealState::Loading => "loading",
        RevealState::Loaded => "more available",
        RevealState::Exhausted => "end of listing",
        RevealState::Empty => "no results",
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

pub(crate) fn product_line(card: &ProductCard) -> String {
    let price = match card.discount_price {
        Some(discounted) => format!("{discounted} (-{}%)", card.discount_percent),
        None => card.price.to_string(),
    };
    let stock = if card.in_stock { "" } else { "  [out of stock]" };
    format!(
        "{:<34}{:<18}{}{stock}",
        truncate(&card.name, 30),
        price,
        card.vendor_slug
    )
}

fn order_line(card: &OrderCard) -> String {
    format!(
        "#{:<8}{:<12}{:<12}{}",
        card.id,
        card.status,
        card.total.to_string(),
        card.created_at.format("%Y-%m-%d")
    )
}

fn vendor_line(card: &VendorCard) -> String {
    format!(
        "{:<30}{:<24}{} product(s)",
        truncate(&card.display_name, 26),
        card.slug,
        card.product_count
    )
}

/// # Errors
///
/// Returns an error if the API rejects the request or the token file cannot
/// be written.
pub(crate) async fn run_session(
    api_url: &str,
    token_file: PathBuf,
    command: SessionCommands,
) -> anyhow::Result<()> {
    let client = session_client(api_url, token_file, DEFAULT_TIMEOUT_SECS)?;
    match command {
        SessionCommands::Login { login, password } => {
            let tokens = client.login(&login, &password).await?;
            println!(
                "signed in as {}",
                tokens.user["username"].as_str().unwrap_or(&login)
            );
        }
        SessionCommands::Otp {
            command: OtpCommands::Request { email },
        } => {
            let challenge = client.request_otp(&email).await?;
            println!("code sent to {email}; it expires at {}", challenge.expires_at);
            println!("temp token: {}", challenge.temp_token);
        }
        SessionCommands::Otp {
            command: OtpCommands::Verify { temp_token, code },
        } => {
            let tokens = client.verify_otp(&temp_token, code.trim()).await?;
            println!(
                "signed in as {}",
                tokens.user["username"].as_str().unwrap_or("(unknown)")
            );
        }
        SessionCommands::Rate {
            slug,
            stars,
            comment,
        } => {
            let summary = client
                .rate_product(&slug, stars, comment.as_deref())
                .await?;
            println!(
                "{slug}: {}% from {} ratings",
                summary.rating_average, summary.rating_count
            );
        }
        SessionCommands::Refresh => {
            client.refresh().await?;
            println!("session refreshed");
        }
        SessionCommands::Logout => {
            client.sign_out()?;
            println!("signed out");
        }
        SessionCommands::Show => {
            match client.saved_session()? {
                Some(tokens) => println!("{}", tokens.user),
                None => println!("not signed in"),
            }
        }
    }
    Ok(())
}
