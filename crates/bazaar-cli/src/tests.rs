use bazaar_core::{CategoryRank, ListingKind, ProductCard};
use rust_decimal::Decimal;

use super::*;
use crate::browse::{category_selector, listing_config, product_line, ListingArg, OtpCommands};

fn browse_args(extra: &[&str]) -> BrowseArgs {
    let mut argv = vec!["bazaar-cli", "browse"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).expect("expected valid cli args").command {
        Some(Commands::Browse(args)) => args,
        other => panic!("expected browse command, got {other:?}"),
    }
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["bazaar-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["bazaar-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_seed_with_explicit_path() {
    let cli = Cli::try_parse_from(["bazaar-cli", "db", "seed", "--path", "/tmp/catalog.yaml"])
        .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed { ref path }
        }) if path.to_str() == Some("/tmp/catalog.yaml")
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["bazaar-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn browse_defaults_to_featured_shop() {
    let args = browse_args(&[]);
    assert_eq!(args.listing, ListingArg::Shop);
    assert_eq!(args.sort, "featured");
    assert_eq!(args.pages, 3);
    assert!(category_selector(&args).expect("selector").is_none());
}

#[test]
fn browse_parses_category_filter() {
    let args = browse_args(&[
        "--sort",
        "price-low",
        "--rank",
        "super",
        "--category",
        "electronics",
        "--pages",
        "5",
    ]);
    assert_eq!(args.pages, 5);
    assert_eq!(args.search, None);

    let selector = category_selector(&args)
        .expect("selector")
        .expect("filter present");
    assert_eq!(selector.rank, CategoryRank::Super);
    assert_eq!(selector.slug, "electronics");
}

#[test]
fn browse_parses_search_term() {
    let args = browse_args(&["-q", "phone case"]);
    assert_eq!(args.search.as_deref(), Some("phone case"));
}

#[test]
fn browse_rank_requires_category() {
    let result = Cli::try_parse_from(["bazaar-cli", "browse", "--rank", "main"]);
    assert!(result.is_err());
}

#[test]
fn browse_rejects_unknown_rank() {
    let args = browse_args(&["--rank", "giant", "--category", "phones"]);
    assert!(category_selector(&args).is_err());
}

#[test]
fn storefront_needs_vendor_slug() {
    let args = browse_args(&["--listing", "storefront"]);
    assert!(listing_config(&args).is_err());

    let args = browse_args(&["--listing", "storefront", "--vendor", "acme-supply"]);
    let config = listing_config(&args).expect("config");
    assert_eq!(config.kind, ListingKind::VendorStorefront);
    assert_eq!(config.endpoint, "/api/v1/vendors/acme-supply/products");
}

#[test]
fn vendor_directory_uses_its_own_page_size() {
    let args = browse_args(&["--listing", "vendors"]);
    let config = listing_config(&args).expect("config");
    assert_eq!(config.initial_page_size, 12);
}

#[test]
fn parses_session_login() {
    let cli = Cli::try_parse_from([
        "bazaar-cli",
        "session",
        "login",
        "--login",
        "jane",
        "--password",
        "hunter22",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Session {
            command: SessionCommands::Login { ref login, .. },
            ..
        }) if login == "jane"
    ));
}

#[test]
fn parses_session_rate_and_rejects_out_of_range_stars() {
    let cli = Cli::try_parse_from([
        "bazaar-cli",
        "session",
        "rate",
        "speaker",
        "--stars",
        "4",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Session {
            command: SessionCommands::Rate { ref slug, stars: 4, comment: None },
            ..
        }) if slug == "speaker"
    ));

    let err = Cli::try_parse_from(["bazaar-cli", "session", "rate", "speaker", "--stars", "6"])
        .expect_err("six stars is out of range");
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
}

#[test]
fn parses_session_otp_request_and_verify() {
    let cli = Cli::try_parse_from([
        "bazaar-cli",
        "session",
        "otp",
        "request",
        "--email",
        "jane@example.com",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Session {
            command: SessionCommands::Otp {
                command: OtpCommands::Request { ref email }
            },
            ..
        }) if email == "jane@example.com"
    ));

    let cli = Cli::try_parse_from([
        "bazaar-cli",
        "session",
        "otp",
        "verify",
        "--temp-token",
        "abc",
        "--code",
        "123456",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Session {
            command: SessionCommands::Otp {
                command: OtpCommands::Verify { ref temp_token, ref code }
            },
            ..
        }) if temp_token == "abc" && code == "123456"
    ));
}

#[test]
fn product_line_shows_discount_and_stock() {
    let card = ProductCard {
        id: 1,
        name: "Noise Cancelling Headphones".to_string(),
        slug: "noise-cancelling-headphones".to_string(),
        price: Decimal::new(20_000, 2),
        discount_price: Some(Decimal::new(15_000, 2)),
        discount_percent: 25,
        primary_image: None,
        images: vec![],
        in_stock: false,
        is_active: true,
        rating_average: 90,
        rating_count: 12,
        vendor_name: "Acme Supply".to_string(),
        vendor_slug: "acme-supply".to_string(),
        created_at: chrono::Utc::now(),
    };

    let line = product_line(&card);
    assert!(line.contains("150.00 (-25%)"));
    assert!(line.contains("acme-supply"));
    assert!(line.ends_with("[out of stock]"));
}
