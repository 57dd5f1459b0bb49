use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::collab::BillingCycle;
use crate::prompt::VideoStyle;

#[derive(Parser, Debug)]
#[command(name = "shopsage", version, about = "AI shop audits, listing copy, trend scans and product videos")]
pub struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the text model from the config.
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub account_id: Option<String>,

    #[arg(long, global = true)]
    pub account_email: Option<String>,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every analysis screen.
#[derive(ClapArgs, Debug, Clone)]
pub struct ResultOpts {
    /// Keep the result as a report.
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Open a follow-up chat about the result.
    #[arg(long, default_value_t = false)]
    pub chat: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(flatten)]
    Feature(FeatureCommand),
    #[command(flatten)]
    Account(AccountCommand),
}

/// Commands that call the generation backend.
#[derive(Subcommand, Debug)]
pub enum FeatureCommand {
    /// Audit a whole shop.
    Audit {
        #[arg(long)]
        shop_url: String,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        opts: ResultOpts,
    },
    /// Write listing title, description and tags.
    Listing {
        #[arg(long)]
        product: String,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        #[arg(long, default_value = "friendly")]
        tone: String,
        /// Optional product photo to write from.
        #[arg(long)]
        image: Option<PathBuf>,
        #[command(flatten)]
        opts: ResultOpts,
    },
    /// Scan live demand trends in a niche.
    Trends {
        #[arg(long)]
        niche: String,
        #[arg(long, default_value = "US")]
        region: String,
        #[command(flatten)]
        opts: ResultOpts,
    },
    /// Compare the shop with current competitors.
    Competitors {
        #[arg(long)]
        shop_name: String,
        #[arg(long)]
        niche: String,
        #[command(flatten)]
        opts: ResultOpts,
    },
    /// Review one or more product photos.
    Images {
        #[arg(long)]
        product: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Generate a product video from a photo.
    Video {
        #[arg(long)]
        product: String,
        #[arg(long)]
        image: PathBuf,
        #[arg(long, value_enum, default_value_t = VideoStyle::Showcase)]
        style: VideoStyle,
        /// Download the finished video here.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip the credit confirmation prompt.
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
}

/// Commands about the signed-in account; these never touch the backend.
#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Show the current credit balance.
    Balance,
    /// Buy credits or a plan.
    Topup {
        #[arg(long, default_value = "credits_100")]
        pack: String,
        #[arg(long, value_enum, default_value_t = BillingCycle::Once)]
        cycle: BillingCycle,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_with_repeated_keywords() {
        let args = Args::parse_from([
            "shopsage", "--debug", "listing", "--product", "mug", "--keyword", "gift", "--keyword", "coffee", "--save",
        ]);
        assert!(args.debug);
        match args.command {
            Command::Feature(FeatureCommand::Listing { keywords, opts, tone, .. }) => {
                assert_eq!(keywords, vec!["gift", "coffee"]);
                assert_eq!(tone, "friendly");
                assert!(opts.save && !opts.chat);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn video_style_and_progress_flag() {
        let args = Args::parse_from([
            "shopsage", "video", "--product", "mug", "--image", "a.png", "--style", "unboxing", "--progress", "false",
        ]);
        assert!(!args.progress);
        assert!(matches!(args.command, Command::Feature(FeatureCommand::Video { style: VideoStyle::Unboxing, .. })));
    }

    #[test]
    fn topup_only_starts_a_checkout() {
        let args = Args::parse_from(["shopsage", "topup", "--cycle", "monthly"]);
        assert!(matches!(
            args.command,
            Command::Account(AccountCommand::Topup { cycle: BillingCycle::Monthly, .. })
        ));
        assert!(Args::try_parse_from(["shopsage", "topup", "--grant", "500"]).is_err());
    }
}
