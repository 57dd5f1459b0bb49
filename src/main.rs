use anyhow::Context;
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cli;
mod collab;
mod config;
mod context;
mod dispatch;
mod entitlement;
mod errors;
mod features;
mod normalize;
mod poll;
mod prompt;
mod provider;
mod shape;
mod ux;
mod wire;

use cli::{AccountCommand, Command, FeatureCommand, ResultOpts};
use collab::{Account, Billing, LinkCheckout, Session, StaticSession};
use entitlement::{EntitlementGate, FileBalanceStore};
use errors::{ShopError, ShopResult};
use features::Orchestrator;
use prompt::{Feature, FeatureInput};
use shape::FeatureResult;
use wire::ImageAttachment;

fn init_logging(debug: bool) {
    let default = if debug { "shopsage=debug" } else { "shopsage=warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

fn read_image(path: &Path) -> ShopResult<ImageAttachment> {
    let data = fs_err::read(path)?;
    Ok(ImageAttachment::new(ImageAttachment::mime_for_path(path), data))
}

fn account_from(cfg: &config::Config) -> Option<Account> {
    match (&cfg.account_id, &cfg.account_email) {
        (Some(id), Some(email)) => Some(Account { id: id.clone(), email: email.clone() }),
        (Some(id), None) => Some(Account { id: id.clone(), email: String::new() }),
        _ => None,
    }
}

/// `/img <path> <text>` attaches a photo to a chat line.
fn split_chat_line(line: &str) -> ShopResult<(String, Option<ImageAttachment>)> {
    match line.strip_prefix("/img ") {
        Some(rest) => {
            let (path, text) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            let img = read_image(Path::new(path))?;
            Ok((text.trim().to_string(), Some(img)))
        }
        None => Ok((line.to_string(), None)),
    }
}

async fn chat(orch: &Orchestrator, feature: Feature, result: &FeatureResult) -> ShopResult<()> {
    let thread = orch.open_thread(feature, result)?;
    println!("Follow-up chat open. Type /exit to leave, /img <path> <question> to attach a photo.");
    let stdin = io::stdin();
    let mut input = stdin.lock();
    while let Some(line) = ux::read_chat_line(&mut input) {
        if line.is_empty() {
            continue;
        }
        let turn = match split_chat_line(&line) {
            Ok(t) => t,
            Err(e) => {
                ux::show_failure(&e);
                continue;
            }
        };
        // a failed turn leaves the thread usable for a retry
        match orch.ask(thread.id, &turn.0, turn.1).await {
            Ok(reply) => ux::show_reply(&reply),
            Err(e) => ux::show_failure(&e),
        }
    }
    orch.close_thread(thread.id);
    Ok(())
}

async fn analysis(
    orch: &Orchestrator,
    input: FeatureInput,
    image: Option<&PathBuf>,
    opts: &ResultOpts,
) -> ShopResult<()> {
    let image = image.map(|p| read_image(p)).transpose()?;
    let result = orch.run(&input, image).await?;
    ux::show_result(&result);
    if opts.save && !orch.save(&input.title(), result.clone()) {
        ux::show_failure(&ShopError::Storage("the report could not be saved".into()));
    }
    if opts.chat {
        chat(orch, input.feature(), &result).await?;
    }
    Ok(())
}

async fn images(orch: &Orchestrator, product: &str, paths: &[PathBuf], save: bool) -> ShopResult<()> {
    let mut batch = Vec::new();
    for p in paths {
        let label = p.display().to_string();
        match read_image(p) {
            Ok(img) => batch.push((label, img)),
            Err(e) => ux::show_failure(&e),
        }
    }
    let results = orch.review_images(product, batch).await;
    ux::show_batch(&results);
    if save {
        for (label, res) in &results {
            if let Ok(review) = res {
                let title = format!("Photo review: {product} ({label})");
                if !orch.save(&title, FeatureResult::ImageReview(review.clone())) {
                    ux::show_failure(&ShopError::Storage(format!("could not save review of {label}")));
                }
            }
        }
    }
    Ok(())
}

async fn video(
    orch: &Orchestrator,
    cfg: &config::Config,
    product: &str,
    image: &Path,
    style: prompt::VideoStyle,
    out: Option<&Path>,
    yes: bool,
    progress: bool,
) -> ShopResult<()> {
    let cost = cfg.cost_of(Feature::Video);
    if !yes && !ux::confirm(&format!("Generating a video costs {cost} credits. Continue?")) {
        return Err(ShopError::Cancelled);
    }
    let img = read_image(image)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let spinner = ux::video_spinner(progress);
    let res = orch
        .generate_video(product, style, img, &cancel, |h| spinner.set_message(ux::status_message(h)))
        .await;
    spinner.finish_and_clear();
    watcher.abort();

    let media = res?;
    match out {
        Some(dest) => {
            let n = orch.download(&media, dest).await?;
            ux::show_media(&media, Some((dest, n)));
        }
        None => ux::show_media(&media, None),
    }
    Ok(())
}

async fn run(orch: &Orchestrator, cfg: &config::Config, command: FeatureCommand, progress: bool) -> ShopResult<()> {
    match command {
        FeatureCommand::Audit { shop_url, notes, opts } => {
            analysis(orch, FeatureInput::ShopAudit { shop_url, notes }, None, &opts).await
        }
        FeatureCommand::Listing { product, keywords, tone, image, opts } => {
            analysis(orch, FeatureInput::ListingCopy { product, keywords, tone }, image.as_ref(), &opts).await
        }
        FeatureCommand::Trends { niche, region, opts } => {
            analysis(orch, FeatureInput::TrendScan { niche, region }, None, &opts).await
        }
        FeatureCommand::Competitors { shop_name, niche, opts } => {
            analysis(orch, FeatureInput::CompetitorScan { shop_name, niche }, None, &opts).await
        }
        FeatureCommand::Images { product, paths, save } => images(orch, &product, &paths, save).await,
        FeatureCommand::Video { product, image, style, out, yes } => {
            video(orch, cfg, &product, &image, style, out.as_deref(), yes, progress).await
        }
    }
}

fn signed_in(session: &dyn Session) -> ShopResult<Account> {
    session
        .current()
        .ok_or_else(|| ShopError::Config("no signed-in account; pass --account-id or set account_id".into()))
}

async fn account_command(
    gate: &EntitlementGate,
    session: &dyn Session,
    cfg: &config::Config,
    command: AccountCommand,
) -> ShopResult<()> {
    let account = signed_in(session)?;
    match command {
        AccountCommand::Topup { pack, cycle } => {
            let url = LinkCheckout::new(cfg.checkout_url.clone()).initiate_checkout(&pack, cycle, &account).await?;
            println!("Complete your purchase at:\n{url}");
        }
        AccountCommand::Balance => println!("{} credits", gate.balance(&account.id).await?),
    }
    Ok(())
}

/// Sign-in link shown when a costed action is refused for lack of an account.
fn sign_in_hint(err: &ShopError, session: &dyn Session, cfg: &config::Config) -> Option<String> {
    if !matches!(err, ShopError::InsufficientEntitlement { .. }) || session.current().is_some() {
        return None;
    }
    session.sign_in_url("google", &cfg.app_url).ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging(args.debug);

    let mut cfg = config::Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(m) = args.model.clone() {
        cfg.text_model = m;
    }
    if args.account_id.is_some() {
        cfg.account_id = args.account_id.clone();
    }
    if args.account_email.is_some() {
        cfg.account_email = args.account_email.clone();
    }
    log::debug!("text model {}, video model {}", cfg.text_model, cfg.video_model);

    let session: Arc<dyn Session> = Arc::new(StaticSession::new(account_from(&cfg), cfg.auth_url.clone()));
    let gate = EntitlementGate::new(Arc::new(FileBalanceStore::new(&cfg.ledger_path, cfg.starting_balance)));
    let reports = Arc::new(collab::FileReportStore::new(&cfg.reports_dir));

    let res = match args.command {
        Command::Account(command) => account_command(&gate, session.as_ref(), &cfg, command).await,
        Command::Feature(command) => {
            let backend = provider::make_backend(&cfg).map_err(|e| anyhow::anyhow!(e.user_notice()))?;
            let orch = Orchestrator::new(cfg.clone(), backend, gate, session.clone(), reports);
            run(&orch, &cfg, command, args.progress).await
        }
    };

    if let Err(e) = res {
        ux::show_failure(&e);
        if let Some(url) = sign_in_hint(&e, session.as_ref(), &cfg) {
            eprintln!("Sign in first: {url}");
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_hint_returns_to_the_app() {
        let cfg = config::Config::default();
        let signed_out = StaticSession::new(None, cfg.auth_url.clone());
        let refused = ShopError::InsufficientEntitlement { cost: 5 };

        let url = sign_in_hint(&refused, &signed_out, &cfg).unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let redirect = parsed.query_pairs().find(|(k, _)| k == "redirect_to").map(|(_, v)| v.into_owned());
        assert_eq!(redirect.as_deref(), Some(cfg.app_url.as_str()));
        assert!(!url.contains("checkout"));

        assert!(sign_in_hint(&ShopError::Cancelled, &signed_out, &cfg).is_none());
        let signed_in = StaticSession::new(Some(Account { id: "a".into(), email: String::new() }), cfg.auth_url.clone());
        assert!(sign_in_hint(&refused, &signed_in, &cfg).is_none());
    }
}
