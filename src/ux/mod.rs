use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::errors::{ShopError, ShopResult};
use crate::shape::{
    Competition, CompetitorScan, FeatureResult, ImageReview, ListingCopy, Severity, ShopAudit,
    TrendDirection, TrendEntry,
};
use crate::wire::{MediaReference, OperationHandle, OperationStatus};

fn banner(title: &str) {
    let line = format!("━━━━━━━━━━━━━━━━━━━━━ {title} ━━━━━━━━━━━━━━━━━━━━━");
    println!("\n{}", line.bold());
}

fn score(v: u8) -> ColoredString {
    let s = format!("{v}/100");
    match v {
        80..=100 => s.green().bold(),
        50..=79 => s.yellow().bold(),
        _ => s.red().bold(),
    }
}

fn severity(s: Severity) -> ColoredString {
    match s {
        Severity::High => "[HIGH]".red().bold(),
        Severity::Medium => "[MEDIUM]".yellow().bold(),
        Severity::Low => "[LOW]".cyan().bold(),
    }
}

pub fn show_result(result: &FeatureResult) {
    match result {
        FeatureResult::ShopAudit(a) => show_audit(a),
        FeatureResult::ListingCopy(l) => show_listing(l),
        FeatureResult::TrendScan(t) => show_trends(t),
        FeatureResult::CompetitorScan(c) => show_competitors(c),
        FeatureResult::ImageReview(r) => show_image_review("Photo review", r),
    }
}

fn show_audit(a: &ShopAudit) {
    banner("Shop Audit");
    println!("Score: {}", score(a.overall_score));
    println!("{}\n", a.summary);
    for (i, f) in a.findings.iter().enumerate() {
        println!("{}. {} {} ({:?})", i + 1, severity(f.severity), f.title.bold(), f.category);
        println!("   {}", f.detail);
        println!("   {} {}", "fix:".green(), f.recommendation);
    }
    println!();
}

fn show_listing(l: &ListingCopy) {
    banner("Listing Copy");
    println!("{}\n{}\n", "Title".bold(), l.title);
    println!("{}\n{}\n", "Description".bold(), l.description);
    println!("{} {}", "Tags".bold(), l.tags.join(", ").cyan());
    println!();
}

fn show_trends(ts: &[TrendEntry]) {
    banner("Trend Scan");
    for t in ts {
        let arrow = match t.trend {
            TrendDirection::Rising => "▲ rising".green(),
            TrendDirection::Stable => "■ stable".yellow(),
            TrendDirection::Declining => "▼ declining".red(),
        };
        let comp = match t.competition {
            Competition::Low => "low".green(),
            Competition::Medium => "medium".yellow(),
            Competition::High => "high".red(),
        };
        println!("{}  {}  demand {}  competition {}", t.keyword.bold(), arrow, score(t.demand_score), comp);
        println!("   {}", t.insight);
    }
    println!();
}

fn show_competitors(c: &CompetitorScan) {
    banner("Competitors");
    for comp in &c.competitors {
        println!("{}  {}", comp.name.bold(), comp.price_range.dimmed());
        for s in &comp.strengths {
            println!("   {} {}", "+".green(), s);
        }
        for w in &comp.weaknesses {
            println!("   {} {}", "-".red(), w);
        }
    }
    if !c.opportunities.is_empty() {
        println!("\n{}", "Opportunities".bold());
        for o in &c.opportunities {
            println!(" • {o}");
        }
    }
    println!();
}

pub fn show_image_review(label: &str, r: &ImageReview) {
    banner(label);
    println!("Score: {}", score(r.score));
    println!("{} {}", "Alt text:".bold(), r.alt_text);
    for i in &r.issues {
        println!("   {} {}", "!".red().bold(), i);
    }
    for s in &r.suggestions {
        println!("   {} {}", "→".green(), s);
    }
    println!();
}

/// Batch results: successes rendered in full, failures as one line each.
pub fn show_batch(results: &[(String, ShopResult<ImageReview>)]) {
    let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
    println!("\n{} {ok}/{} photos reviewed", "Batch:".bold(), results.len());
    for (label, res) in results {
        match res {
            Ok(r) => show_image_review(label, r),
            Err(e) => println!("{} {}: {}", "[FAILED]".red().bold(), label, e.user_notice()),
        }
    }
}

pub fn show_media(media: &MediaReference, saved: Option<(&std::path::Path, u64)>) {
    banner("Video ready");
    println!("{} {}", "URI:".bold(), media.uri);
    match saved {
        Some((p, n)) => println!("{} {} ({n} bytes)", "Saved:".bold(), p.display()),
        None => println!("{} {}", "Fetch:".bold(), media.fetch_url),
    }
}

pub fn show_failure(err: &ShopError) {
    eprintln!("{} {}", "✗".red().bold(), err.user_notice());
    log::debug!("failure detail: {err}");
}

/// Spinner shown while a video job runs.
pub fn video_spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {elapsed_precise} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("submitting video job");
    pb
}

pub fn status_message(h: &OperationHandle) -> String {
    match h.status {
        OperationStatus::Pending => "queued".into(),
        OperationStatus::Running => "generating video".into(),
        OperationStatus::Done => "finished".into(),
        OperationStatus::Error => format!("failed: {}", h.error_detail.as_deref().unwrap_or("unknown")),
    }
}

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes"
    } else {
        false
    }
}

/// Next chat line from stdin; `None` on EOF or `/exit`.
pub fn read_chat_line(input: &mut impl BufRead) -> Option<String> {
    print!("{} ", "you>".cyan().bold());
    let _ = io::stdout().flush();
    let mut s = String::new();
    match input.read_line(&mut s) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let line = s.trim().to_string();
            (line != "/exit").then_some(line)
        }
    }
}

pub fn show_reply(text: &str) {
    println!("{} {}\n", "ai>".magenta().bold(), text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_line_stops_on_exit_or_eof() {
        let mut input = io::Cursor::new("what next?\n/exit\nignored\n");
        assert_eq!(read_chat_line(&mut input).as_deref(), Some("what next?"));
        assert_eq!(read_chat_line(&mut input), None);

        let mut empty = io::Cursor::new("");
        assert_eq!(read_chat_line(&mut empty), None);
    }

    #[test]
    fn status_text_includes_error_detail() {
        let h = OperationHandle {
            id: "op".into(),
            status: OperationStatus::Error,
            result_ref: None,
            error_detail: Some("quota".into()),
        };
        assert_eq!(status_message(&h), "failed: quota");
    }
}
