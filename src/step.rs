//! PR Step — one scan pass: resume the in-flight PR if any, else scan open
//! PRs in creation order. Single-flight and ordered rather than fanned out
//! concurrently, because at most one merge may be in flight at a time.

use crate::config::Config;
use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::merge_context::{FinishOutcome, MergeContext, StartOutcome};
use regex::Regex;
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum StepOutcome {
    InProgress,
    Idle(Option<Duration>),
}

/// Runs one Resume-then-Scan pass against `gateway`.
pub async fn run(gateway: &dyn Gateway, config: &Config) -> GatewayResult<StepOutcome> {
    if let Some(outcome) = resume(gateway, config).await? {
        return Ok(outcome);
    }
    scan(gateway, config).await
}

/// The resume half of the pass. Returns `None` when there is nothing to
/// resume and the caller should fall through to the scan.
async fn resume(gateway: &dyn Gateway, config: &Config) -> GatewayResult<Option<StepOutcome>> {
    let staging_head = match gateway.get_ref(&config.staging_ref()).await {
        Ok(sha) => sha,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    let tag_pattern = Regex::new(&format!(
        "^tags/{}(\\d+)$",
        regex::escape(&config.merge_tag_prefix)
    ))
    .expect("merge tag prefix produces a valid regex");

    let tags = gateway.list_tags().await?;
    let matched = tags.iter().find_map(|(name, target)| {
        if target != &staging_head {
            return None;
        }
        tag_pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    });

    let pr_number = match matched {
        Some(n) => n,
        None => return Ok(None),
    };

    let pr = match gateway.get_pr(pr_number, false).await {
        Ok(pr) => pr,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    if !pr.is_open() {
        if !config.dry_run {
            let _ = gateway.delete_ref(&config.merge_tag_ref(pr_number)).await;
        }
        return Ok(None);
    }

    let ctx = MergeContext::new(gateway, config);
    match ctx.finish_processing(pr_number, &staging_head).await? {
        FinishOutcome::StillWaiting => Ok(Some(StepOutcome::InProgress)),
        FinishOutcome::Done => Ok(None),
    }
}

/// The scan half of the pass: open PRs in creation-time order, first-match
/// short-circuiting.
async fn scan(gateway: &dyn Gateway, config: &Config) -> GatewayResult<StepOutcome> {
    let prs = gateway.list_open_prs().await?;
    let ctx = MergeContext::new(gateway, config);

    let mut min_delay: Option<Duration> = None;
    let last_index = prs.len().saturating_sub(1);

    for (index, pr) in prs.iter().enumerate() {
        let span = tracing::info_span!("scan_pr", pr = pr.number);
        let _enter = span.enter();

        match ctx.start_processing(pr.number).await {
            Ok(StartOutcome::Started) => return Ok(StepOutcome::InProgress),
            Ok(StartOutcome::Deferred(d)) => {
                min_delay = Some(min_delay.map_or(d, |m| m.min(d)));
            }
            Ok(StartOutcome::Rejected) => {}
            Err(e) => {
                if index == last_index {
                    return Err(e);
                }
                tracing::warn!(pr = pr.number, error = %e, "skipping PR after error, continuing scan");
            }
        }
    }

    Ok(StepOutcome::Idle(min_delay))
}
