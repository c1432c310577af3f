// BEGIN - Embark standard lints v0.3
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::explicit_into_iter_loop,
    clippy::filter_map_next,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::pub_enum_variant_names,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_to_string,
    clippy::suboptimal_flops,
    clippy::todo,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::verbose_file_reads,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.3

pub mod config;
pub mod error;
pub mod gateway;
pub mod labeler;
pub mod logging;
pub mod merge_context;
pub mod models;
pub mod scheduler;
pub mod status;
pub mod step;
pub mod voting;
pub mod webhook;

use anyhow::{Context as _, Result};
use std::sync::Arc;

/// Top-level wiring: owns the Gateway and the Scheduler singleton, and runs
/// the webhook listener alongside it until told to stop.
pub struct App {
    pub config: config::Config,
    pub scheduler: Arc<scheduler::Scheduler>,
}

impl App {
    pub fn new(config: config::Config) -> Result<Self> {
        let gateway = gateway::GithubGateway::new(
            config.github_token.clone(),
            config.owner.clone(),
            config.repo.clone(),
        )
        .context("failed to construct the platform gateway")?;

        let scheduler = scheduler::Scheduler::new(Arc::new(gateway), config.clone());

        Ok(Self { config, scheduler })
    }

    /// Kicks off an initial scan in the background, then serves the webhook
    /// listener concurrently until the Scheduler asks it to close.
    pub async fn run(&self) -> Result<()> {
        let initial_scan = Arc::clone(&self.scheduler);
        tokio::spawn(async move { initial_scan.run().await });

        webhook::serve(&self.config, Arc::clone(&self.scheduler)).await
    }
}
