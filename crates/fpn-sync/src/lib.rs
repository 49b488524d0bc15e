//! Dispatch pipeline for FPN: qualify, order, render, and deliver new projects.

use anyhow::{Context, Result};
use fpn_adapters::{FeedClient, TelegramMessenger};
use fpn_storage::{HttpClientConfig, SqlDedupeStore};

pub mod config;
pub mod dispatch;
pub mod filter;
pub mod format;
pub mod pacer;

#[cfg(test)]
mod testing;

pub use config::{FileConfig, SyncConfig};
pub use dispatch::{CycleSummary, DispatchLoop, DispatchSettings};
pub use filter::{select_qualified, QualificationFilter, Qualified, Rejection, Selection};
pub use format::{NotificationFormatter, MAX_MESSAGE_CHARS};
pub use pacer::{NoopPacer, Pacer, TokioPacer};

pub const CRATE_NAME: &str = "fpn-sync";

pub type LiveDispatchLoop = DispatchLoop<FeedClient, TelegramMessenger, SqlDedupeStore, TokioPacer>;

/// Connect to the dedupe database and make sure its table exists.
pub async fn open_store(config: &SyncConfig) -> Result<SqlDedupeStore> {
    let store = SqlDedupeStore::connect(&config.database_url, config.store_timeout)
        .await
        .context("connecting dedupe store")?;
    store.init().await.context("initialising dedupe store")?;
    Ok(store)
}

/// Wire the production collaborators. Any failure here is a startup failure.
pub async fn build_live_loop(config: &SyncConfig) -> Result<LiveDispatchLoop> {
    let (bot_token, chat_id) = config.credentials()?;
    let store = open_store(config).await?;
    let messenger = TelegramMessenger::new(&config.telegram_api_base, bot_token, config.http_timeout)
        .context("initialising messaging client")?;
    let feed = FeedClient::new(
        &config.feed,
        HttpClientConfig {
            timeout: config.http_timeout,
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        },
    )
    .context("initialising feed client")?;

    Ok(DispatchLoop::from_config(
        feed,
        messenger,
        store,
        TokioPacer,
        config,
        chat_id,
    ))
}
