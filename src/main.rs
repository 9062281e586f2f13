use std::sync::Arc;

use anyhow::Context;
use inbox_rules::config::Config;
use inbox_rules::mail::{GmailMailStore, MailStore};
use inbox_rules::pipeline::Orchestrator;
use inbox_rules::rules::{RuleProcessor, RuleSet};
use inbox_rules::store::{EmailStore, LibSqlBackend};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let _log_guard = inbox_rules::logging::init(config.log_dir.as_deref())
        .context("failed to initialise logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        rules = %config.rules_file.display(),
        db = %config.db_path.display(),
        "Inbox rules starting"
    );

    let rules = RuleSet::load(&config.rules_file)
        .with_context(|| format!("failed to load rules from {}", config.rules_file.display()))?;

    let email_store: Arc<dyn EmailStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    let mail_store: Arc<dyn MailStore> = Arc::new(GmailMailStore::new(config.gmail.clone()));

    let processor = RuleProcessor::new(Arc::new(rules), mail_store.clone());
    let orchestrator = Orchestrator::new(mail_store, email_store, processor)
        .with_max_emails(config.max_emails)
        .with_concurrency(config.concurrency);

    match config.poll_interval {
        None => {
            orchestrator.run_once().await.context("pipeline run failed")?;
        }
        Some(interval) => {
            let (handle, shutdown) = Arc::new(orchestrator).spawn_poller(interval);
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            info!("Shutdown requested");
            let _ = shutdown.send(true);
            handle.await.context("poller task failed")?;
        }
    }

    Ok(())
}
