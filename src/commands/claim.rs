use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use autoclaim::auth::{AuthVerifier, Authorization};
use autoclaim::claimer::{AutoClaimer, ClaimEvent, EventRecord};
use autoclaim::client::BeduClient;
use autoclaim::config::{ClaimPlan, Config};
use autoclaim::error::ClaimErrorTrait;

/// Flag overrides for the claim command
#[derive(Args, Debug, Default)]
pub struct ClaimArgs {
    /// Task type (audittask, producetask)
    #[arg(short, long)]
    pub task_type: Option<String>,

    /// Number of tasks to claim before stopping
    #[arg(short, long)]
    pub limit: Option<i64>,

    /// Seconds between attempts (fractional allowed, minimum 0.1)
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Pick a random listing page in 1..=N each attempt
    #[arg(long)]
    pub max_pages: Option<i64>,

    /// Claims issued concurrently per batch
    #[arg(long)]
    pub concurrency: Option<i64>,

    /// Step filter id
    #[arg(long)]
    pub step: Option<i64>,

    /// Subject filter id
    #[arg(long)]
    pub subject: Option<i64>,

    /// Clue type filter id
    #[arg(long)]
    pub clue_type: Option<i64>,

    /// Keywords, one of which must appear in the brief (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Keywords that must not appear in the brief (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Dispatch window start, "YYYY-MM-DD HH:MM:SS" (producetask only)
    #[arg(long)]
    pub start_time: Option<String>,

    /// Dispatch window end, "YYYY-MM-DD HH:MM:SS" (producetask only)
    #[arg(long)]
    pub end_time: Option<String>,

    /// Cookie credential, overriding the configured one
    #[arg(long)]
    pub cookie: Option<String>,
}

impl ClaimArgs {
    /// Overlay the given flags onto the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        let claim = &mut config.claim;

        if let Some(v) = &self.task_type {
            claim.task_type = v.clone();
        }
        if let Some(v) = self.limit {
            claim.claim_limit = v;
        }
        if let Some(v) = self.interval {
            claim.interval_secs = v;
        }
        if let Some(v) = self.max_pages {
            claim.max_pages = v;
        }
        if let Some(v) = self.concurrency {
            claim.concurrent_claims = v;
        }
        if let Some(v) = self.step {
            claim.step_id = v;
        }
        if let Some(v) = self.subject {
            claim.subject_id = v;
        }
        if let Some(v) = self.clue_type {
            claim.clue_type_id = v;
        }
        if !self.include.is_empty() {
            claim.include_keywords = self.include.clone();
        }
        if !self.exclude.is_empty() {
            claim.exclude_keywords = self.exclude.clone();
        }
        if let Some(v) = &self.start_time {
            claim.start_time = v.clone();
        }
        if let Some(v) = &self.end_time {
            claim.end_time = v.clone();
        }
        if let Some(v) = &self.cookie {
            config.server.cookie = v.clone();
        }
    }
}

pub async fn claim(config: Config) -> Result<()> {
    let plan = ClaimPlan::from_settings(&config.claim)?.with_page_size(config.server.page_size);
    let session = config.server.session();
    session.validate()?;

    let client = Arc::new(BeduClient::from_config(&config.server)?);

    let verifier = AuthVerifier::from_config(&config.auth)?;
    let authorization = match verifier.verify(&config.auth, &client, &session).await {
        Ok(authorization) => authorization,
        Err(e) => {
            if e.is_recoverable() {
                tracing::warn!(
                    category = %e.category(),
                    "Authorization service unavailable, try again later"
                );
            }
            return Err(e).context("Authorization check failed");
        }
    };
    match authorization {
        Authorization::Skipped => {}
        Authorization::Licensed(record) => {
            println!("Licensed user: {} (expires {})", record.name, record.exp_time);
        }
        Authorization::Authorized { user_name } => {
            println!("Authorized user: {user_name}");
        }
    }

    println!("Starting Auto-Claim");
    println!("===================");
    println!("  Task type:   {}", plan.kind);
    println!("  Limit:       {}", plan.claim_limit);
    println!("  Interval:    {:.1}s", plan.interval.as_secs_f64());
    println!("  Concurrency: {}", plan.concurrent_claims);
    if plan.max_pages > 1 {
        println!("  Pages:       1..={}", plan.max_pages);
    }
    if !plan.keywords.include().is_empty() {
        println!("  Include:     {}", plan.keywords.include().join(", "));
    }
    if !plan.keywords.exclude().is_empty() {
        println!("  Exclude:     {}", plan.keywords.exclude().join(", "));
    }
    if plan.uses_dispatch_window() && !plan.window.is_unbounded() {
        println!(
            "  Window:      {} .. {}",
            plan.window.start().unwrap_or("-"),
            plan.window.end().unwrap_or("-")
        );
    }
    println!();

    let claimer = AutoClaimer::new(plan, session, client);
    let mut events = claimer
        .take_events()
        .context("Event stream already taken")?;

    let shutdown = CancellationToken::new();
    claimer.start(&shutdown)?;

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    if drive(&claimer, &mut events, ctrl_c).await {
        println!("Interrupted by Ctrl-C");
    }

    let status = claimer.status();
    println!();
    println!("Auto-Claim Finished");
    println!("===================");
    println!("  Claimed:  {}", status.successful_claims);
    println!("  Attempts: {}", status.attempt_count);
    if let Some(error) = &status.last_error {
        println!("  Last error: {error}");
    }
    if claimer.dropped_events() > 0 {
        println!("  Dropped events: {}", claimer.dropped_events());
    }

    Ok(())
}

/// Print events until the run ends, stopping it when `interrupt` fires
///
/// The interrupt future is created once and polled across iterations, so a
/// signal arriving while an event is printed is not lost. Returns whether
/// the run was interrupted.
async fn drive(
    claimer: &AutoClaimer,
    events: &mut mpsc::Receiver<EventRecord>,
    interrupt: impl Future<Output = ()>,
) -> bool {
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            Some(record) = events.recv() => print_event(&record),

            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                claimer.stop();
            }

            _ = claimer.wait() => break,
        }
    }

    // The loop reports its exit right after the run ends
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(record) = events.recv().await {
            print_event(&record);
            if matches!(record.event, ClaimEvent::Stopped { .. }) {
                break;
            }
        }
    })
    .await;

    interrupted
}

fn print_event(record: &EventRecord) {
    match record.event {
        ClaimEvent::Filtered { .. } | ClaimEvent::PageSelected { .. } => {
            tracing::debug!("{record}");
        }
        _ => println!("{record}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoclaim::client::{ApiError, Session, TaskApi};
    use autoclaim::config::ClaimSettings;
    use autoclaim::models::{ClaimResponse, ListQuery, TaskKind, TaskListData, TaskListResponse};

    /// Pool that never has anything to claim, so runs only end when stopped
    struct EmptyPool;

    #[async_trait]
    impl TaskApi for EmptyPool {
        async fn list_tasks(
            &self,
            _session: &Session,
            _query: &ListQuery,
        ) -> std::result::Result<TaskListResponse, ApiError> {
            Ok(TaskListResponse {
                errno: 0,
                errmsg: "success".to_string(),
                data: TaskListData {
                    total: 0,
                    list: Some(Vec::new()),
                },
            })
        }

        async fn claim_task(
            &self,
            _session: &Session,
            _id: &str,
            _kind: TaskKind,
        ) -> std::result::Result<ClaimResponse, ApiError> {
            Ok(ClaimResponse::default())
        }
    }

    fn polling_claimer() -> AutoClaimer {
        let settings = ClaimSettings {
            interval_secs: 0.1,
            ..Default::default()
        };
        AutoClaimer::new(
            ClaimPlan::from_settings(&settings).unwrap(),
            Session::new("http://task-pool.test", "BDUSS=abc"),
            Arc::new(EmptyPool),
        )
    }

    #[tokio::test]
    async fn test_interrupt_while_events_flow() {
        let claimer = polling_claimer();
        let mut events = claimer.take_events().unwrap();
        claimer.start(&CancellationToken::new()).unwrap();

        let interrupt = tokio::time::sleep(Duration::from_millis(350));
        let interrupted = tokio::time::timeout(
            Duration::from_secs(5),
            drive(&claimer, &mut events, interrupt),
        )
        .await
        .unwrap();

        assert!(interrupted);
        assert!(!claimer.is_active());
        assert!(claimer.status().attempt_count >= 2);
    }

    #[tokio::test]
    async fn test_run_ending_on_its_own() {
        let claimer = polling_claimer();
        let mut events = claimer.take_events().unwrap();
        let parent = CancellationToken::new();
        claimer.start(&parent).unwrap();

        let cancel = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });

        let interrupted = tokio::time::timeout(
            Duration::from_secs(5),
            drive(&claimer, &mut events, std::future::pending()),
        )
        .await
        .unwrap();

        assert!(!interrupted);
        assert!(!claimer.is_active());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        let args = ClaimArgs {
            task_type: Some("producetask".to_string()),
            limit: Some(3),
            include: vec!["algebra".to_string()],
            cookie: Some("BDUSS=abc".to_string()),
            ..Default::default()
        };

        args.apply(&mut config);

        assert_eq!(config.claim.task_type, "producetask");
        assert_eq!(config.claim.claim_limit, 3);
        assert_eq!(config.claim.include_keywords, vec!["algebra".to_string()]);
        assert_eq!(config.server.cookie, "BDUSS=abc");
        assert_eq!(config.claim.interval_secs, 1.0);
    }
}
