use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use ts_rs::TS;
use uuid::Uuid;

use campaignctl::api::{CampaignApi, HttpCampaignApi};
use campaignctl::config::Config;
use campaignctl::logging;
use campaignctl::session::Session;
use campaignctl::sync::{ResourceKey, SnapshotCache, SyncCoordinator, SyncEvent};
use campaignctl::types::{
    AddRecipientsResult, Campaign, CampaignPatch, CampaignQuery, CampaignStatus, CampaignSummary,
    ContentOutcome, EmailArtifactOutcome, EmailDispatchOutcome, EmailPreview, EmailRecipient,
    EmailStats, GenerateContentRequest, GenerateContentResponse, GenerateEmailRequest,
    GenerateEmailResponse, NewRecipient, SendEmailsRequest, SendEmailsResponse,
};
use campaignctl::workflow::{
    available_actions, due_event, parse_schedule_input, AuditTrail, ContentOrchestrator,
    Dispatched, LifecycleEvent, WorkflowAction, WorkflowDispatcher, WorkflowError,
};

#[derive(Parser)]
#[command(name = "campaignctl")]
#[command(about = "Campaign lifecycle workflow for the StoreSync dashboard")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a campaign with its approval history
    Show { id: Uuid },

    /// List campaigns
    List {
        #[arg(short, long)]
        status: Option<CampaignStatus>,
        #[arg(long)]
        location: Option<Uuid>,
        #[arg(long)]
        template: Option<Uuid>,
        #[arg(long)]
        brand: Option<Uuid>,
        #[arg(short, long)]
        page: Option<u32>,
    },

    /// Submit a draft for review
    Submit {
        id: Uuid,
        #[arg(short = 'm', long)]
        comments: Option<String>,
    },

    /// Approve a campaign pending review
    Approve {
        id: Uuid,
        #[arg(short = 'm', long)]
        comments: Option<String>,
    },

    /// Reject a campaign pending review (comments required)
    Reject {
        id: Uuid,
        #[arg(short = 'm', long, default_value = "")]
        comments: String,
    },

    /// Send a campaign back to draft
    Revise {
        id: Uuid,
        #[arg(short = 'm', long)]
        comments: Option<String>,
    },

    /// Set the publication window and schedule an approved campaign
    Schedule {
        id: Uuid,
        /// Start, RFC 3339 or YYYY-MM-DDTHH:MM (UTC)
        #[arg(long)]
        start: String,
        /// End, RFC 3339 or YYYY-MM-DDTHH:MM (UTC)
        #[arg(long)]
        end: String,
    },

    /// Retry the schedule transition after the dates were saved
    CompleteSchedule { id: Uuid },

    /// Edit a draft's fields
    Edit {
        id: Uuid,
        /// Replace the generated content
        #[arg(long)]
        content: Option<String>,
        /// Set a template variable (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },

    /// Delete a draft or rejected campaign
    Delete { id: Uuid },

    /// Generate the campaign's content
    Generate {
        id: Uuid,
        /// Discard existing content and generate again
        #[arg(long)]
        regenerate: bool,
        /// Ask for AI generation (falls back to the template)
        #[arg(long)]
        ai: bool,
        #[arg(long)]
        instructions: Option<String>,
        /// Queue the work instead of waiting for it
        #[arg(long)]
        queued: bool,
    },

    /// Generate the HTML email from the campaign content
    HtmlEmail {
        id: Uuid,
        #[arg(long)]
        queued: bool,
    },

    /// Email recipients and sending
    Email {
        #[command(subcommand)]
        command: EmailCommands,
    },

    /// Poll a campaign and print changes
    Watch { id: Uuid },

    /// Poll the approval queue
    Queue {
        /// Print once and exit
        #[arg(long)]
        once: bool,
    },

    /// Print the campaign JSON schema, or export TypeScript bindings
    Schema {
        /// Directory to write TypeScript definitions to
        #[arg(long)]
        typescript: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum EmailCommands {
    /// Send the campaign email to pending recipients
    Send {
        id: Uuid,
        /// Limit to these recipient ids (repeatable)
        #[arg(long = "recipient")]
        recipients: Vec<Uuid>,
        /// Wait for delivery instead of queueing
        #[arg(long)]
        wait: bool,
    },
    /// Send a single test email
    Test { id: Uuid, email: String },
    /// Add recipients as EMAIL or EMAIL:NAME
    Add { id: Uuid, recipients: Vec<String> },
    /// Remove recipients that have not been sent to
    Clear { id: Uuid },
    /// Delivery counts
    Status { id: Uuid },
    /// Subject, preview text and HTML
    Preview { id: Uuid },
    /// List recipients
    Recipients {
        id: Uuid,
        #[arg(short, long)]
        page: Option<u32>,
    },
}

/// Services bound to one signed-in session
struct Engine {
    api: Arc<dyn CampaignApi>,
    session: Session,
    cache: Arc<SnapshotCache>,
    dispatcher: WorkflowDispatcher,
    orchestrator: ContentOrchestrator,
}

impl Engine {
    async fn connect(config: &Config) -> Result<Self> {
        let Some(token) = config.api.token.as_deref() else {
            bail!("No API token configured; set CAMPAIGNCTL__API__TOKEN");
        };
        let session = HttpCampaignApi::sign_in(&config.api.base_url, config.api.timeout(), token)
            .await
            .with_context(|| format!("Failed to sign in to {}", config.api.base_url))?;
        let client = HttpCampaignApi::new(&config.api.base_url, config.api.timeout(), session.clone())
            .context("Failed to build HTTP client")?;

        let api: Arc<dyn CampaignApi> = Arc::new(client);
        let cache = Arc::new(SnapshotCache::new());
        Ok(Self {
            dispatcher: WorkflowDispatcher::new(api.clone(), session.clone(), cache.clone()),
            orchestrator: ContentOrchestrator::new(api.clone(), session.clone(), cache.clone()),
            api,
            session,
            cache,
        })
    }

    fn coordinator(&self, config: &Config) -> SyncCoordinator {
        SyncCoordinator::new(
            self.api.clone(),
            self.cache.clone(),
            self.session.clone(),
            config.sync.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let is_watch_mode = matches!(cli.command, Commands::Watch { .. } | Commands::Queue { once: false });
    let logging_handle = logging::init_logging(&config, is_watch_mode, cli.debug)?;

    if let Commands::Schema { typescript } = &cli.command {
        return cmd_schema(typescript.as_deref());
    }

    let engine = Engine::connect(&config).await?;

    match cli.command {
        Commands::Show { id } => cmd_show(&engine, id).await?,
        Commands::List {
            status,
            location,
            template,
            brand,
            page,
        } => {
            let query = CampaignQuery {
                status,
                location,
                template,
                brand,
                page,
            };
            cmd_list(&engine, &query).await?;
        }
        Commands::Submit { id, comments } => {
            cmd_action(&engine, id, WorkflowAction::Submit { comments }).await?;
        }
        Commands::Approve { id, comments } => {
            cmd_action(&engine, id, WorkflowAction::Approve { comments }).await?;
        }
        Commands::Reject { id, comments } => {
            cmd_action(&engine, id, WorkflowAction::Reject { comments }).await?;
        }
        Commands::Revise { id, comments } => {
            cmd_action(&engine, id, WorkflowAction::Revise { comments }).await?;
        }
        Commands::Schedule { id, start, end } => {
            let start = parse_schedule_input(&start).context("Invalid --start")?;
            let end = parse_schedule_input(&end).context("Invalid --end")?;
            let action = WorkflowAction::Schedule {
                start: Some(start),
                end: Some(end),
            };
            cmd_action(&engine, id, action).await?;
        }
        Commands::CompleteSchedule { id } => {
            let result = engine.dispatcher.complete_schedule(id).await;
            report_dispatch(result)?;
        }
        Commands::Edit {
            id,
            content,
            set,
            start,
            end,
        } => cmd_edit(&engine, id, content, set, start, end).await?,
        Commands::Delete { id } => cmd_action(&engine, id, WorkflowAction::Delete).await?,
        Commands::Generate {
            id,
            regenerate,
            ai,
            instructions,
            queued,
        } => {
            let mut request = GenerateContentRequest::default().with_ai(ai).queued(queued);
            if let Some(instructions) = instructions {
                request = request.with_instructions(instructions);
            }
            cmd_generate(&engine, id, regenerate, &request).await?;
        }
        Commands::HtmlEmail { id, queued } => {
            let request = GenerateEmailRequest {
                async_generation: Some(queued),
            };
            cmd_html_email(&engine, id, &request).await?;
        }
        Commands::Email { command } => cmd_email(&engine, command).await?,
        Commands::Watch { id } => {
            cmd_watch(&engine, &config, ResourceKey::Detail(id)).await?;
        }
        Commands::Queue { once } => {
            let query = CampaignQuery::approval_queue();
            if once {
                cmd_list(&engine, &query).await?;
            } else {
                cmd_watch(&engine, &config, ResourceKey::List(query)).await?;
            }
        }
        Commands::Schema { .. } => {}
    }

    // Print log file path on exit if logs were written
    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.metadata().is_ok_and(|m| m.len() > 0) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    Ok(())
}

fn print_campaign(campaign: &Campaign, session: &Session) {
    println!("{}", campaign.title());
    println!("{}", "─".repeat(60));
    println!("  ID:        {}", campaign.id);
    println!("  Status:    {}", campaign.status.label());
    if let Some(brand) = &campaign.brand_name {
        println!("  Brand:     {}", brand);
    }
    if let Some(author) = &campaign.created_by_name {
        println!("  Author:    {}", author);
    }
    if let Some((start, end)) = campaign.schedule_bounds() {
        println!(
            "  Window:    {} .. {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        );
    }
    match due_event(campaign, Utc::now()) {
        Some(LifecycleEvent::Activate) => println!("  Starting:  awaiting the scheduler"),
        Some(LifecycleEvent::Complete) => println!("  Ending:    awaiting the scheduler"),
        None => {}
    }
    println!(
        "  Content:   {}",
        if campaign.has_content() { "yes" } else { "none" }
    );
    println!(
        "  Email:     {} ({} recipients)",
        if campaign.has_html_email { "ready" } else { "none" },
        campaign.email_recipient_count
    );

    let actions = available_actions(campaign.status, &session.authority_for(campaign));
    if !actions.is_empty() {
        let names: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
        println!("  Actions:   {}", names.join(", "));
    }

    match AuditTrail::from_server(&campaign.approval_history) {
        Ok(trail) if !trail.is_empty() => {
            println!();
            println!("History");
            for step in trail.sorted_descending() {
                let who = step
                    .approver_name
                    .as_deref()
                    .unwrap_or(if step.is_system() { "system" } else { "?" });
                println!(
                    "  {} {} → {} [{}] by {}",
                    step.created_at.format("%Y-%m-%d %H:%M"),
                    step.previous_status,
                    step.new_status,
                    step.decision,
                    who
                );
                if !step.comments.is_empty() {
                    println!("      {}", step.comments);
                }
            }
        }
        Ok(_) => {}
        Err(err) => eprintln!("Unreadable history: {}", err),
    }
}

fn print_summaries(summaries: &[CampaignSummary]) {
    for summary in summaries {
        let title = match (&summary.location_name, &summary.template_name) {
            (Some(location), Some(template)) => format!("{location} - {template}"),
            _ => summary.id.to_string(),
        };
        println!("  {:<16} {}  {}", summary.status.label(), summary.id, title);
    }
}

async fn cmd_show(engine: &Engine, id: Uuid) -> Result<()> {
    let campaign = engine
        .api
        .fetch_campaign(id)
        .await
        .with_context(|| format!("Failed to fetch campaign {}", id))?;
    print_campaign(&campaign, &engine.session);
    Ok(())
}

async fn cmd_list(engine: &Engine, query: &CampaignQuery) -> Result<()> {
    let page = engine
        .api
        .list_campaigns(query)
        .await
        .context("Failed to list campaigns")?;

    if page.is_empty() {
        println!("No campaigns");
        return Ok(());
    }

    println!("Campaigns [{}] ({} total)", query, page.count);
    println!("{}", "─".repeat(60));
    print_summaries(&page.results);
    if page.has_next() {
        println!("... more on page {}", query.page.unwrap_or(1) + 1);
    }
    Ok(())
}

fn report_dispatch(result: Result<Dispatched, WorkflowError>) -> Result<()> {
    match result {
        Ok(Dispatched::Transitioned { campaign, edge }) => {
            println!("{}: {} → {}", campaign.title(), edge.0, edge.1);
            Ok(())
        }
        Ok(Dispatched::Updated(campaign)) => {
            println!("Updated {}", campaign.title());
            Ok(())
        }
        Ok(Dispatched::Deleted(id)) => {
            println!("Deleted {}", id);
            Ok(())
        }
        Err(WorkflowError::Validation(err)) => bail!("{} ({})", err, err.field()),
        Err(err @ WorkflowError::Conflict { .. }) => {
            if let Some(latest) = err.latest() {
                eprintln!("Current status: {}", latest.status.label());
            }
            bail!(err.user_message())
        }
        Err(err @ WorkflowError::SchedulePartial { .. }) => {
            eprintln!("Retry with: campaignctl complete-schedule <id>");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn cmd_action(engine: &Engine, id: Uuid, action: WorkflowAction) -> Result<()> {
    let result = engine.dispatcher.execute(id, action).await;
    report_dispatch(result)
}

async fn cmd_edit(
    engine: &Engine,
    id: Uuid,
    content: Option<String>,
    set: Vec<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let customizations = if set.is_empty() {
        None
    } else {
        let current = engine
            .api
            .fetch_campaign(id)
            .await
            .with_context(|| format!("Failed to fetch campaign {}", id))?;
        let mut merged: BTreeMap<String, String> = current.customizations;
        for pair in &set {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("Expected KEY=VALUE, got '{}'", pair);
            };
            merged.insert(key.trim().to_string(), value.to_string());
        }
        Some(merged)
    };

    let patch = CampaignPatch {
        customizations,
        generated_content: content,
        scheduled_start: start
            .as_deref()
            .map(parse_schedule_input)
            .transpose()
            .context("Invalid --start")?,
        scheduled_end: end
            .as_deref()
            .map(parse_schedule_input)
            .transpose()
            .context("Invalid --end")?,
    };
    cmd_action(engine, id, WorkflowAction::Edit(patch)).await
}

async fn cmd_generate(
    engine: &Engine,
    id: Uuid,
    regenerate: bool,
    request: &GenerateContentRequest,
) -> Result<()> {
    let outcome = if regenerate {
        engine.orchestrator.regenerate_content(id, request).await?
    } else {
        engine.orchestrator.generate_content(id, request).await?
    };

    match outcome {
        ContentOutcome::Ready(generated) => {
            println!(
                "Content generated ({} characters, {})",
                generated.content_length.unwrap_or_default(),
                if generated.used_ai { "AI" } else { "template" }
            );
            if let Some(reason) = generated.fallback_reason {
                println!("  Fallback: {}", reason);
            }
            if let Some(content) = generated.content {
                println!();
                println!("{}", content);
            }
        }
        ContentOutcome::Queued { task_id } => {
            println!(
                "Content generation queued{}; run `campaignctl show {}` later",
                task_id.map(|t| format!(" (task {t})")).unwrap_or_default(),
                id
            );
        }
        ContentOutcome::Failed { message } => bail!("Content generation failed: {}", message),
    }
    Ok(())
}

async fn cmd_html_email(engine: &Engine, id: Uuid, request: &GenerateEmailRequest) -> Result<()> {
    match engine.orchestrator.generate_html_email(id, request).await? {
        EmailArtifactOutcome::Ready(artifacts) => {
            println!("HTML email generated");
            if let Some(subject) = artifacts.subject {
                println!("  Subject: {}", subject);
            }
            if let Some(preview) = artifacts.preview_text {
                println!("  Preview: {}", preview);
            }
        }
        EmailArtifactOutcome::Queued { task_id } => {
            println!(
                "Email generation queued{}",
                task_id.map(|t| format!(" (task {t})")).unwrap_or_default()
            );
        }
        EmailArtifactOutcome::Failed { message } => bail!("Email generation failed: {}", message),
    }
    Ok(())
}

fn parse_recipient(raw: &str) -> NewRecipient {
    match raw.split_once(':') {
        Some((email, name)) => NewRecipient::new(email, name),
        None => NewRecipient::new(raw, ""),
    }
}

fn print_add_result(result: &AddRecipientsResult) {
    println!("Added {}, skipped {} duplicates", result.created, result.skipped);
    for error in &result.errors {
        println!("  ✗ {}: {}", error.email, error.error);
    }
}

async fn cmd_email(engine: &Engine, command: EmailCommands) -> Result<()> {
    let orchestrator = &engine.orchestrator;
    match command {
        EmailCommands::Send {
            id,
            recipients,
            wait,
        } => {
            let request = SendEmailsRequest {
                recipient_ids: (!recipients.is_empty()).then_some(recipients),
                async_sending: !wait,
            };
            match orchestrator.send_emails(id, &request).await? {
                EmailDispatchOutcome::Completed(report) => {
                    println!("{}", report.summary());
                    for failure in &report.errors {
                        println!("  ✗ {}: {}", failure.email, failure.error);
                    }
                }
                EmailDispatchOutcome::Queued { task_id } => {
                    println!(
                        "Sending queued{}",
                        task_id.map(|t| format!(" (task {t})")).unwrap_or_default()
                    );
                }
                EmailDispatchOutcome::Failed { message } => bail!("Sending failed: {}", message),
            }
        }
        EmailCommands::Test { id, email } => {
            let response = orchestrator.send_test_email(id, &email).await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| format!("Test email sent to {}", email))
            );
        }
        EmailCommands::Add { id, recipients } => {
            let recipients: Vec<NewRecipient> =
                recipients.iter().map(|r| parse_recipient(r)).collect();
            let result = orchestrator.add_recipients(id, &recipients).await?;
            print_add_result(&result);
        }
        EmailCommands::Clear { id } => {
            let result = orchestrator.clear_recipients(id).await?;
            println!("Removed {} pending recipients", result.deleted);
        }
        EmailCommands::Status { id } => {
            let stats = orchestrator.email_status(id).await?;
            println!(
                "Total: {}, Pending: {}, Sent: {}, Failed: {}",
                stats.total, stats.pending, stats.sent, stats.failed
            );
        }
        EmailCommands::Preview { id } => {
            let preview = orchestrator.email_preview(id).await?;
            if !preview.has_html_email {
                println!("No HTML email yet");
                return Ok(());
            }
            println!("Subject: {}", preview.email_subject);
            println!("Preview: {}", preview.email_preview_text);
            println!();
            println!("{}", preview.generated_html_email);
        }
        EmailCommands::Recipients { id, page } => {
            let recipients = orchestrator.recipients(id, page).await?;
            println!("Recipients ({} total)", recipients.count);
            println!("{}", "─".repeat(60));
            for recipient in &recipients.results {
                println!(
                    "  {:?} {} {}",
                    recipient.status, recipient.email, recipient.name
                );
            }
        }
    }
    Ok(())
}

async fn render(coordinator: &SyncCoordinator, session: &Session, key: &ResourceKey) {
    let cache = coordinator.cache();
    match key {
        ResourceKey::Detail(id) => {
            if let Some(campaign) = cache.detail(*id).await {
                println!();
                print_campaign(&campaign, session);
            }
        }
        ResourceKey::List(query) => {
            if let Some(page) = cache.list(query).await {
                println!();
                println!(
                    "{} [{}] {} campaigns",
                    Utc::now().format("%H:%M:%S"),
                    query,
                    page.count
                );
                print_summaries(&page.results);
            }
        }
    }
}

async fn cmd_watch(engine: &Engine, config: &Config, key: ResourceKey) -> Result<()> {
    let coordinator = engine.coordinator(config);
    let mut events = coordinator.subscribe();
    let handle = coordinator.watch(key.clone());

    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        key,
        coordinator.interval_for(&key).as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::Refreshed { key }) => render(&coordinator, &engine.session, &key).await,
                Ok(SyncEvent::StatusChanged { from, to, lifecycle, .. }) => {
                    let by = if lifecycle.is_some() { " (scheduler)" } else { "" };
                    println!("Status changed: {} → {}{}", from.label(), to.label(), by);
                }
                Ok(SyncEvent::FetchFailed { error, .. }) => {
                    eprintln!("Refresh failed: {}", error);
                    if error.is_auth_error() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    handle.stop().await;
    Ok(())
}

fn cmd_schema(typescript: Option<&std::path::Path>) -> Result<()> {
    let Some(dir) = typescript else {
        let schema = schemars::schema_for!(Campaign);
        println!(
            "{}",
            serde_json::to_string_pretty(&schema).context("Failed to render schema")?
        );
        return Ok(());
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Campaign::export_all_to(dir).context("Failed to export Campaign")?;
    CampaignSummary::export_all_to(dir).context("Failed to export CampaignSummary")?;
    EmailRecipient::export_all_to(dir).context("Failed to export EmailRecipient")?;
    EmailStats::export_all_to(dir).context("Failed to export EmailStats")?;
    EmailPreview::export_all_to(dir).context("Failed to export EmailPreview")?;
    GenerateContentResponse::export_all_to(dir)
        .context("Failed to export GenerateContentResponse")?;
    GenerateEmailResponse::export_all_to(dir).context("Failed to export GenerateEmailResponse")?;
    SendEmailsResponse::export_all_to(dir).context("Failed to export SendEmailsResponse")?;
    AddRecipientsResult::export_all_to(dir).context("Failed to export AddRecipientsResult")?;
    println!("TypeScript definitions written to {}", dir.display());
    Ok(())
}
