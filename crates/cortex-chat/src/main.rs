use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cortex_agent::{
    AgentMessage, AgentRunRequest, CortexAgentClient, RunOutcome, SessionContext, ToolChoice,
};
use cortex_core::config::AgentConfig;
use cortex_core::CortexConfig;
use tracing::info;

mod chat;
mod cli;
mod render;
mod turn;

use cli::{Cli, Command, ThreadsCommand};
use turn::{run_turn, TurnEnd, TurnOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cortex_chat=info,cortex_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > CORTEX_CONFIG env > ~/.cortex/cortex.toml
    let config = CortexConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let client = CortexAgentClient::from_connection(&config.connection)
        .context("building Cortex client")?;
    info!(
        base_url = client.config().base_url(),
        agent = %config.agent.name,
        "client ready"
    );

    match cli.command {
        Command::Threads(cmd) => threads(&client, &config.agent, cmd).await,
        Command::Ask {
            thread,
            events,
            message,
        } => ask(&client, &config.agent, thread, events, message).await,
        Command::Chat {
            thread,
            idle_warn_secs,
        } => {
            chat::Chat::new(&client, &config.agent, idle_warn_secs)
                .run(thread)
                .await
        }
    }
}

async fn threads(
    client: &CortexAgentClient,
    agent: &AgentConfig,
    cmd: ThreadsCommand,
) -> anyhow::Result<()> {
    match cmd {
        ThreadsCommand::List { limit, origin, all } => {
            let origin = if all {
                None
            } else {
                Some(origin.unwrap_or_else(|| agent.origin_application.clone()))
            };
            let threads = client.list_threads(limit, origin.as_deref()).await;
            if threads.is_empty() {
                fail_if_recorded(client)?;
                println!("(no threads)");
            }
            for thread in &threads {
                println!("{}", render::thread_line(thread));
            }
        }
        ThreadsCommand::Create => {
            let id = client
                .create_thread(&agent.origin_application)
                .await
                .ok_or_else(|| failure(client, "create thread"))?;
            println!("{id}");
        }
        ThreadsCommand::Show { id, page_size } => {
            let desc = client
                .describe_thread(&id, page_size, None)
                .await
                .ok_or_else(|| failure(client, "describe thread"))?;
            let mut session = SessionContext::new();
            session.load_thread(id.as_str(), &desc);
            for msg in &session.history {
                println!("{}", render::message(msg));
            }
        }
        ThreadsCommand::Delete { id } => {
            if !client.delete_thread(&id).await {
                return Err(failure(client, "delete thread"));
            }
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn ask(
    client: &CortexAgentClient,
    agent: &AgentConfig,
    thread: Option<String>,
    events: bool,
    message: String,
) -> anyhow::Result<()> {
    let parent = match &thread {
        Some(id) => {
            let desc = client
                .describe_thread(id, 1, None)
                .await
                .ok_or_else(|| failure(client, "describe thread"))?;
            Some(desc.latest_message_id().unwrap_or("0").to_string())
        }
        None => None,
    };

    let request = AgentRunRequest::new(
        &agent.database,
        &agent.schema,
        &agent.name,
        vec![AgentMessage::user(message)],
    )
    .in_thread(thread, parent)
    .with_tool_choice(agent.tool_choice.as_deref().map(ToolChoice::of_kind));

    let opts = TurnOptions {
        echo_events: events,
        idle_warn: Duration::from_secs(60),
    };
    let summary = match run_turn(client, request, &opts).await {
        TurnEnd::Finished(summary) => summary,
        TurnEnd::Stalled(_) => anyhow::bail!("agent stopped responding"),
    };
    match summary.outcome() {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Partial => {
            println!();
            eprintln!("(response ended without a final answer)");
            Ok(())
        }
        RunOutcome::Failed => anyhow::bail!(summary.error.unwrap_or_default()),
    }
}

fn failure(client: &CortexAgentClient, op: &str) -> anyhow::Error {
    let reason = client
        .last_error()
        .unwrap_or_else(|| "no result".to_string());
    anyhow::anyhow!("failed to {op}: {reason}")
}

// an empty list is indistinguishable from a swallowed failure without this
fn fail_if_recorded(client: &CortexAgentClient) -> anyhow::Result<()> {
    match client.last_error() {
        Some(reason) => anyhow::bail!("failed to list threads: {reason}"),
        None => Ok(()),
    }
}
