//! Interactive conversation loop.

use std::time::Duration;

use cortex_agent::{AgentRunRequest, CortexAgentClient, RunOutcome, SessionContext, ToolChoice};
use cortex_core::config::AgentConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::render;
use crate::turn::{run_turn, TurnEnd, TurnOptions};

/// Messages per page when loading a thread.
const HISTORY_PAGE: u32 = 50;

const HELP: &str = "commands: /new  /load ID  /delete  /threads  /history  /quit";

pub struct Chat<'a> {
    client: &'a CortexAgentClient,
    agent: &'a AgentConfig,
    session: SessionContext,
    opts: TurnOptions,
}

impl<'a> Chat<'a> {
    pub fn new(client: &'a CortexAgentClient, agent: &'a AgentConfig, idle_warn_secs: u64) -> Self {
        Self {
            client,
            agent,
            session: SessionContext::new(),
            opts: TurnOptions {
                echo_events: false,
                idle_warn: Duration::from_secs(idle_warn_secs.max(1)),
            },
        }
    }

    pub async fn run(mut self, thread: Option<String>) -> anyhow::Result<()> {
        if let Some(id) = thread {
            self.load(&id).await;
        }
        println!("{HELP}");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(' ').unwrap_or((line, "")) {
                ("/quit", _) | ("/exit", _) => break,
                ("/new", _) => self.new_thread().await,
                ("/load", id) if !id.trim().is_empty() => self.load(id.trim()).await,
                ("/delete", _) => self.delete().await,
                ("/threads", _) => self.list().await,
                ("/history", _) => {
                    for msg in &self.session.history {
                        println!("{}", render::message(msg));
                    }
                }
                (cmd, _) if cmd.starts_with('/') => println!("{HELP}"),
                _ => self.send(line).await,
            }
        }
        Ok(())
    }

    async fn new_thread(&mut self) {
        match self.client.create_thread(&self.agent.origin_application).await {
            Some(id) => {
                println!("created thread {id}");
                self.session.start_thread(id);
            }
            None => eprintln!("failed to create thread: {}", self.last_error()),
        }
    }

    async fn load(&mut self, id: &str) {
        match self.client.describe_thread(id, HISTORY_PAGE, None).await {
            Some(desc) => {
                self.session.load_thread(id, &desc);
                for msg in &self.session.history {
                    println!("{}", render::message(msg));
                }
                info!(thread_id = id, "resumed thread");
            }
            None => eprintln!("failed to load thread {id}: {}", self.last_error()),
        }
    }

    async fn delete(&mut self) {
        let Some(id) = self.session.thread_id.clone() else {
            println!("no current thread");
            return;
        };
        if self.client.delete_thread(&id).await {
            println!("deleted thread {id}");
            self.session.clear();
        } else {
            eprintln!("failed to delete thread: {}", self.last_error());
        }
    }

    async fn list(&self) {
        let threads = self
            .client
            .list_threads(20, Some(&self.agent.origin_application))
            .await;
        for thread in &threads {
            println!("{}", render::thread_line(thread));
        }
        if threads.is_empty() {
            println!("(no threads)");
        }
    }

    async fn send(&mut self, text: &str) {
        self.session.push_user(text);
        let request = AgentRunRequest::new(
            &self.agent.database,
            &self.agent.schema,
            &self.agent.name,
            self.session.outgoing_messages(),
        )
        .in_thread(
            self.session.thread_id.clone(),
            self.session.parent_message_id.clone(),
        )
        .with_tool_choice(
            self.agent
                .tool_choice
                .as_deref()
                .map(ToolChoice::of_kind),
        );

        print!("agent> ");
        let summary = match run_turn(self.client, request, &self.opts).await {
            TurnEnd::Finished(summary) => summary,
            TurnEnd::Stalled(summary) => {
                eprintln!("\nthe agent stopped responding; reloading the thread");
                if let Some(id) = self.session.thread_id.clone() {
                    self.load(&id).await;
                } else if !summary.streamed.is_empty() {
                    self.session.push_assistant(summary.streamed);
                }
                return;
            }
        };

        match summary.outcome() {
            RunOutcome::Completed => {
                self.session.push_assistant(summary.answer());
                self.refresh_parent().await;
            }
            RunOutcome::Partial => {
                eprintln!("(response ended without a final answer)");
                if !summary.streamed.is_empty() {
                    self.session.push_assistant(summary.answer());
                }
                self.refresh_parent().await;
            }
            RunOutcome::Failed => {
                // the server never saw this turn; keep history in step with it
                self.session.history.pop();
            }
        }
    }

    /// Point the next run at the newest message the service stored.
    async fn refresh_parent(&mut self) {
        let Some(id) = self.session.thread_id.clone() else {
            return;
        };
        match self.client.describe_thread(&id, 1, None).await {
            Some(desc) => {
                if let Some(latest) = desc.latest_message_id() {
                    self.session.set_parent_message_id(latest);
                }
            }
            None => warn!(thread_id = %id, "could not refresh parent message id"),
        }
    }

    fn last_error(&self) -> String {
        self.client
            .last_error()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}
