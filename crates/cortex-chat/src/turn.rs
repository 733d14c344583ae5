//! Drive one streaming run to the terminal, watching for stalls.

use std::io::Write;
use std::time::Duration;

use cortex_agent::{AgentRunRequest, CortexAgentClient, RunSummary, StreamChunk};
use futures_util::StreamExt;
use tracing::warn;

use crate::render;

pub struct TurnOptions {
    /// Print every raw event to stderr.
    pub echo_events: bool,
    /// Silence before a warning. The run is abandoned after twice this.
    pub idle_warn: Duration,
}

pub enum TurnEnd {
    /// The stream ended on its own (final, error, or closed early).
    Finished(RunSummary),
    /// No chunk arrived for twice the idle window; the stream was dropped.
    Stalled(RunSummary),
}

pub async fn run_turn(
    client: &CortexAgentClient,
    request: AgentRunRequest,
    opts: &TurnOptions,
) -> TurnEnd {
    let stream = client.run_agent_stream(request, true);
    futures_util::pin_mut!(stream);
    let mut summary = RunSummary::default();
    let mut stdout = std::io::stdout();
    let mut warned = false;

    loop {
        let next = match tokio::time::timeout(opts.idle_warn, stream.next()).await {
            Ok(next) => next,
            Err(_) if !warned => {
                warned = true;
                warn!(idle_secs = opts.idle_warn.as_secs(), "no response from agent yet");
                eprintln!("\n(still waiting for the agent...)");
                continue;
            }
            Err(_) => {
                warn!("agent stream stalled, abandoning run");
                return TurnEnd::Stalled(summary);
            }
        };
        let Some(chunk) = next else { break };
        warned = false;
        summary.observe(&chunk);

        match &chunk {
            StreamChunk::Event { event } => {
                if opts.echo_events {
                    eprintln!("{}", event.clone().into_value());
                } else {
                    for note in render::event_notes(event) {
                        eprintln!("  {note}");
                    }
                }
            }
            StreamChunk::Content { content } => {
                print!("{content}");
                let _ = stdout.flush();
            }
            StreamChunk::Final { content } => {
                // the final text repeats the deltas; only print it when nothing streamed
                if summary.streamed.is_empty() {
                    print!("{content}");
                }
                println!();
            }
            StreamChunk::Error { error } => {
                eprintln!("\nerror: {error}");
            }
        }
    }
    TurnEnd::Finished(summary)
}
