//! Terminal front-end for a single group discussion.
//!
//! Every line typed on stdin is submitted as one contribution. `/finish`
//! (or end of input) closes the discussion and prints the feedback.

use anyhow::{Context, bail};
use clap::Parser;
use crossfire_api::{
    config::Config, prompts::prompts_for, state::AppState, telemetry::init_tracing,
};
use crossfire_core::{
    engine::{DiscussionEngine, SessionUpdate},
    random::{RandomSource, StdRandom},
    runtime::SessionRuntime,
};
use std::io::BufRead;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(version, about = "Practice a group interview in the terminal")]
struct Args {
    /// Case to discuss. Generated from --company when omitted.
    #[arg(long)]
    topic: Option<String>,

    /// Company used to generate a case when no --topic is given.
    #[arg(long)]
    company: Option<String>,

    /// Position the candidates are interviewing for.
    #[arg(long, default_value = "产品经理")]
    job_title: String,

    /// Seed for reproducible speaker selection and delays.
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides MAX_ROUNDS.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_rounds: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_level);

    if let Some(max_rounds) = args.max_rounds {
        config.engine.scheduler.max_rounds = max_rounds;
    }
    let prompts = prompts_for(&config)?;
    let state = AppState::from_config(config, prompts)?;

    let topic = match (args.topic, args.company) {
        (Some(topic), _) => topic,
        (None, Some(company)) => {
            state
                .case_service
                .generate_topic(&company, &args.job_title)
                .await?
        }
        (None, None) => bail!("either --topic or --company is required"),
    };

    let rng: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(StdRandom::seeded(seed)),
        None => Box::new(StdRandom::from_entropy()),
    };
    let engine = DiscussionEngine::new(
        topic.clone(),
        args.job_title.clone(),
        state.roster.as_ref().clone(),
        state.config.engine.clone(),
        rng,
    );

    println!("题目：{topic}");
    println!("岗位：{}", args.job_title);
    for member in state.roster.members() {
        println!("  {} ({})", member.name, member.archetype);
    }
    println!("输入发言后回车提交，输入 /finish 结束讨论。\n");

    let (handle, mut updates_rx, runtime) = SessionRuntime::spawn(engine, state.generator.clone());
    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.recv(), if stdin_open => match line {
                Some(line) => match line.trim() {
                    "" => {}
                    "/finish" | "/quit" => {
                        stdin_open = false;
                        handle.finish().await?;
                    }
                    text => {
                        handle.type_text(text).await?;
                        handle.submit().await?;
                    }
                },
                None => {
                    stdin_open = false;
                    handle.finish().await?;
                }
            },
            update = updates_rx.recv() => {
                let Some(update) = update else { break };
                if let SessionUpdate::Finished { transcript, interruptions, round_count } = &update {
                    println!("\n讨论结束：{round_count} 轮，打断 {interruptions} 次。");
                    let feedback = state
                        .feedback_service
                        .generate_feedback(&topic, &args.job_title, transcript, *interruptions)
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&feedback)?);
                    break;
                }
                print_update(&state, &update);
            },
        }
    }

    drop(handle);
    runtime.await?;
    Ok(())
}

/// Forwards stdin lines from a detached thread.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_update(state: &AppState, update: &SessionUpdate) {
    match update {
        SessionUpdate::TurnStarted { turn } => {
            let name = state
                .roster
                .get(&turn.speaker_id)
                .map_or(turn.speaker_id.as_str(), |p| p.name.as_str());
            println!("({name} 正在思考...)");
        }
        SessionUpdate::TurnEnded {
            speaker_id,
            succeeded: false,
            ..
        } => println!("({speaker_id} 没有发言)"),
        SessionUpdate::Contribution { contribution } => {
            println!("[{}] {}", contribution.display_name, contribution.text);
        }
        SessionUpdate::Interruption { event } if event.occurred => {
            println!("(你打断了当前发言)");
        }
        SessionUpdate::Rounds {
            round_count,
            max_rounds,
            ceiling_reached,
        } => {
            if *ceiling_reached {
                println!("(已达到 {max_rounds} 轮上限，其他组员不再主动发言)");
            } else {
                tracing::debug!(round_count, max_rounds, "Round completed");
            }
        }
        SessionUpdate::Rejected { reason } => println!("(提交被拒绝：{reason})"),
        _ => {}
    }
}
