//! `ve` - take a virtue lesson from the terminal.
//!
//! # Architecture
//!
//! The CLI wires concrete collaborators into [`ve_engine::LessonSession`] and
//! drives it from a line prompt:
//!
//! ```text
//! main() -> VeConfig::load() -> Catalog -> open_session() -> run_prompt()
//!                                              |
//!                                              v
//!                          SqliteStore ledger + FileKeyValueStore lock cache
//! ```
//!
//! While a lesson is locked the prompt also receives countdown ticks, so the
//! lesson reopens on its own once the cooldown has passed.

mod command;
mod render;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::{
    fs::{self, OpenOptions},
    io::{Write, stdout},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ve_engine::{
    Catalog, Collaborators, Event, LessonSession, SessionSettings, SystemClock, VeConfig,
};
use ve_ledger::{Ledger, SqliteStore};
use ve_local::{FileKeyValueStore, HashedDeviceId, IdentityProvider, LocalLockStore};
use ve_types::{Lesson, LessonError, LessonId, Page};

use command::{Command, HELP};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, prefer no logs over interleaving them with the prompt.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.ve/logs/ve.log
    if let Some(config_path) = VeConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("ve.log"));
    }

    // Fallback: ./.ve/logs/ve.log
    candidates.push(PathBuf::from(".ve").join("logs").join("ve.log"));

    candidates
}

fn load_config() -> VeConfig {
    match VeConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            let path = err.path().display().to_string();
            match &err {
                ve_engine::ConfigError::Parse { source, .. } => {
                    eprintln!("Couldn't parse {path} ({source}). Using defaults.");
                }
                ve_engine::ConfigError::Read { source, .. } => {
                    eprintln!("Couldn't read {path} ({source}). Using defaults.");
                }
            }
            VeConfig::default()
        }
    }
}

fn select_lesson(config: &VeConfig) -> Result<Arc<Lesson>> {
    let catalog = match config.catalog_path() {
        Some(path) => Catalog::load_json(&path)?,
        None => Catalog::builtin()?,
    };
    let Some(raw) = config.lesson_id() else {
        return Ok(catalog.first());
    };
    let id = LessonId::new(raw).with_context(|| format!("Invalid lesson id {raw:?}"))?;
    catalog
        .get(&id)
        .with_context(|| format!("Lesson {id} is not in the catalog"))
}

async fn open_session(config: &VeConfig, lesson: Arc<Lesson>) -> Result<LessonSession> {
    let device = HashedDeviceId::new(config.platform_id_source())
        .stable_device_id()
        .context("Failed to determine device identity")?;

    let store = SqliteStore::open(config.ledger_path())?;
    let kv = FileKeyValueStore::open(config.local_store_path())
        .context("Failed to open local lock cache")?;

    let deps = Collaborators::with_sampled_clock(
        Ledger::new(Arc::new(store)),
        LocalLockStore::new(Arc::new(kv)),
        Arc::new(SystemClock),
        device,
    )
    .await;
    let settings = SessionSettings {
        cooldown: config.cooldown(),
        auth_uid: config.auth_uid(),
        ..SessionSettings::default()
    };

    LessonSession::open(lesson, deps, settings)
        .await
        .context("Failed to open lesson session")
}

enum Input {
    Line(Option<String>),
    Tick(DateTime<Utc>),
}

fn prompt() -> Result<()> {
    let mut out = stdout();
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

fn report(session: &mut LessonSession, result: Result<(), LessonError>) {
    if let Err(e) = result {
        eprintln!("{e}");
    }
    for notice in session.take_notices() {
        eprintln!("{}", render::notice(&notice));
    }
}

/// Handle one command. Returns `false` when the user asked to quit.
async fn handle(session: &mut LessonSession, command: Command, feed_limit: usize) -> bool {
    let result = match command {
        Command::Quit => return false,
        Command::Help => {
            println!("{HELP}");
            return true;
        }
        Command::Feed => {
            match session
                .collaborators()
                .ledger
                .recent_reflections(feed_limit)
                .await
            {
                Ok(entries) => println!("{}", render::feed(&entries)),
                Err(e) => eprintln!("Couldn't load reflections: {e}"),
            }
            return true;
        }
        Command::Status => {
            let deps = session.collaborators();
            match deps.ledger.account(&deps.device).await {
                Ok(account) => println!("{}", render::status(account.as_ref(), session.state())),
                Err(e) => eprintln!("Couldn't load account: {e}"),
            }
            return true;
        }
        Command::Next => session.advance().await,
        Command::Back => session.retreat().await,
        Command::Pick(number) => {
            let quiz = session
                .state()
                .current_page()
                .and_then(Page::as_quiz)
                .map(|quiz| quiz.id.clone());
            match quiz {
                Some(quiz) => session.select_option(quiz, number - 1).await,
                None => {
                    eprintln!("This page has no quiz.");
                    return true;
                }
            }
        }
        Command::Submit => session.submit_quiz().await,
        Command::Reflect(text) => session.submit_reflection(text).await,
        Command::Retry => session.retry_sync().await,
    };

    report(session, result);
    println!("{}", render::page(session.state()));
    true
}

async fn run_prompt(session: &mut LessonSession, feed_limit: usize) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render::page(session.state()));
    prompt()?;

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line.context("Failed to read input")?),
            Some(now) = session.next_tick() => Input::Tick(now),
        };

        match input {
            Input::Tick(now) => {
                let was_locked = session.state().is_locked();
                let result = session.dispatch(Event::Tick { now }).await;
                report(session, result);
                if was_locked && !session.state().is_locked() {
                    println!("\nLesson unlocked.\n{}", render::page(session.state()));
                    prompt()?;
                }
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                match Command::parse(&line) {
                    Ok(command) => {
                        if !handle(session, command, feed_limit).await {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                }
                prompt()?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config();
    let lesson = select_lesson(&config)?;
    let mut session = open_session(&config, lesson).await?;

    let result = run_prompt(&mut session, config.feed_limit()).await;
    tracing::info!("Session closed");
    result
}
