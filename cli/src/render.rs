//! Plain-text views of the session for the line prompt.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use ve_engine::LessonState;
use ve_types::{Notice, OptionFeedback, Page, ReflectionEntry, UserAccount};

pub fn page(state: &LessonState) -> String {
    let mut out = String::new();
    let lesson = state.lesson();

    if state.is_locked() {
        let remaining = state
            .countdown()
            .map_or_else(|| "0m 0s".to_owned(), |countdown| countdown.to_string());
        let _ = write!(
            out,
            "{} is locked. Next lesson in {remaining}.",
            lesson.title()
        );
        return out;
    }

    let _ = writeln!(
        out,
        "{} ({}/{})",
        lesson.title(),
        state.page_index() + 1,
        lesson.page_count()
    );

    match state.current_page() {
        Some(Page::Content { title, body, .. }) => {
            let _ = writeln!(out, "\n{title}\n\n{body}");
        }
        Some(Page::Quiz(quiz)) => {
            let _ = writeln!(out, "\n{}", quiz.question);
            let feedback = state.feedback(&quiz.id);
            for (index, option) in quiz.options.iter().enumerate() {
                let marker = match feedback {
                    Some(OptionFeedback::Correct { option: picked }) if picked == index => "[+]",
                    Some(OptionFeedback::Incorrect { option: picked }) if picked == index => "[x]",
                    _ => "[ ]",
                };
                let _ = writeln!(out, "  {marker} {}. {option}", index + 1);
            }
        }
        Some(Page::Reflection { prompt }) => {
            let _ = writeln!(out, "\n{prompt}");
            if !state.quiz_submitted() {
                let _ = writeln!(out, "\nComplete the quiz first to unlock reflection.");
            }
        }
        None => {}
    }

    if let Some(outcome) = state.outcome() {
        let _ = writeln!(out, "\nQuiz score: {}/{}", outcome.score, outcome.total);
    }
    if state.is_completed() {
        let _ = writeln!(out, "Lesson complete.");
    }
    out.trim_end().to_owned()
}

pub fn notice(notice: &Notice) -> String {
    if notice.sync_retry {
        format!("{}: {} (type `retry`)", notice.title, notice.message)
    } else if notice.retryable {
        format!("{}: {} (try again)", notice.title, notice.message)
    } else {
        format!("{}: {}", notice.title, notice.message)
    }
}

pub fn status(account: Option<&UserAccount>, state: &LessonState) -> String {
    let points = account.map_or(0, |account| account.points);
    let mut out = format!("Points: {points}");
    if let Some(date) = account.and_then(|account| account.last_lesson_date) {
        let _ = write!(out, "\nLast lesson: {}", timestamp(date));
    }
    match state.countdown() {
        Some(countdown) => {
            let _ = write!(out, "\nLocked. Next lesson in {countdown}.");
        }
        None => out.push_str("\nUnlocked."),
    }
    out
}

pub fn feed(entries: &[ReflectionEntry]) -> String {
    if entries.is_empty() {
        return "No reflections yet.".to_owned();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            timestamp(entry.timestamp),
            entry.lesson_id,
            entry.content
        );
    }
    out.trim_end().to_owned()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
