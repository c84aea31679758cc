use std::io::{self, BufRead, Write};

use persona_core::model::{AssessmentId, UserId};
use services::{AppServices, AssessmentSession, ResultView, SessionError, SessionLoopService};
use tracing::warn;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    ResumeOrFresh,
    ResumeOnly,
    Fresh,
}

enum Input {
    Choice(usize),
    Quit,
    Invalid,
}

fn read_input(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_owned()))
}

fn parse_choice(raw: &str, options: usize) -> Input {
    if raw.eq_ignore_ascii_case("q") {
        return Input::Quit;
    }
    match raw.parse::<usize>() {
        Ok(n) if (1..=options).contains(&n) => Input::Choice(n - 1),
        _ => Input::Invalid,
    }
}

pub fn list(app: &AppServices) {
    let catalog = app.catalog();
    if catalog.is_empty() {
        println!("No assessments available.");
        return;
    }
    for definition in catalog.list() {
        println!(
            "{:<20} {} ({} questions)",
            definition.id(),
            definition.name(),
            definition.total_questions()
        );
    }
}

pub async fn take(
    app: &AppServices,
    identity: Option<UserId>,
    assessment_id: &AssessmentId,
    mode: StartMode,
) -> CliResult {
    let session_loop = app.session_loop();
    let mut session = session_loop.open(identity, assessment_id).await?;

    if mode == StartMode::Fresh && !session_loop.restart(&mut session).await {
        eprintln!("warning: previous progress could not be cleared; it will be overwritten");
    }

    let start = session_loop.start(&mut session).await?;
    if mode == StartMode::ResumeOnly && !start.resumed {
        println!("No saved progress for {assessment_id}.");
        session_loop.abandon(session);
        return Ok(());
    }

    println!("{}", session.definition().name());
    if start.resumed {
        println!(
            "Resuming at question {} ({:.0}% complete)",
            start.current_question_label, start.progress_percentage
        );
    }

    if !answer_questions(&session_loop, &mut session).await? {
        println!("Progress saved. Run `resume {assessment_id}` to continue.");
        session_loop.abandon(session);
        return Ok(());
    }

    loop {
        match session_loop.finalize(&mut session).await {
            Ok(outcome) => {
                print_result(&ResultView::from_result(Some(outcome.result_id), &outcome.result));
                return Ok(());
            }
            Err(SessionError::ResultNotPersisted) => {
                let retry = read_input("Could not save your result. Retry? [y/N] ")?;
                if !matches!(retry.as_deref(), Some("y" | "Y")) {
                    println!("Your answers are kept; run `resume {assessment_id}` to finish later.");
                    session_loop.abandon(session);
                    return Ok(());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Returns `false` if the user quit before the last question.
async fn answer_questions(
    session_loop: &SessionLoopService,
    session: &mut AssessmentSession,
) -> Result<bool, Box<dyn std::error::Error>> {
    let total = session.definition().total_questions();
    while let Some(question) = session.current_question().cloned() {
        println!();
        println!(
            "Question {}/{}: {}",
            session.current_question_label(),
            total,
            question.prompt()
        );
        for (i, answer) in question.answers().iter().enumerate() {
            println!("  {}. {}", i + 1, answer.text());
        }

        let Some(raw) = read_input("Answer (number, q to quit): ")? else {
            return Ok(false);
        };
        let index = match parse_choice(&raw, question.answers().len()) {
            Input::Choice(index) => index,
            Input::Quit => return Ok(false),
            Input::Invalid => {
                println!("Please enter a number between 1 and {}.", question.answers().len());
                continue;
            }
        };

        let answer_id = question.answers()[index].id().clone();
        let outcome = session_loop
            .submit_answer(session, question.id().clone(), answer_id)
            .await?;
        if !outcome.persisted {
            warn!("progress for this answer was not saved");
            eprintln!("warning: progress could not be saved; continuing in memory");
        }
        println!("{:.0}% complete", outcome.progress_percentage);
    }
    Ok(session.is_ready_to_finalize())
}

fn print_result(view: &ResultView) {
    println!();
    println!("{}: {}%", view.assessment_name, view.percentage_score);
    println!("You are {}: {}", view.primary.label, view.primary.description);
    if let Some(secondary) = view.secondary {
        println!("Runner-up: {}", secondary.label);
    }
    for category in &view.categories {
        println!("  {:<18} {:>3}  (raw {:+})", category.category, category.normalized, category.raw);
    }
    if let Some(seconds) = view.completion_time_seconds {
        println!("Completed in {}m {:02}s", seconds / 60, seconds % 60);
    }
}

pub async fn history(app: &AppServices, identity: Option<UserId>, limit: u32) {
    let rows = app.archive().history(identity, limit).await;
    if rows.is_empty() {
        println!("No completed assessments.");
        return;
    }
    for row in &rows {
        let view = ResultView::from_row(row);
        println!(
            "#{:<5} {}  {:<24} {:>3}%  {}",
            row.id,
            view.completed_at.format("%Y-%m-%d %H:%M"),
            view.assessment_name,
            view.percentage_score,
            view.primary.label
        );
    }
}

pub async fn stats(app: &AppServices, identity: Option<UserId>) {
    let Some(stats) = app.archive().statistics(identity).await else {
        println!("No statistics yet.");
        return;
    };
    println!("Completed:     {}", stats.total_completed);
    println!("Average score: {:.1}%", stats.average_score);
    println!("Unique tests:  {}", stats.unique_tests_taken);
    if let Some(last) = stats.last_test_date {
        println!("Last test:     {}", last.format("%Y-%m-%d %H:%M"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_are_one_based() {
        assert!(matches!(parse_choice("1", 3), Input::Choice(0)));
        assert!(matches!(parse_choice("3", 3), Input::Choice(2)));
        assert!(matches!(parse_choice("0", 3), Input::Invalid));
        assert!(matches!(parse_choice("4", 3), Input::Invalid));
        assert!(matches!(parse_choice("Q", 3), Input::Quit));
        assert!(matches!(parse_choice("yes", 3), Input::Invalid));
    }
}
