use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use elysium_contracts::story::{parse_console_input, ConsoleCommand};
use elysium_engine::{Scene, StoryEngine, StorySession};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use uuid::Uuid;

const RULE_WIDTH: usize = 50;
const WRAP_WIDTH: usize = 80;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub turns: usize,
    pub saved: Vec<PathBuf>,
}

/// Interactive loop: premise, then A/B choices until `quit` or end of input.
pub async fn run_console<R, W>(
    engine: Arc<StoryEngine>,
    input: R,
    output: &mut W,
    out_dir: &Path,
) -> Result<ConsoleSummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(output, "{rule}")?;
    writeln!(output, "      Welcome to Project Elysium: The AI Storyteller")?;
    writeln!(output, "{rule}")?;

    let premise = loop {
        write!(
            output,
            "Enter your character and setting (e.g., 'a knight in a haunted forest'):\n> "
        )?;
        output.flush()?;
        let Some(line) = next_line(&mut lines).await? else {
            return Ok(ConsoleSummary::default());
        };
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    let mut session = engine.session(Uuid::new_v4().to_string());
    let mut summary = ConsoleSummary::default();

    writeln!(output, "\n...AI is thinking...")?;
    let mut scene = session.begin(&premise).await;
    illustrate_and_save(&session, &scene, output, out_dir, &mut summary).await?;

    let reason = 'game: loop {
        writeln!(output, "\n{rule}\n")?;
        for line in wrap_text(&scene.text, WRAP_WIDTH) {
            writeln!(output, "{line}")?;
        }
        writeln!(output, "\n{rule}")?;

        let choice = loop {
            write!(output, "What do you do? (Type A or B, or 'quit' to exit)\n> ")?;
            output.flush()?;
            let Some(line) = next_line(&mut lines).await? else {
                break 'game "eof";
            };
            match parse_console_input(&line) {
                ConsoleCommand::Quit => break 'game "quit",
                ConsoleCommand::Choose(choice) => break choice,
                ConsoleCommand::Invalid(_) => {
                    writeln!(output, "\nInvalid choice. Please enter A or B.")?;
                }
            }
        };

        writeln!(output, "\n...AI is thinking...")?;
        scene = session.advance(choice).await;
        summary.turns += 1;
        illustrate_and_save(&session, &scene, output, out_dir, &mut summary).await?;
    };

    writeln!(output, "\nThanks for playing!")?;
    output.flush()?;
    session.finish(reason);
    Ok(summary)
}

async fn next_line<R>(lines: &mut Lines<R>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    lines.next_line().await.context("failed reading console input")
}

async fn illustrate_and_save<W: Write>(
    session: &StorySession,
    scene: &Scene,
    output: &mut W,
    out_dir: &Path,
    summary: &mut ConsoleSummary,
) -> Result<()> {
    writeln!(output, "...AI is creating a visual prompt...")?;
    output.flush()?;
    let Some(illustration) = session.illustrate(scene).await else {
        return Ok(());
    };
    let path = illustration.save_numbered(out_dir, summary.saved.len() + 1)?;
    writeln!(output, "Illustration saved to {}", path.display())?;
    summary.saved.push(path);
    Ok(())
}

/// Greedy word wrap that keeps the scene's own line breaks.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        out.push(current);
    }
    out
}
