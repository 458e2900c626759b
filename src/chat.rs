//! Interactive question loop (`lore chat`).
//!
//! Reads one question per line, prints `Result: <answer>` followed by the
//! source chunks that grounded it, and repeats until the user types `exit`
//! (any case) or input ends. A failed question prints the error and the loop
//! carries on.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::models::Answer;
use crate::qa::QaEngine;

const PROMPT: &str = "Ask a question (or type 'exit' to quit): ";

/// Run the loop over arbitrary input and output streams.
pub async fn run_chat<R: BufRead, W: Write>(
    engine: &QaEngine,
    mut input: R,
    mut out: W,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match engine.answer(question, true).await {
            Ok(answer) => write_answer(&mut out, &answer)?,
            Err(e) => writeln!(out, "Error: {}\n", e)?,
        }
    }
    Ok(())
}

/// Print an answer and its sources in the interactive format.
pub fn write_answer<W: Write>(out: &mut W, answer: &Answer) -> std::io::Result<()> {
    writeln!(out, "Result: {}", answer.text)?;
    if let Some(sources) = &answer.sources {
        writeln!(out, "Source Documents:")?;
        for (i, s) in sources.iter().enumerate() {
            writeln!(
                out,
                "  {}. {} (page {}, score {:.3})",
                i + 1,
                s.source_path,
                s.page_number,
                s.score
            )?;
            writeln!(out, "     {}", preview(&s.text, 160))?;
        }
    }
    writeln!(out)
}

/// First `max_chars` characters of `text` on one line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    #[test]
    fn test_write_answer_format() {
        let answer = Answer {
            text: "The code is 2591.".into(),
            sources: Some(vec![Source {
                chunk_id: "guide.pdf#p12#c0".into(),
                source_path: "guide.pdf".into(),
                page_number: 12,
                score: 0.8,
                text: "The safe code\n in the pharmacy is 2591.".into(),
            }]),
        };
        let mut out = Vec::new();
        write_answer(&mut out, &answer).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Result: The code is 2591.\nSource Documents:\n"));
        assert!(out.contains("1. guide.pdf (page 12, score 0.800)"));
        assert!(out.contains("The safe code in the pharmacy is 2591."));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("ab  cd", 10), "ab cd");
        assert_eq!(preview("ééééé", 3), "ééé…");
    }
}
