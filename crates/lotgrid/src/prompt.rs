//! Line prompts on stderr, answers from stdin.

use std::io::{BufRead, Write};

use anyhow::{Context as _, Result};

/// Ask a question and return the trimmed answer. End of input reads as an
/// empty answer.
pub fn ask(question: &str) -> Result<String> {
    let stdin = std::io::stdin();
    ask_from(&mut stdin.lock(), question)
}

/// Ask a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    let answer = ask(&format!("{question} [y/N]"))?;
    Ok(is_yes(&answer))
}

fn ask_from(input: &mut impl BufRead, question: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{question} ").context("Failed to write prompt")?;
    stderr.flush().context("Failed to flush prompt")?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read answer")?;
    Ok(line.trim().to_string())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_ask_trims_and_handles_eof() -> Result<()> {
        let mut input = "  12 \n".as_bytes();
        assert_eq!(ask_from(&mut input, "Where?")?, "12");
        let mut empty = "".as_bytes();
        assert_eq!(ask_from(&mut empty, "Where?")?, "");
        Ok(())
    }
}
