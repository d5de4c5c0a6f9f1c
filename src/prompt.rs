//! Input prompts for the interactive menu.
//!
//! [`TermPrompter`] drives a real terminal through dialoguer. [`LinePrompter`]
//! reads plain lines, for piped input and scripted sessions. Every method
//! returns `Ok(None)` once input has ended.

use std::io::{self, BufRead, Write};

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};

const OUT_OF_RANGE: &str = "Value must be between 0 and 100";

pub trait Prompter {
    fn text(&mut self, prompt: &str, allow_empty: bool) -> anyhow::Result<Option<String>>;

    fn int(&mut self, prompt: &str) -> anyhow::Result<Option<i32>>;

    /// A number in 0-100.
    fn percent(&mut self, prompt: &str) -> anyhow::Result<Option<f64>>;

    /// Like [`Prompter::percent`], but blank or unparsable input keeps `current`.
    fn percent_or_keep(&mut self, prompt: &str, current: f64) -> anyhow::Result<Option<f64>>;

    /// Index into `items`.
    fn select(&mut self, prompt: &str, items: &[&str]) -> anyhow::Result<Option<usize>>;
}

fn in_percent_range(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

fn keep_notice(current: f64) -> String {
    format!("Invalid input, keeping previous value {current:.2}")
}

pub struct TermPrompter {
    theme: ColorfulTheme,
}

impl TermPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TermPrompter {
    fn default() -> Self {
        Self::new()
    }
}

/// Ctrl-D and Ctrl-C end the session instead of failing it.
fn interrupted<T>(result: dialoguer::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(dialoguer::Error::IO(err))
            if matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

impl Prompter for TermPrompter {
    fn text(&mut self, prompt: &str, allow_empty: bool) -> anyhow::Result<Option<String>> {
        interrupted(
            Input::<String>::with_theme(&self.theme)
                .with_prompt(prompt)
                .allow_empty(allow_empty)
                .interact_text(),
        )
    }

    fn int(&mut self, prompt: &str) -> anyhow::Result<Option<i32>> {
        interrupted(
            Input::<i32>::with_theme(&self.theme)
                .with_prompt(prompt)
                .interact_text(),
        )
    }

    fn percent(&mut self, prompt: &str) -> anyhow::Result<Option<f64>> {
        interrupted(
            Input::<f64>::with_theme(&self.theme)
                .with_prompt(prompt)
                .validate_with(|value: &f64| {
                    if in_percent_range(*value) {
                        Ok(())
                    } else {
                        Err(OUT_OF_RANGE)
                    }
                })
                .interact_text(),
        )
    }

    fn percent_or_keep(&mut self, prompt: &str, current: f64) -> anyhow::Result<Option<f64>> {
        let Some(input) = interrupted(
            Input::<String>::with_theme(&self.theme)
                .with_prompt(prompt)
                .allow_empty(true)
                .validate_with(|input: &String| match input.trim().parse::<f64>() {
                    Ok(value) if !in_percent_range(value) => Err(OUT_OF_RANGE),
                    _ => Ok(()),
                })
                .interact_text(),
        )?
        else {
            return Ok(None);
        };
        let input = input.trim();
        if input.is_empty() {
            return Ok(Some(current));
        }
        match input.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                println!("{}", keep_notice(current));
                Ok(Some(current))
            }
        }
    }

    fn select(&mut self, prompt: &str, items: &[&str]) -> anyhow::Result<Option<usize>> {
        // Esc or q in the list ends the session like end of input.
        Ok(interrupted(
            Select::with_theme(&self.theme)
                .with_prompt(prompt)
                .items(items)
                .default(0)
                .interact_opt(),
        )?
        .flatten())
    }
}

/// Line-oriented prompts over any reader/writer pair.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        write!(self.output, "{prompt}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn text(&mut self, prompt: &str, allow_empty: bool) -> anyhow::Result<Option<String>> {
        loop {
            let Some(line) = self.ask(prompt)? else {
                return Ok(None);
            };
            if allow_empty || !line.trim().is_empty() {
                return Ok(Some(line));
            }
            writeln!(self.output, "Input cannot be empty, try again.")?;
        }
    }

    fn int(&mut self, prompt: &str) -> anyhow::Result<Option<i32>> {
        loop {
            let Some(line) = self.ask(prompt)? else {
                return Ok(None);
            };
            match line.trim().parse() {
                Ok(value) => return Ok(Some(value)),
                Err(_) => writeln!(self.output, "Invalid integer, try again.")?,
            }
        }
    }

    fn percent(&mut self, prompt: &str) -> anyhow::Result<Option<f64>> {
        loop {
            let Some(line) = self.ask(prompt)? else {
                return Ok(None);
            };
            match line.trim().parse::<f64>() {
                Ok(value) if in_percent_range(value) => return Ok(Some(value)),
                Ok(_) => writeln!(self.output, "{OUT_OF_RANGE}, try again.")?,
                Err(_) => writeln!(self.output, "Invalid number, try again.")?,
            }
        }
    }

    fn percent_or_keep(&mut self, prompt: &str, current: f64) -> anyhow::Result<Option<f64>> {
        loop {
            let Some(line) = self.ask(prompt)? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                return Ok(Some(current));
            }
            match line.parse::<f64>() {
                Ok(value) if in_percent_range(value) => return Ok(Some(value)),
                Ok(_) => writeln!(self.output, "{OUT_OF_RANGE}, try again.")?,
                Err(_) => {
                    writeln!(self.output, "{}", keep_notice(current))?;
                    return Ok(Some(current));
                }
            }
        }
    }

    fn select(&mut self, prompt: &str, items: &[&str]) -> anyhow::Result<Option<usize>> {
        for (number, item) in items.iter().enumerate() {
            writeln!(self.output, "{}. {item}", number + 1)?;
        }
        loop {
            let Some(line) = self.ask(prompt)? else {
                return Ok(None);
            };
            match line.trim().parse::<usize>() {
                Ok(number) if (1..=items.len()).contains(&number) => {
                    return Ok(Some(number - 1))
                }
                _ => writeln!(self.output, "Invalid choice, try again.")?,
            }
        }
    }
}
