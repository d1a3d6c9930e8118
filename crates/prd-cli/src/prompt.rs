//! Terminal prompter: operator decisions read from stdin.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

use prd_core::{ObjectKey, PullStrategy, Result};
use prd_sync::{Prompter, StrategyChoice, UnroutedObject};

pub struct StdinPrompter {
    input: Mutex<BufReader<Stdin>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    /// Print a question on stderr and read one trimmed answer line. `None` on EOF.
    async fn ask(&self, question: &str) -> Result<Option<String>> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(question.as_bytes()).await?;
        stderr.write_all(b" ").await?;
        stderr.flush().await?;

        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn say(&self, text: &str) -> Result<()> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(text.as_bytes()).await?;
        stderr.write_all(b"\n").await?;
        Ok(())
    }
}

/// `m`, `merge!`, `o!` ... A trailing `!` applies the answer to every later
/// conflict of the same type.
pub fn parse_strategy_answer(answer: &str) -> Option<StrategyChoice> {
    let (word, apply_to_all) = match answer.strip_suffix('!') {
        Some(word) => (word, true),
        None => (answer, false),
    };
    let strategy: PullStrategy = word.parse().ok()?;
    if strategy == PullStrategy::Ask {
        return None;
    }
    Some(StrategyChoice {
        strategy,
        apply_to_all,
    })
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn choose_pull_strategy(&self, key: ObjectKey, path: &Path) -> Result<StrategyChoice> {
        let question = format!(
            "{} changed remotely and locally ({}).\n[s]kip, [o]verwrite, [m]erge? Add ! to reuse for every {}:",
            key,
            path.display(),
            key.object_type
        );
        loop {
            let Some(answer) = self.ask(&question).await? else {
                return Ok(StrategyChoice::once(PullStrategy::Skip));
            };
            if let Some(choice) = parse_strategy_answer(&answer) {
                return Ok(choice);
            }
            self.say("Please answer s, o or m.").await?;
        }
    }

    async fn choose_subdirectories(
        &self,
        objects: &[UnroutedObject],
        subdirs: &[String],
    ) -> Result<BTreeMap<ObjectKey, String>> {
        let mut assigned = BTreeMap::new();
        let options = subdirs.join(", ");
        for object in objects {
            let question = format!(
                "No subdirectory for {} \"{}\". Choose one of [{}] or leave empty to skip:",
                object.key, object.name, options
            );
            loop {
                let Some(answer) = self.ask(&question).await? else {
                    return Ok(assigned);
                };
                if answer.is_empty() {
                    break;
                }
                if subdirs.iter().any(|s| *s == answer) {
                    assigned.insert(object.key, answer);
                    break;
                }
                self.say(&format!("Unknown subdirectory: {}", answer)).await?;
            }
        }
        Ok(assigned)
    }

    async fn confirm_cascade_delete(&self, path: &Path, children: &[PathBuf]) -> Result<bool> {
        self.say(&format!("Deleting {} also deletes remotely:", path.display()))
            .await?;
        for child in children {
            self.say(&format!("  {}", child.display())).await?;
        }
        let answer = self.ask("Proceed? [y/N]").await?;
        Ok(matches!(answer.as_deref(), Some("y" | "Y" | "yes")))
    }

    async fn await_conflict_resolution(&self, unresolved: &[PathBuf]) -> Result<bool> {
        self.say("Merge conflicts in:").await?;
        for path in unresolved {
            self.say(&format!("  {}", path.display())).await?;
        }
        let answer = self
            .ask("Resolve them, then press Enter (or type skip to leave them):")
            .await?;
        Ok(matches!(answer.as_deref(), Some(a) if a != "skip"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_answer() {
        assert_eq!(
            parse_strategy_answer("m"),
            Some(StrategyChoice::once(PullStrategy::Merge))
        );
        assert_eq!(
            parse_strategy_answer("overwrite!"),
            Some(StrategyChoice {
                strategy: PullStrategy::Overwrite,
                apply_to_all: true
            })
        );
        assert_eq!(parse_strategy_answer("ask"), None);
        assert_eq!(parse_strategy_answer("maybe"), None);
    }
}
