//! Operation guidance: who decides which untried operation to attempt
//!
//! Returning `None` declines the attempt; exploration counts that as a miss.

use crate::actions::Operation;
use crate::agent::controls::PromptLines;
use crate::core::config::{AgentConfig, GuideKind};
use crate::core::error::Result;
use crate::core::types::Screen;
use crate::judge::{Judge, LlmJudge};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{BufRead, BufReader, Write};
use tracing::{debug, info};

pub trait OperationGuide {
    fn choose(&mut self, candidates: &[Operation], screen: &Screen) -> Result<Option<Operation>>;
}

/// Guide named by `[guidance] kind`
///
/// The model guide talks to the base model through its own judge. When the
/// run controls are listening on stdin, pass their `PromptLines` so the
/// human guide reads its answers through the listener.
pub fn guide_from_config(
    config: &AgentConfig,
    prompts: Option<PromptLines>,
) -> Result<Box<dyn OperationGuide>> {
    Ok(match config.guidance.kind {
        GuideKind::Human => match prompts {
            Some(prompts) => Box::new(HumanGuide::new(prompts, std::io::stdout())),
            None => Box::new(HumanGuide::stdio()),
        },
        GuideKind::Random => Box::new(RandomGuide::new(config.seed)),
        GuideKind::Model => Box::new(ModelGuide::new(
            LlmJudge::from_config(config)?,
            config.task.clone(),
        )),
    })
}

/// A person at the terminal picks by index
pub struct HumanGuide<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> HumanGuide<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl HumanGuide<BufReader<std::io::Stdin>, std::io::Stdout> {
    /// Reads stdin directly, taking its lock only while reading
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> OperationGuide for HumanGuide<R, W> {
    fn choose(&mut self, candidates: &[Operation], _screen: &Screen) -> Result<Option<Operation>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        writeln!(self.output, "Candidate operations:")?;
        for (i, op) in candidates.iter().enumerate() {
            writeln!(self.output, "  [{}] {}", i, op)?;
        }

        loop {
            write!(
                self.output,
                "Choose 0-{} (empty line to skip): ",
                candidates.len() - 1
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if line.is_empty() {
                return Ok(None);
            }
            match line.parse::<usize>() {
                Ok(i) if i < candidates.len() => {
                    info!(operation = %candidates[i], "operation chosen by user");
                    return Ok(Some(candidates[i].clone()));
                }
                _ => writeln!(self.output, "Invalid choice: {}", line)?,
            }
        }
    }
}

/// Uniform choice from a seeded generator
pub struct RandomGuide {
    rng: ChaCha8Rng,
}

impl RandomGuide {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng }
    }
}

impl OperationGuide for RandomGuide {
    fn choose(&mut self, candidates: &[Operation], _screen: &Screen) -> Result<Option<Operation>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let i = self.rng.gen_range(0..candidates.len());
        debug!(index = i, operation = %candidates[i], "random guidance");
        Ok(Some(candidates[i].clone()))
    }
}

/// A judge picks the operation it finds most promising
pub struct ModelGuide<J: Judge> {
    judge: J,
    task: String,
}

impl<J: Judge> ModelGuide<J> {
    pub fn new(judge: J, task: impl Into<String>) -> Self {
        Self {
            judge,
            task: task.into(),
        }
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }
}

impl<J: Judge> OperationGuide for ModelGuide<J> {
    fn choose(&mut self, candidates: &[Operation], screen: &Screen) -> Result<Option<Operation>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let choice = self.judge.guide_operation(&self.task, candidates, screen)?;
        Ok(choice
            .and_then(|i| candidates.get(i))
            .cloned())
    }
}

impl<G: OperationGuide + ?Sized> OperationGuide for Box<G> {
    fn choose(&mut self, candidates: &[Operation], screen: &Screen) -> Result<Option<Operation>> {
        (**self).choose(candidates, screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::controls::{prompt_channel, RunControls};
    use crate::core::types::ClusterId;
    use crate::judge::{ClusterProposal, SkillNaming, Verdict};
    use crate::memory::records::{Skill, SkillCluster};
    use image::Rgb;
    use std::io::Cursor;

    fn screen() -> Screen {
        Screen::from_pixel(4, 4, Rgb([0, 0, 0]))
    }

    fn candidates() -> Vec<Operation> {
        vec![Operation::click(1, 1), Operation::click(2, 2), Operation::click(3, 3)]
    }

    #[test]
    fn test_human_guide_reprompts_on_invalid_input() {
        let input = Cursor::new("abc\n7\n1\n");
        let mut output = Vec::new();
        let choice = HumanGuide::new(input, &mut output)
            .choose(&candidates(), &screen())
            .unwrap();
        assert_eq!(choice, Some(Operation::click(2, 2)));
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("[2] Click at (3, 3)"));
        assert_eq!(printed.matches("Invalid choice").count(), 2);
    }

    #[test]
    fn test_human_guide_empty_line_declines() {
        let mut guide = HumanGuide::new(Cursor::new("\n"), Vec::new());
        assert_eq!(guide.choose(&candidates(), &screen()).unwrap(), None);
        let mut guide = HumanGuide::new(Cursor::new(""), Vec::new());
        assert_eq!(guide.choose(&candidates(), &screen()).unwrap(), None);
    }

    #[test]
    fn test_human_guide_answers_through_listener() {
        let controls = RunControls::new();
        let (sender, prompts) = prompt_channel();
        let listener = {
            let controls = controls.clone();
            std::thread::spawn(move || {
                while !sender.is_waiting() {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                controls.listen(Cursor::new("1\n/\n"), Some(&sender));
            })
        };

        let mut guide = HumanGuide::new(prompts, Vec::new());
        let choice = guide.choose(&candidates(), &screen()).unwrap();
        listener.join().unwrap();
        assert_eq!(choice, Some(Operation::click(2, 2)));
        assert!(controls.should_exit());

        // the listener is gone, so the next prompt sees the end of input
        assert_eq!(guide.choose(&candidates(), &screen()).unwrap(), None);
    }

    #[test]
    fn test_random_guide_is_seeded() {
        let picks = |seed| {
            let mut guide = RandomGuide::new(Some(seed));
            (0..10)
                .map(|_| guide.choose(&candidates(), &screen()).unwrap().unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
        assert_eq!(
            RandomGuide::new(Some(1)).choose(&[], &screen()).unwrap(),
            None
        );
    }

    struct IndexJudge(Option<usize>);

    impl Judge for IndexJudge {
        fn select_cluster(
            &mut self,
            _task: &str,
            _clusters: &[SkillCluster],
            _screen: &Screen,
        ) -> Result<Option<ClusterId>> {
            Ok(None)
        }
        fn evaluate_skill(
            &mut self,
            _task: &str,
            _skill: &Skill,
            _before: &Screen,
            _after: &Screen,
        ) -> Result<Option<Verdict>> {
            Ok(None)
        }
        fn name_skill(
            &mut self,
            _operations: &[Operation],
            _before: &Screen,
            _after: &Screen,
        ) -> Result<Option<SkillNaming>> {
            Ok(None)
        }
        fn cluster_skills(&mut self, _skills: &[Skill]) -> Result<Option<Vec<ClusterProposal>>> {
            Ok(None)
        }
        fn merge_skills(
            &mut self,
            _clusters: &[SkillCluster],
            _skills: &[Skill],
        ) -> Result<Option<Vec<ClusterProposal>>> {
            Ok(None)
        }
        fn guide_operation(
            &mut self,
            _task: &str,
            _candidates: &[Operation],
            _screen: &Screen,
        ) -> Result<Option<usize>> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_model_guide_uses_index() {
        let mut guide = ModelGuide::new(IndexJudge(Some(2)), "win");
        assert_eq!(
            guide.choose(&candidates(), &screen()).unwrap(),
            Some(Operation::click(3, 3))
        );
        let mut guide = ModelGuide::new(IndexJudge(Some(9)), "win");
        assert_eq!(guide.choose(&candidates(), &screen()).unwrap(), None);
        let mut guide = ModelGuide::new(IndexJudge(None), "win");
        assert_eq!(guide.choose(&candidates(), &screen()).unwrap(), None);
    }
}
