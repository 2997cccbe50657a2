//! Judge backed by model endpoints
//!
//! The agent loop is synchronous, so each call blocks on a private tokio
//! runtime. Calls are retried per `BrainConfig`; a reply without a usable
//! tool call decodes to "no decision".

use super::{prompts, tools, with_retries, ClusterProposal, Judge, SkillNaming, Verdict};
use crate::actions::Operation;
use crate::core::config::{AgentConfig, BrainConfig, ModelFormat};
use crate::core::error::Result;
use crate::core::types::{ClusterId, Screen};
use crate::llm::{LlmClient, ModelReply, ModelRequest, Usage};
use crate::memory::records::{Skill, SkillCluster};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Base,
    Evaluate,
}

pub struct LlmJudge {
    base: LlmClient,
    evaluator: LlmClient,
    runtime: Runtime,
    max_attempts: u32,
    backoff: Duration,
    /// System prompt for direct play, usually game knowledge
    pre_knowledge: Option<String>,
    usage: Usage,
}

impl LlmJudge {
    pub fn new(base: LlmClient, evaluator: LlmClient, brain: &BrainConfig) -> Result<Self> {
        Ok(Self {
            base,
            evaluator,
            runtime: Runtime::new()?,
            max_attempts: brain.max_attempts,
            backoff: Duration::from_millis(brain.retry_backoff_ms),
            pre_knowledge: None,
            usage: Usage::default(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let base = LlmClient::from_config(&config.brain.base_model)?;
        let evaluator = LlmClient::from_config(&config.brain.evaluate_model)?;
        let mut judge = Self::new(base, evaluator, &config.brain)?;
        judge.pre_knowledge = config.pre_knowledge.clone();
        Ok(judge)
    }

    fn call(&mut self, endpoint: Endpoint, request: ModelRequest<'_>) -> Result<ModelReply> {
        let client = match endpoint {
            Endpoint::Base => &self.base,
            Endpoint::Evaluate => &self.evaluator,
        };
        let runtime = &self.runtime;
        let reply = with_retries(self.max_attempts, self.backoff, || {
            runtime.block_on(client.complete(&request))
        })?;

        info!(
            model = client.model(),
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            "model call"
        );
        if reply.tool_call.is_none() {
            debug!(text = %reply.text, "reply carried no tool call");
        }
        self.usage.add(reply.usage);
        Ok(reply)
    }
}

impl Judge for LlmJudge {
    fn usage(&self) -> Usage {
        self.usage
    }

    fn select_cluster(
        &mut self,
        task: &str,
        clusters: &[SkillCluster],
        screen: &Screen,
    ) -> Result<Option<ClusterId>> {
        let prompt = prompts::select_cluster(task, clusters);
        let tools = tools::select_skill();
        let images = [screen];
        let request = ModelRequest::new(&prompt)
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;

        // an id outside the offered list is no decision
        Ok(tools::decode_selection(reply.tool_call.as_ref())
            .map(ClusterId)
            .filter(|id| clusters.iter().any(|c| c.id == *id)))
    }

    fn evaluate_skill(
        &mut self,
        task: &str,
        skill: &Skill,
        before: &Screen,
        after: &Screen,
    ) -> Result<Option<Verdict>> {
        let prompt = prompts::evaluate_skill(task, skill);
        let tools = tools::action_reflex(true);
        let images = [before, after];
        let request = ModelRequest::new(&prompt)
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Evaluate, request)?;
        Ok(tools::decode_verdict(reply.tool_call.as_ref()))
    }

    fn name_skill(
        &mut self,
        operations: &[Operation],
        before: &Screen,
        after: &Screen,
    ) -> Result<Option<SkillNaming>> {
        let prompt = prompts::name_skill(operations);
        let tools = tools::name_skill();
        let images = [before, after];
        let request = ModelRequest::new(&prompt)
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;
        Ok(tools::decode_naming(reply.tool_call.as_ref()))
    }

    fn cluster_skills(&mut self, skills: &[Skill]) -> Result<Option<Vec<ClusterProposal>>> {
        let prompt = prompts::cluster_skills(skills);
        let tools = tools::cluster_skills();
        let request = ModelRequest::new(&prompt).with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;
        Ok(tools::decode_clusters(
            reply.tool_call.as_ref(),
            tools::CLUSTER_SKILLS,
        ))
    }

    fn merge_skills(
        &mut self,
        clusters: &[SkillCluster],
        skills: &[Skill],
    ) -> Result<Option<Vec<ClusterProposal>>> {
        let prompt = prompts::merge_skills(clusters, skills);
        let tools = tools::merge_skills();
        let request = ModelRequest::new(&prompt).with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;
        Ok(tools::decode_clusters(
            reply.tool_call.as_ref(),
            tools::MERGE_SKILLS,
        ))
    }

    fn propose_operation(&mut self, task: &str, screen: &Screen) -> Result<Option<Operation>> {
        let action_text = self.base.format() == ModelFormat::ActionText;
        let prompt = if action_text {
            prompts::propose_action_text(task)
        } else {
            prompts::propose_operation(task)
        };
        let tools = if action_text {
            Vec::new()
        } else {
            tools::operations()
        };
        let system = self.pre_knowledge.clone();
        let images = [screen];
        let request = ModelRequest::new(&prompt)
            .with_system(system.as_deref())
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;
        Ok(tools::decode_operation(reply.tool_call.as_ref()))
    }

    fn evaluate_progress(
        &mut self,
        task: &str,
        before: &Screen,
        after: &Screen,
    ) -> Result<Option<bool>> {
        let prompt = prompts::evaluate_progress(task);
        let tools = tools::action_reflex(false);
        let images = [before, after];
        let request = ModelRequest::new(&prompt)
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Evaluate, request)?;
        Ok(tools::decode_progress(reply.tool_call.as_ref()))
    }

    fn guide_operation(
        &mut self,
        task: &str,
        candidates: &[Operation],
        screen: &Screen,
    ) -> Result<Option<usize>> {
        let prompt = prompts::guide_operation(task, candidates);
        let tools = tools::give_guidance();
        let images = [screen];
        let request = ModelRequest::new(&prompt)
            .with_images(&images)
            .with_tools(&tools);
        let reply = self.call(Endpoint::Base, request)?;
        Ok(tools::decode_guidance(reply.tool_call.as_ref()).filter(|i| *i < candidates.len()))
    }
}
