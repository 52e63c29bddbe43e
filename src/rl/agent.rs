//! Epsilon-greedy Q-learning agent with experience replay and a
//! periodically synchronized target network.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::policy::{QNetwork, QNetworkConfig};
use super::replay::{ReplayBuffer, Transition};

#[derive(Debug, Clone)]
pub struct DqnConfig {
    pub network: QNetworkConfig,
    pub learning_rate: f64,
    /// Discount factor applied to bootstrapped next-state values.
    pub discount: f32,
    pub epsilon_start: f64,
    /// Exploration floor; epsilon never decays below this.
    pub epsilon_end: f64,
    /// Multiplicative decay applied after each successful training step.
    pub epsilon_decay: f64,
    pub replay_capacity: usize,
    pub batch_size: usize,
    /// Hard-copy the online parameters into the target network every this
    /// many episodes.
    pub target_sync_episodes: u64,
    /// Number of recent episode rewards kept for reporting.
    pub reward_history: usize,
    /// Fixed RNG seed for reproducible exploration; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            network: QNetworkConfig::new(32, 4),
            learning_rate: 0.1,
            discount: 0.95,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            replay_capacity: 10_000,
            batch_size: 32,
            target_sync_episodes: 10,
            reward_history: 100,
            seed: None,
        }
    }
}

/// Sidecar persisted next to the model weights so a restored agent resumes
/// with its earned exploration rate instead of restarting at the ceiling.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainMeta {
    pub episodes: u64,
    pub epsilon: f64,
}

/// One learned policy per actor: online network trained from replayed
/// experience, target network bootstrapping the training targets.
///
/// Nothing in here is allowed to take down the host tick loop; training and
/// persistence failures are logged and abandoned.
pub struct DqnAgent<B: AutodiffBackend> {
    online: QNetwork<B>,
    target: QNetwork<B>,
    replay: ReplayBuffer,
    config: DqnConfig,
    device: B::Device,
    epsilon: f64,
    episodes: u64,
    episode_rewards: VecDeque<f32>,
    model_id: String,
    rng: SmallRng,
}

impl<B: AutodiffBackend> DqnAgent<B> {
    pub fn new(device: B::Device, model_id: impl Into<String>, config: DqnConfig) -> Self {
        let online = QNetwork::new(&device, &config.network);
        let target = online.clone();
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        Self {
            online,
            target,
            replay: ReplayBuffer::new(config.replay_capacity),
            epsilon: config.epsilon_start,
            episodes: 0,
            episode_rewards: VecDeque::with_capacity(config.reward_history),
            model_id: model_id.into(),
            device,
            config,
            rng,
        }
    }

    /// Pick an action for the observation. While `exploring`, a uniformly
    /// random action is taken with probability epsilon; otherwise the online
    /// network's argmax, ties resolved to the lowest index.
    pub fn act(&mut self, observation: &[f32], exploring: bool) -> usize {
        let action_count = self.config.network.action_count;
        if exploring && self.rng.random::<f64>() < self.epsilon {
            return self.rng.random_range(0..action_count);
        }

        let input = Tensor::<B, 1>::from_floats(observation, &self.device)
            .reshape([1, observation.len()]);
        let q_values: Vec<f32> = match self.online.forward(input).into_data().to_vec() {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(?err, "Q-value readback failed, taking first action");
                return 0;
            }
        };
        argmax(&q_values)
    }

    /// Store a transition, evicting the oldest when at capacity.
    pub fn remember(
        &mut self,
        state: Vec<f32>,
        action: usize,
        reward: f32,
        next_state: Vec<f32>,
        terminal: bool,
    ) {
        self.replay.push(Transition {
            state,
            action,
            reward,
            next_state,
            terminal,
        });
    }

    /// One training step over a sampled batch. Failures are contained here:
    /// they are logged and leave the policy, the replay buffer and the
    /// exploration rate untouched.
    pub fn replay(&mut self) {
        match self.train_step() {
            Ok(Some(loss)) => {
                tracing::trace!(loss = loss as f64, epsilon = self.epsilon, "training step complete");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "training step failed, keeping previous policy");
            }
        }
    }

    fn train_step(&mut self) -> Result<Option<f32>> {
        if self.replay.len() < self.config.batch_size {
            return Ok(None);
        }

        let batch = self.replay.sample(self.config.batch_size, &mut self.rng);
        let batch_size = batch.len();
        let obs_size = self.config.network.obs_size;

        let mut states = Vec::with_capacity(batch_size * obs_size);
        let mut next_states = Vec::with_capacity(batch_size * obs_size);
        let mut actions: Vec<i64> = Vec::with_capacity(batch_size);
        for transition in &batch {
            states.extend_from_slice(&transition.state);
            next_states.extend_from_slice(&transition.next_state);
            actions.push(transition.action as i64);
        }

        let states = Tensor::<B, 1>::from_floats(states.as_slice(), &self.device)
            .reshape([batch_size, obs_size]);
        let next_states = Tensor::<B, 1>::from_floats(next_states.as_slice(), &self.device)
            .reshape([batch_size, obs_size]);

        // Bootstrap from the target network, not the online one.
        let next_max: Vec<f32> = self
            .target
            .forward(next_states)
            .max_dim(1)
            .into_data()
            .to_vec()
            .map_err(|err| anyhow!("next-state Q readback failed: {err:?}"))?;

        let mut targets = Vec::with_capacity(batch_size);
        for (transition, max_next) in batch.iter().zip(&next_max) {
            let target = if transition.terminal {
                transition.reward
            } else {
                transition.reward + self.config.discount * max_next
            };
            if !target.is_finite() {
                bail!("non-finite training target");
            }
            targets.push(target);
        }
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device);

        // Only the taken action's Q-value is pulled toward its target; the
        // other action slots never contribute to the loss.
        let action_indices = Tensor::<B, 1, Int>::from_ints(actions.as_slice(), &self.device)
            .reshape([batch_size, 1]);
        let q_taken: Tensor<B, 1> = self
            .online
            .forward(states)
            .gather(1, action_indices)
            .squeeze(1);

        let loss = (q_taken - targets).powf_scalar(2.0).mean();
        let loss_value = loss
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| anyhow!("loss readback failed: {err:?}"))?[0];
        if !loss_value.is_finite() {
            bail!("non-finite loss");
        }

        let grads = GradientsParams::from_grads(loss.backward(), &self.online);
        let mut optimizer = AdamConfig::new().init::<B, QNetwork<B>>();
        self.online = optimizer.step(self.config.learning_rate, self.online.clone(), grads);

        if self.epsilon > self.config.epsilon_end {
            self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_end);
        }

        Ok(Some(loss_value))
    }

    /// Close out an episode: record its total reward and periodically
    /// hard-copy the online parameters into the target network.
    pub fn end_episode(&mut self, total_reward: f32) {
        self.episodes += 1;
        self.episode_rewards.push_back(total_reward);
        if self.episode_rewards.len() > self.config.reward_history {
            self.episode_rewards.pop_front();
        }
        if self.episodes % self.config.target_sync_episodes == 0 {
            self.sync_target();
        }
    }

    /// Hard copy of online parameters into the target network.
    pub fn sync_target(&mut self) {
        self.target = self.online.clone();
    }

    /// Confidence in [0, 1]: rises as exploration falls, 1.0 once epsilon
    /// sits at its floor.
    pub fn confidence(&self) -> f64 {
        let floor = self.config.epsilon_end;
        let span = (1.0 - floor).max(f64::EPSILON);
        (1.0 - (self.epsilon - floor) / span).clamp(0.0, 1.0)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    pub fn mean_episode_reward(&self) -> f32 {
        if self.episode_rewards.is_empty() {
            return 0.0;
        }
        self.episode_rewards.iter().sum::<f32>() / self.episode_rewards.len() as f32
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Persist the online network and training sidecar under `dir`, keyed by
    /// this agent's model id.
    pub fn save_model(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating model dir {}", dir.display()))?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.online
            .clone()
            .save_file(self.weights_path(dir), &recorder)
            .map_err(|err| anyhow!("recording model weights failed: {err:?}"))?;

        let meta = TrainMeta {
            episodes: self.episodes,
            epsilon: self.epsilon,
        };
        let file = std::fs::File::create(self.meta_path(dir))?;
        serde_json::to_writer(std::io::BufWriter::new(file), &meta)?;
        Ok(())
    }

    /// Restore a previously saved model. A missing or unreadable model is
    /// not an error: the current in-memory policy stays as it is and `false`
    /// is returned.
    pub fn load_model(&mut self, dir: &Path) -> bool {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        match self
            .online
            .clone()
            .load_file(self.weights_path(dir), &recorder, &self.device)
        {
            Ok(model) => {
                self.online = model;
                self.sync_target();
                if let Some(meta) = self.load_meta(dir) {
                    self.episodes = meta.episodes;
                    self.epsilon = meta
                        .epsilon
                        .clamp(self.config.epsilon_end, self.config.epsilon_start);
                }
                tracing::info!(model = %self.model_id, episodes = self.episodes, "restored saved model");
                true
            }
            Err(err) => {
                tracing::debug!(model = %self.model_id, ?err, "no saved model, starting fresh");
                false
            }
        }
    }

    fn load_meta(&self, dir: &Path) -> Option<TrainMeta> {
        let file = std::fs::File::open(self.meta_path(dir)).ok()?;
        serde_json::from_reader(std::io::BufReader::new(file)).ok()
    }

    fn weights_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.model_id)
    }

    fn meta_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.meta.json", self.model_id))
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type TestBackend = Autodiff<NdArray>;

    fn test_config() -> DqnConfig {
        DqnConfig {
            network: QNetworkConfig {
                obs_size: 8,
                action_count: 4,
                hidden_sizes: vec![16, 16],
            },
            batch_size: 4,
            epsilon_decay: 0.5,
            seed: Some(42),
            ..DqnConfig::default()
        }
    }

    fn test_agent(model_id: &str) -> DqnAgent<TestBackend> {
        DqnAgent::new(NdArrayDevice::Cpu, model_id, test_config())
    }

    fn fill_buffer(agent: &mut DqnAgent<TestBackend>, count: usize) {
        for i in 0..count {
            let state = vec![i as f32 / count as f32; 8];
            let next = vec![(i + 1) as f32 / count as f32; 8];
            agent.remember(state, i % 4, 0.5, next, false);
        }
    }

    #[test]
    fn greedy_action_is_deterministic() {
        let mut agent = test_agent("det");
        let obs = vec![0.3; 8];
        let first = agent.act(&obs, false);
        for _ in 0..10 {
            assert_eq!(agent.act(&obs, false), first);
        }
        assert!(first < 4);
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[1.0, 1.0, 1.0, 1.0]), 0);
        assert_eq!(argmax(&[0.0, 2.0, 2.0, 1.0]), 1);
        assert_eq!(argmax(&[0.0, -1.0, 3.0, 3.0]), 2);
    }

    #[test]
    fn replay_below_batch_size_is_a_noop() {
        let mut agent = test_agent("noop");
        fill_buffer(&mut agent, 2);
        let before = agent.epsilon();
        agent.replay();
        assert_eq!(agent.epsilon(), before);
    }

    #[test]
    fn epsilon_decays_monotonically_to_its_floor() {
        let mut agent = test_agent("decay");
        fill_buffer(&mut agent, 8);

        let floor = agent.config.epsilon_end;
        let mut previous = agent.epsilon();
        for _ in 0..12 {
            agent.replay();
            let current = agent.epsilon();
            assert!(current <= previous);
            assert!(current >= floor);
            previous = current;
        }
        // Decay 0.5 must have reached the floor well within 12 steps.
        assert_eq!(agent.epsilon(), floor);
        assert!((agent.confidence() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn training_does_not_shrink_the_buffer() {
        let mut agent = test_agent("buffer");
        fill_buffer(&mut agent, 8);
        agent.replay();
        assert_eq!(agent.replay_len(), 8);
    }

    #[test]
    fn fresh_agent_has_zero_confidence() {
        let agent = test_agent("conf");
        assert!(agent.confidence().abs() < 1e-9);
    }

    #[test]
    fn episode_history_is_bounded() {
        let mut agent = DqnAgent::<TestBackend>::new(
            NdArrayDevice::Cpu,
            "history",
            DqnConfig {
                reward_history: 3,
                ..test_config()
            },
        );
        for i in 0..5 {
            agent.end_episode(i as f32);
        }
        assert_eq!(agent.episodes(), 5);
        // Only the last 3 rewards remain: 2, 3, 4.
        assert!((agent.mean_episode_reward() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn load_from_empty_dir_keeps_policy_intact() {
        let mut agent = test_agent("missing");
        let obs = vec![0.7; 8];
        let before = agent.act(&obs, false);

        let dir = std::env::temp_dir().join("shiftmaze-no-models");
        assert!(!agent.load_model(&dir));
        assert_eq!(agent.act(&obs, false), before);
        assert_eq!(agent.episodes(), 0);
    }

    #[test]
    fn save_then_load_reproduces_decisions() {
        let dir = std::env::temp_dir().join(format!("shiftmaze-models-{}", std::process::id()));
        let obs = vec![0.2; 8];

        let mut trained = test_agent("roundtrip");
        fill_buffer(&mut trained, 8);
        for _ in 0..4 {
            trained.replay();
        }
        trained.end_episode(1.0);
        trained.save_model(&dir).expect("save must succeed");
        let expected = trained.act(&obs, false);

        let mut restored = test_agent("roundtrip");
        assert!(restored.load_model(&dir));
        assert_eq!(restored.act(&obs, false), expected);
        assert_eq!(restored.episodes(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
