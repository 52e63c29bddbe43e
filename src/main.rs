use std::env;
use std::path::PathBuf;
use std::time::Duration;

use burn::backend::Autodiff;
use burn::backend::NdArray;
use burn::backend::ndarray::NdArrayDevice;
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use shiftmaze::config::{ExplorationProfile, GameConfig};
use shiftmaze::race::Race;

type TrainingBackend = Autodiff<NdArray>;

fn get_env_var_i32(key: &str) -> Option<i32> {
    env::var(key).ok().and_then(|val| val.parse::<i32>().ok())
}

fn get_env_var_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.parse::<u64>().ok())
}

fn get_env_var_f32(key: &str) -> Option<f32> {
    env::var(key).ok().and_then(|val| val.parse::<f32>().ok())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiftmaze=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn config_from_env() -> GameConfig {
    let mut config = GameConfig::default();

    if let Some(width) = get_env_var_i32("MAZE_WIDTH") {
        config.maze_width = width;
    }
    if let Some(height) = get_env_var_i32("MAZE_HEIGHT") {
        config.maze_height = height;
    }
    config.maze_seed = get_env_var_u64("MAZE_SEED");
    if let Some(bots) = get_env_var_u64("BOT_COUNT") {
        config.bot_count = bots as usize;
    }
    if let Some(secs) = get_env_var_u64("MAZE_SHIFT_SECS") {
        config.shift_interval = Duration::from_secs(secs);
    }
    if let Some(intensity) = get_env_var_f32("MAZE_SHIFT_INTENSITY") {
        config.shift_intensity = intensity;
    }
    if let Some(millis) = get_env_var_u64("DECISION_INTERVAL_MS") {
        config.decision_interval = Duration::from_millis(millis);
    }
    if let Some(profile) = env::var("EXPLORATION_PROFILE")
        .ok()
        .and_then(|name| ExplorationProfile::parse(&name))
    {
        config.exploration_profile = profile;
    }
    if let Ok(dir) = env::var("MODEL_DIR") {
        config.model_dir = PathBuf::from(dir);
    }

    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let config = config_from_env();
    let max_ticks = get_env_var_u64("RACE_TICKS").unwrap_or(20_000);
    let tick = Duration::from_millis(50);

    tracing::info!(
        width = config.maze_width,
        height = config.maze_height,
        bots = config.bot_count,
        seed = ?config.maze_seed,
        "starting race"
    );

    let mut race = Race::<TrainingBackend>::new(config, NdArrayDevice::Cpu);
    let outcome = race.run(max_ticks, tick);

    match outcome.winner {
        Some(index) => tracing::info!(
            bot = index,
            ticks = outcome.ticks,
            completion = ?outcome.completion_time,
            "race finished"
        ),
        None => tracing::info!(ticks = outcome.ticks, "no bot reached the goal in time"),
    }

    for (index, controller) in race.controllers().iter().enumerate() {
        tracing::info!(
            bot = index,
            episodes = controller.agent().episodes(),
            epsilon = controller.agent().epsilon(),
            confidence = controller.confidence(),
            mean_reward = controller.agent().mean_episode_reward() as f64,
            "bot summary"
        );
    }

    // Persist models off the driver thread; a slow disk must not stall a
    // future tick loop sharing this runtime.
    tokio::task::spawn_blocking(move || race.save_models()).await?;

    Ok(())
}
