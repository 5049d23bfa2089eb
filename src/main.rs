use log::error;
use rhythm::config::RhythmConfig;
use rhythm::engine::Engine;
use rhythm::generate::CommandGenerator;
use rhythm::oracle::uci::UciEngine;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RhythmConfig::default();
    let path = std::env::var("RHYTHM_ENGINE").unwrap_or_else(|_| "stockfish".to_string());
    let oracle = UciEngine::new(path).with_retry(config.retry.clone());

    let mut engine = Engine::new(oracle, config);
    if let Ok(generator) = std::env::var("RHYTHM_GENERATOR") {
        engine = engine.with_generator(CommandGenerator::new(generator));
    }
    if let Err(e) = engine.run().await {
        error!("{e}");
        std::process::exit(1);
    }
}
