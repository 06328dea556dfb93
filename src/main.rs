use std::{error::Error, path::PathBuf, time::Duration};

use clap::Parser;
use log::info;
use sprocket::{host::HeadlessRenderer, Config, ProjectData, Runtime};

#[derive(Parser, Debug)]
#[command(name = "sprocket")]
#[command(about = "Run a block project document")]
struct Args {
  /// Path to the project document (JSON)
  project: PathBuf,

  /// Runtime settings file (JSON); command line flags override it
  #[arg(long)]
  config: Option<PathBuf>,

  /// Run this many ticks without a window, then print the final state
  #[arg(long, default_value = "300")]
  ticks: u64,

  #[arg(long)]
  clone_limit: Option<usize>,

  #[arg(long)]
  frame_rate: Option<u32>,

  /// Never open a window, even when built with the `sdl` feature
  #[arg(long)]
  headless: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
  pretty_env_logger::init();

  let args = Args::parse();
  let mut config = match &args.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  if let Some(clone_limit) = args.clone_limit {
    config.clone_limit = clone_limit;
  }
  if let Some(frame_rate) = args.frame_rate {
    config.frame_rate = frame_rate.max(1);
  }

  let project = ProjectData::load(&args.project)?;
  let mut runtime = Runtime::new(config);
  runtime.load_project(&project)?;

  #[cfg(feature = "sdl")]
  if !args.headless {
    return sprocket::frontend::run(&mut runtime).map_err(Into::into);
  }
  #[cfg(not(feature = "sdl"))]
  if !args.headless {
    info!("built without the sdl feature, running headless");
  }

  run_headless(&mut runtime, args.ticks)?;
  Ok(())
}

fn run_headless(runtime: &mut Runtime, ticks: u64) -> Result<(), Box<dyn Error>> {
  let frame = Duration::from_secs(1) / runtime.config().frame_rate.max(1);
  let mut renderer = HeadlessRenderer::default();
  runtime.load_visuals(&mut renderer);
  runtime.start()?;
  let mut now = Duration::ZERO;
  for _ in 0..ticks {
    runtime.tick(now);
    runtime.render(&mut renderer);
    if !runtime.is_running() {
      break;
    }
    now += frame;
  }
  info!(
    "ran {} frames, {} executors still live",
    renderer.frames,
    runtime.executor_count()
  );
  for entity in runtime.entities() {
    let state = &entity.state;
    println!(
      "{:<16} x={:<8} y={:<8} dir={:<6} size={:<6} visible={}",
      entity.name(),
      state.x,
      state.y,
      state.direction,
      state.size,
      state.visible
    );
  }
  for diagnostic in runtime.diagnostics() {
    println!("{diagnostic}");
  }
  Ok(())
}
