use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use playctl::{default_config_path, PlaybackController, PlayerConfig, PlayerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const VOLUME_STEP: i64 = 5;
const SEEK_STEP: i64 = 10;

#[derive(Parser, Debug)]
#[command(name = "playctl", version, about = "Play stream URIs through mpv or ffplay")]
struct Args {
  /// Config file (defaults to the user config dir)
  #[arg(long)]
  config: Option<PathBuf>,

  /// Engine executable, overriding the config file
  #[arg(long)]
  engine: Option<String>,

  /// Control socket path, overriding the config file
  #[arg(long)]
  socket: Option<PathBuf>,

  /// http(s) URIs: the first plays, the rest are queued
  uris: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let mut config = match args.config.clone().or_else(default_config_path) {
    Some(path) => PlayerConfig::load(&path)
      .with_context(|| format!("loading config from {}", path.display()))?,
    None => PlayerConfig::default(),
  };
  if args.engine.is_some() {
    config.engine_path = args.engine.clone();
  }
  if args.socket.is_some() {
    config.socket_path = args.socket.clone();
  }

  let controller = PlaybackController::new(&config);
  let poller = controller.spawn_poller();
  let printer = tokio::spawn(print_events(controller.clone()));

  for (i, uri) in args.uris.iter().enumerate() {
    let result = if i == 0 {
      controller.play(uri).await
    } else {
      controller.enqueue(uri).await
    };
    result.with_context(|| format!("starting {uri}"))?;
  }

  print_help();
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        log::info!("Interrupted");
        break;
      }
      line = lines.next_line() => match line {
        Ok(Some(line)) => {
          if !handle_command(&controller, line.trim()).await {
            break;
          }
        }
        Ok(None) => break,
        Err(e) => {
          log::error!("Failed to read stdin: {}", e);
          break;
        }
      },
    }
  }

  let outcome = controller.stop().await;
  log::info!("Engine shut down: {:?}", outcome);
  poller.stop().await;
  printer.abort();
  Ok(())
}

/// Run one stdin command. Returns `false` to quit.
async fn handle_command(controller: &PlaybackController, line: &str) -> bool {
  let (cmd, arg) = match line.split_once(' ') {
    Some((cmd, arg)) => (cmd, arg.trim()),
    None => (line, ""),
  };

  let result = match cmd {
    "" => Ok(()),
    "p" => controller.toggle_pause().await.map(|r| log::debug!("Pause: {:?}", r)),
    "+" | "-" => {
      let step = if cmd == "+" { VOLUME_STEP } else { -VOLUME_STEP };
      let volume = controller
        .get_volume()
        .await
        .unwrap_or(playctl::player::DEFAULT_VOLUME);
      controller.set_volume(i64::from(volume) + step).await.map(drop)
    }
    "v" => match arg.parse::<i64>() {
      Ok(volume) => controller.set_volume(volume).await.map(drop),
      Err(_) => {
        println!("usage: v <0-100>");
        Ok(())
      }
    },
    "f" => controller.seek(SEEK_STEP).await.map(drop),
    "b" => controller.seek(-SEEK_STEP).await.map(drop),
    "n" => controller.play_next().await.map(|next| {
      if next.is_none() {
        println!("Queue is empty");
      }
    }),
    "prev" => controller.previous().await.map(|prev| {
      if prev.is_none() {
        println!("Nothing played before this");
      }
    }),
    "a" => controller.enqueue(arg).await,
    "r" => {
      if !controller.remove_from_queue(arg).await {
        println!("Not removed: {arg}");
      }
      Ok(())
    }
    "l" => {
      for (i, track) in controller.queue().iter().enumerate() {
        println!("{:>3}. {}", i + 1, track.label());
      }
      Ok(())
    }
    "s" => {
      controller.stop().await;
      Ok(())
    }
    "q" => return false,
    "h" | "?" => {
      print_help();
      Ok(())
    }
    other => {
      println!("Unknown command {other:?} (h for help)");
      Ok(())
    }
  };

  if let Err(e) = result {
    log::error!("{}", e);
  }
  true
}

async fn print_events(controller: PlaybackController) {
  let events = controller.events();
  let mut stdout = std::io::stdout();
  while let Ok(event) = events.recv().await {
    match event {
      PlayerEvent::Status { line, .. } => {
        let _ = write!(stdout, "\r\x1b[2K{line}");
      }
      PlayerEvent::TrackStarted(track) => {
        let _ = writeln!(stdout, "\r\x1b[2KNow playing: {}", track.label());
      }
      PlayerEvent::Stopped => {
        let _ = writeln!(stdout, "\r\x1b[2KStopped");
      }
      PlayerEvent::QueueChanged(len) => {
        log::debug!("Queue length {}", len);
      }
    }
    let _ = stdout.flush();
  }
}

fn print_help() {
  println!(
    "p pause/resume | +/- volume | v <n> set volume | f/b seek | n next | prev previous\n\
     a <uri> queue | r <uri> unqueue | l list queue | s stop | q quit"
  );
}
