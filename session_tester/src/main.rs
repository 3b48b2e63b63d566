use chroma_match::core_modules::utils::image_helper::{load_rgba, save_png};
use chroma_match::{
    Collaborators, FacePainter, Feedback, FeedbackSink, FrameSource, GameConfig,
    ParallelPipeline, Pixel, PixelBuffer, QuantizedColor, SessionObserver, SessionSnapshot,
    SessionState, Spawner, TapPoint, sample_dominant_colors,
};
use log::{debug, error, info};
use std::env;
use std::process::ExitCode;

const FRAME_SECS: f64 = 1.0 / 60.0;
const SWATCH_SIZE: u32 = 32;
const RETAP_AFTER_FRAMES: u32 = 30;

/// Play style of the scripted player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Player {
    /// Taps every revealed target as soon as taps are accepted.
    Perfect,
    /// Never taps; the session should time out.
    Idle,
}

struct Options {
    image_path: String,
    config: GameConfig,
    player: Player,
    palette_out: Option<String>,
}

fn usage() -> &'static str {
    "Usage: session_tester <frame_image> [--config <game.json>] [--idle] [--palette-out <swatches.png>]"
}

fn parse_args() -> Result<Options, String> {
    let mut args = env::args().skip(1);
    let image_path = args.next().ok_or_else(|| usage().to_string())?;
    let mut options = Options {
        image_path,
        config: GameConfig::default(),
        player: Player::Perfect,
        palette_out: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                let json = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?;
                options.config = GameConfig::from_json_str(&json).map_err(|e| e.to_string())?;
            }
            "--idle" => options.player = Player::Idle,
            "--palette-out" => {
                options.palette_out = Some(args.next().ok_or("--palette-out needs a path")?);
            }
            other => return Err(format!("unknown argument {other}\n{}", usage())),
        }
    }
    Ok(options)
}

struct PlacedCube {
    spawned: bool,
}

impl Spawner for PlacedCube {
    fn is_spawned(&self) -> bool {
        self.spawned
    }

    fn despawn(&mut self) {
        info!("cube removed");
        self.spawned = false;
    }
}

/// A camera pointed at a still image.
struct StillCamera(PixelBuffer);

impl FrameSource for StillCamera {
    fn try_acquire_frame(&mut self) -> Option<PixelBuffer> {
        Some(self.0.clone())
    }
}

struct LoggedCube;

impl FacePainter for LoggedCube {
    fn clear_faces(&mut self) {
        debug!("all faces blank");
    }

    fn paint_face(&mut self, index: usize, color: QuantizedColor) {
        info!("face {index} painted {color}");
    }
}

#[derive(Default)]
struct Hud {
    last_state: Option<SessionState>,
}

impl SessionObserver for Hud {
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        if self.last_state != Some(snapshot.state) {
            info!(
                "[{}] main {}s, color {}s",
                snapshot.state,
                snapshot.main_seconds(),
                snapshot.color_seconds()
            );
            self.last_state = Some(snapshot.state);
        }
    }
}

struct Speaker;

impl FeedbackSink for Speaker {
    fn play(&mut self, feedback: Feedback) {
        debug!("feedback: {feedback:?}");
    }
}

/// Remembers the perfect player's last tap until a snapshot shows it landed.
#[derive(Debug, Default)]
struct TapTracker {
    /// Completed count when the tap was sent, and frames waited since.
    awaiting: Option<(usize, u32)>,
}

impl TapTracker {
    /// The target to tap this frame, if any.
    fn next_target(&mut self, snapshot: &SessionSnapshot) -> Option<QuantizedColor> {
        let matched = snapshot.completed.len();
        self.awaiting = match self.awaiting {
            // The actor may drop a tap, so one that never lands is sent again.
            Some((sent_at, waited)) if matched == sent_at && waited < RETAP_AFTER_FRAMES => {
                Some((sent_at, waited + 1))
            }
            _ => None,
        };
        if self.awaiting.is_some()
            || !snapshot.guard_open
            || snapshot.state != SessionState::Playing
        {
            return None;
        }
        let target = snapshot.targets.get(matched).copied()?;
        self.awaiting = Some((matched, 0));
        Some(target)
    }
}

/// First pixel of `color` in scan order, as a tap point at the pixel center.
fn locate(frame: &PixelBuffer, color: QuantizedColor) -> Option<TapPoint> {
    let index = frame.pixels().position(|p| QuantizedColor::from(p) == color)?;
    let x = (index as u32 % frame.width()) as f32 + 0.5;
    let y = (index as u32 / frame.width()) as f32 + 0.5;
    Some(TapPoint::new(
        x / frame.width() as f32,
        y / frame.height() as f32,
    ))
}

fn palette_swatches(colors: &[QuantizedColor]) -> Result<PixelBuffer, String> {
    PixelBuffer::from_fn(SWATCH_SIZE * colors.len() as u32, SWATCH_SIZE, |x, _| {
        colors
            .get((x / SWATCH_SIZE) as usize)
            .map_or(Pixel::default(), |c| c.to_pixel())
    })
    .map_err(|e| e.to_string())
}

async fn run(options: Options) -> Result<SessionState, String> {
    let frame = load_rgba(&options.image_path).map_err(|e| e.to_string())?;
    info!(
        "loaded {}x{} frame from {}",
        frame.width(),
        frame.height(),
        options.image_path
    );

    // Preview the palette so the scripted player knows where to tap.
    let palette = sample_dominant_colors(&frame).map_err(|e| e.to_string())?;
    if let Some(path) = &options.palette_out {
        save_png(path, &palette_swatches(palette.colors())?).map_err(|e| e.to_string())?;
        info!("palette written to {path}");
    }

    let collaborators = Collaborators {
        spawner: Box::new(PlacedCube { spawned: true }),
        frames: Box::new(StillCamera(frame.clone())),
        painter: Box::new(LoggedCube),
        observer: Box::new(Hud::default()),
        feedback: Box::new(Speaker),
    };
    let (handle, task) =
        ParallelPipeline::spawn(options.config.clone(), collaborators).map_err(|e| e.to_string())?;

    let max_frames = ((options.config.session_duration_secs + 5.0) / FRAME_SECS) as usize;
    let mut tracker = TapTracker::default();
    let mut outcome = SessionState::Idle;
    for _ in 0..max_frames {
        handle.tick(FRAME_SECS).map_err(|e| e.to_string())?;
        let snapshot = handle.snapshot().await.map_err(|e| e.to_string())?;
        outcome = snapshot.state;
        if matches!(snapshot.state, SessionState::Ended(_)) {
            break;
        }
        if options.player == Player::Perfect {
            if let Some(point) = tracker
                .next_target(&snapshot)
                .and_then(|target| locate(&frame, target))
            {
                handle.tap(point).map_err(|e| e.to_string())?;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    handle.shutdown().map_err(|e| e.to_string())?;
    task.await.map_err(|e| e.to_string())?;
    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    match run(options).await {
        Ok(state) => {
            println!("Session finished: {state}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_match::quantize;

    fn playing(targets: &[QuantizedColor], completed: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Playing,
            saved: targets.to_vec(),
            targets: targets.to_vec(),
            completed: targets[..completed].to_vec(),
            main_timer: 100.0,
            color_timer: 20.0,
            guard_open: true,
        }
    }

    #[test]
    fn dropped_tap_is_sent_again() {
        let red = quantize(224, 0, 0);
        let mut tracker = TapTracker::default();
        let snapshot = playing(&[red], 0);

        assert_eq!(tracker.next_target(&snapshot), Some(red));
        for _ in 0..RETAP_AFTER_FRAMES {
            assert_eq!(tracker.next_target(&snapshot), None);
        }
        assert_eq!(tracker.next_target(&snapshot), Some(red));
    }

    #[test]
    fn landed_tap_moves_to_the_next_target() {
        let red = quantize(224, 0, 0);
        let green = quantize(0, 224, 0);
        let mut tracker = TapTracker::default();

        assert_eq!(tracker.next_target(&playing(&[red], 0)), Some(red));
        assert_eq!(tracker.next_target(&playing(&[red, green], 1)), Some(green));
    }

    #[test]
    fn waits_for_the_guard_window() {
        let red = quantize(224, 0, 0);
        let mut snapshot = playing(&[red], 0);
        snapshot.guard_open = false;
        assert_eq!(TapTracker::default().next_target(&snapshot), None);
    }
}
