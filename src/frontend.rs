//! A window for the runtime: draws frames with SDL2, turns SDL events into
//! input, and paces ticks to the configured frame rate.
//!
//! Keys: Escape quits, F5 restarts the project, F6 pauses. While a question
//! is open, typed text goes to the answer and Return submits it.

use std::time::{Duration, Instant};

use log::{info, warn};
use sdl2::{
  event::Event,
  image::LoadTexture,
  keyboard::Keycode,
  pixels::Color,
  rect::{Point, Rect},
  render::{Canvas, Texture, TextureCreator},
  video::{Window, WindowContext},
};

use crate::{
  costume::Costume,
  host::{EntityView, Frame, InputState, Renderer, VisualHandle},
  pen::{PenCommand, PenInstruction},
  runtime::Runtime,
  target::{EntityId, EntityState, RotationStyle},
};

pub struct SdlRenderer<'r> {
  canvas: Canvas<Window>,
  creator: &'r TextureCreator<WindowContext>,
  textures: Vec<Texture<'r>>,
  lines: Vec<PenInstruction>,
  stamps: Vec<(EntityId, EntityState)>,
  /// Screen rectangles of the last frame, front to back, for clicks.
  hits: Vec<(EntityId, Rect)>,
}

impl<'r> SdlRenderer<'r> {
  pub fn new(canvas: Canvas<Window>, creator: &'r TextureCreator<WindowContext>) -> Self {
    SdlRenderer {
      canvas,
      creator,
      textures: Vec::new(),
      lines: Vec::new(),
      stamps: Vec::new(),
      hits: Vec::new(),
    }
  }

  /// The frontmost entity under a window position.
  pub fn entity_at(&self, x: i32, y: i32) -> Option<EntityId> {
    self
      .hits
      .iter()
      .find(|(_, rect)| rect.contains_point((x, y)))
      .map(|(id, _)| *id)
  }

  fn draw(&mut self, view: &EntityView, state: &EntityState, width: u32, height: u32) -> Option<Rect> {
    let (costume, VisualHandle(handle)) = (view.costume?, view.visual?);
    let texture = self.textures.get_mut(handle as usize)?;
    let query = texture.query();
    let scale = if view.is_stage {
      1. / costume.bitmap_resolution.max(1) as f64
    } else {
      state.size / 100. / costume.bitmap_resolution.max(1) as f64
    };
    let w = (query.width as f64 * scale).max(1.);
    let h = (query.height as f64 * scale).max(1.);
    let (cx, cy) = if view.is_stage {
      (w / 2., h / 2.)
    } else {
      (costume.rotation_center_x * scale, costume.rotation_center_y * scale)
    };
    let left = width as f64 / 2. + state.x - cx;
    let top = height as f64 / 2. - state.y - cy;
    let rect = Rect::new(left as i32, top as i32, w as u32, h as u32);
    let (angle, flip) = match state.rotation_style {
      RotationStyle::AllAround => (state.direction - 90., false),
      RotationStyle::LeftRight => (0., state.direction < 0.),
      RotationStyle::DontRotate => (0., false),
    };
    texture.set_alpha_mod((255. * (1. - state.effect("ghost") / 100.)) as u8);
    if let Err(error) = self.canvas.copy_ex(
      texture,
      None,
      Some(rect),
      angle,
      Some(Point::new(cx as i32, cy as i32)),
      flip,
      false,
    ) {
      warn!("{}: {error}", view.name);
    }
    Some(rect)
  }

  fn draw_pen(&mut self, width: u32, height: u32) {
    for line in &self.lines {
      self.canvas.set_draw_color(Color::RGBA(line.r, line.g, line.b, line.a));
      let result = self.canvas.draw_line(
        (
          (line.x1 + width as f64 / 2.) as i32,
          (height as f64 / 2. - line.y1) as i32,
        ),
        (
          (line.x2 + width as f64 / 2.) as i32,
          (height as f64 / 2. - line.y2) as i32,
        ),
      );
      if let Err(error) = result {
        warn!("pen: {error}");
        break;
      }
    }
  }
}

impl<'r> Renderer for SdlRenderer<'r> {
  fn load_visual(&mut self, costume: &Costume) -> Result<VisualHandle, String> {
    let texture = self.creator.load_texture(&costume.md5ext)?;
    self.textures.push(texture);
    Ok(VisualHandle(self.textures.len() as u32 - 1))
  }

  fn pen(&mut self, command: &PenCommand) {
    match command {
      PenCommand::Line(line) => self.lines.push(line.clone()),
      PenCommand::Stamp { entity, state } => self.stamps.push((*entity, state.clone())),
      PenCommand::Clear => {
        self.lines.clear();
        self.stamps.clear();
      }
    }
  }

  fn present(&mut self, frame: &Frame) {
    self.canvas.set_draw_color(Color::RGB(255, 255, 255));
    self.canvas.clear();
    self.hits.clear();
    let (width, height) = (frame.stage_width, frame.stage_height);
    let mut entities = frame.entities.iter();
    if let Some(stage) = frame.entities.first().filter(|view| view.is_stage) {
      entities.next();
      self.draw(stage, stage.state, width, height);
    }
    self.draw_pen(width, height);
    let stamps = self.stamps.clone();
    for (entity, state) in &stamps {
      if let Some(view) = frame.entities.iter().find(|view| view.id == *entity) {
        self.draw(view, state, width, height);
      }
    }
    for view in entities.filter(|view| view.state.visible) {
      if let Some(rect) = self.draw(view, view.state, width, height) {
        self.hits.insert(0, (view.id, rect));
      }
    }
    self.canvas.present();
  }
}

/// Names keys the way hat blocks and `key pressed?` spell them.
fn key_name(keycode: Keycode) -> Option<String> {
  Some(match keycode {
    Keycode::Space => "space".to_string(),
    Keycode::Left => "left arrow".to_string(),
    Keycode::Right => "right arrow".to_string(),
    Keycode::Up => "up arrow".to_string(),
    Keycode::Down => "down arrow".to_string(),
    Keycode::Return => "enter".to_string(),
    other => {
      let name = other.name();
      if name.chars().count() != 1 {
        return None;
      }
      name.to_lowercase()
    }
  })
}

/// Opens a window and runs the loaded project until the window closes.
pub fn run(runtime: &mut Runtime) -> Result<(), String> {
  let (width, height) = (runtime.config().stage_width, runtime.config().stage_height);
  let frame = Duration::from_secs(1) / runtime.config().frame_rate.max(1);
  let sdl_context = sdl2::init()?;
  let video_subsystem = sdl_context.video()?;
  let window = video_subsystem
    .window("sprocket", width, height)
    .opengl()
    .position_centered()
    .build()
    .map_err(|e| e.to_string())?;
  let canvas = window.into_canvas().build().map_err(|e| e.to_string())?;
  let creator = canvas.texture_creator();
  let mut event_pump = sdl_context.event_pump()?;
  let mut renderer = SdlRenderer::new(canvas, &creator);
  runtime.load_visuals(&mut renderer);
  runtime.start().map_err(|e| e.to_string())?;

  let epoch = Instant::now();
  let mut input = InputState::default();
  let mut typed = String::new();
  'main: loop {
    let started = Instant::now();
    for event in event_pump.poll_iter() {
      match event {
        Event::Quit { .. }
        | Event::KeyDown {
          keycode: Some(Keycode::Escape),
          ..
        } => break 'main,
        Event::KeyDown {
          keycode: Some(Keycode::F5),
          ..
        } => runtime.start().map_err(|e| e.to_string())?,
        Event::KeyDown {
          keycode: Some(Keycode::F6),
          ..
        } => runtime.toggle_pause(),
        Event::KeyDown {
          keycode: Some(Keycode::Return),
          ..
        } if runtime.world().current_question().is_some() => {
          runtime.answer(&std::mem::take(&mut typed));
        }
        Event::KeyDown {
          keycode: Some(Keycode::Backspace),
          ..
        } => {
          typed.pop();
        }
        Event::TextInput { text, .. } if runtime.world().current_question().is_some() => {
          typed.push_str(&text);
        }
        Event::KeyDown {
          keycode: Some(keycode),
          repeat,
          ..
        } => {
          if let Some(key) = key_name(keycode) {
            if !repeat {
              runtime.key_pressed(&key);
            }
            input.keys_down.insert(key);
          }
        }
        Event::KeyUp {
          keycode: Some(keycode),
          ..
        } => {
          if let Some(key) = key_name(keycode) {
            input.keys_down.remove(&key);
          }
        }
        Event::MouseMotion { x, y, .. } => {
          input.mouse_x = (x - width as i32 / 2) as f64;
          input.mouse_y = (height as i32 / 2 - y) as f64;
        }
        Event::MouseButtonDown { x, y, .. } => {
          input.mouse_down = true;
          let target = renderer
            .entity_at(x, y)
            .or_else(|| runtime.world().stage_id());
          if let Some(target) = target {
            runtime.click(target);
          }
        }
        Event::MouseButtonUp { .. } => input.mouse_down = false,
        _ => {}
      }
    }
    runtime.set_input(input.clone());
    runtime.tick(epoch.elapsed());
    runtime.render(&mut renderer);
    let title = match runtime.world().current_question() {
      Some(question) => format!("sprocket: {} {typed}", question.text),
      None if runtime.is_paused() => "sprocket (paused)".to_string(),
      None => "sprocket".to_string(),
    };
    if let Err(error) = renderer.canvas.window_mut().set_title(&title) {
      warn!("{error}");
    }
    if let Some(rest) = frame.checked_sub(started.elapsed()) {
      ::std::thread::sleep(rest);
    }
  }
  info!("window closed");
  Ok(())
}
