//! SDL2 window renderer.
//!
//! One streaming RGB24 texture at frame geometry, stretched to the
//! window by the canvas copy. The event queue is drained by `is_open`,
//! which the pipeline polls once per iteration as its liveness gate.

use sdl2::Sdl;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};

use crate::DisplayError;
use crate::decode::JpegDecoder;

/// Decodes and presents frames in a resizable window.
pub struct DisplayRenderer {
    canvas: Canvas<Window>,
    texture: Texture,
    // The texture's backing store lives in the creator; it must outlive
    // the texture (unsafe_textures drops the compile-time check).
    _texture_creator: TextureCreator<WindowContext>,
    event_pump: sdl2::EventPump,
    decoder: JpegDecoder,
    frame_width: u32,
    open: bool,
    _sdl: Sdl,
}

impl DisplayRenderer {
    /// Open a centered, resizable window of `window_width × window_height`
    /// presenting frames of `frame_width × frame_height`.
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        window_width: u32,
        window_height: u32,
        title: &str,
    ) -> Result<Self, DisplayError> {
        let init = DisplayError::Init;

        let sdl = sdl2::init().map_err(init)?;
        let video = sdl.video().map_err(init)?;

        let window = video
            .window(title, window_width, window_height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| DisplayError::Init(e.to_string()))?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .map_err(|e| DisplayError::Init(e.to_string()))?;

        let texture_creator = canvas.texture_creator();
        let texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, frame_width, frame_height)
            .map_err(|e| DisplayError::Init(e.to_string()))?;

        let event_pump = sdl.event_pump().map_err(DisplayError::Init)?;

        Ok(Self {
            canvas,
            texture,
            _texture_creator: texture_creator,
            event_pump,
            decoder: JpegDecoder::new(frame_width, frame_height),
            frame_width,
            open: true,
            _sdl: sdl,
        })
    }

    /// Decode and present one frame.
    pub fn render(&mut self, jpeg: &[u8]) -> Result<(), DisplayError> {
        if !self.open {
            return Ok(());
        }

        let rgb = self.decoder.decode(jpeg)?;
        let pitch = self.frame_width as usize * 3;
        self.texture
            .update(None, rgb, pitch)
            .map_err(|e| DisplayError::Render(e.to_string()))?;

        self.canvas.clear();
        self.canvas
            .copy(&self.texture, None, None)
            .map_err(DisplayError::Render)?;
        self.canvas.present();

        Ok(())
    }

    /// Drain pending window events; `false` once the user quit
    /// (window close or Escape).
    pub fn is_open(&mut self) -> bool {
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => self.open = false,
                _ => {}
            }
        }
        self.open
    }
}
