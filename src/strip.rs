extern crate smart_leds;

use smart_leds::{SmartLedsWrite, RGB8};

use crate::result;

pub const OFF: RGB8 = RGB8{r: 0, g: 0, b: 0};
pub const RED: RGB8 = RGB8{r: 255, g: 0, b: 0};

/// Colour of every position on the strip. Overwritten wholesale on each
/// update; nothing is diffed.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pixels: Vec<RGB8>,
}

impl DisplayState {
    pub fn new(num_pixels: usize) -> DisplayState {
        return DisplayState{
            pixels: vec![OFF; num_pixels],
        };
    }

    pub fn len(&self) -> usize {
        return self.pixels.len();
    }

    pub fn pixels(&self) -> &[RGB8] {
        return &self.pixels;
    }

    pub fn fill(&mut self, color: RGB8) {
        for pixel in self.pixels.iter_mut() {
            *pixel = color;
        }
    }

    pub fn set(&mut self, position: usize, color: RGB8) -> result::TubeResult<()> {
        let len = self.pixels.len();
        let pixel = self.pixels.get_mut(position).ok_or_else(|| result::make_error(&format!(
            "Position {} is outside the strip (0..{})", position, len)))?;
        *pixel = color;
        return Ok(());
    }

    pub fn lit_positions(&self) -> Vec<usize> {
        return self.pixels.iter()
            .enumerate()
            .filter(|(_, color)| **color != OFF)
            .map(|(position, _)| position)
            .collect();
    }
}

/// "Set the active position among N", which is all the poll loop needs
/// from a display.
pub trait StationDisplay {
    fn num_positions(&self) -> usize;

    /// Turns every position off, then lights `position`.
    fn light_up(&mut self, position: usize) -> result::TubeResult<()>;

    fn clear(&mut self) -> result::TubeResult<()>;
}

pub const DEFAULT_BRIGHTNESS: f32 = 0.5;

// smart_leds::brightness wants 0..=255.
fn brightness_level(brightness: f32) -> u8 {
    return (brightness.max(0.0).min(1.0) * 255.0).round() as u8;
}

/// A strip of addressable LEDs behind any `SmartLedsWrite` driver.
pub struct LedStrip<W> {
    state: DisplayState,
    writer: W,
    active_color: RGB8,
    brightness: u8,
}

impl<W> LedStrip<W> {
    pub fn new(num_pixels: usize, writer: W) -> LedStrip<W> {
        return LedStrip{
            state: DisplayState::new(num_pixels),
            writer: writer,
            active_color: RED,
            brightness: brightness_level(DEFAULT_BRIGHTNESS),
        };
    }

    pub fn with_active_color(mut self, color: RGB8) -> LedStrip<W> {
        self.active_color = color;
        return self;
    }

    pub fn with_brightness(mut self, brightness: f32) -> LedStrip<W> {
        self.brightness = brightness_level(brightness);
        return self;
    }

    pub fn state(&self) -> &DisplayState {
        return &self.state;
    }

    pub fn writer(&self) -> &W {
        return &self.writer;
    }
}

impl<W> LedStrip<W>
where W: SmartLedsWrite<Color = RGB8>, W::Error: std::fmt::Debug {
    fn show(&mut self) -> result::TubeResult<()> {
        let frame = smart_leds::brightness(self.state.pixels().iter().cloned(), self.brightness);
        return self.writer.write(frame)
            .map_err(|err| result::make_error(&format!("LED strip write failed: {:?}", err)));
    }
}

impl<W> StationDisplay for LedStrip<W>
where W: SmartLedsWrite<Color = RGB8>, W::Error: std::fmt::Debug {
    fn num_positions(&self) -> usize {
        return self.state.len();
    }

    fn light_up(&mut self, position: usize) -> result::TubeResult<()> {
        if position >= self.state.len() {
            return Err(result::make_error(&format!(
                "Position {} is outside the strip (0..{})", position, self.state.len())));
        }

        self.state.fill(OFF);
        self.state.set(position, self.active_color)?;
        debug!("Lighting position {}", position);
        return self.show();
    }

    fn clear(&mut self) -> result::TubeResult<()> {
        self.state.fill(OFF);
        return self.show();
    }
}

/// Keeps the last frame in memory instead of driving hardware.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    last_frame: Option<Vec<RGB8>>,
    frames_written: usize,
}

impl MemoryWriter {
    pub fn new() -> MemoryWriter {
        return MemoryWriter::default();
    }

    pub fn last_frame(&self) -> Option<&[RGB8]> {
        return self.last_frame.as_deref();
    }

    pub fn frames_written(&self) -> usize {
        return self.frames_written;
    }
}

impl SmartLedsWrite for MemoryWriter {
    type Error = std::convert::Infallible;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where T: IntoIterator<Item = I>, I: Into<Self::Color> {
        self.last_frame = Some(iterator.into_iter().map(|color| color.into()).collect());
        self.frames_written += 1;
        return Ok(());
    }
}
