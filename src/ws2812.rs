// WS2812 ("NeoPixel") strip on the Raspberry Pi SPI0 bus.
//
// Wire the strip's DIN to MOSI (GPIO 10) and enable SPI with
// sudo raspi-config. ws2812-spi shapes the WS2812 pulses from SPI bytes and
// needs a 2-3.8MHz clock.
extern crate rppal;
extern crate ws2812_spi;

use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use crate::result;

const SPI_CLOCK_HZ: u32 = 3_000_000;

// spidev's default bufsiz; one frame has to fit in it.
pub const SPI_BUFFER_BYTES: usize = 4096;

// Four SPI bytes per colour byte, three colour bytes per LED.
const SPI_BYTES_PER_PIXEL: usize = 12;

// Low time that latches the frame (140 bytes is ~370us at 3MHz).
const RESET_BYTES: usize = 140;

pub type Ws2812Writer = ws2812_spi::Ws2812<Spi>;

pub fn frame_bytes(num_pixels: usize) -> usize {
    return num_pixels * SPI_BYTES_PER_PIXEL + RESET_BYTES;
}

pub fn max_pixels() -> usize {
    return (SPI_BUFFER_BYTES - RESET_BYTES) / SPI_BYTES_PER_PIXEL;
}

pub fn check_strip_length(num_pixels: usize) -> result::TubeResult<()> {
    if frame_bytes(num_pixels) > SPI_BUFFER_BYTES {
        return Err(result::make_error(&format!(
            "{} pixels need {} SPI bytes per frame; at most {} pixels fit in {} bytes",
            num_pixels, frame_bytes(num_pixels), max_pixels(), SPI_BUFFER_BYTES)));
    }
    return Ok(());
}

/// Opens SPI0 for a strip of `num_pixels` LEDs.
pub fn open(num_pixels: usize) -> result::TubeResult<Ws2812Writer> {
    check_strip_length(num_pixels)?;
    let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)?;
    info!("Driving {} WS2812 pixels on SPI0 at {}Hz", num_pixels, SPI_CLOCK_HZ);
    return Ok(ws2812_spi::Ws2812::new(spi));
}

#[cfg(test)]
mod tests {
    use crate::stations;

    #[test]
    fn default_strip_fits_spi_buffer() {
        assert!(super::check_strip_length(stations::DEFAULT_NUM_PIXELS).is_ok());
        assert_eq!(12 * 50 + 140, super::frame_bytes(50));
    }

    #[test]
    fn longest_strip_that_fits() {
        let max = super::max_pixels();
        assert_eq!(329, max);
        assert!(super::frame_bytes(max) <= super::SPI_BUFFER_BYTES);
        assert!(super::check_strip_length(max).is_ok());
    }

    #[test]
    fn one_pixel_too_many() {
        let too_many = super::max_pixels() + 1;
        assert!(super::frame_bytes(too_many) > super::SPI_BUFFER_BYTES);

        let err = super::check_strip_length(too_many).expect_err("strip too long");
        assert!(format!("{}", err).contains("at most 329 pixels"));
    }
}
