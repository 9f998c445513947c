//! Output path to the addressable LED strip.
//!
//! The renderer talks to a [`LightDriver`]: stage changed pixels with
//! `set_pixels`, then commit the frame with `show`. The production
//! implementation speaks the WLED UDP realtime protocol; tests use
//! [`MockDriver`].

use std::error::Error;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::color::Color;

/// Driver for an addressable LED strip.
///
/// Implementations are expected to buffer `set_pixels` and perform the
/// physical write on `show`, so one logical event turns into one bus
/// transaction regardless of how many pixels it touched.
#[async_trait]
pub trait LightDriver: Send {
    /// Stage colors for the given pixel indices.
    async fn set_pixels(&mut self, pixels: &[(usize, Color)]) -> Result<(), Box<dyn Error + Send>>;

    /// Commit staged pixels to the physical strip.
    async fn show(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// WLED realtime protocol byte for a full-frame RGB packet.
const WLED_DRGB: u8 = 2;

/// Seconds the strip holds realtime data before returning to its own state.
const WLED_TIMEOUT_S: u8 = 255;

/// Drives a WLED-compatible strip over the UDP realtime protocol.
///
/// Keeps a full frame of `length` pixels; `show` sends the frame as a single
/// DRGB datagram. Pixels outside the configured mappings are never staged and
/// stay black in the frame.
pub struct UdpStripDriver {
    socket: UdpSocket,
    frame: Vec<Color>,
}

impl UdpStripDriver {
    /// Bind a local socket and associate it with the strip at `target`.
    pub async fn connect(target: &str, length: usize) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;

        Ok(Self {
            socket,
            frame: vec![Color::BLACK; length],
        })
    }
}

#[async_trait]
impl LightDriver for UdpStripDriver {
    async fn set_pixels(&mut self, pixels: &[(usize, Color)]) -> Result<(), Box<dyn Error + Send>> {
        for &(index, color) in pixels {
            // Indices are validated against strip length at config build time.
            if let Some(slot) = self.frame.get_mut(index) {
                *slot = color;
            }
        }
        Ok(())
    }

    async fn show(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let mut packet = Vec::with_capacity(2 + self.frame.len() * 3);
        packet.push(WLED_DRGB);
        packet.push(WLED_TIMEOUT_S);
        for color in &self.frame {
            packet.extend_from_slice(&[color.r, color.g, color.b]);
        }

        self.socket
            .send(&packet)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        Ok(())
    }
}

/// Mock driver recording every call for assertions.
///
/// Cloning yields a handle onto the same recorded state, so a test can keep
/// one clone while the engine owns the other.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    inner: std::sync::Arc<std::sync::Mutex<MockDriverState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MockDriverState {
    /// One entry per `set_pixels` call.
    writes: Vec<Vec<(usize, Color)>>,
    shows: usize,
    fail_next_show: bool,
}

#[cfg(test)]
impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `set_pixels` batches recorded so far.
    pub fn writes(&self) -> Vec<Vec<(usize, Color)>> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn show_count(&self) -> usize {
        self.inner.lock().unwrap().shows
    }

    /// Last color written for `index`, if any batch touched it.
    pub fn last_color(&self, index: usize) -> Option<Color> {
        let state = self.inner.lock().unwrap();
        state
            .writes
            .iter()
            .rev()
            .find_map(|batch| batch.iter().rev().find(|(i, _)| *i == index))
            .map(|&(_, color)| color)
    }

    /// Make the next `show` fail with an I/O error.
    pub fn fail_next_show(&self) {
        self.inner.lock().unwrap().fail_next_show = true;
    }
}

#[cfg(test)]
#[async_trait]
impl LightDriver for MockDriver {
    async fn set_pixels(&mut self, pixels: &[(usize, Color)]) -> Result<(), Box<dyn Error + Send>> {
        self.inner.lock().unwrap().writes.push(pixels.to_vec());
        Ok(())
    }

    async fn show(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_next_show {
            state.fail_next_show = false;
            // Roll back the staged batch like a failed bus transaction.
            state.writes.pop();
            return Err(Box::new(std::io::Error::other("injected show failure")));
        }
        state.shows += 1;
        Ok(())
    }
}
