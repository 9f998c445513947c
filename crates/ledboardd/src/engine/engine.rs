//! ledboardd engine
//!
//! Single-consumer event loop that serializes everything touching the
//! renderer: entity-state notifications from the state source, heartbeat
//! ticks, and administrative changes all post into one channel, and one task
//! drains it. Driver failures are logged and the loop keeps going; the
//! renderer retries the affected pixels on the next event.

use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use super::renderer::AggregationRenderer;
use crate::color::Color;
use crate::driver::LightDriver;

/// Capacity for the event channel. Provides backpressure when the state
/// source delivers faster than the engine can render.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Events processed by the engine task.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An entity's boolean state changed (or was re-reported).
    StateChanged { entity_id: String, on: bool },

    /// Heartbeat phase flip, posted by the internal ticker task.
    HeartbeatTick,

    /// Administrative: change global brightness and redraw.
    SetBrightness(f32),

    /// Administrative: change the off-color and redraw.
    SetOffColor(Color),

    /// Administrative: recompute every configured LED.
    Redraw,
}

/// The engine has shut down and no longer accepts events.
#[derive(Debug, thiserror::Error)]
#[error("engine is no longer running")]
pub struct EngineClosed;

/// Cloneable sender half used by the state source and administrative callers.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    pub async fn state_changed(&self, entity_id: &str, on: bool) -> Result<(), EngineClosed> {
        self.send(EngineEvent::StateChanged {
            entity_id: entity_id.to_string(),
            on,
        })
        .await
    }

    pub async fn set_brightness(&self, brightness: f32) -> Result<(), EngineClosed> {
        self.send(EngineEvent::SetBrightness(brightness)).await
    }

    pub async fn set_off_color(&self, color: Color) -> Result<(), EngineClosed> {
        self.send(EngineEvent::SetOffColor(color)).await
    }

    pub async fn redraw(&self) -> Result<(), EngineClosed> {
        self.send(EngineEvent::Redraw).await
    }

    async fn send(&self, event: EngineEvent) -> Result<(), EngineClosed> {
        self.tx.send(event).await.map_err(|_| EngineClosed)
    }
}

/// Owns the renderer and drains the event channel.
pub struct Engine<D: LightDriver> {
    renderer: AggregationRenderer<D>,
    rx: mpsc::Receiver<EngineEvent>,
    tx: mpsc::Sender<EngineEvent>,
}

impl<D: LightDriver> Engine<D> {
    pub fn new(renderer: AggregationRenderer<D>) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let handle = EngineHandle { tx: tx.clone() };
        (Self { renderer, rx, tx }, handle)
    }

    /// Run the event loop until every handle (and the heartbeat ticker, if
    /// any) is gone.
    ///
    /// Starts with a full redraw so the board reflects registry state (all
    /// off) immediately, then spawns the heartbeat ticker when configured.
    pub async fn run(self) {
        let Self {
            mut renderer,
            mut rx,
            tx,
        } = self;

        info!("engine starting");

        if let Err(e) = renderer.redraw_all().await {
            warn!("initial redraw failed: {e}");
        }

        if let Some(period) = renderer.heartbeat_period() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                // The first tick completes immediately; skip it so the phase
                // flips on the period boundary.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if tx.send(EngineEvent::HeartbeatTick).await.is_err() {
                        break;
                    }
                }
            });
        }

        // The loop must only hold the receiver, or it would keep itself alive.
        drop(tx);

        while let Some(event) = rx.recv().await {
            if let Err(e) = Self::dispatch(&mut renderer, event).await {
                warn!("render failed: {e} (will retry on the next event)");
            }
        }

        info!("engine shutting down");
    }

    async fn dispatch(
        renderer: &mut AggregationRenderer<D>,
        event: EngineEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send>> {
        match event {
            EngineEvent::StateChanged { entity_id, on } => {
                renderer.on_entity_changed(&entity_id, on).await
            }
            EngineEvent::HeartbeatTick => renderer.on_heartbeat_tick().await,
            EngineEvent::SetBrightness(brightness) => {
                info!("brightness changed to {brightness}");
                renderer.set_brightness(brightness).await
            }
            EngineEvent::SetOffColor(color) => {
                info!("off color changed to {color}");
                renderer.set_off_color(color).await
            }
            EngineEvent::Redraw => renderer.redraw_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Board;
    use crate::driver::MockDriver;
    use crate::mapping::LedMapTable;

    fn engine_with(
        entries: &[(usize, &str, &str)],
    ) -> (Engine<MockDriver>, EngineHandle, MockDriver) {
        let board = Board {
            table: LedMapTable::build(entries.iter().map(|&(l, e, c)| (l, e, c))).unwrap(),
            heartbeat: None,
            brightness: 1.0,
            off_color: Color::BLACK,
            force_all_on: false,
        };
        let driver = MockDriver::new();
        let renderer = AggregationRenderer::new(board, driver.clone());
        let (engine, handle) = Engine::new(renderer);
        (engine, handle, driver)
    }

    #[tokio::test]
    async fn test_events_render_in_order() {
        let (engine, handle, driver) = engine_with(&[(0, "a", "#FF0000"), (1, "b", "#00FF00")]);

        handle.state_changed("a", true).await.unwrap();
        handle.state_changed("b", true).await.unwrap();
        handle.state_changed("a", false).await.unwrap();
        drop(handle);

        // With all senders gone the loop drains the queue and returns.
        engine.run().await;

        assert_eq!(driver.last_color(0), Some(Color::BLACK));
        assert_eq!(driver.last_color(1), Some(Color::new(0, 255, 0)));
    }

    #[tokio::test]
    async fn test_driver_failure_does_not_stop_the_loop() {
        let (engine, handle, driver) = engine_with(&[(0, "a", "#FF0000")]);

        driver.fail_next_show();
        handle.state_changed("a", true).await.unwrap();
        handle.state_changed("a", false).await.unwrap();
        handle.state_changed("a", true).await.unwrap();
        drop(handle);

        engine.run().await;

        assert_eq!(driver.last_color(0), Some(Color::new(255, 0, 0)));
    }

    #[tokio::test]
    async fn test_handle_reports_closed_engine() {
        let (engine, handle, _driver) = engine_with(&[(0, "a", "#FF0000")]);
        drop(engine);

        assert!(handle.state_changed("a", true).await.is_err());
    }
}
