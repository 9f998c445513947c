//! State-to-light aggregation and rendering.
//!
//! The renderer owns the mutable half of the system: the state registry, the
//! heartbeat phase, and the cache of last-written colors. All entry points run
//! on the single engine task, so recompute-and-write sequences never
//! interleave.

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::color::Color;
use crate::config::Board;
use crate::driver::LightDriver;
use crate::heartbeat::Heartbeat;
use crate::heartbeat::HeartbeatPhase;
use crate::mapping::LedMapTable;
use crate::registry::StateRegistry;

/// Resolves entity states into per-LED colors and pushes changes to the
/// driver.
///
/// Aggregation policy: any-on-wins, with the first on entity in configured
/// order determining the color. The heartbeat LED is owned by the heartbeat
/// during its on phase; entity aggregation applies there only as the
/// off-phase fallback.
pub struct AggregationRenderer<D: LightDriver> {
    table: LedMapTable,
    registry: StateRegistry,
    driver: D,
    heartbeat: Option<Heartbeat>,
    brightness: f32,
    off_color: Color,
    force_all_on: bool,

    /// Last color written per LED. Purely a de-duplication cache; entries are
    /// only updated after a successful driver write, so a failed write is
    /// retried by the next event that touches the pixel.
    rendered: HashMap<usize, Color>,
}

impl<D: LightDriver> AggregationRenderer<D> {
    pub fn new(board: Board, driver: D) -> Self {
        Self {
            table: board.table,
            registry: StateRegistry::new(),
            driver,
            heartbeat: board.heartbeat,
            brightness: board.brightness,
            off_color: board.off_color,
            force_all_on: board.force_all_on,
            rendered: HashMap::new(),
        }
    }

    /// Heartbeat tick interval, if a heartbeat is configured.
    pub fn heartbeat_period(&self) -> Option<Duration> {
        self.heartbeat.as_ref().map(Heartbeat::period)
    }

    /// Apply a state-change notification for `entity`.
    ///
    /// Notifications for entities outside the mapping table are logged and
    /// discarded; no-op updates trigger no recomputation or driver write.
    pub async fn on_entity_changed(
        &mut self,
        entity: &str,
        on: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        let Some(leds) = self.table.leds_for_entity(entity) else {
            warn!("ignoring state change for unmapped entity {entity:?}");
            return Ok(());
        };
        let leds: Vec<usize> = leds.iter().copied().collect();

        if !self.registry.update(entity, on) {
            debug!("{entity} unchanged ({})", if on { "on" } else { "off" });
            return Ok(());
        }

        debug!("{entity} -> {}", if on { "on" } else { "off" });
        self.apply(leds).await
    }

    /// Flip the heartbeat phase and re-render its LED. No-op when disabled.
    pub async fn on_heartbeat_tick(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let Some(hb) = &mut self.heartbeat else {
            return Ok(());
        };
        hb.tick();
        let led = hb.led();
        self.apply([led]).await
    }

    /// Change the global brightness and re-render everything.
    pub async fn set_brightness(&mut self, brightness: f32) -> Result<(), Box<dyn Error + Send>> {
        self.brightness = brightness.clamp(0.0, 1.0);
        self.redraw_all().await
    }

    /// Change the off-color and re-render everything.
    pub async fn set_off_color(&mut self, color: Color) -> Result<(), Box<dyn Error + Send>> {
        self.off_color = color;
        self.redraw_all().await
    }

    /// Recompute every configured index plus the heartbeat index.
    pub async fn redraw_all(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let mut leds: Vec<usize> = self.table.lit_indices().collect();
        if let Some(hb) = &self.heartbeat {
            if !leds.contains(&hb.led()) {
                leds.push(hb.led());
            }
        }
        self.apply(leds).await
    }

    /// The color `led` should currently display.
    fn color_for(&self, led: usize) -> Color {
        if let Some(hb) = &self.heartbeat {
            if hb.led() == led && hb.phase() == HeartbeatPhase::PulseOn {
                return hb.color().scale(self.brightness);
            }
        }

        for (entity, on_color) in self.table.entities_for(led) {
            if self.force_all_on || self.registry.get(entity) {
                return on_color.scale(self.brightness);
            }
        }

        self.off_color.scale(self.brightness)
    }

    /// Recompute the given LEDs and push the ones that changed as a single
    /// batched write.
    async fn apply(
        &mut self,
        leds: impl IntoIterator<Item = usize>,
    ) -> Result<(), Box<dyn Error + Send>> {
        let mut changed = Vec::new();
        for led in leds {
            let color = self.color_for(led);
            if self.rendered.get(&led) != Some(&color) {
                changed.push((led, color));
            }
        }

        if changed.is_empty() {
            return Ok(());
        }

        self.driver.set_pixels(&changed).await?;
        self.driver.show().await?;

        for (led, color) in changed {
            self.rendered.insert(led, color);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::heartbeat::Heartbeat;

    const RED: Color = Color::new(255, 0, 0);
    const BLUE: Color = Color::new(0, 0, 255);

    fn board(entries: &[(usize, &str, &str)]) -> Board {
        Board {
            table: LedMapTable::build(entries.iter().map(|&(l, e, c)| (l, e, c))).unwrap(),
            heartbeat: None,
            brightness: 1.0,
            off_color: Color::BLACK,
            force_all_on: false,
        }
    }

    fn renderer(board: Board) -> (AggregationRenderer<MockDriver>, MockDriver) {
        let driver = MockDriver::new();
        (AggregationRenderer::new(board, driver.clone()), driver)
    }

    #[tokio::test]
    async fn test_first_on_in_order_wins() {
        let (mut renderer, driver) = renderer(board(&[
            (0, "lamp.kitchen", "#FF0000"),
            (1, "lamp.hall", "#FF0000"),
            (1, "lamp.porch", "#FF0000"),
        ]));

        renderer.on_entity_changed("lamp.kitchen", true).await.unwrap();
        assert_eq!(driver.last_color(0), Some(RED));

        // Porch wins LED 1 because hall is off.
        renderer.on_entity_changed("lamp.hall", false).await.unwrap();
        renderer.on_entity_changed("lamp.porch", true).await.unwrap();
        assert_eq!(driver.last_color(1), Some(RED));

        renderer.on_entity_changed("lamp.porch", false).await.unwrap();
        assert_eq!(driver.last_color(1), Some(Color::BLACK));
    }

    #[tokio::test]
    async fn test_earlier_entity_color_takes_precedence() {
        let (mut renderer, driver) = renderer(board(&[
            (0, "a", "#FF0000"),
            (0, "b", "#00FF00"),
        ]));

        renderer.on_entity_changed("b", true).await.unwrap();
        assert_eq!(driver.last_color(0), Some(Color::new(0, 255, 0)));

        // Once `a` turns on it owns the pixel regardless of arrival order.
        renderer.on_entity_changed("a", true).await.unwrap();
        assert_eq!(driver.last_color(0), Some(RED));
    }

    #[tokio::test]
    async fn test_noop_update_writes_nothing() {
        let (mut renderer, driver) = renderer(board(&[(0, "a", "#FF0000")]));

        renderer.on_entity_changed("a", true).await.unwrap();
        let shows = driver.show_count();

        renderer.on_entity_changed("a", true).await.unwrap();
        renderer.on_entity_changed("a", true).await.unwrap();
        assert_eq!(driver.show_count(), shows);
    }

    #[tokio::test]
    async fn test_unmapped_entity_is_discarded() {
        let (mut renderer, driver) = renderer(board(&[(0, "a", "#FF0000")]));

        renderer.on_entity_changed("ghost", true).await.unwrap();
        assert_eq!(driver.show_count(), 0);
        assert!(driver.writes().is_empty());
    }

    #[tokio::test]
    async fn test_multi_led_entity_batches_one_write() {
        let (mut renderer, driver) = renderer(board(&[
            (0, "a", "#FF0000"),
            (4, "a", "#FF0000"),
            (7, "a", "#0000FF"),
        ]));

        renderer.on_entity_changed("a", true).await.unwrap();

        // One entity spanning three LEDs is one set_pixels + one show.
        assert_eq!(driver.show_count(), 1);
        let writes = driver.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], vec![(0, RED), (4, RED), (7, BLUE)]);
    }

    #[tokio::test]
    async fn test_brightness_applies_to_on_and_off_colors() {
        let mut b = board(&[(0, "a", "#FF0000")]);
        b.brightness = 0.5;
        b.off_color = Color::new(10, 10, 10);
        let (mut renderer, driver) = renderer(b);

        renderer.on_entity_changed("a", true).await.unwrap();
        assert_eq!(driver.last_color(0), Some(Color::new(128, 0, 0)));

        renderer.on_entity_changed("a", false).await.unwrap();
        assert_eq!(driver.last_color(0), Some(Color::new(5, 5, 5)));
    }

    #[tokio::test]
    async fn test_set_brightness_redraws_everything() {
        let (mut renderer, driver) = renderer(board(&[
            (0, "a", "#FF0000"),
            (1, "b", "#FF0000"),
        ]));

        renderer.redraw_all().await.unwrap();
        renderer.on_entity_changed("a", true).await.unwrap();
        let writes_before = driver.writes().len();

        renderer.set_brightness(0.5).await.unwrap();

        let writes = driver.writes();
        assert_eq!(writes.len(), writes_before + 1);
        // LED 1 is already black; the brightness redraw only rewrites LED 0.
        assert_eq!(writes[writes_before], vec![(0, Color::new(128, 0, 0))]);
    }

    #[tokio::test]
    async fn test_heartbeat_owns_its_pixel_while_on() {
        let mut b = board(&[(2, "a", "#FF0000")]);
        b.heartbeat = Some(Heartbeat::new(2, 500, BLUE).unwrap());
        let (mut renderer, driver) = renderer(b);

        renderer.on_entity_changed("a", true).await.unwrap();
        assert_eq!(driver.last_color(2), Some(RED));

        // Pulse on: indicator color wins over the on entity.
        renderer.on_heartbeat_tick().await.unwrap();
        assert_eq!(driver.last_color(2), Some(BLUE));

        // Pulse off: entity aggregation applies again.
        renderer.on_heartbeat_tick().await.unwrap();
        assert_eq!(driver.last_color(2), Some(RED));
    }

    #[tokio::test]
    async fn test_two_ticks_produce_blue_then_black() {
        let mut b = board(&[]);
        b.heartbeat = Some(Heartbeat::new(2, 1, BLUE).unwrap());
        let (mut renderer, driver) = renderer(b);

        renderer.on_heartbeat_tick().await.unwrap();
        assert_eq!(driver.last_color(2), Some(BLUE));
        renderer.on_heartbeat_tick().await.unwrap();
        assert_eq!(driver.last_color(2), Some(Color::BLACK));
    }

    #[tokio::test]
    async fn test_redraw_all_blanks_the_board() {
        let mut b = board(&[(0, "a", "#FF0000"), (5, "b", "#00FF00")]);
        b.heartbeat = Some(Heartbeat::new(9, 500, BLUE).unwrap());
        let (mut renderer, driver) = renderer(b);

        renderer.redraw_all().await.unwrap();

        let writes = driver.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0],
            vec![(0, Color::BLACK), (5, Color::BLACK), (9, Color::BLACK)]
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_on_next_event() {
        let (mut renderer, driver) = renderer(board(&[(0, "a", "#FF0000"), (1, "b", "#00FF00")]));

        driver.fail_next_show();
        assert!(renderer.on_entity_changed("a", true).await.is_err());
        assert_eq!(driver.last_color(0), None);

        // The failed pixel was not cached, so the next event rewrites it.
        renderer.on_entity_changed("b", true).await.unwrap();
        renderer.on_entity_changed("a", false).await.unwrap();
        renderer.on_entity_changed("a", true).await.unwrap();
        assert_eq!(driver.last_color(0), Some(RED));
    }

    #[tokio::test]
    async fn test_force_all_on_renders_first_configured_color() {
        let mut b = board(&[(0, "a", "#FF0000"), (0, "b", "#00FF00")]);
        b.force_all_on = true;
        let (mut renderer, driver) = renderer(b);

        renderer.redraw_all().await.unwrap();
        assert_eq!(driver.last_color(0), Some(RED));
    }
}
